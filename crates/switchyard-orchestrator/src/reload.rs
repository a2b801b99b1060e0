//! Hot reload of the provider set from the config file
//!
//! Invalid edits are logged and ignored; the running catalog stays in
//! place. Router settings are read once at startup and only the
//! `[[providers]]` list is swapped on reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use switchyard_config::Config;
use switchyard_provider::CatalogError;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::orchestrator::Orchestrator;

/// Editors often write a file in several steps
const DEBOUNCE: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum ReloadError {
    /// The file could not be read, parsed or validated
    #[error("invalid configuration: {0:#}")]
    Config(anyhow::Error),

    /// The provider set could not be built
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The file watcher could not be started
    #[error("failed to watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Load `path` and swap its providers into the orchestrator's catalog
pub fn reload_from_path(path: &Path, orchestrator: &Orchestrator) -> Result<u64, ReloadError> {
    let config = Config::load(path).map_err(ReloadError::Config)?;
    let version = orchestrator.reload(&config.providers)?;
    Ok(version)
}

/// Watches the config file and reloads providers on change
///
/// Dropping the watcher stops file notifications; the background task
/// ends when the token is cancelled or notifications stop.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl ConfigWatcher {
    /// Start watching `path`; must be called inside a Tokio runtime
    pub fn spawn(path: PathBuf, orchestrator: Arc<Orchestrator>, cancel: CancellationToken) -> Result<Self, ReloadError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();

        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            if let Ok(event) = result {
                let _ = tx.send(event);
            }
        })
        .map_err(|source| ReloadError::Watch {
            path: path.clone(),
            source,
        })?;

        // Watch the directory so atomic rename-over saves are seen
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|source| ReloadError::Watch {
                path: dir.clone(),
                source,
            })?;

        tracing::info!(path = %path.display(), "watching configuration for provider changes");

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    event = rx.recv() => {
                        let Some(event) = event else { break };
                        if !concerns(&event, &path) {
                            continue;
                        }

                        tokio::time::sleep(DEBOUNCE).await;
                        while rx.try_recv().is_ok() {}

                        match reload_from_path(&path, &orchestrator) {
                            Ok(version) => tracing::info!(
                                path = %path.display(),
                                version,
                                "configuration reloaded"
                            ),
                            Err(e) => tracing::warn!(
                                path = %path.display(),
                                error = %e,
                                "configuration reload rejected, keeping current providers"
                            ),
                        }
                    }
                }
            }
            tracing::debug!("configuration watcher stopped");
        });

        Ok(Self { _watcher: watcher, task })
    }

    /// Wait for the background task to end
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

impl std::fmt::Debug for ConfigWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigWatcher")
            .field("finished", &self.task.is_finished())
            .finish_non_exhaustive()
    }
}

fn concerns(event: &Event, path: &Path) -> bool {
    matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
        && event.paths.iter().any(|p| p.file_name() == path.file_name())
}
