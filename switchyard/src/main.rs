#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;
mod report;

use std::path::Path;
use std::sync::Arc;

use args::{Args, Command, RequestFlags};
use clap::Parser;
use switchyard_config::Config;
use switchyard_orchestrator::{ConfigWatcher, Orchestrator};
use switchyard_provider::{ProviderCatalog, SystemSecretResolver};
use switchyard_routing::{CapacityMonitor, CapacitySettings};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)?;

    let _telemetry_guard = switchyard_telemetry::init(config.telemetry.as_ref(), &args.log_filter)?;

    tracing::debug!(
        config_path = %args.config.display(),
        providers = config.providers.len(),
        "starting switchyard"
    );

    let orchestrator = build(&config)?;

    match args.command {
        Command::Check => check(&orchestrator, &args.config),
        Command::Route(prompt) => {
            let request = prompt.flags.request(&prompt.prompt);
            let (profile, decision) = orchestrator.preview(&request)?;
            print_json(&report::preview(&profile, &decision))
        }
        Command::Complete(prompt) => {
            let request = prompt.flags.request(&prompt.prompt);
            match orchestrator.handle(request).await {
                Ok(outcome) => print_json(&report::outcome(&outcome)),
                Err(envelope) => {
                    print_json(&report::failure(&envelope))?;
                    Err(envelope.into())
                }
            }
        }
        Command::Watch(flags) => watch(orchestrator, args.config, flags).await,
    }
}

fn build(config: &Config) -> anyhow::Result<Arc<Orchestrator>> {
    let monitor = Arc::new(CapacityMonitor::new(CapacitySettings::from_config(
        &config.router.capacity,
    )?));
    let catalog = ProviderCatalog::from_config(&config.providers, monitor, Arc::new(SystemSecretResolver))?;
    Ok(Arc::new(Orchestrator::from_config(&config.router, Arc::new(catalog))))
}

fn check(orchestrator: &Orchestrator, path: &Path) -> anyhow::Result<()> {
    let snapshot = orchestrator.catalog().snapshot();
    println!("{}: ok, {} providers", path.display(), snapshot.pool().len());
    for descriptor in snapshot.pool().descriptors() {
        println!(
            "  {:<16} {:<6} {:<7} {:<24} priority={} context={} timeout={}s",
            descriptor.id,
            descriptor.kind,
            descriptor.protocol,
            descriptor.model,
            descriptor.priority,
            descriptor.limits.max_context_tokens,
            descriptor.timeout.as_secs(),
        );
    }
    Ok(())
}

/// Serve stdin prompts until EOF or a shutdown signal
async fn watch(orchestrator: Arc<Orchestrator>, path: std::path::PathBuf, flags: RequestFlags) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_clone.cancel();
    });

    let watcher = ConfigWatcher::spawn(path, Arc::clone(&orchestrator), shutdown.clone())?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            () = shutdown.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }

        let report = match orchestrator.handle(flags.request(prompt)).await {
            Ok(outcome) => report::outcome(&outcome),
            Err(envelope) => report::failure(&envelope),
        };
        println!("{}", serde_json::to_string(&report)?);
    }

    shutdown.cancel();
    watcher.join().await;
    tracing::info!("switchyard stopped");
    Ok(())
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Wait for a shutdown signal (`SIGINT` or `SIGTERM`)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
