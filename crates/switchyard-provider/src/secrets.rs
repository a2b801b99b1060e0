//! Credential resolution
//!
//! Configuration only ever names where a credential lives. The value is
//! read when the catalog is built and held as a `SecretString`.

use std::path::PathBuf;

use secrecy::SecretString;
use switchyard_core::CredentialRef;
use thiserror::Error;

/// Errors resolving a credential reference
#[derive(Debug, Error)]
pub enum SecretError {
    /// The named environment variable is not set
    #[error("environment variable '{0}' is not set")]
    MissingEnv(String),

    /// The credential file could not be read
    #[error("failed to read credential file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The referenced value is empty
    #[error("credential from {0} is empty")]
    Empty(String),
}

/// Turns a `CredentialRef` into the secret it points at
pub trait SecretResolver: Send + Sync {
    /// Resolve a reference; `CredentialRef::None` resolves to `None`
    fn resolve(&self, reference: &CredentialRef) -> Result<Option<SecretString>, SecretError>;
}

/// Resolves `env:` references from the process environment and `file:` references from disk
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSecretResolver;

impl SecretResolver for SystemSecretResolver {
    fn resolve(&self, reference: &CredentialRef) -> Result<Option<SecretString>, SecretError> {
        let value = match reference {
            CredentialRef::None => return Ok(None),
            CredentialRef::Env(name) => std::env::var(name).map_err(|_| SecretError::MissingEnv(name.clone()))?,
            CredentialRef::File(path) => std::fs::read_to_string(path).map_err(|source| SecretError::Unreadable {
                path: path.clone(),
                source,
            })?,
        };

        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(SecretError::Empty(reference.to_string()));
        }
        Ok(Some(SecretString::from(trimmed.to_owned())))
    }
}
