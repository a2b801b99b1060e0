//! Provider adapters for Switchyard
//!
//! Backends implement [`Provider`]; [`ProviderAdapter`] wraps one with a
//! timeout and capacity reporting; [`ProviderCatalog`] holds the current
//! set and replaces it atomically on reload.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod adapter;
pub mod catalog;
pub mod protocol;
pub mod provider;
pub mod secrets;

pub use adapter::ProviderAdapter;
pub use catalog::{CatalogError, CatalogSnapshot, ProviderCatalog};
pub use provider::Provider;
pub use provider::ollama::OllamaProvider;
pub use provider::openai::OpenAiCompatProvider;
pub use secrets::{SecretError, SecretResolver, SystemSecretResolver};
