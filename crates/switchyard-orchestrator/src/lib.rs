//! Request orchestration for Switchyard
//!
//! [`Orchestrator::handle`] is the single entry point: it runs each request
//! through its own state machine, escalating across providers until a
//! response passes the quality gate or the budget is spent.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod error;
pub mod orchestrator;
pub mod reload;
pub mod state;

pub use error::{ErrorEnvelope, OrchestratorError};
pub use orchestrator::{Orchestrator, Outcome};
pub use reload::{ConfigWatcher, ReloadError, reload_from_path};
pub use state::RequestState;
