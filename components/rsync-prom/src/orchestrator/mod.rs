//! Sequencing of one rsync invocation with its metric pushes.

/// Exactly-once exit code publication.
pub mod guard;
/// Collaborator traits, lifecycle and errors.
pub mod models;
/// The run sequence itself.
pub mod orchestrator;

pub use guard::ExitCodeGuard;
pub use models::{
    Launcher, OrchestratorError, Publisher, RunReport, RunState, SENTINEL_EXIT_CODE,
};
pub use orchestrator::{TransferOrchestrator, WrapParams};
