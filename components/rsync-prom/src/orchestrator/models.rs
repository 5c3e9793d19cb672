// Local crates
use crate::metrics::{Grouping, PublishError, Reading};
use crate::parser::{ParseError, TransferStats};

// External crates
use std::future::Future;
use tokio::io::AsyncRead;

/// Exit code published when rsync's real exit code was never observed.
pub const SENTINEL_EXIT_CODE: i32 = 254;

/// Starts the wrapped tool and later waits for it.
///
/// The orchestrator only reads the stream returned by [`Launcher::start`] and
/// passes the code from [`Launcher::wait`] through untouched. Exit code
/// remapping belongs to the implementation, not to the orchestrator.
pub trait Launcher: Send {
    /// The tool's standard output.
    type Output: AsyncRead + Unpin + Send;
    /// Why the tool could not be started.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Launches the tool with `args`, `args[0]` being the program.
    fn start(
        &mut self,
        args: &[String],
    ) -> impl Future<Output = Result<Self::Output, Self::Error>> + Send;

    /// Blocks until the tool finished and returns its exit code.
    fn wait(&mut self) -> impl Future<Output = i32> + Send;

    /// Whether the tool was stopped from outside, which may have cut its
    /// output short.
    fn interrupted(&self) -> bool {
        false
    }
}

/// Sink for named readings. Failures are reported, never escalated by the
/// orchestrator.
pub trait Publisher: Send + Sync + 'static {
    /// Publishes `readings` as one batch under `grouping`.
    fn publish(
        &self,
        grouping: &Grouping,
        readings: &[Reading],
    ) -> impl Future<Output = Result<(), PublishError>> + Send;
}

/// Lifecycle of one orchestrated invocation.
///
/// ```text
/// NotStarted -> Starting -> Streaming -> Waiting -> Done
///                   \            \
///                    `-> Failed   `-> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Start marker pushed, tool not launched yet.
    NotStarted,
    /// Launching the tool.
    Starting,
    /// Parsing the tool's output.
    Streaming,
    /// Waiting for the tool to exit.
    Waiting,
    /// Exit code observed.
    Done,
    /// Start or parse failed, the sentinel code stands.
    Failed,
}

impl RunState {
    /// Moves to `next` if the lifecycle allows it.
    pub fn advance(&mut self, next: RunState) -> Result<(), OrchestratorError> {
        let allowed = matches!(
            (*self, next),
            (RunState::NotStarted, RunState::Starting)
                | (RunState::Starting, RunState::Streaming)
                | (RunState::Starting, RunState::Failed)
                | (RunState::Streaming, RunState::Waiting)
                | (RunState::Streaming, RunState::Failed)
                | (RunState::Waiting, RunState::Done)
        );

        if !allowed {
            return Err(OrchestratorError::InvalidTransition {
                from: *self,
                to: next,
            });
        }

        tracing::debug!(from = ?*self, to = ?next, "Orchestrator state transition");
        *self = next;
        Ok(())
    }

    /// `Done` or `Failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }
}

/// Outcome of a run that got as far as waiting for the tool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunReport {
    /// The tool's exit code, as returned by the launcher.
    pub exit_code: i32,
    /// Totals parsed from the tool's output.
    pub stats: TransferStats,
}

/// Errors that abort an orchestrated run.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// The launcher could not start the tool.
    #[error("failed to start rsync: {0}")]
    Start(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// The output stream failed or held an unconvertible number.
    #[error("failed to parse rsync output: {0}")]
    Parse(#[from] ParseError),
    /// A lifecycle step was skipped. Always a bug.
    #[error("invalid orchestrator state transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// State before the attempted move.
        from: RunState,
        /// Rejected target state.
        to: RunState,
    },
}
