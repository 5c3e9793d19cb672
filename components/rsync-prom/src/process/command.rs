// Local crates
use crate::orchestrator::Launcher;
use crate::process::{async_read::CancellableRead, policy::ExitCodePolicy};

// External crates
use std::io;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, ChildStdout, Command};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Exit code reported when rsync's real status cannot be determined (killed by
/// a signal, or waiting on it failed).
pub const UNKNOWN_EXIT_CODE: i32 = 1;

/// rsync's stdout, ending early when the launcher is cancelled.
pub type CancellableStdout = CancellableRead<ChildStdout>;

/// Reasons a command could not be launched.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    /// The argument list was empty.
    #[error("no command given, expected rsync and its arguments")]
    EmptyCommand,
    /// Launchers are single use.
    #[error("a process was already started by this launcher")]
    AlreadyStarted,
    /// The operating system refused to start the program.
    #[error("failed to spawn {program:?}: {source}")]
    Spawn {
        /// `args[0]`
        program: String,
        /// Underlying spawn error.
        #[source]
        source: io::Error,
    },
    /// stdout was not captured.
    #[error("spawned process has no stdout pipe")]
    MissingStdout,
}

/// Launches the wrapped command as a child process.
///
/// stdout is piped to the parser, stderr is inherited so rsync's errors stay
/// visible. The child is killed when the cancellation token fires or when the
/// launcher is dropped.
#[derive(Debug)]
pub struct CommandLauncher {
    child: Option<Child>,
    policy: ExitCodePolicy,
    cancel: CancellationToken,
}

impl CommandLauncher {
    /// A launcher that applies `policy` to the exit code and stops when
    /// `cancel` fires.
    pub fn new(policy: ExitCodePolicy, cancel: CancellationToken) -> Self {
        Self {
            child: None,
            policy,
            cancel,
        }
    }

    /// Child pid, once started.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }
}

fn exit_code_of(status: io::Result<ExitStatus>) -> i32 {
    match status {
        Ok(status) => match status.code() {
            Some(code) => code,
            None => {
                tracing::warn!(status = %status, "rsync was terminated by a signal");
                UNKNOWN_EXIT_CODE
            }
        },
        Err(e) => {
            tracing::error!(error = %e, "Failed to wait for rsync");
            UNKNOWN_EXIT_CODE
        }
    }
}

impl Launcher for CommandLauncher {
    type Output = CancellableStdout;
    type Error = LaunchError;

    #[instrument(
        name = "rsync_prom_launcher::start",
        target = "process::command",
        skip_all,
        level = "debug"
    )]
    async fn start(&mut self, args: &[String]) -> Result<Self::Output, Self::Error> {
        let (program, rest) = args.split_first().ok_or(LaunchError::EmptyCommand)?;
        if self.child.is_some() {
            return Err(LaunchError::AlreadyStarted);
        }

        tracing::info!(command = ?args, "Starting rsync");
        let mut child = Command::new(program)
            .args(rest)
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or(LaunchError::MissingStdout)?;
        tracing::debug!(pid = ?child.id(), "rsync started");
        self.child = Some(child);

        Ok(CancellableRead::new(stdout, self.cancel.clone()))
    }

    fn interrupted(&self) -> bool {
        self.cancel.is_cancelled()
    }

    #[instrument(
        name = "rsync_prom_launcher::wait",
        target = "process::command",
        skip_all,
        level = "debug"
    )]
    async fn wait(&mut self) -> i32 {
        let Some(mut child) = self.child.take() else {
            tracing::error!("wait called before rsync was started");
            return UNKNOWN_EXIT_CODE;
        };

        let finished = tokio::select! {
            status = child.wait() => Some(status),
            _ = self.cancel.cancelled() => None,
        };

        let status = match finished {
            Some(status) => status,
            None => {
                tracing::warn!(pid = ?child.id(), "Cancellation requested, killing rsync");
                if let Err(e) = child.kill().await {
                    tracing::error!(error = %e, "Failed to kill rsync");
                }
                child.wait().await
            }
        };

        let code = exit_code_of(status);
        self.policy.apply(code)
    }
}
