// Local crates
use crate::metrics::{self, Grouping, Reading};
use crate::orchestrator::{
    guard::ExitCodeGuard,
    models::{Launcher, OrchestratorError, Publisher, RunReport, RunState},
};
use crate::parser::{self, TransferStats};

// External crates
use chrono::Utc;
use std::io::Write;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::instrument;

/// Where metrics go and how they are labelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapParams {
    /// Address of the Prometheus push gateway.
    pub pushgateway: String,
    /// Prometheus instance label.
    pub instance: String,
    /// Prometheus job name, also the prefix of the lifecycle metric names.
    pub job: String,
}

/// Publishes readings, logging failures instead of returning them.
///
/// Losing a push must not change the apparent outcome of the wrapped rsync.
pub(crate) async fn publish_best_effort<P: Publisher>(
    publisher: &P,
    grouping: &Grouping,
    readings: &[Reading],
) {
    if let Err(e) = publisher.publish(grouping, readings).await {
        tracing::warn!(
            error = %e,
            job = %grouping.job,
            instance = %grouping.instance,
            readings = readings.len(),
            "Failed to push metrics"
        );
    }
}

/// Drives one rsync invocation and pushes metrics about it.
///
/// Each instance owns nothing but its configuration and a handle to the
/// publisher, so concurrent wrappers should each build their own.
#[derive(Debug)]
pub struct TransferOrchestrator<P: Publisher> {
    params: WrapParams,
    publisher: Arc<P>,
    echo_output: bool,
}

impl<P: Publisher> TransferOrchestrator<P> {
    /// An orchestrator labelling its pushes from `params`.
    pub fn new(params: WrapParams, publisher: Arc<P>) -> Self {
        Self {
            params,
            publisher,
            echo_output: false,
        }
    }

    /// Copy every line of rsync's output to our stdout while parsing it.
    #[must_use]
    pub fn with_echo_output(mut self, echo_output: bool) -> Self {
        self.echo_output = echo_output;
        self
    }

    /// Labels and gateway this orchestrator pushes with.
    #[must_use]
    pub fn params(&self) -> &WrapParams {
        &self.params
    }

    /// Grouping key shared by every push of a run.
    #[must_use]
    pub fn grouping(&self) -> Grouping {
        Grouping::new(&self.params.job, &self.params.instance)
    }

    /// Runs rsync once through `launcher`.
    ///
    /// 1. pushes the start timestamp,
    /// 2. arms the exit code guard with the sentinel code,
    /// 3. starts rsync and parses its output to the end,
    /// 4. pushes the transfer totals if a summary was found,
    /// 5. waits for rsync and records its exit code.
    ///
    /// The exit code reading is pushed on every path. A non-zero rsync exit
    /// code is reported through that reading and the returned [`RunReport`],
    /// never as an error.
    #[instrument(
        name = "rsync_prom_orchestrator::run",
        target = "orchestrator::orchestrator",
        skip_all,
        fields(job = %self.params.job, instance = %self.params.instance),
        level = "info"
    )]
    pub async fn run<L: Launcher>(
        &self,
        args: &[String],
        launcher: &mut L,
    ) -> Result<RunReport, OrchestratorError> {
        tracing::info!(pushgateway = %self.params.pushgateway, "Wrapping rsync invocation");

        let grouping = self.grouping();
        let started = metrics::start_timestamp(&self.params.job, Utc::now());
        publish_best_effort(self.publisher.as_ref(), &grouping, &[started]).await;

        let mut guard = ExitCodeGuard::arm(Arc::clone(&self.publisher), grouping.clone());
        let mut state = RunState::NotStarted;

        let result = self
            .drive(args, launcher, &mut state, &mut guard, &grouping)
            .await;

        tracing::debug!(state = ?state, exit_code = guard.code(), "Finishing rsync invocation");
        guard.finish().await;
        result
    }

    async fn drive<L: Launcher>(
        &self,
        args: &[String],
        launcher: &mut L,
        state: &mut RunState,
        guard: &mut ExitCodeGuard<P>,
        grouping: &Grouping,
    ) -> Result<RunReport, OrchestratorError> {
        state.advance(RunState::Starting)?;
        let stdout = match launcher.start(args).await {
            Ok(stdout) => stdout,
            Err(e) => {
                tracing::error!(error = %e, "Failed to start rsync");
                state.advance(RunState::Failed)?;
                return Err(OrchestratorError::Start(Box::new(e)));
            }
        };

        state.advance(RunState::Streaming)?;
        tracing::info!("Parsing rsync output");
        let reader = BufReader::new(stdout);
        let parsed = if self.echo_output {
            let mut echo = LineEcho::new(std::io::stdout());
            parser::parse_with(reader, |line| echo.echo(line)).await
        } else {
            parser::parse(reader).await
        };

        let stats = match parsed {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!(error = %e, "Discarding rsync statistics");
                state.advance(RunState::Failed)?;
                return Err(e.into());
            }
        };

        if launcher.interrupted() {
            tracing::warn!(
                "rsync was interrupted, its summary may be incomplete, not pushing transfer totals"
            );
        } else {
            self.push_transfer_stats(&stats, grouping).await;
        }

        state.advance(RunState::Waiting)?;
        tracing::info!("Waiting for rsync to exit");
        let exit_code = launcher.wait().await;
        guard.set(exit_code);
        state.advance(RunState::Done)?;

        Ok(RunReport { exit_code, stats })
    }

    async fn push_transfer_stats(&self, stats: &TransferStats, grouping: &Grouping) {
        if !stats.found {
            tracing::warn!(
                "No rsync summary found in output, was rsync started with --verbose or --stats?"
            );
            return;
        }

        tracing::info!(
            total_written = stats.total_written,
            total_read = stats.total_read,
            bytes_per_sec = stats.bytes_per_sec,
            total_size = stats.total_size,
            speedup = stats.speedup(),
            "Pushing rsync transfer totals"
        );
        let readings = metrics::transfer_readings(stats);
        publish_best_effort(self.publisher.as_ref(), grouping, &readings).await;
    }
}

/// Copies rsync's lines to a writer, giving up after the first failed write
/// (a closed pipe, usually) instead of failing every line.
struct LineEcho<W> {
    out: W,
    failed: bool,
}

impl<W: Write> LineEcho<W> {
    fn new(out: W) -> Self {
        Self { out, failed: false }
    }

    fn echo(&mut self, line: &str) {
        if self.failed {
            return;
        }
        if let Err(e) = writeln!(self.out, "{line}") {
            tracing::warn!(error = %e, "Failed to echo rsync output, echoing disabled");
            self.failed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct ClosedPipe {
        attempts: usize,
    }

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            self.attempts += 1;
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn echo_copies_lines() {
        let mut echo = LineEcho::new(Vec::new());
        echo.echo("sending incremental file list");
        echo.echo("sent 1,590 bytes  received 18 bytes  3,216.00 bytes/sec");
        assert_eq!(
            String::from_utf8(echo.out).unwrap(),
            "sending incremental file list\nsent 1,590 bytes  received 18 bytes  3,216.00 bytes/sec\n"
        );
    }

    #[test]
    fn echo_stops_after_first_write_error() {
        let mut echo = LineEcho::new(ClosedPipe { attempts: 0 });
        for _ in 0..3 {
            echo.echo("docs/readme.txt");
        }
        assert!(echo.failed);
        assert_eq!(echo.out.attempts, 1);
    }
}
