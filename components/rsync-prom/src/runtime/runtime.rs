// Local crates
use rsync_prom::{
    helpers::{load_config::Config, shutdown::cancel_on_signal},
    instrumentation::tracing::{init_panic_handler, init_tracing},
    metrics::{LogPublisher, PushgatewayPublisher},
    orchestrator::{Publisher, RunReport, TransferOrchestrator},
    process::CommandLauncher,
};

// External crates
use anyhow::Result;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// How the wrapper behaves around the core run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Log readings instead of pushing them.
    pub dry_publish: bool,
    /// Exit with rsync's exit code instead of 0 after a successful run.
    pub propagate_exit_code: bool,
}

/// rsync-prom runtime initialization and setup.
pub async fn run_wrapper(config: Config, command: Vec<String>, options: RunOptions) -> Result<ExitCode> {
    // Keep the file writer guard alive until the process exits
    let _log_guard = init_tracing(&config.logging)?;
    init_panic_handler();

    let cancel = CancellationToken::new();
    let signal_listener = cancel_on_signal(cancel.clone());
    let mut launcher = CommandLauncher::new(config.exit_code_policy(), cancel);

    let result = if options.dry_publish {
        wrap(LogPublisher, &config, &command, &mut launcher).await
    } else {
        let publisher = PushgatewayPublisher::new(config.pushgateway.url.as_str());
        wrap(publisher, &config, &command, &mut launcher).await
    };
    signal_listener.abort();

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "rsync-prom run failed");
            return Err(e);
        }
    };

    if options.propagate_exit_code {
        return Ok(exit_code_from(report.exit_code));
    }
    Ok(ExitCode::SUCCESS)
}

#[instrument(
    name = "rsync_prom_runtime::wrap",
    target = "runtime::runtime",
    skip_all,
    level = "debug"
)]
async fn wrap<P: Publisher>(
    publisher: P,
    config: &Config,
    command: &[String],
    launcher: &mut CommandLauncher,
) -> Result<RunReport> {
    let orchestrator = TransferOrchestrator::new(config.wrap_params(), Arc::new(publisher))
        .with_echo_output(config.rsync.echo_output);

    let report = orchestrator.run(command, launcher).await?;
    tracing::info!(
        exit_code = report.exit_code,
        found = report.stats.found,
        "rsync finished"
    );
    Ok(report)
}

fn exit_code_from(code: i32) -> ExitCode {
    ExitCode::from(exit_status_byte(code))
}

/// Codes a process cannot exit with collapse to 1.
fn exit_status_byte(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}
