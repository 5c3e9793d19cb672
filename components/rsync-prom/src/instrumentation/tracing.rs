// Local crates
use crate::helpers::load_config::{LogFormat, LoggingConfig};

// External crates
use anyhow::{Context, Result};
use std::panic;
use tracing::{Subscriber, error};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    Layer, filter::EnvFilter, fmt, fmt::MakeWriter, prelude::*, registry::Registry,
};

const DEFAULT_FILTER: &str = "info";
const LOG_FILE_NAME: &str = "rsync-prom.log";

/// Installs the global subscriber: stderr output in the configured format,
/// plus a daily rotated log file when `log_dir` is set.
///
/// `RUST_LOG` overrides the default `info` filter. The returned guard flushes
/// the file writer and must live until the program exits.
pub fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = default_filter();

    let stderr_layer = match config.format {
        LogFormat::Pretty => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .with_target(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .boxed(),
    };

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let file_appender = rolling::daily(dir, LOG_FILE_NAME);
            let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking_writer)
                .with_file(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(fmt::time::UtcTime::rfc_3339());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = Registry::default()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .with(ErrorLayer::default());

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global tracing subscriber")?;

    Ok(guard)
}

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Plain stderr subscriber for the time before the configuration, and with it
/// the real log setup, is known. Meant for `tracing::subscriber::with_default`
/// around configuration loading.
pub fn bootstrap_subscriber() -> impl Subscriber + Send + Sync + 'static {
    bootstrap_subscriber_with(default_filter(), std::io::stderr)
}

fn bootstrap_subscriber_with<W>(filter: EnvFilter, writer: W) -> impl Subscriber + Send + Sync + 'static
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .finish()
}

/// Routes panics through `tracing` so they land in the configured outputs.
pub fn init_panic_handler() {
    panic::set_hook(Box::new(|panic_info| {
        let payload = panic_info.payload();
        let msg = payload
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("Unknown panic");

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_string());

        error!(
            message = %msg,
            location = %location,
            "Application panicked!"
        );
    }));
}
