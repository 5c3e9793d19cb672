//! Wraps rsync, extracts its transfer totals and pushes them, together with
//! start and exit markers, to a Prometheus push gateway.
//!
//! The core is [`parser`], which turns rsync's summary lines into
//! [`TransferStats`], and [`orchestrator`], which sequences one rsync run with
//! its metric pushes. Starting rsync ([`process`]) and shipping metrics
//! ([`metrics`]) sit behind the [`Launcher`] and [`Publisher`] traits, so rsync
//! can just as well be started remotely, over SSH for example.
//!
//! # Rsync requirements
//!
//! Start rsync with `--verbose` (`-v`) or `--stats` so it prints transfer
//! totals. Do not pass `--human-readable` (`-h`), and run rsync in the
//! `C.UTF-8` locale so numbers are not localized.

/// Configuration loading and signal handling.
pub mod helpers;
/// Log subscriber setup.
pub mod instrumentation;
pub mod metrics;
pub mod orchestrator;
pub mod parser;
pub mod process;

pub use orchestrator::{
    Launcher, OrchestratorError, Publisher, RunReport, TransferOrchestrator, WrapParams,
};
pub use parser::{ParseError, TransferStats, parse};
