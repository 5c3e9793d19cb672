//! Extraction of rsync transfer totals from its textual output.
//!
//! rsync only prints the totals when started with `--verbose` (`-v`) or
//! `--stats`. `--human-readable` (`-h`) output cannot be parsed, and rsync
//! should run in the `C.UTF-8` locale so that it does not localize grouping
//! separators and fraction points.

/// Line matching and stream parsing.
pub mod parser;
/// Parsed totals.
pub mod stats;

pub use parser::{ParseError, StatsParser, SummaryLine, match_summary_line, parse, parse_with};
pub use stats::TransferStats;
