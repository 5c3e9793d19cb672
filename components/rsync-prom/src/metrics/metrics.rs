// Local crates
use crate::parser::TransferStats;

// External crates
use chrono::{DateTime, Utc};
use std::collections::HashMap;

// ======== Transfer Metrics ========
/// Bytes sent.
pub const TOTAL_WRITTEN: &str = "rsync_total_written";
/// Bytes received.
pub const TOTAL_READ: &str = "rsync_total_read";
/// Throughput reported by rsync.
pub const BYTES_PER_SEC: &str = "rsync_bytes_per_sec";
/// Size of the source file set.
pub const TOTAL_SIZE: &str = "rsync_total_size";

// ======== Lifecycle Metrics ========
const START_TIMESTAMP_SUFFIX: &str = "_start_timestamp_seconds";
const EXIT_CODE_SUFFIX: &str = "_exit_code";

/// One named gauge sample handed to a publisher.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Metric name.
    pub name: String,
    /// `# HELP` text.
    pub help: &'static str,
    /// Gauge value.
    pub value: f64,
}

impl Reading {
    /// A reading named `name`.
    pub fn new(name: impl Into<String>, help: &'static str, value: f64) -> Self {
        Self {
            name: name.into(),
            help,
            value,
        }
    }
}

/// Labels that tell the push gateway which invocation a batch belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grouping {
    /// `job` path segment of the push URL.
    pub job: String,
    /// Value of the `instance` grouping label.
    pub instance: String,
}

impl Grouping {
    /// Grouping for `job` on `instance`.
    pub fn new(job: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            instance: instance.into(),
        }
    }

    /// Grouping key labels below the job, as the push gateway expects them.
    #[must_use]
    pub fn labels(&self) -> HashMap<String, String> {
        HashMap::from([("instance".to_string(), self.instance.clone())])
    }
}

/// `<job>_start_timestamp_seconds`
pub fn start_timestamp_name(job: &str) -> String {
    format!("{job}{START_TIMESTAMP_SUFFIX}")
}

/// `<job>_exit_code`
pub fn exit_code_name(job: &str) -> String {
    format!("{job}{EXIT_CODE_SUFFIX}")
}

/// Start marker, in fractional unix seconds.
pub fn start_timestamp(job: &str, at: DateTime<Utc>) -> Reading {
    Reading::new(
        start_timestamp_name(job),
        "The timestamp of the rsync start",
        at.timestamp_millis() as f64 / 1000.0,
    )
}

// end timestamp is push_time_seconds, set by the push gateway itself
/// Exit code reading, the sentinel included.
pub fn exit_code(job: &str, code: i32) -> Reading {
    Reading::new(
        exit_code_name(job),
        "The exit code (0 = success, non-zero = failure)",
        f64::from(code),
    )
}

/// The four transfer totals, published together as one batch.
pub fn transfer_readings(stats: &TransferStats) -> Vec<Reading> {
    vec![
        Reading::new(
            TOTAL_WRITTEN,
            "Total bytes written for this transfer",
            stats.total_written as f64,
        ),
        Reading::new(
            TOTAL_READ,
            "Total bytes read for this transfer",
            stats.total_read as f64,
        ),
        Reading::new(BYTES_PER_SEC, "bytes per second", stats.bytes_per_sec),
        Reading::new(
            TOTAL_SIZE,
            "Total size of all processed files, in bytes",
            stats.total_size as f64,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn lifecycle_names_are_namespaced_by_job() {
        assert_eq!(start_timestamp_name("backup"), "backup_start_timestamp_seconds");
        assert_eq!(exit_code_name("backup"), "backup_exit_code");
    }

    #[test]
    fn start_timestamp_keeps_millisecond_precision() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_250).unwrap();
        let reading = start_timestamp("rsync", at);
        assert_eq!(reading.value, 1_700_000_000.25);
    }

    #[test]
    fn transfer_readings_cover_all_totals() {
        let stats = TransferStats {
            found: true,
            total_written: 1_590,
            total_read: 18,
            bytes_per_sec: 3_216.0,
            total_size: 1_188_046,
        };
        let readings = transfer_readings(&stats);
        let by_name: HashMap<_, _> = readings.iter().map(|r| (r.name.as_str(), r.value)).collect();
        assert_eq!(by_name.len(), 4);
        assert_eq!(by_name[TOTAL_WRITTEN], 1_590.0);
        assert_eq!(by_name[TOTAL_READ], 18.0);
        assert_eq!(by_name[BYTES_PER_SEC], 3_216.0);
        assert_eq!(by_name[TOTAL_SIZE], 1_188_046.0);
    }

    #[test]
    fn grouping_labels_carry_instance_only() {
        let labels = Grouping::new("rsync", "rsync@host").labels();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels["instance"], "rsync@host");
    }
}
