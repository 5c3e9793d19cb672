/// Transfer totals extracted from rsync's end-of-run summary.
///
/// All numeric fields stay at zero unless the summary line that carries them
/// was seen. `found` tells "nothing was transferred" apart from "rsync never
/// printed a summary" (for example because `--verbose`/`--stats` was missing).
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct TransferStats {
    /// At least one summary line was recognized.
    pub found: bool,
    /// Bytes sent to the destination.
    pub total_written: u64,
    /// Bytes received from the destination.
    pub total_read: u64,
    /// Throughput reported on the `sent ...` line.
    pub bytes_per_sec: f64,
    /// Size of all processed source files, in bytes.
    pub total_size: u64,
}

impl TransferStats {
    /// Bytes that actually crossed the wire in either direction.
    #[must_use]
    pub fn total_transferred(&self) -> u64 {
        self.total_written.saturating_add(self.total_read)
    }

    /// rsync's speedup figure: `total_size / (total_written + total_read)`.
    ///
    /// Real-valued. Returns `0.0` when nothing was transferred.
    #[must_use]
    pub fn speedup(&self) -> f64 {
        let transferred = self.total_transferred();
        if transferred == 0 {
            return 0.0;
        }
        self.total_size as f64 / transferred as f64
    }
}
