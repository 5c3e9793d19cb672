/// rsync's "partial transfer due to vanished source files" exit code.
pub const VANISHED_SOURCE_FILES: i32 = 24;

/// Caller-side reinterpretation of rsync exit codes.
///
/// Applied by the launcher after rsync exits. The orchestrator publishes
/// whatever the launcher returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitCodePolicy {
    /// Files vanishing between listing and transfer can be expected (backing
    /// up a directory with churning container layers) or alarming (replicating
    /// an ever-growing data set). When set, exit code 24 counts as success.
    pub exit_24_is_exit_0: bool,
}

impl ExitCodePolicy {
    /// The exit code to report for rsync's `code`.
    #[must_use]
    pub fn apply(&self, code: i32) -> i32 {
        if self.exit_24_is_exit_0 && code == VANISHED_SOURCE_FILES {
            tracing::info!(
                exit_code = code,
                "Treating vanished source files exit code as success"
            );
            return 0;
        }
        code
    }
}
