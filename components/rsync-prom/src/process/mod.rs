//! Launching rsync as a child process and interpreting its exit status.

/// Readers that stop on a future.
pub mod async_read;
/// Child process launcher.
pub mod command;
/// Exit code reinterpretation.
pub mod policy;

pub use command::{CommandLauncher, LaunchError, UNKNOWN_EXIT_CODE};
pub use policy::{ExitCodePolicy, VANISHED_SOURCE_FILES};
