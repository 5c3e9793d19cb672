// Local crates
use crate::metrics::{self, Grouping};
use crate::orchestrator::models::{Publisher, SENTINEL_EXIT_CODE};
use crate::orchestrator::orchestrator::publish_best_effort;

// External crates
use std::sync::Arc;
use tokio::runtime::Handle;

/// Publishes the exit code reading exactly once per invocation.
///
/// Armed with [`SENTINEL_EXIT_CODE`]. The regular path calls
/// [`ExitCodeGuard::finish`]; if the guard is dropped without finishing (the
/// run future was cancelled, or a panic unwound through it) the publication
/// is spawned onto the current tokio runtime instead.
#[derive(Debug)]
pub struct ExitCodeGuard<P: Publisher> {
    publisher: Arc<P>,
    grouping: Grouping,
    code: i32,
    armed: bool,
}

impl<P: Publisher> ExitCodeGuard<P> {
    /// A guard that will publish [`SENTINEL_EXIT_CODE`] unless told otherwise.
    pub fn arm(publisher: Arc<P>, grouping: Grouping) -> Self {
        Self {
            publisher,
            grouping,
            code: SENTINEL_EXIT_CODE,
            armed: true,
        }
    }

    /// Replaces the sentinel with an observed exit code.
    pub fn set(&mut self, code: i32) {
        self.code = code;
    }

    /// The code that will be published.
    #[must_use]
    pub fn code(&self) -> i32 {
        self.code
    }

    /// Publishes the exit code and disarms the guard.
    ///
    /// Disarms before awaiting: a publication interrupted here is lost rather
    /// than repeated.
    pub async fn finish(mut self) {
        self.armed = false;
        tracing::info!(exit_code = self.code, "Pushing exit code");
        let reading = metrics::exit_code(&self.grouping.job, self.code);
        publish_best_effort(self.publisher.as_ref(), &self.grouping, &[reading]).await;
    }
}

impl<P: Publisher> Drop for ExitCodeGuard<P> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;

        let code = self.code;
        let Ok(handle) = Handle::try_current() else {
            tracing::error!(
                exit_code = code,
                "Exit code guard dropped outside a tokio runtime, exit code not pushed"
            );
            return;
        };

        tracing::warn!(
            exit_code = code,
            "Run ended before finishing, pushing exit code in the background"
        );
        let publisher = Arc::clone(&self.publisher);
        let grouping = self.grouping.clone();
        handle.spawn(async move {
            let reading = metrics::exit_code(&grouping.job, code);
            publish_best_effort(publisher.as_ref(), &grouping, &[reading]).await;
        });
    }
}
