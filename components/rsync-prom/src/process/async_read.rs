// External crates
use pin_project::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf, Result as IoResult};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

/// A reader that reports end of file once its token is cancelled.
///
/// The parser reading rsync's stdout never learns about cancellation, it just
/// sees the stream end. Whether that end was real is available through
/// [`CancellableRead::was_cancelled`].
#[pin_project]
pub struct CancellableRead<R> {
    #[pin]
    reader: R,
    // boxed so the reader stays Unpin whenever `R` is
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    stopped: bool,
}

impl<R> CancellableRead<R> {
    /// Wraps `reader`, ending it when `token` is cancelled.
    pub fn new(reader: R, token: CancellationToken) -> Self {
        Self {
            reader,
            cancelled: Box::pin(token.cancelled_owned()),
            stopped: false,
        }
    }

    /// Whether the stream ended because of cancellation rather than a real
    /// end of file.
    #[must_use]
    pub const fn was_cancelled(&self) -> bool {
        self.stopped
    }

    /// Gives back the wrapped reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R> std::fmt::Debug for CancellableRead<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellableRead")
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

impl<R: AsyncRead> AsyncRead for CancellableRead<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<IoResult<()>> {
        let this = self.project();
        if *this.stopped {
            return Poll::Ready(Ok(()));
        }

        match this.cancelled.as_mut().poll(cx) {
            Poll::Ready(()) => {
                tracing::debug!("Output stream cancelled, reporting end of file");
                *this.stopped = true;
                Poll::Ready(Ok(()))
            }
            Poll::Pending => this.reader.poll_read(cx, buf),
        }
    }
}
