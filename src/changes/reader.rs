//! The reader handed to a [`ChangeHandler`](super::ChangeHandler).

use super::deadline::DeadlineHandle;
use super::wire::ResponseBody;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::time::Instant;

/// Feed response body whose every read must complete within a timeout.
///
/// Before each read the deadline on the underlying socket is moved to
/// `now + timeout`, so a connection that goes quiet for longer than the
/// timeout fails the read with [`io::ErrorKind::TimedOut`] instead of
/// blocking forever. A read that was cancelled (dropped while pending) does
/// not shorten the next one. A zero timeout disables the deadline.
///
/// The reader owns the body. It only holds a [`DeadlineHandle`] to the
/// socket; the feed loop shuts the socket down after the handler returns.
pub struct ChangeReader {
    body: ResponseBody,
    deadline: DeadlineHandle,
    timeout: Duration,
    // Set between a Pending poll and the next poll. A poll that finds the
    // deadline already expired while in flight is the timer firing and must
    // not move it.
    in_flight: bool,
}

impl ChangeReader {
    /// Wrap `body`, enforcing `timeout` through `deadline`.
    pub fn new(body: ResponseBody, deadline: DeadlineHandle, timeout: Duration) -> Self {
        ChangeReader {
            body,
            deadline,
            timeout,
            in_flight: false,
        }
    }

    /// Per-read timeout; zero when disabled.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Close the body. Later reads fail.
    pub fn close(&mut self) {
        self.body.close();
    }

    pub(crate) fn into_body(self) -> ResponseBody {
        self.body
    }
}

impl AsyncRead for ChangeReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if !this.timeout.is_zero() {
            let now = Instant::now();
            let expired = this.in_flight
                && this
                    .deadline
                    .read_deadline()
                    .is_some_and(|deadline| deadline <= now);
            if !expired {
                this.deadline.set_read_deadline(Some(now + this.timeout));
            }
        }
        match Pin::new(&mut this.body).poll_read(cx, buf) {
            Poll::Pending => {
                this.in_flight = true;
                Poll::Pending
            }
            ready => {
                this.in_flight = false;
                ready
            }
        }
    }
}
