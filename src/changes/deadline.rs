//! Read deadlines on a dialed socket.
//!
//! A [`DeadlineSocket`] wraps whatever the dial hook returned. A pending read
//! on it fails with [`io::ErrorKind::TimedOut`] once the deadline stored in
//! its [`DeadlineHandle`] passes. The handle is shared: the feed's reader
//! keeps a clone to push the deadline forward before every read, while the
//! socket itself stays owned by the response body.

use super::dial::BoxedSocket;
use parking_lot::Mutex;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{Instant, Sleep};

/// Shared read deadline of a [`DeadlineSocket`].
#[derive(Debug, Clone, Default)]
pub struct DeadlineHandle {
    deadline: Arc<Mutex<Option<Instant>>>,
}

impl DeadlineHandle {
    /// Set the instant after which pending reads fail; `None` disables it.
    ///
    /// Takes effect for reads already pending on their next poll and for
    /// all later reads.
    pub fn set_read_deadline(&self, deadline: Option<Instant>) {
        *self.deadline.lock() = deadline;
    }

    /// Currently configured deadline.
    pub fn read_deadline(&self) -> Option<Instant> {
        *self.deadline.lock()
    }
}

/// A dialed socket whose reads honor a [`DeadlineHandle`].
pub struct DeadlineSocket {
    inner: BoxedSocket,
    handle: DeadlineHandle,
    timer: Pin<Box<Sleep>>,
    armed: Option<Instant>,
}

impl DeadlineSocket {
    /// Wrap a freshly dialed socket. No deadline is set.
    pub fn new(inner: BoxedSocket) -> Self {
        DeadlineSocket {
            inner,
            handle: DeadlineHandle::default(),
            timer: Box::pin(tokio::time::sleep_until(Instant::now())),
            armed: None,
        }
    }

    /// A handle controlling this socket's read deadline.
    pub fn handle(&self) -> DeadlineHandle {
        self.handle.clone()
    }

    fn poll_deadline(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        let Some(deadline) = self.handle.read_deadline() else {
            self.armed = None;
            return Poll::Pending;
        };
        if self.armed != Some(deadline) {
            self.timer.as_mut().reset(deadline);
            self.armed = Some(deadline);
        }
        self.timer.as_mut().poll(cx)
    }
}

impl AsyncRead for DeadlineSocket {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Poll::Ready(result) = Pin::new(&mut this.inner).poll_read(cx, buf) {
            return Poll::Ready(result);
        }
        match this.poll_deadline(cx) {
            Poll::Ready(()) => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "read deadline exceeded",
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl AsyncWrite for DeadlineSocket {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_read_without_deadline_waits_for_data() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut socket = DeadlineSocket::new(Box::new(client));

        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            server.write_all(b"late").await.unwrap();
            server
        });

        let mut buf = [0u8; 4];
        socket.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"late");
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_stalled_read_times_out() {
        let (client, _server) = tokio::io::duplex(64);
        let mut socket = DeadlineSocket::new(Box::new(client));
        socket
            .handle()
            .set_read_deadline(Some(Instant::now() + Duration::from_millis(26)));

        let mut buf = [0u8; 16];
        let err = tokio::time::timeout(Duration::from_secs(2), socket.read(&mut buf))
            .await
            .expect("deadline did not fire")
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn test_buffered_data_wins_over_expired_deadline() {
        let (client, mut server) = tokio::io::duplex(64);
        server.write_all(b"ready").await.unwrap();
        let mut socket = DeadlineSocket::new(Box::new(client));
        socket.handle().set_read_deadline(Some(Instant::now()));

        let mut buf = [0u8; 5];
        socket.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ready");
    }

    #[tokio::test]
    async fn test_clearing_deadline() {
        let (client, _server) = tokio::io::duplex(64);
        let socket = DeadlineSocket::new(Box::new(client));
        let handle = socket.handle();
        handle.set_read_deadline(Some(Instant::now()));
        assert!(handle.read_deadline().is_some());
        handle.set_read_deadline(None);
        assert!(handle.read_deadline().is_none());
    }
}
