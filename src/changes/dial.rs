//! The dial hook: the only way the feed loop obtains a socket.
//!
//! Owning the raw socket is what lets the feed put a deadline on every body
//! read, and swapping the dialer is how tests feed canned bytes to the loop.
//!
//! ```
//! use couchdb_http::changes::{BoxedSocket, DialFn};
//! use futures::FutureExt;
//!
//! let dialer = DialFn::new(|_network: String, address: String| {
//!     async move {
//!         let stream = tokio::net::TcpStream::connect(address).await?;
//!         Ok(Box::new(stream) as BoxedSocket)
//!     }
//!     .boxed()
//! });
//! # let _ = dialer;
//! ```

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// A bidirectional byte stream usable as a feed connection.
pub trait Socket: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> Socket for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Owned, type-erased [`Socket`].
pub type BoxedSocket = Box<dyn Socket>;

/// Opens raw connections for the changes feed.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Connect to `address` (`host:port`) over `network` (always `"tcp"`
    /// for the feed).
    async fn dial(&self, network: &str, address: &str) -> io::Result<BoxedSocket>;
}

/// Plain TCP dialer used unless another one is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, network: &str, address: &str) -> io::Result<BoxedSocket> {
        if network != "tcp" {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsupported network: {}", network),
            ));
        }
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}

/// Adapts a closure returning a boxed future into a [`Dialer`].
pub struct DialFn<F>(F);

impl<F> DialFn<F>
where
    F: Fn(String, String) -> BoxFuture<'static, io::Result<BoxedSocket>> + Send + Sync,
{
    /// Wrap `f`, called with `(network, address)`.
    pub fn new(f: F) -> Self {
        DialFn(f)
    }
}

#[async_trait]
impl<F> Dialer for DialFn<F>
where
    F: Fn(String, String) -> BoxFuture<'static, io::Result<BoxedSocket>> + Send + Sync,
{
    async fn dial(&self, network: &str, address: &str) -> io::Result<BoxedSocket> {
        (self.0)(network.to_string(), address.to_string()).await
    }
}
