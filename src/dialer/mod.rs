//! Transport abstraction used in place of a raw TCP dial.
//!
//! A [`Dialer`] opens the byte stream a vendor driver speaks its wire
//! protocol over. Any transport can satisfy it: an SSH-forwarded channel, a
//! direct TCP connection ([`TcpDialer`]), or a test stub built from a closure
//! ([`DialerFn`]).
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use tunneldb::dialer::{Dialer, TcpDialer};
//!
//! # async fn example() -> std::io::Result<()> {
//! let dialer: Arc<dyn Dialer> = Arc::new(TcpDialer::new());
//! let ctx = CancellationToken::new();
//! let _stream = dialer.dial(&ctx, "tcp", "localhost:5432").await?;
//! # Ok(())
//! # }
//! ```

pub mod tcp;

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

pub use tcp::TcpDialer;

/// Byte stream produced by a dialer.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Owned stream handed to the vendor driver.
pub type DialStream = Box<dyn AsyncStream>;

/// Transport capability used to establish the underlying network connection.
///
/// Implementations should observe `ctx` and return promptly once it is
/// canceled. The caller maps any failure that happens after cancellation to
/// a cancellation error.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Open a stream to `address` over `network` (`"tcp"` or `"unix"`).
    async fn dial(
        &self,
        ctx: &CancellationToken,
        network: &str,
        address: &str,
    ) -> io::Result<DialStream>;
}

/// Adapts an async closure into a [`Dialer`].
///
/// ```
/// use std::io;
/// use tunneldb::dialer::DialerFn;
///
/// let dialer = DialerFn::new(|_ctx, _network, address| async move {
///     Err::<tunneldb::dialer::DialStream, _>(io::Error::new(
///         io::ErrorKind::ConnectionRefused,
///         format!("no route to {address}"),
///     ))
/// });
/// # let _ = dialer;
/// ```
pub struct DialerFn<F> {
    func: F,
}

impl<F, Fut> DialerFn<F>
where
    F: Fn(CancellationToken, String, String) -> Fut + Send + Sync,
    Fut: Future<Output = io::Result<DialStream>> + Send,
{
    /// Wrap `func`, which receives the context, network and address.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> Dialer for DialerFn<F>
where
    F: Fn(CancellationToken, String, String) -> Fut + Send + Sync,
    Fut: Future<Output = io::Result<DialStream>> + Send,
{
    async fn dial(
        &self,
        ctx: &CancellationToken,
        network: &str,
        address: &str,
    ) -> io::Result<DialStream> {
        (self.func)(ctx.clone(), network.to_string(), address.to_string()).await
    }
}

impl<F> fmt::Debug for DialerFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialerFn").finish_non_exhaustive()
    }
}
