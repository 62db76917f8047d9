//! Direct dialer without a tunnel.

use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use super::{DialStream, Dialer};

/// Dials the address directly with `tokio::net`.
///
/// Useful when a database is reachable without a tunnel, or as the dialer
/// behind a local port forward.
#[derive(Debug, Clone, Default)]
pub struct TcpDialer {
    /// Upper bound for a single dial (None waits for the OS timeout)
    timeout: Option<Duration>,
    /// Disable Nagle's algorithm on the new socket
    nodelay: bool,
}

impl TcpDialer {
    /// Create a dialer with no timeout and Nagle enabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the dial timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set TCP_NODELAY on dialed sockets.
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    async fn open(&self, network: &str, address: &str) -> io::Result<DialStream> {
        match network {
            "tcp" | "tcp4" | "tcp6" => {
                let stream = TcpStream::connect(address).await?;
                stream.set_nodelay(self.nodelay)?;
                Ok(Box::new(stream))
            }
            #[cfg(unix)]
            "unix" => Ok(Box::new(tokio::net::UnixStream::connect(address).await?)),
            other => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("unsupported network {other:?}"),
            )),
        }
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(
        &self,
        ctx: &CancellationToken,
        network: &str,
        address: &str,
    ) -> io::Result<DialStream> {
        let open = async {
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, self.open(network, address))
                    .await
                    .map_err(|_| {
                        io::Error::new(
                            io::ErrorKind::TimedOut,
                            format!("dial {network} {address}: timeout after {}ms", limit.as_millis()),
                        )
                    })?,
                None => self.open(network, address).await,
            }
        };

        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(io::Error::new(io::ErrorKind::Interrupted, "dial canceled")),
            result = open => result,
        }
    }
}
