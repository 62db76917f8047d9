//! Error types for tunneldb.
//!
//! Errors raised by collaborators (vendor DSN parsers, config-edit hooks,
//! dialers, vendor handshakes) are carried unchanged: their `Display` and
//! `source()` are forwarded transparently.

use std::io;
use thiserror::Error;

/// Boxed error used for vendor parser failures and hook rejections.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used across the crate.
pub type Result<T, E = TunnelError> = std::result::Result<T, E>;

/// Top-level error type for connector construction and connection setup.
#[derive(Error, Debug)]
pub enum TunnelError {
    /// The DSN was rejected by the vendor parser
    #[error(transparent)]
    MalformedDsn(BoxError),

    /// The config-edit hook refused the parsed configuration
    #[error(transparent)]
    ConfigEditRejected(BoxError),

    /// The injected dialer failed
    #[error(transparent)]
    Dial(io::Error),

    /// The connect context was canceled while dialing or handshaking
    #[error("context canceled")]
    Cancelled,

    /// The connection timeout configured in the DSN expired
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// SQL Server handshake or session setup failed
    #[error(transparent)]
    Mssql(#[from] tiberius::error::Error),

    /// PostgreSQL handshake failed
    #[error(transparent)]
    Postgres(#[from] tokio_postgres::Error),

    /// A driver with this name is already registered
    #[error("tunneldb: driver {0:?} is already registered")]
    DuplicateDriver(String),

    /// No driver is registered under this name
    #[error("tunneldb: unknown driver {0:?}")]
    UnknownDriver(String),
}

impl TunnelError {
    /// Wrap a vendor parser error.
    pub(crate) fn malformed_dsn<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        TunnelError::MalformedDsn(err.into())
    }

    /// True when the error is the cancellation of the connect context.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TunnelError::Cancelled)
    }

    /// True when the error came from the DSN parser.
    pub fn is_malformed_dsn(&self) -> bool {
        matches!(self, TunnelError::MalformedDsn(_))
    }
}
