//! Uniform driver and connector contracts.
//!
//! Every supported vendor is described by a [`Vendor`]: how to parse its DSN,
//! how to wire a [`Dialer`] into its connector, and which override to apply.
//! The shared [`TunnelDriver::open_connector`] logic is written once for all
//! vendors, so adding a vendor means adding one `Vendor` implementation.
//!
//! # Architecture
//!
//! - [`TunnelDriver`] - named factory turning `(dialer, dsn)` into a connector
//! - [`Connector`] - produces live [`Connection`]s on demand
//! - [`DriverRegistry`] - name to driver lookup
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use tunneldb::dialer::TcpDialer;
//! use tunneldb::driver::registry;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let connector = registry().open_connector(
//!     "pgx",
//!     Arc::new(TcpDialer::new()),
//!     "host=localhost user=app dbname=app",
//! )?;
//!
//! let ctx = CancellationToken::new();
//! let connection = connector.connect(&ctx).await?;
//! # let _ = connection;
//! # Ok(())
//! # }
//! ```

pub mod registry;

use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::compat::Compat;
use tokio_util::sync::CancellationToken;

use crate::dialer::{DialStream, Dialer};
use crate::error::{Result, TunnelError};

pub use registry::{register_driver, registry, DriverRegistry};

/// SQL Server client running over a dialed stream.
pub type MssqlClient = tiberius::Client<Compat<DialStream>>;

/// Live connection returned by [`Connector::connect`].
pub enum Connection {
    /// SQL Server session
    Mssql(MssqlClient),
    /// PostgreSQL session; its connection task runs on the tokio runtime
    Postgres(tokio_postgres::Client),
}

impl Connection {
    /// The SQL Server client, if this is an mssql connection.
    pub fn into_mssql(self) -> Option<MssqlClient> {
        match self {
            Connection::Mssql(client) => Some(client),
            Connection::Postgres(_) => None,
        }
    }

    /// The PostgreSQL client, if this is a pgx connection.
    pub fn into_postgres(self) -> Option<tokio_postgres::Client> {
        match self {
            Connection::Postgres(client) => Some(client),
            Connection::Mssql(_) => None,
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connection::Mssql(_) => f.write_str("Connection::Mssql"),
            Connection::Postgres(_) => f.write_str("Connection::Postgres"),
        }
    }
}

/// Produces live connections for one parsed DSN.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Dial through the injected dialer and run the vendor handshake.
    ///
    /// # Errors
    ///
    /// - [`TunnelError::Cancelled`] when `ctx` is canceled before the
    ///   connection is ready, including a dial that fails after cancellation
    /// - [`TunnelError::DeadlineExceeded`] when the DSN's connection timeout expires
    /// - [`TunnelError::Dial`] with the dialer's error otherwise
    /// - the vendor error when the handshake fails
    async fn connect(&self, ctx: &CancellationToken) -> Result<Connection>;

    /// Name of the driver that built this connector.
    fn driver_name(&self) -> &str;

    /// The concrete connector, used by `downcast_ref`.
    fn as_any(&self) -> &dyn Any;
}

impl<'a> dyn Connector + 'a {
    /// Downcast to the vendor connector type.
    pub fn downcast_ref<T: Connector + 'static>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Named factory for tunnel-aware connectors.
pub trait TunnelDriver: Send + Sync {
    /// The registered driver name.
    fn name(&self) -> &str;

    /// Parse `dsn`, wire `dialer` into the resulting connector and apply
    /// this driver's overrides.
    ///
    /// Performs no I/O. The dialer only runs once [`Connector::connect`] is
    /// called.
    ///
    /// # Errors
    ///
    /// - [`TunnelError::MalformedDsn`] with the vendor parser's error
    /// - [`TunnelError::ConfigEditRejected`] with the config-edit hook's error
    fn open_connector(&self, dialer: Arc<dyn Dialer>, dsn: &str) -> Result<Box<dyn Connector>>;
}

/// Vendor-specific steps of connector construction.
pub trait Vendor: Send + Sync {
    /// Parsed DSN in the vendor's native shape.
    type Config;
    /// Connector produced for one DSN.
    type Connector: Connector + 'static;

    /// Name the driver registers under.
    fn name(&self) -> &str;

    /// Parse `dsn` with the vendor's own parser.
    fn parse(&self, dsn: &str) -> Result<Self::Config>;

    /// Build the connector with `dialer` as its transport.
    fn inject_dialer(&self, config: Self::Config, dialer: Arc<dyn Dialer>) -> Self::Connector;

    /// Apply any stored override for `dsn` to the connector.
    fn apply_override(&self, dsn: &str, connector: &mut Self::Connector) -> Result<()>;
}

impl<V: Vendor> TunnelDriver for V {
    fn name(&self) -> &str {
        Vendor::name(self)
    }

    fn open_connector(&self, dialer: Arc<dyn Dialer>, dsn: &str) -> Result<Box<dyn Connector>> {
        let config = self.parse(dsn).inspect_err(|err| {
            tracing::debug!(driver = %Vendor::name(self), error = %err, "DSN rejected");
        })?;

        let mut connector = self.inject_dialer(config, dialer);
        self.apply_override(dsn, &mut connector)?;

        tracing::debug!(driver = %Vendor::name(self), "tunnel connector ready");
        Ok(Box::new(connector))
    }
}

/// Run a dial-and-handshake future under the connect context.
///
/// A failure observed after `ctx` was canceled is reported as
/// [`TunnelError::Cancelled`], whatever the collaborator returned.
pub(crate) async fn connect_within<T, F>(
    ctx: &CancellationToken,
    timeout: Option<Duration>,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let guarded = async {
        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(TunnelError::Cancelled),
            result = fut => result.map_err(|err| {
                if ctx.is_cancelled() {
                    TunnelError::Cancelled
                } else {
                    err
                }
            }),
        }
    };

    match timeout {
        Some(limit) => tokio::time::timeout(limit, guarded)
            .await
            .unwrap_or(Err(TunnelError::DeadlineExceeded)),
        None => guarded.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[tokio::test]
    async fn test_connect_within_passes_result() {
        let ctx = CancellationToken::new();
        let value = connect_within(&ctx, None, async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_connect_within_keeps_error_without_cancel() {
        let ctx = CancellationToken::new();
        let err = connect_within::<(), _>(&ctx, None, async {
            Err(TunnelError::Dial(io::Error::new(io::ErrorKind::Other, "no connect")))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, TunnelError::Dial(_)));
    }

    #[tokio::test]
    async fn test_connect_within_error_after_cancel() {
        let ctx = CancellationToken::new();
        let inner = ctx.clone();
        let err = connect_within::<(), _>(&ctx, None, async move {
            inner.cancel();
            Err(TunnelError::Dial(io::Error::new(io::ErrorKind::Other, "no connect")))
        })
        .await
        .unwrap_err();

        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_connect_within_already_canceled() {
        let ctx = CancellationToken::new();
        ctx.cancel();
        let err = connect_within(&ctx, None, std::future::pending::<Result<()>>())
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_connect_within_deadline() {
        let ctx = CancellationToken::new();
        let err = connect_within(
            &ctx,
            Some(Duration::from_millis(10)),
            std::future::pending::<Result<()>>(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TunnelError::DeadlineExceeded));
    }
}
