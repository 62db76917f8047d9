//! SQL Server connector running over an injected dialer.

use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::compat::TokioAsyncWriteCompatExt;
use tokio_util::sync::CancellationToken;

use crate::dialer::Dialer;
use crate::driver::{connect_within, Connection, Connector};
use crate::error::{Result, TunnelError};

use super::dsn::MssqlDsn;

/// SQL Server connector built by [`MssqlDriver`](super::MssqlDriver).
///
/// Each [`connect`](Connector::connect) dials `host:port` through the
/// dialer, performs the TDS login, then runs the session init statement when
/// one was stored for the DSN.
pub struct MssqlConnector {
    dsn: MssqlDsn,
    dialer: Arc<dyn Dialer>,
    session_init_sql: Option<String>,
    driver_name: String,
}

impl MssqlConnector {
    pub(crate) fn new(dsn: MssqlDsn, dialer: Arc<dyn Dialer>, driver_name: &str) -> Self {
        Self {
            dsn,
            dialer,
            session_init_sql: None,
            driver_name: driver_name.to_string(),
        }
    }

    /// Statement run right after login, if any.
    pub fn session_init_sql(&self) -> Option<&str> {
        self.session_init_sql.as_deref()
    }

    pub(crate) fn set_session_init_sql(&mut self, sql: Option<String>) {
        self.session_init_sql = sql;
    }

    /// tiberius configuration parsed from the DSN.
    pub fn config(&self) -> &tiberius::Config {
        &self.dsn.config
    }

    /// `host:port` passed to the dialer.
    pub fn address(&self) -> String {
        self.dsn.address()
    }

    /// Deadline for dial plus login.
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.dsn.connect_timeout
    }
}

#[async_trait]
impl Connector for MssqlConnector {
    async fn connect(&self, ctx: &CancellationToken) -> Result<Connection> {
        let address = self.address();
        let config = self.dsn.config.clone();

        let client = connect_within(ctx, self.connect_timeout(), async {
            let stream = self
                .dialer
                .dial(ctx, "tcp", &address)
                .await
                .map_err(TunnelError::Dial)?;

            let mut client = tiberius::Client::connect(config, stream.compat_write()).await?;

            if let Some(sql) = self.session_init_sql() {
                client.simple_query(sql).await?.into_results().await?;
                tracing::debug!(driver = %self.driver_name, "session init statement applied");
            }
            Ok::<_, TunnelError>(client)
        })
        .await?;

        Ok(Connection::Mssql(client))
    }

    fn driver_name(&self) -> &str {
        &self.driver_name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for MssqlConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MssqlConnector")
            .field("driver", &self.driver_name)
            .field("dsn", &self.dsn)
            .field("session_init_sql", &self.session_init_sql)
            .finish_non_exhaustive()
    }
}
