//! PostgreSQL connector running over an injected dialer.

use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_postgres::config::Host;
use tokio_postgres::{Config, NoTls};
use tokio_util::sync::CancellationToken;

use crate::dialer::Dialer;
use crate::driver::{connect_within, Connection, Connector};
use crate::error::{Result, TunnelError};

/// Port used when the DSN names none.
pub const DEFAULT_PORT: u16 = 5432;

/// PostgreSQL connector built by [`PostgresDriver`](super::PostgresDriver).
///
/// Every configured host is tried in order: dial through the dialer, then
/// run the startup handshake with `connect_raw`. The tunnel carries the
/// transport security, so the session itself is opened without TLS.
pub struct PostgresConnector {
    config: Config,
    dialer: Arc<dyn Dialer>,
    driver_name: String,
}

impl PostgresConnector {
    pub(crate) fn new(config: Config, dialer: Arc<dyn Dialer>, driver_name: &str) -> Self {
        Self {
            config,
            dialer,
            driver_name: driver_name.to_string(),
        }
    }

    /// Connection configuration, after any config-edit hook ran.
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// `(network, address)` pairs handed to the dialer, in connect order.
    ///
    /// A `hostaddr` entry replaces the matching `host` as the dial target;
    /// the host name then only names the server.
    pub fn targets(&self) -> Vec<(&'static str, String)> {
        let ports = self.config.get_ports();
        let port_for = |index: usize| match ports {
            [] => DEFAULT_PORT,
            [port] => *port,
            _ => ports.get(index).copied().unwrap_or(DEFAULT_PORT),
        };

        let hosts = self.config.get_hosts();
        let hostaddrs = self.config.get_hostaddrs();
        let count = hosts.len().max(hostaddrs.len());
        if count == 0 {
            return vec![("tcp", format!("localhost:{}", port_for(0)))];
        }

        (0..count)
            .filter_map(|index| {
                let port = port_for(index);
                if let Some(addr) = hostaddrs.get(index) {
                    return Some(("tcp", SocketAddr::new(*addr, port).to_string()));
                }
                let target = match hosts.get(index)? {
                    Host::Tcp(name) if name.contains(':') => ("tcp", format!("[{name}]:{port}")),
                    Host::Tcp(name) => ("tcp", format!("{name}:{port}")),
                    #[cfg(unix)]
                    Host::Unix(dir) => (
                        "unix",
                        dir.join(format!(".s.PGSQL.{port}")).display().to_string(),
                    ),
                };
                Some(target)
            })
            .collect()
    }

    async fn connect_one(
        &self,
        ctx: &CancellationToken,
        network: &str,
        address: &str,
    ) -> Result<tokio_postgres::Client> {
        let stream = self
            .dialer
            .dial(ctx, network, address)
            .await
            .map_err(TunnelError::Dial)?;

        let (client, connection) = self.config.connect_raw(stream, NoTls).await?;

        let driver = self.driver_name.clone();
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::warn!(driver = %driver, error = %err, "Postgres connection closed with error");
            }
        });

        Ok(client)
    }
}

#[async_trait]
impl Connector for PostgresConnector {
    async fn connect(&self, ctx: &CancellationToken) -> Result<Connection> {
        let timeout = self.config.get_connect_timeout().copied();
        let mut last_err = None;

        for (network, address) in self.targets() {
            match connect_within(ctx, timeout, self.connect_one(ctx, network, &address)).await {
                Ok(client) => return Ok(Connection::Postgres(client)),
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => {
                    tracing::debug!(driver = %self.driver_name, %address, error = %err, "Postgres host failed");
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            TunnelError::Dial(io::Error::new(io::ErrorKind::InvalidInput, "no host to dial"))
        }))
    }

    fn driver_name(&self) -> &str {
        &self.driver_name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for PostgresConnector {
    // tokio_postgres::Config redacts the password in its own Debug output
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConnector")
            .field("driver", &self.driver_name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
