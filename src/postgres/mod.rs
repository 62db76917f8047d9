//! PostgreSQL driver (`pgx`) backed by tokio-postgres.
//!
//! Unlike the mssql session init statement, which is stored per DSN, the
//! config-edit hook is global to the driver: it runs against the parsed
//! [`tokio_postgres::Config`] of every connector the driver opens, and can
//! either adjust it or reject it.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tunneldb::dialer::TcpDialer;
//! use tunneldb::driver::TunnelDriver;
//! use tunneldb::postgres::{self, PostgresDriver};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! postgres::set_config_edit(Some(|config: &mut tokio_postgres::Config| -> Result<(), tunneldb::BoxError> {
//!     config.application_name("reporting");
//!     Ok(())
//! }));
//!
//! let connector = PostgresDriver::new()
//!     .open_connector(Arc::new(TcpDialer::new()), "host=db user=app dbname=app")?;
//! # let _ = connector;
//! postgres::clear_config_edit();
//! # Ok(())
//! # }
//! ```

pub mod connector;

use once_cell::sync::Lazy;
use std::str::FromStr;
use std::sync::Arc;
use tokio_postgres::Config;

use crate::dialer::Dialer;
use crate::driver::Vendor;
use crate::error::{BoxError, Result, TunnelError};
use crate::overrides::ConfigEditHook;

pub use connector::{PostgresConnector, DEFAULT_PORT};

/// Name the driver registers under.
pub const DRIVER_NAME: &str = "pgx";

static CONFIG_EDIT: Lazy<Arc<ConfigEditHook<Config>>> =
    Lazy::new(|| Arc::new(ConfigEditHook::new()));

/// Set the hook applied to every connector opened by [`PostgresDriver::new`].
///
/// `None` clears it. A hook that returns an error makes `open_connector` fail
/// with that error.
pub fn set_config_edit<F>(hook: Option<F>)
where
    F: Fn(&mut Config) -> Result<(), BoxError> + Send + Sync + 'static,
{
    CONFIG_EDIT.set(hook);
}

/// Remove the process-wide config-edit hook.
pub fn clear_config_edit() {
    CONFIG_EDIT.set_shared(None);
}

/// Process-wide hook store used by [`PostgresDriver::new`].
pub fn config_edit_store() -> Arc<ConfigEditHook<Config>> {
    Arc::clone(&CONFIG_EDIT)
}

/// Tunnel driver for PostgreSQL.
#[derive(Debug, Clone)]
pub struct PostgresDriver {
    name: String,
    config_edit: Arc<ConfigEditHook<Config>>,
}

impl PostgresDriver {
    /// Driver bound to the process-wide config-edit hook.
    pub fn new() -> Self {
        Self::with_hook(config_edit_store())
    }

    /// Driver bound to its own hook store.
    pub fn with_hook(config_edit: Arc<ConfigEditHook<Config>>) -> Self {
        Self {
            name: DRIVER_NAME.to_string(),
            config_edit,
        }
    }

    /// Register under a different name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The hook store consulted by this driver.
    pub fn hook(&self) -> &Arc<ConfigEditHook<Config>> {
        &self.config_edit
    }
}

impl Default for PostgresDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Vendor for PostgresDriver {
    type Config = Config;
    type Connector = PostgresConnector;

    fn name(&self) -> &str {
        &self.name
    }

    fn parse(&self, dsn: &str) -> Result<Config> {
        Config::from_str(dsn).map_err(TunnelError::malformed_dsn)
    }

    fn inject_dialer(&self, config: Config, dialer: Arc<dyn Dialer>) -> PostgresConnector {
        PostgresConnector::new(config, dialer, &self.name)
    }

    fn apply_override(&self, _dsn: &str, connector: &mut PostgresConnector) -> Result<()> {
        self.config_edit
            .apply(connector.config_mut())
            .map_err(TunnelError::ConfigEditRejected)
    }
}
