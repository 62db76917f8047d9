//! Driver registry keyed by driver name.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::dialer::Dialer;
use crate::error::{Result, TunnelError};
use crate::mssql::MssqlDriver;
use crate::postgres::PostgresDriver;

use super::{Connector, TunnelDriver};

/// Process-wide registry, populated with the built-in drivers on first use.
static REGISTRY: Lazy<DriverRegistry> = Lazy::new(DriverRegistry::with_builtin);

/// The process-wide registry holding `mssql` and `pgx`.
pub fn registry() -> &'static DriverRegistry {
    &REGISTRY
}

/// Register `driver` in the process-wide registry.
///
/// # Errors
///
/// Returns [`TunnelError::DuplicateDriver`] if the name is taken.
pub fn register_driver<D>(driver: D) -> Result<()>
where
    D: TunnelDriver + 'static,
{
    REGISTRY.register(driver)
}

/// Name to driver lookup. Drivers are never unregistered.
pub struct DriverRegistry {
    drivers: RwLock<HashMap<String, Arc<dyn TunnelDriver>>>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            drivers: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry holding the built-in drivers bound to the
    /// process-wide override stores.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        let builtin: [Arc<dyn TunnelDriver>; 2] =
            [Arc::new(MssqlDriver::new()), Arc::new(PostgresDriver::new())];
        {
            let mut drivers = registry.drivers.write();
            for driver in builtin {
                drivers.insert(driver.name().to_string(), driver);
            }
        }
        registry
    }

    /// Register a driver under its own name.
    ///
    /// # Errors
    ///
    /// Returns [`TunnelError::DuplicateDriver`] if the name is taken.
    pub fn register<D>(&self, driver: D) -> Result<()>
    where
        D: TunnelDriver + 'static,
    {
        self.register_shared(Arc::new(driver))
    }

    /// Register an already shared driver.
    pub fn register_shared(&self, driver: Arc<dyn TunnelDriver>) -> Result<()> {
        let name = driver.name().to_string();
        let mut drivers = self.drivers.write();
        if drivers.contains_key(&name) {
            return Err(TunnelError::DuplicateDriver(name));
        }
        drivers.insert(name.clone(), driver);
        drop(drivers);

        tracing::info!(driver = %name, "Tunnel driver registered");
        Ok(())
    }

    /// Look up a driver by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn TunnelDriver>> {
        self.drivers.read().get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.drivers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Open a connector with the driver registered as `name`.
    ///
    /// # Errors
    ///
    /// Returns [`TunnelError::UnknownDriver`] for an unregistered name, or
    /// whatever the driver's `open_connector` returns.
    pub fn open_connector(
        &self,
        name: &str,
        dialer: Arc<dyn Dialer>,
        dsn: &str,
    ) -> Result<Box<dyn Connector>> {
        let driver = self
            .get(name)
            .ok_or_else(|| TunnelError::UnknownDriver(name.to_string()))?;
        driver.open_connector(dialer, dsn)
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.names())
            .finish()
    }
}
