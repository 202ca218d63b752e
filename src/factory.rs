use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;
use std::sync::Arc;

use crate::config::{expand_url, normalize, resolve_role, ConfigRecord, Role};
use crate::driver::{ConnectionParts, Connector, DatabaseConnection, DriverKind, RawConnection};
use crate::error::{ConfigError, ConnectionError, Result};
use crate::registry::Registry;
use crate::settings::DatabaseSettings;

/// Turns configuration records into connections.
///
/// Cloning is cheap: clones share the registry and the replica-selection
/// generator. Every connection built here keeps a clone so it can open
/// handles later.
#[derive(Clone)]
pub struct ConnectionFactory {
    registry: Arc<Registry>,
    rng: Arc<Mutex<StdRng>>,
}

impl ConnectionFactory {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self::with_rng(registry, StdRng::from_entropy())
    }

    /// Uses `rng` for replica selection, e.g. a seeded generator in tests
    pub fn with_rng(registry: Arc<Registry>, rng: StdRng) -> Self {
        Self {
            registry,
            rng: Arc::new(Mutex::new(rng)),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Builds a connection for a single server.
    ///
    /// `read`/`write` keys are kept in the connection's config but not
    /// resolved here. No I/O happens until the connection is used.
    pub fn make(
        &self,
        config: &ConfigRecord,
        name: Option<&str>,
    ) -> Result<Box<dyn DatabaseConnection>> {
        let config = normalize(&expand_url(config)?, name);
        let driver = config.driver()?.to_string();
        let database = config.get_str("database").unwrap_or_default().to_string();
        let prefix = config.get_str("prefix").unwrap_or_default().to_string();

        tracing::debug!(%driver, name = name.unwrap_or_default(), "making connection");
        self.build(&driver, &database, &prefix, config)
    }

    /// Builds the connection registered under `name` in `settings`, or the
    /// default connection when `name` is `None`
    pub fn make_named(
        &self,
        settings: &DatabaseSettings,
        name: Option<&str>,
    ) -> Result<Box<dyn DatabaseConnection>> {
        let name = name.unwrap_or(settings.default_name());
        let config = settings
            .connection(name)
            .ok_or_else(|| ConfigError::UnknownConnection(name.to_string()))?;
        self.make(config, Some(name))
    }

    /// Resolves the connector for the record's driver, registered overrides
    /// first
    pub fn create_connector(&self, config: &ConfigRecord) -> Result<Arc<dyn Connector>> {
        let driver = config.driver()?;

        if let Some(connector) = self.registry.connector(driver) {
            tracing::debug!(driver, "using registered connector");
            return Ok(connector);
        }

        match DriverKind::from_name(driver) {
            Some(kind) => builtin_connector(kind),
            None => Err(ConfigError::UnsupportedDriver(driver.to_string()).into()),
        }
    }

    /// Constructs the connection object for `driver`, registered overrides
    /// first. Overrides receive the same parts as the built-in connections.
    pub fn build(
        &self,
        driver: &str,
        database: &str,
        prefix: &str,
        config: ConfigRecord,
    ) -> Result<Box<dyn DatabaseConnection>> {
        let parts = ConnectionParts {
            database: database.to_string(),
            prefix: prefix.to_string(),
            config,
            factory: self.clone(),
        };

        if let Some(connection) = self.registry.connection(driver, parts.clone()) {
            tracing::debug!(driver, "using registered connection");
            return Ok(connection);
        }

        match DriverKind::from_name(driver) {
            Some(kind) => builtin_connection(kind, parts),
            None => Err(ConfigError::UnsupportedDriver(driver.to_string()).into()),
        }
    }

    /// Flattens `config` for `role`, drawing a replica from this factory's
    /// generator
    pub fn resolve_role(&self, config: &ConfigRecord, role: Role) -> Result<ConfigRecord> {
        let config = expand_url(config)?;
        let resolved = resolve_role(&config, role, &mut *self.rng.lock())?;
        Ok(expand_url(&resolved)?)
    }

    /// Opens a raw handle to one of the read servers
    pub async fn create_read_connection(&self, config: &ConfigRecord) -> Result<RawConnection> {
        self.create_role_connection(config, Role::Read).await
    }

    /// Opens a raw handle to one of the write servers
    pub async fn create_write_connection(&self, config: &ConfigRecord) -> Result<RawConnection> {
        self.create_role_connection(config, Role::Write).await
    }

    async fn create_role_connection(
        &self,
        config: &ConfigRecord,
        role: Role,
    ) -> Result<RawConnection> {
        let resolved = self.resolve_role(config, role)?;
        let connector = self.create_connector(&resolved)?;

        tracing::debug!(
            %role,
            driver = resolved.get_str("driver").unwrap_or_default(),
            host = resolved.get_str("host").unwrap_or_default(),
            "opening connection"
        );
        connector.connect(&resolved).await
    }
}

impl Default for ConnectionFactory {
    fn default() -> Self {
        Self::new(Arc::new(Registry::new()))
    }
}

impl fmt::Debug for ConnectionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionFactory")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

fn builtin_connector(kind: DriverKind) -> Result<Arc<dyn Connector>> {
    if !kind.is_available() {
        return Err(ConnectionError::DriverNotAvailable(kind.feature_name()));
    }

    match kind {
        #[cfg(feature = "mysql")]
        DriverKind::MySql => Ok(Arc::new(crate::drivers::mysql::MySqlConnector)),

        #[cfg(feature = "postgres")]
        DriverKind::Postgres => Ok(Arc::new(crate::drivers::postgres::PostgresConnector)),

        #[cfg(feature = "sqlite")]
        DriverKind::Sqlite => Ok(Arc::new(crate::drivers::sqlite::SqliteConnector)),

        #[cfg(feature = "sqlsrv")]
        DriverKind::SqlServer => Ok(Arc::new(crate::drivers::sqlsrv::SqlServerConnector)),

        // Fallback for when feature not compiled
        #[allow(unreachable_patterns)]
        _ => Err(ConnectionError::DriverNotAvailable(kind.feature_name())),
    }
}

fn builtin_connection(
    kind: DriverKind,
    parts: ConnectionParts,
) -> Result<Box<dyn DatabaseConnection>> {
    if !kind.is_available() {
        return Err(ConnectionError::DriverNotAvailable(kind.feature_name()));
    }

    match kind {
        #[cfg(feature = "mysql")]
        DriverKind::MySql => Ok(Box::new(crate::drivers::mysql::MySqlConnection::new(parts))),

        #[cfg(feature = "postgres")]
        DriverKind::Postgres => Ok(Box::new(
            crate::drivers::postgres::PostgresConnection::new(parts),
        )),

        #[cfg(feature = "sqlite")]
        DriverKind::Sqlite => Ok(Box::new(crate::drivers::sqlite::SqliteConnection::new(parts))),

        #[cfg(feature = "sqlsrv")]
        DriverKind::SqlServer => Ok(Box::new(
            crate::drivers::sqlsrv::SqlServerConnection::new(parts),
        )),

        #[allow(unreachable_patterns)]
        _ => {
            let _ = parts;
            Err(ConnectionError::DriverNotAvailable(kind.feature_name()))
        }
    }
}
