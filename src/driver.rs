use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;

use crate::config::ConfigRecord;
use crate::error::Result;
use crate::factory::ConnectionFactory;

/// Built-in database drivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriverKind {
    #[serde(rename = "mysql")]
    MySql,
    #[serde(rename = "pgsql")]
    Postgres,
    #[serde(rename = "sqlite")]
    Sqlite,
    #[serde(rename = "sqlsrv")]
    SqlServer,
}

impl DriverKind {
    /// Looks up a built-in driver by the name used in configuration
    pub fn from_name(driver: &str) -> Option<Self> {
        match driver {
            "mysql" => Some(DriverKind::MySql),
            "pgsql" => Some(DriverKind::Postgres),
            "sqlite" => Some(DriverKind::Sqlite),
            "sqlsrv" => Some(DriverKind::SqlServer),
            _ => None,
        }
    }

    /// The name used for this driver in configuration records
    pub fn driver_name(&self) -> &'static str {
        match self {
            DriverKind::MySql => "mysql",
            DriverKind::Postgres => "pgsql",
            DriverKind::Sqlite => "sqlite",
            DriverKind::SqlServer => "sqlsrv",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DriverKind::MySql => "MySQL",
            DriverKind::Postgres => "PostgreSQL",
            DriverKind::Sqlite => "SQLite",
            DriverKind::SqlServer => "SQL Server",
        }
    }

    /// Default TCP port; `None` for file-based drivers
    pub fn default_port(&self) -> Option<u16> {
        match self {
            DriverKind::MySql => Some(3306),
            DriverKind::Postgres => Some(5432),
            DriverKind::Sqlite => None,
            DriverKind::SqlServer => Some(1433),
        }
    }

    pub fn all() -> &'static [DriverKind] {
        &[
            DriverKind::MySql,
            DriverKind::Postgres,
            DriverKind::Sqlite,
            DriverKind::SqlServer,
        ]
    }

    /// Cargo feature that compiles this driver in
    pub fn feature_name(&self) -> &'static str {
        match self {
            DriverKind::MySql => "mysql",
            DriverKind::Postgres => "postgres",
            DriverKind::Sqlite => "sqlite",
            DriverKind::SqlServer => "sqlsrv",
        }
    }

    pub fn is_available(&self) -> bool {
        match self {
            DriverKind::MySql => cfg!(feature = "mysql"),
            DriverKind::Postgres => cfg!(feature = "postgres"),
            DriverKind::Sqlite => cfg!(feature = "sqlite"),
            DriverKind::SqlServer => cfg!(feature = "sqlsrv"),
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.driver_name())
    }
}

/// A live, driver-level connection handle
pub enum RawConnection {
    #[cfg(feature = "mysql")]
    MySql(mysql_async::Conn),
    #[cfg(feature = "postgres")]
    Postgres(tokio_postgres::Client),
    #[cfg(feature = "sqlite")]
    Sqlite(rusqlite::Connection),
    #[cfg(feature = "sqlsrv")]
    SqlServer(crate::drivers::sqlsrv::SqlServerClient),
    /// Handle produced by a registered connector
    Custom(Box<dyn Any + Send>),
}

impl RawConnection {
    pub fn custom<T: Any + Send>(handle: T) -> Self {
        RawConnection::Custom(Box::new(handle))
    }

    /// Recovers the handle of a registered connector
    pub fn downcast_custom<T: Any>(self) -> Option<T> {
        match self {
            RawConnection::Custom(handle) => handle.downcast::<T>().ok().map(|h| *h),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    /// Built-in driver behind this handle, `None` for custom handles
    pub fn kind(&self) -> Option<DriverKind> {
        match self {
            #[cfg(feature = "mysql")]
            RawConnection::MySql(_) => Some(DriverKind::MySql),
            #[cfg(feature = "postgres")]
            RawConnection::Postgres(_) => Some(DriverKind::Postgres),
            #[cfg(feature = "sqlite")]
            RawConnection::Sqlite(_) => Some(DriverKind::Sqlite),
            #[cfg(feature = "sqlsrv")]
            RawConnection::SqlServer(_) => Some(DriverKind::SqlServer),
            RawConnection::Custom(_) => None,
        }
    }
}

impl fmt::Debug for RawConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Some(kind) => write!(f, "RawConnection::{}", kind.name()),
            None => f.write_str("RawConnection::Custom"),
        }
    }
}

/// Performs the handshake for one driver
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &ConfigRecord) -> Result<RawConnection>;
}

/// Information returned from a successful connection test
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub server_version: Option<String>,
    pub latency_ms: u64,
    pub database_name: Option<String>,
}

/// Everything a connection is constructed from, built-in or registered
#[derive(Clone)]
pub struct ConnectionParts {
    pub database: String,
    pub prefix: String,
    pub config: ConfigRecord,
    pub factory: ConnectionFactory,
}

impl fmt::Debug for ConnectionParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParts")
            .field("database", &self.database)
            .field("prefix", &self.prefix)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Core trait for application-facing database connections
#[async_trait]
pub trait DatabaseConnection: Send + Sync {
    fn parts(&self) -> &ConnectionParts;

    /// Driver name this connection was built for
    fn driver(&self) -> &str;

    fn database_name(&self) -> &str {
        &self.parts().database
    }

    fn table_prefix(&self) -> &str {
        &self.parts().prefix
    }

    fn config(&self) -> &ConfigRecord {
        &self.parts().config
    }

    /// Logical connection name assigned at construction
    fn name(&self) -> Option<&str> {
        self.config().get_str("name")
    }

    /// Opens a handle for write traffic (or the single server) through the
    /// factory that built this connection
    async fn connect(&self) -> Result<RawConnection> {
        self.parts().factory.create_write_connection(self.config()).await
    }

    /// Opens a handle for read traffic
    async fn connect_read(&self) -> Result<RawConnection> {
        self.parts().factory.create_read_connection(self.config()).await
    }

    /// Test if connection can be established
    async fn test_connection(&self) -> Result<ConnectionInfo>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_names_round_trip() {
        for kind in DriverKind::all() {
            assert_eq!(DriverKind::from_name(kind.driver_name()), Some(*kind));
        }
        assert_eq!(DriverKind::from_name("postgres"), None);
        assert_eq!(DriverKind::from_name("MYSQL"), None);
    }

    #[test]
    fn default_ports() {
        assert_eq!(DriverKind::MySql.default_port(), Some(3306));
        assert_eq!(DriverKind::Postgres.default_port(), Some(5432));
        assert_eq!(DriverKind::SqlServer.default_port(), Some(1433));
        assert_eq!(DriverKind::Sqlite.default_port(), None);
    }

    #[test]
    fn custom_handles_downcast() {
        let raw = RawConnection::custom(String::from("handle"));
        assert_eq!(raw.kind(), None);
        assert_eq!(format!("{raw:?}"), "RawConnection::Custom");
        assert_eq!(raw.downcast_custom::<String>(), Some("handle".to_string()));

        let raw = RawConnection::custom(7_u32);
        assert_eq!(raw.downcast_custom::<String>(), None);
    }
}
