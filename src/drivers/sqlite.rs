//! SQLite driver implementation

use async_trait::async_trait;
use std::path::Path;
use std::time::{Duration, Instant};

use super::non_empty;
use crate::config::ConfigRecord;
use crate::driver::{
    ConnectionInfo, ConnectionParts, Connector, DatabaseConnection, DriverKind, RawConnection,
};
use crate::error::{ConnectionError, Result};

const MEMORY: &str = ":memory:";

fn map_error(err: rusqlite::Error) -> ConnectionError {
    ConnectionError::Failed(err.to_string())
}

pub struct SqliteConnector;

impl SqliteConnector {
    /// Database path from the record; files must already exist
    pub fn database_path(config: &ConfigRecord) -> Result<String> {
        let path = non_empty(config, "database").ok_or_else(|| {
            ConnectionError::InvalidConnectionString("SQLite database path is empty".into())
        })?;

        if path == MEMORY || path.starts_with("file:") {
            return Ok(path.to_string());
        }

        if !Path::new(path).exists() {
            return Err(ConnectionError::InvalidConnectionString(format!(
                "Database file at path [{}] does not exist",
                path
            )));
        }

        Ok(path.to_string())
    }
}

#[async_trait]
impl Connector for SqliteConnector {
    async fn connect(&self, config: &ConfigRecord) -> Result<RawConnection> {
        let path = Self::database_path(config)?;
        let foreign_keys = config.get_bool("foreign_keys");
        let busy_timeout = config.get_u64("busy_timeout").map(Duration::from_millis);

        // SQLite is synchronous, so we run it in a blocking task
        let conn = tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&path).map_err(map_error)?;

            if let Some(enabled) = foreign_keys {
                conn.pragma_update(None, "foreign_keys", enabled)
                    .map_err(map_error)?;
            }
            if let Some(timeout) = busy_timeout {
                conn.busy_timeout(timeout).map_err(map_error)?;
            }

            Ok::<_, ConnectionError>(conn)
        })
        .await
        .map_err(|e| ConnectionError::Failed(e.to_string()))??;

        tracing::info!(
            database = config.get_str("database").unwrap_or_default(),
            "opened SQLite database"
        );
        Ok(RawConnection::Sqlite(conn))
    }
}

pub struct SqliteConnection {
    parts: ConnectionParts,
}

impl SqliteConnection {
    pub fn new(parts: ConnectionParts) -> Self {
        Self { parts }
    }
}

#[async_trait]
impl DatabaseConnection for SqliteConnection {
    fn parts(&self) -> &ConnectionParts {
        &self.parts
    }

    fn driver(&self) -> &str {
        DriverKind::Sqlite.driver_name()
    }

    async fn test_connection(&self) -> Result<ConnectionInfo> {
        let start = Instant::now();

        let RawConnection::Sqlite(conn) = self.connect().await? else {
            return Err(ConnectionError::Failed(
                "connector did not return a SQLite handle".into(),
            ));
        };

        let version = tokio::task::spawn_blocking(move || {
            conn.query_row("SELECT sqlite_version()", [], |row| row.get::<_, String>(0))
                .map_err(map_error)
        })
        .await
        .map_err(|e| ConnectionError::Failed(e.to_string()))??;

        let latency = start.elapsed().as_millis() as u64;

        Ok(ConnectionInfo {
            server_version: Some(format!("SQLite {}", version)),
            latency_ms: latency,
            database_name: Some(self.database_name().to_string()).filter(|d| !d.is_empty()),
        })
    }
}
