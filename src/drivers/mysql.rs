//! MySQL driver implementation

use async_trait::async_trait;
use mysql_async::prelude::*;
use std::time::Instant;

use super::{connect_timeout, non_empty, quote_literal};
use crate::config::ConfigRecord;
use crate::driver::{
    ConnectionInfo, ConnectionParts, Connector, DatabaseConnection, DriverKind, RawConnection,
};
use crate::error::{ConnectionError, Result};

const DEFAULT_PORT: u16 = 3306;

/// Server error code for rejected credentials
const ER_ACCESS_DENIED: u16 = 1045;

fn map_error(err: mysql_async::Error) -> ConnectionError {
    match err {
        mysql_async::Error::Server(ref server) if server.code == ER_ACCESS_DENIED => {
            ConnectionError::AuthFailed
        }
        other => ConnectionError::Failed(other.to_string()),
    }
}

pub struct MySqlConnector;

impl MySqlConnector {
    /// Driver options for a flattened record. `unix_socket` takes precedence
    /// over host and port.
    pub fn options(config: &ConfigRecord) -> mysql_async::Opts {
        let mut builder = mysql_async::OptsBuilder::default()
            .ip_or_hostname(non_empty(config, "host").unwrap_or("localhost"))
            .tcp_port(config.get_u16("port").unwrap_or(DEFAULT_PORT))
            .user(config.get_str("username"))
            .pass(config.get_str("password"))
            .db_name(non_empty(config, "database"));

        if let Some(socket) = non_empty(config, "unix_socket") {
            builder = builder.socket(Some(socket));
        }

        builder.into()
    }

    /// Statements run right after the handshake
    pub fn session_statements(config: &ConfigRecord) -> Vec<String> {
        let mut statements = Vec::new();

        if let Some(charset) = non_empty(config, "charset") {
            let mut names = format!("SET NAMES {}", quote_literal(charset));
            if let Some(collation) = non_empty(config, "collation") {
                names.push_str(&format!(" COLLATE {}", quote_literal(collation)));
            }
            statements.push(names);
        }

        if let Some(timezone) = non_empty(config, "timezone") {
            statements.push(format!("SET time_zone = {}", quote_literal(timezone)));
        }

        match config.get_bool("strict") {
            Some(true) => statements.push(
                "SET SESSION sql_mode = 'ONLY_FULL_GROUP_BY,STRICT_TRANS_TABLES,NO_ZERO_IN_DATE,NO_ZERO_DATE,ERROR_FOR_DIVISION_BY_ZERO,NO_ENGINE_SUBSTITUTION'"
                    .to_string(),
            ),
            Some(false) => {
                statements.push("SET SESSION sql_mode = 'NO_ENGINE_SUBSTITUTION'".to_string())
            }
            None => {}
        }

        statements
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    async fn connect(&self, config: &ConfigRecord) -> Result<RawConnection> {
        let timeout = connect_timeout(config);
        let opts = Self::options(config);

        let mut conn = tokio::time::timeout(timeout, mysql_async::Conn::new(opts))
            .await
            .map_err(|_| ConnectionError::Timeout(timeout))?
            .map_err(map_error)?;

        for statement in Self::session_statements(config) {
            conn.query_drop(statement).await.map_err(map_error)?;
        }

        tracing::info!(
            host = config.get_str("host").unwrap_or("localhost"),
            database = config.get_str("database").unwrap_or_default(),
            "connected to MySQL"
        );
        Ok(RawConnection::MySql(conn))
    }
}

pub struct MySqlConnection {
    parts: ConnectionParts,
}

impl MySqlConnection {
    pub fn new(parts: ConnectionParts) -> Self {
        Self { parts }
    }
}

#[async_trait]
impl DatabaseConnection for MySqlConnection {
    fn parts(&self) -> &ConnectionParts {
        &self.parts
    }

    fn driver(&self) -> &str {
        DriverKind::MySql.driver_name()
    }

    async fn test_connection(&self) -> Result<ConnectionInfo> {
        let start = Instant::now();

        let RawConnection::MySql(mut conn) = self.connect().await? else {
            return Err(ConnectionError::Failed("connector did not return a MySQL handle".into()));
        };

        let version: Option<String> = conn
            .query_first("SELECT VERSION()")
            .await
            .map_err(map_error)?;

        let latency = start.elapsed().as_millis() as u64;

        // Clean up
        conn.disconnect().await.ok();

        Ok(ConnectionInfo {
            server_version: version.map(|v| format!("MySQL {}", v)),
            latency_ms: latency,
            database_name: Some(self.database_name().to_string()).filter(|d| !d.is_empty()),
        })
    }
}
