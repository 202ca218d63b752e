//! PostgreSQL driver implementation

use async_trait::async_trait;
use postgres_native_tls::MakeTlsConnector;
use std::time::Instant;
use tokio_postgres::config::SslMode;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, NoTls};

use super::{connect_timeout, non_empty, quote_literal};
use crate::config::ConfigRecord;
use crate::driver::{
    ConnectionInfo, ConnectionParts, Connector, DatabaseConnection, DriverKind, RawConnection,
};
use crate::error::{ConnectionError, Result};

const DEFAULT_PORT: u16 = 5432;

fn map_error(err: tokio_postgres::Error) -> ConnectionError {
    let rejected = err.as_db_error().is_some_and(|db| {
        db.code() == &SqlState::INVALID_PASSWORD
            || db.code() == &SqlState::INVALID_AUTHORIZATION_SPECIFICATION
    });
    if rejected {
        ConnectionError::AuthFailed
    } else {
        ConnectionError::Failed(err.to_string())
    }
}

/// `sslmode` as libpq spells it; `prefer` when absent
fn ssl_mode_name(config: &ConfigRecord) -> &str {
    non_empty(config, "sslmode").unwrap_or("prefer")
}

pub struct PostgresConnector;

impl PostgresConnector {
    pub fn options(config: &ConfigRecord) -> Result<tokio_postgres::Config> {
        let mut pg = tokio_postgres::Config::new();
        pg.host(non_empty(config, "host").unwrap_or("localhost"));
        pg.port(config.get_u16("port").unwrap_or(DEFAULT_PORT));
        pg.connect_timeout(connect_timeout(config));

        if let Some(user) = non_empty(config, "username") {
            pg.user(user);
        }
        if let Some(password) = config.get_str("password") {
            pg.password(password);
        }
        if let Some(database) = non_empty(config, "database") {
            pg.dbname(database);
        }
        if let Some(application_name) = non_empty(config, "application_name") {
            pg.application_name(application_name);
        }

        let mode = match ssl_mode_name(config) {
            "disable" => SslMode::Disable,
            "allow" | "prefer" => SslMode::Prefer,
            "require" | "verify-ca" | "verify-full" => SslMode::Require,
            other => {
                return Err(ConnectionError::InvalidConnectionString(format!(
                    "unknown sslmode: {}",
                    other
                )))
            }
        };
        pg.ssl_mode(mode);

        Ok(pg)
    }

    /// Statements run right after the handshake
    pub fn session_statements(config: &ConfigRecord) -> Vec<String> {
        let mut statements = Vec::new();

        if let Some(charset) = non_empty(config, "charset") {
            statements.push(format!("SET client_encoding TO {}", quote_literal(charset)));
        }

        if let Some(timezone) = non_empty(config, "timezone") {
            statements.push(format!("SET TIME ZONE {}", quote_literal(timezone)));
        }

        let schemas: Vec<&str> = match config.get("search_path").or(config.get("schema")) {
            Some(serde_json::Value::String(list)) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect(),
            Some(serde_json::Value::Array(list)) => list
                .iter()
                .filter_map(serde_json::Value::as_str)
                .collect(),
            _ => Vec::new(),
        };
        if !schemas.is_empty() {
            let quoted: Vec<String> = schemas
                .iter()
                .map(|s| format!("\"{}\"", s.trim_matches('"').replace('"', "\"\"")))
                .collect();
            statements.push(format!("SET search_path TO {}", quoted.join(", ")));
        }

        statements
    }

    /// TLS settings per libpq: `verify-full` checks certificate and host,
    /// `verify-ca` only the certificate, anything else encrypts unverified
    fn tls_connector(config: &ConfigRecord) -> Result<MakeTlsConnector> {
        let mut builder = native_tls::TlsConnector::builder();
        match ssl_mode_name(config) {
            "verify-full" => {}
            "verify-ca" => {
                builder.danger_accept_invalid_hostnames(true);
            }
            _ => {
                builder.danger_accept_invalid_certs(true);
            }
        }

        if let Some(path) = non_empty(config, "sslrootcert") {
            let pem = std::fs::read(path).map_err(|e| {
                ConnectionError::InvalidConnectionString(format!("sslrootcert {}: {}", path, e))
            })?;
            let cert = native_tls::Certificate::from_pem(&pem)
                .map_err(|e| ConnectionError::InvalidConnectionString(e.to_string()))?;
            builder.add_root_certificate(cert);
        }

        let connector = builder
            .build()
            .map_err(|e| ConnectionError::Failed(e.to_string()))?;
        Ok(MakeTlsConnector::new(connector))
    }
}

#[async_trait]
impl Connector for PostgresConnector {
    async fn connect(&self, config: &ConfigRecord) -> Result<RawConnection> {
        let pg = Self::options(config)?;
        let timeout = connect_timeout(config);

        // Spawn connection handler (required by tokio-postgres)
        let client = if pg.get_ssl_mode() == SslMode::Disable {
            let (client, connection) = tokio::time::timeout(timeout, pg.connect(NoTls))
                .await
                .map_err(|_| ConnectionError::Timeout(timeout))?
                .map_err(map_error)?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::error!(error = %e, "PostgreSQL connection error");
                }
            });
            client
        } else {
            let tls = Self::tls_connector(config)?;
            let (client, connection) = tokio::time::timeout(timeout, pg.connect(tls))
                .await
                .map_err(|_| ConnectionError::Timeout(timeout))?
                .map_err(map_error)?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::error!(error = %e, "PostgreSQL connection error");
                }
            });
            client
        };

        let statements = Self::session_statements(config);
        if !statements.is_empty() {
            client
                .batch_execute(&statements.join("; "))
                .await
                .map_err(map_error)?;
        }

        tracing::info!(
            host = config.get_str("host").unwrap_or("localhost"),
            database = config.get_str("database").unwrap_or_default(),
            "connected to PostgreSQL"
        );
        Ok(RawConnection::Postgres(client))
    }
}

pub struct PostgresConnection {
    parts: ConnectionParts,
}

impl PostgresConnection {
    pub fn new(parts: ConnectionParts) -> Self {
        Self { parts }
    }
}

async fn server_version(client: &Client) -> Result<String> {
    let row = client
        .query_one("SELECT version()", &[])
        .await
        .map_err(map_error)?;
    Ok(row.get(0))
}

#[async_trait]
impl DatabaseConnection for PostgresConnection {
    fn parts(&self) -> &ConnectionParts {
        &self.parts
    }

    fn driver(&self) -> &str {
        DriverKind::Postgres.driver_name()
    }

    async fn test_connection(&self) -> Result<ConnectionInfo> {
        let start = Instant::now();

        let RawConnection::Postgres(client) = self.connect().await? else {
            return Err(ConnectionError::Failed(
                "connector did not return a PostgreSQL handle".into(),
            ));
        };

        let version = server_version(&client).await?;
        let latency = start.elapsed().as_millis() as u64;

        Ok(ConnectionInfo {
            server_version: Some(version),
            latency_ms: latency,
            database_name: Some(self.database_name().to_string()).filter(|d| !d.is_empty()),
        })
    }
}
