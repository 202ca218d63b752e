//! SQL Server driver implementation

use async_trait::async_trait;
use std::time::Instant;
use tiberius::{AuthMethod, Client, Config};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use super::{connect_timeout, non_empty};
use crate::config::ConfigRecord;
use crate::driver::{
    ConnectionInfo, ConnectionParts, Connector, DatabaseConnection, DriverKind, RawConnection,
};
use crate::error::{ConnectionError, Result};

pub type SqlServerClient = Client<Compat<TcpStream>>;

const DEFAULT_PORT: u16 = 1433;

/// Server error number for a failed login
const LOGIN_FAILED: u32 = 18456;

fn map_error(err: tiberius::error::Error) -> ConnectionError {
    match err {
        tiberius::error::Error::Server(ref token) if token.code() == LOGIN_FAILED => {
            ConnectionError::AuthFailed
        }
        other => ConnectionError::Failed(other.to_string()),
    }
}

pub struct SqlServerConnector;

impl SqlServerConnector {
    pub fn options(config: &ConfigRecord) -> Config {
        let mut tib = Config::new();

        tib.host(non_empty(config, "host").unwrap_or("localhost"));
        tib.port(config.get_u16("port").unwrap_or(DEFAULT_PORT));
        if let Some(database) = non_empty(config, "database") {
            tib.database(database);
        }
        if let Some(application_name) = non_empty(config, "application_name") {
            tib.application_name(application_name);
        }

        let username = non_empty(config, "username").unwrap_or("sa");
        let password = config.get_str("password").unwrap_or("");
        tib.authentication(AuthMethod::sql_server(username, password));

        if config.get_bool("trust_cert").unwrap_or(false) {
            tib.trust_cert();
        }

        tib
    }
}

#[async_trait]
impl Connector for SqlServerConnector {
    async fn connect(&self, config: &ConfigRecord) -> Result<RawConnection> {
        let tib = Self::options(config);
        let timeout = connect_timeout(config);

        let tcp = tokio::time::timeout(timeout, TcpStream::connect(tib.get_addr()))
            .await
            .map_err(|_| ConnectionError::Timeout(timeout))?
            .map_err(|e| ConnectionError::Failed(format!("Failed to connect: {}", e)))?;
        tcp.set_nodelay(true).ok();

        let client = tokio::time::timeout(timeout, Client::connect(tib, tcp.compat_write()))
            .await
            .map_err(|_| ConnectionError::Timeout(timeout))?
            .map_err(map_error)?;

        tracing::info!(
            host = config.get_str("host").unwrap_or("localhost"),
            database = config.get_str("database").unwrap_or_default(),
            "connected to SQL Server"
        );
        Ok(RawConnection::SqlServer(client))
    }
}

pub struct SqlServerConnection {
    parts: ConnectionParts,
}

impl SqlServerConnection {
    pub fn new(parts: ConnectionParts) -> Self {
        Self { parts }
    }
}

#[async_trait]
impl DatabaseConnection for SqlServerConnection {
    fn parts(&self) -> &ConnectionParts {
        &self.parts
    }

    fn driver(&self) -> &str {
        DriverKind::SqlServer.driver_name()
    }

    async fn test_connection(&self) -> Result<ConnectionInfo> {
        let start = Instant::now();

        let RawConnection::SqlServer(mut client) = self.connect().await? else {
            return Err(ConnectionError::Failed(
                "connector did not return a SQL Server handle".into(),
            ));
        };

        let row = client
            .simple_query("SELECT @@VERSION")
            .await
            .map_err(map_error)?
            .into_row()
            .await
            .map_err(map_error)?;
        let version = row.and_then(|row| row.get::<&str, _>(0).map(str::to_string));

        let latency = start.elapsed().as_millis() as u64;

        client.close().await.ok();

        Ok(ConnectionInfo {
            server_version: version,
            latency_ms: latency,
            database_name: Some(self.database_name().to_string()).filter(|d| !d.is_empty()),
        })
    }
}
