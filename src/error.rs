use std::time::Duration;
use thiserror::Error;

use crate::config::Role;

/// Errors raised while turning a configuration record into a connection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("A driver must be specified.")]
    MissingDriver,
    #[error("Unsupported driver [{0}]")]
    UnsupportedDriver(String),
    #[error("The {role} configuration lists no servers")]
    EmptyReplicaList { role: Role },
    #[error("The {role} configuration must be a mapping or a list of mappings")]
    InvalidRoleConfig { role: Role },
    #[error("Invalid database url: {0}")]
    InvalidUrl(String),
    #[error("Database connection [{0}] not configured.")]
    UnknownConnection(String),
}

/// Errors that can occur while resolving or opening a connection
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Connection failed: {0}")]
    Failed(String),
    #[error("Authentication failed")]
    AuthFailed,
    #[error("Connection timeout after {0:?}")]
    Timeout(Duration),
    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),
    #[error("Driver not available: {0} (not compiled)")]
    DriverNotAvailable(&'static str),
}

impl ConnectionError {
    /// The configuration error behind this failure, if any
    pub fn config_error(&self) -> Option<&ConfigError> {
        match self {
            ConnectionError::Config(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConnectionError>;
