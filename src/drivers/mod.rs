//! Built-in driver implementations
//! Each driver is conditionally compiled based on features

use std::time::Duration;

use crate::config::ConfigRecord;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlsrv")]
pub mod sqlsrv;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Handshake timeout from the `timeout` key (seconds)
#[allow(dead_code)]
pub(crate) fn connect_timeout(config: &ConfigRecord) -> Duration {
    config
        .get_u64("timeout")
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_CONNECT_TIMEOUT)
}

/// Quotes `value` as a SQL string literal
#[allow(dead_code)]
pub(crate) fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Non-empty string value of `key`
#[allow(dead_code)]
pub(crate) fn non_empty<'a>(config: &'a ConfigRecord, key: &str) -> Option<&'a str> {
    config.get_str(key).filter(|value| !value.is_empty())
}
