//! Configuration records and the transformations applied before a record
//! reaches a connector: defaults, `url` expansion and read/write resolution.

use percent_encoding::percent_decode_str;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::ConfigError;

/// An ordered mapping of configuration keys, as written in a settings file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigRecord(Map<String, Value>);

impl ConfigRecord {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wraps a JSON value; returns `None` unless it is an object
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String value of `key`; non-string values read as absent
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Port-like value of `key`, accepting numbers and numeric strings
    pub fn get_u16(&self, key: &str) -> Option<u16> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Flag value of `key`; accepts booleans and "true"/"1"/"on"/"yes"
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.0.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => Some(n.as_u64() != Some(0)),
            Value::String(s) => Some(matches!(
                s.to_ascii_lowercase().as_str(),
                "true" | "1" | "on" | "yes"
            )),
            _ => None,
        }
    }

    /// The `driver` key, which every connectable record must carry
    pub fn driver(&self) -> Result<&str, ConfigError> {
        self.get_str("driver").ok_or(ConfigError::MissingDriver)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Copies every key of `other` over this record; `other` wins on conflict
    pub fn merged_with(&self, other: &Map<String, Value>) -> Self {
        let mut merged = self.0.clone();
        for (key, value) in other {
            merged.insert(key.clone(), value.clone());
        }
        Self(merged)
    }
}

impl From<Map<String, Value>> for ConfigRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for ConfigRecord {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The traffic a connection is resolved for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Read,
    Write,
}

impl Role {
    pub fn key(&self) -> &'static str {
        match self {
            Role::Read => "read",
            Role::Write => "write",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Fills in `prefix` and `name` when the record does not set them.
///
/// The input is left untouched; a missing `name` argument defaults to `""`.
pub fn normalize(config: &ConfigRecord, name: Option<&str>) -> ConfigRecord {
    let mut normalized = config.clone();
    if !normalized.contains_key("prefix") {
        normalized.insert("prefix", "");
    }
    if !normalized.contains_key("name") {
        normalized.insert("name", name.unwrap_or_default());
    }
    normalized
}

/// Picks the `role` server for `config` and flattens it into a single record.
///
/// A list of alternatives yields one entry drawn uniformly from `rng`; an
/// absent role falls back to the base record. The result never carries
/// `read` or `write` keys.
pub fn resolve_role<R>(
    config: &ConfigRecord,
    role: Role,
    rng: &mut R,
) -> Result<ConfigRecord, ConfigError>
where
    R: Rng + ?Sized,
{
    let mut merged = match config.get(role.key()) {
        None => config.clone(),
        Some(Value::Object(fragment)) => config.merged_with(fragment),
        Some(Value::Array(alternatives)) => match alternatives.choose(rng) {
            None => return Err(ConfigError::EmptyReplicaList { role }),
            Some(Value::Object(fragment)) => config.merged_with(fragment),
            Some(_) => return Err(ConfigError::InvalidRoleConfig { role }),
        },
        Some(_) => return Err(ConfigError::InvalidRoleConfig { role }),
    };

    merged.remove(Role::Read.key());
    merged.remove(Role::Write.key());
    Ok(merged)
}

/// Maps a URL scheme to the driver name it stands for
fn driver_for_scheme(scheme: &str) -> &str {
    match scheme {
        "mariadb" => "mysql",
        "postgres" | "postgresql" => "pgsql",
        "sqlserver" | "mssql" => "sqlsrv",
        other => other,
    }
}

fn decode(component: &str) -> String {
    percent_decode_str(component).decode_utf8_lossy().into_owned()
}

/// Expands a `url` key into discrete connection keys.
///
/// Components taken from the URL replace explicit keys; query parameters
/// become keys of their own. Records without a `url` are returned as-is.
pub fn expand_url(config: &ConfigRecord) -> Result<ConfigRecord, ConfigError> {
    let raw = match config.get_str("url") {
        Some(raw) if !raw.trim().is_empty() => raw.trim(),
        _ => {
            let mut unchanged = config.clone();
            unchanged.remove("url");
            return Ok(unchanged);
        }
    };

    let url = url::Url::parse(raw).map_err(|e| ConfigError::InvalidUrl(format!("{raw}: {e}")))?;
    let driver = driver_for_scheme(url.scheme());

    let mut expanded = config.clone();
    expanded.remove("url");
    expanded.insert("driver", driver);

    if let Some(host) = url.host_str().filter(|h| !h.is_empty()) {
        expanded.insert("host", host);
    }
    if let Some(port) = url.port() {
        expanded.insert("port", port);
    }
    if !url.username().is_empty() {
        expanded.insert("username", decode(url.username()));
    }
    if let Some(password) = url.password() {
        expanded.insert("password", decode(password));
    }

    let path = decode(url.path());
    let database = if driver == "sqlite" {
        path
    } else {
        path.trim_start_matches('/').to_string()
    };
    if !database.is_empty() {
        expanded.insert("database", database);
    }

    for (key, value) in url.query_pairs() {
        let value = match value.as_ref() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            other => Value::String(other.to_string()),
        };
        expanded.insert(key.into_owned(), value);
    }

    Ok(expanded)
}
