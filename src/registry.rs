//! Driver Registry
//!
//! Extension point consulted before the built-in drivers. Entries are keyed
//! `connector.<driver>` and `connection.<driver>`; binding a key replaces the
//! built-in handling for that driver without touching the factory.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::driver::{ConnectionParts, Connector, DatabaseConnection};

pub type ConnectorResolver = Arc<dyn Fn() -> Arc<dyn Connector> + Send + Sync>;
pub type ConnectionResolver =
    Arc<dyn Fn(ConnectionParts) -> Box<dyn DatabaseConnection> + Send + Sync>;

#[derive(Clone)]
enum Binding {
    Connector(ConnectorResolver),
    Connection(ConnectionResolver),
}

pub fn connector_key(driver: &str) -> String {
    format!("connector.{driver}")
}

pub fn connection_key(driver: &str) -> String {
    format!("connection.{driver}")
}

/// Overrides for connector and connection construction, shared by factories
#[derive(Default)]
pub struct Registry {
    bindings: RwLock<HashMap<String, Binding>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a closure that produces the connector for `driver`.
    ///
    /// The closure runs on every lookup.
    pub fn bind_connector<F>(&self, driver: &str, resolver: F)
    where
        F: Fn() -> Arc<dyn Connector> + Send + Sync + 'static,
    {
        tracing::debug!(driver, "binding connector override");
        self.bindings
            .write()
            .insert(connector_key(driver), Binding::Connector(Arc::new(resolver)));
    }

    /// Registers one shared connector instance for `driver`
    pub fn instance_connector(&self, driver: &str, connector: Arc<dyn Connector>) {
        self.bind_connector(driver, move || connector.clone());
    }

    /// Registers a constructor for the connections of `driver`
    pub fn bind_connection<F>(&self, driver: &str, resolver: F)
    where
        F: Fn(ConnectionParts) -> Box<dyn DatabaseConnection> + Send + Sync + 'static,
    {
        tracing::debug!(driver, "binding connection override");
        self.bindings
            .write()
            .insert(connection_key(driver), Binding::Connection(Arc::new(resolver)));
    }

    /// Whether anything is registered under `key`
    pub fn bound(&self, key: &str) -> bool {
        self.bindings.read().contains_key(key)
    }

    /// Resolves the connector override for `driver`, if one is bound
    pub fn connector(&self, driver: &str) -> Option<Arc<dyn Connector>> {
        // Lock is released before the resolver runs so it may use the registry.
        let binding = self.bindings.read().get(&connector_key(driver)).cloned();
        match binding {
            Some(Binding::Connector(resolve)) => Some(resolve()),
            _ => None,
        }
    }

    /// Constructs the connection override for `driver`, if one is bound
    pub fn connection(
        &self,
        driver: &str,
        parts: ConnectionParts,
    ) -> Option<Box<dyn DatabaseConnection>> {
        let binding = self.bindings.read().get(&connection_key(driver)).cloned();
        match binding {
            Some(Binding::Connection(construct)) => Some(construct(parts)),
            _ => None,
        }
    }

    /// Removes the binding under `key`, returning whether one existed
    pub fn forget(&self, key: &str) -> bool {
        self.bindings.write().remove(key).is_some()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.bindings.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("keys", &self.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigRecord;
    use crate::driver::RawConnection;
    use crate::error::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullConnector;

    #[async_trait]
    impl Connector for NullConnector {
        async fn connect(&self, _config: &ConfigRecord) -> Result<RawConnection> {
            Ok(RawConnection::custom(()))
        }
    }

    #[test]
    fn keys_are_namespaced_by_kind() {
        let registry = Registry::new();
        registry.bind_connector("mysql", || Arc::new(NullConnector));

        assert!(registry.bound("connector.mysql"));
        assert!(!registry.bound("connection.mysql"));
        assert!(registry.connector("mysql").is_some());
        assert!(registry.connector("pgsql").is_none());
        assert_eq!(registry.keys(), vec!["connector.mysql".to_string()]);
    }

    #[test]
    fn bound_resolvers_run_on_each_lookup() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let registry = Registry::new();
        registry.bind_connector("oracle", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Arc::new(NullConnector)
        });

        registry.connector("oracle");
        registry.connector("oracle");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn instances_are_shared() {
        let registry = Registry::new();
        let shared: Arc<dyn Connector> = Arc::new(NullConnector);
        registry.instance_connector("oracle", shared.clone());

        let resolved = registry.connector("oracle").unwrap();
        assert!(Arc::ptr_eq(&shared, &resolved));
    }

    #[test]
    fn forget_removes_binding() {
        let registry = Registry::new();
        registry.bind_connector("oracle", || Arc::new(NullConnector));

        assert!(registry.forget("connector.oracle"));
        assert!(!registry.forget("connector.oracle"));
        assert!(registry.connector("oracle").is_none());
    }
}
