//! Declarative database connections.
//!
//! A [`ConnectionFactory`] turns a configuration record such as
//!
//! ```json
//! {
//!     "driver": "pgsql",
//!     "database": "app",
//!     "read": [{"host": "replica-1"}, {"host": "replica-2"}],
//!     "write": {"host": "primary"}
//! }
//! ```
//!
//! into a connection object for one of the built-in drivers (`mysql`,
//! `pgsql`, `sqlite`, `sqlsrv`) or a driver bound in a [`Registry`].
//!
//! ```rust,ignore
//! use chambers_db::{ConnectionFactory, DatabaseSettings};
//!
//! let settings = DatabaseSettings::load(None)?;
//! let factory = ConnectionFactory::default();
//!
//! let connection = factory.make_named(&settings, None)?;
//! let info = connection.test_connection().await?;
//! let replica = factory.create_read_connection(connection.config()).await?;
//! ```

pub mod config;
pub mod driver;
pub mod drivers;
pub mod error;
pub mod factory;
pub mod registry;
pub mod settings;

pub use config::{ConfigRecord, Role};
pub use driver::{
    ConnectionInfo, ConnectionParts, Connector, DatabaseConnection, DriverKind, RawConnection,
};
pub use error::{ConfigError, ConnectionError, Result};
pub use factory::ConnectionFactory;
pub use registry::Registry;
pub use settings::DatabaseSettings;
