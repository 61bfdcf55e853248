// SQLite backend over rusqlite:
// - config: options read from a connection target
// - params: tagged value -> storage class
// - query: storage class + field tag -> tagged value
// - connection: the Backend/BackendConnection impls

pub mod config;
pub mod connection;
pub mod params;
pub mod query;

pub use config::SqliteOptions;
pub use connection::{SqliteBackend, SqliteConnection, SqliteStatement};

use crate::config::ConnectionTarget;
use crate::error::SqlConnectorError;

impl SqliteBackend {
    /// Build a backend from a target whose `database` is the file path.
    ///
    /// # Errors
    /// Returns `SqlConnectorError::ConfigError` if the path is empty or a parameter is invalid.
    pub fn from_target(target: &ConnectionTarget) -> Result<Self, SqlConnectorError> {
        if target.database.trim().is_empty() {
            return Err(SqlConnectorError::ConfigError(
                "sqlite database path is required".to_string(),
            ));
        }
        let options = SqliteOptions::from_target(target)?;
        Ok(SqliteBackend::with_options(target.database.clone(), options))
    }
}
