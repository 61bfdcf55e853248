use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SqlConnectorError;
use crate::types::DatabaseType;

/// Number of connections a connector opens; always within `[MIN, MAX]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct PoolSize(u32);

impl PoolSize {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 10;
    pub const DEFAULT: PoolSize = PoolSize(4);

    /// # Errors
    /// Returns `SqlConnectorError::ConfigError` if `n` is outside `[1, 10]`.
    pub fn new(n: u32) -> Result<Self, SqlConnectorError> {
        if (Self::MIN..=Self::MAX).contains(&n) {
            Ok(PoolSize(n))
        } else {
            Err(SqlConnectorError::ConfigError(format!(
                "pool size {n} outside the allowed range {}..={}",
                Self::MIN,
                Self::MAX
            )))
        }
    }

    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn as_usize(self) -> usize {
        // At most 10, so the cast is lossless on every target.
        self.0 as usize
    }
}

impl Default for PoolSize {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u32> for PoolSize {
    type Error = SqlConnectorError;

    fn try_from(n: u32) -> Result<Self, Self::Error> {
        PoolSize::new(n)
    }
}

impl From<PoolSize> for u32 {
    fn from(size: PoolSize) -> Self {
        size.0
    }
}

impl fmt::Display for PoolSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Where a connector connects to; backends read only the fields they need.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionTarget {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Database name, or the file path for `SQLite`.
    pub database: String,
    /// Backend-specific options, e.g. `busy_timeout_ms` or `application_name`.
    pub params: BTreeMap<String, String>,
}

impl ConnectionTarget {
    #[must_use]
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Parse an optional parameter, naming the key in the error.
    ///
    /// # Errors
    /// Returns `SqlConnectorError::ConfigError` if the value does not parse as `T`.
    pub fn parsed_param<T>(&self, key: &str) -> Result<Option<T>, SqlConnectorError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.param(key)
            .map(|raw| {
                raw.trim().parse::<T>().map_err(|e| {
                    SqlConnectorError::ConfigError(format!("invalid value {raw:?} for {key}: {e}"))
                })
            })
            .transpose()
    }
}

/// Everything needed to build a connector for any supported backend.
///
/// ```rust
/// use sql_connector::prelude::*;
///
/// let config: ConnectorConfig = serde_json::from_str(
///     r#"{"db_type": "sqlite", "target": {"database": ":memory:"}, "pool_size": 1}"#,
/// )
/// .unwrap();
/// assert_eq!(config.pool_size.get(), 1);
///
/// assert!(serde_json::from_str::<ConnectorConfig>(
///     r#"{"db_type": "sqlite", "target": {"database": "x.db"}, "pool_size": 11}"#,
/// )
/// .is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorConfig {
    pub db_type: DatabaseType,
    pub target: ConnectionTarget,
    #[serde(default)]
    pub pool_size: PoolSize,
}

impl ConnectorConfig {
    #[must_use]
    pub fn new(db_type: DatabaseType, target: ConnectionTarget) -> Self {
        Self {
            db_type,
            target,
            pool_size: PoolSize::default(),
        }
    }

    #[must_use]
    pub fn builder(db_type: DatabaseType) -> ConnectorConfigBuilder {
        ConnectorConfigBuilder::new(db_type)
    }
}

/// Fluent builder for [`ConnectorConfig`].
#[derive(Debug, Clone)]
pub struct ConnectorConfigBuilder {
    config: ConnectorConfig,
    pool_size: Option<u32>,
}

impl ConnectorConfigBuilder {
    #[must_use]
    pub fn new(db_type: DatabaseType) -> Self {
        Self {
            config: ConnectorConfig::new(db_type, ConnectionTarget::default()),
            pool_size: None,
        }
    }

    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.target.host = Some(host.into());
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.target.port = Some(port);
        self
    }

    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.config.target.user = Some(user.into());
        self
    }

    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.target.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.config.target.database = database.into();
        self
    }

    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.target.params.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn pool_size(mut self, n: u32) -> Self {
        self.pool_size = Some(n);
        self
    }

    /// # Errors
    /// Returns `SqlConnectorError::ConfigError` for an out-of-range pool size or an empty
    /// database name.
    pub fn build(self) -> Result<ConnectorConfig, SqlConnectorError> {
        let mut config = self.config;
        if let Some(n) = self.pool_size {
            config.pool_size = PoolSize::new(n)?;
        }
        if config.target.database.trim().is_empty() {
            return Err(SqlConnectorError::ConfigError(
                "database is required".to_string(),
            ));
        }
        Ok(config)
    }
}
