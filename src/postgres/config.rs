use std::time::Duration;

use tracing::warn;

use crate::config::ConnectionTarget;
use crate::error::SqlConnectorError;

const KNOWN_PARAMS: &[&str] = &[
    "application_name",
    "connect_timeout_secs",
    "translate_placeholders",
];

/// Options for `PostgreSQL` sessions, validated from a [`ConnectionTarget`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresOptions {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub dbname: String,
    pub application_name: Option<String>,
    pub connect_timeout: Option<Duration>,
    /// Rewrite `?`/`?N` placeholders to `$N` before compiling.
    pub translate_placeholders: bool,
}

impl PostgresOptions {
    /// # Errors
    /// Returns `SqlConnectorError::ConfigError` if host, user, or database is missing, or a
    /// parameter does not parse.
    pub fn from_target(target: &ConnectionTarget) -> Result<Self, SqlConnectorError> {
        let host = target
            .host
            .clone()
            .ok_or_else(|| SqlConnectorError::ConfigError("host is required".to_string()))?;
        let user = target
            .user
            .clone()
            .ok_or_else(|| SqlConnectorError::ConfigError("user is required".to_string()))?;
        if target.database.trim().is_empty() {
            return Err(SqlConnectorError::ConfigError(
                "dbname is required".to_string(),
            ));
        }
        for key in target.params.keys() {
            if !KNOWN_PARAMS.contains(&key.as_str()) {
                warn!(param = %key, "ignoring unknown postgres connection parameter");
            }
        }

        Ok(Self {
            host,
            port: target.port.unwrap_or(5432),
            user,
            password: target.password.clone(),
            dbname: target.database.clone(),
            application_name: target.param("application_name").map(str::to_owned),
            connect_timeout: target
                .parsed_param::<u64>("connect_timeout_secs")?
                .map(Duration::from_secs),
            translate_placeholders: target
                .parsed_param::<bool>("translate_placeholders")?
                .unwrap_or(true),
        })
    }

    /// The driver-level configuration these options describe.
    #[must_use]
    pub fn to_pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .user(&self.user)
            .dbname(&self.dbname);
        if let Some(password) = &self.password {
            config.password(password);
        }
        if let Some(name) = &self.application_name {
            config.application_name(name);
        }
        if let Some(timeout) = self.connect_timeout {
            config.connect_timeout(timeout);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> ConnectionTarget {
        ConnectionTarget {
            host: Some("db.internal".into()),
            port: None,
            user: Some("app".into()),
            password: Some("pw".into()),
            database: "appdb".into(),
            params: Default::default(),
        }
    }

    #[test]
    fn defaults_fill_port_and_translation() {
        let opts = PostgresOptions::from_target(&target()).unwrap();
        assert_eq!(opts.port, 5432);
        assert!(opts.translate_placeholders);
        assert!(opts.connect_timeout.is_none());
        let pg = opts.to_pg_config();
        assert_eq!(pg.get_dbname(), Some("appdb"));
        assert_eq!(pg.get_ports(), &[5432]);
    }

    #[test]
    fn required_fields_are_checked() {
        let mut missing_host = target();
        missing_host.host = None;
        assert!(matches!(
            PostgresOptions::from_target(&missing_host),
            Err(SqlConnectorError::ConfigError(msg)) if msg.contains("host")
        ));

        let mut missing_db = target();
        missing_db.database.clear();
        assert!(PostgresOptions::from_target(&missing_db).is_err());
    }

    #[test]
    fn params_are_parsed() {
        let mut t = target();
        t.params.insert("connect_timeout_secs".into(), "3".into());
        t.params.insert("translate_placeholders".into(), "false".into());
        t.params.insert("application_name".into(), "svc".into());
        let opts = PostgresOptions::from_target(&t).unwrap();
        assert_eq!(opts.connect_timeout, Some(Duration::from_secs(3)));
        assert!(!opts.translate_placeholders);
        assert_eq!(opts.application_name.as_deref(), Some("svc"));

        t.params.insert("connect_timeout_secs".into(), "soon".into());
        assert!(PostgresOptions::from_target(&t).is_err());
    }
}
