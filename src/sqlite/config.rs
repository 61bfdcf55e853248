use std::time::Duration;

use tracing::warn;

use crate::config::ConnectionTarget;
use crate::error::SqlConnectorError;

const KNOWN_PARAMS: &[&str] = &[
    "busy_timeout_ms",
    "journal_mode",
    "foreign_keys",
    "translate_placeholders",
];

const JOURNAL_MODES: &[&str] = &["DELETE", "TRUNCATE", "PERSIST", "MEMORY", "WAL", "OFF"];

/// Options applied to every `SQLite` connection a backend opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteOptions {
    pub busy_timeout: Duration,
    /// `None` keeps the database's current journal mode.
    pub journal_mode: Option<String>,
    pub foreign_keys: bool,
    /// Rewrite `$N` placeholders to `?N` before compiling.
    pub translate_placeholders: bool,
}

impl SqliteOptions {
    /// Defaults for `path`: WAL journaling for files, none for `:memory:`.
    #[must_use]
    pub fn for_path(path: &str) -> Self {
        Self {
            busy_timeout: Duration::from_millis(5000),
            journal_mode: (!is_memory_path(path)).then(|| "WAL".to_string()),
            foreign_keys: false,
            translate_placeholders: false,
        }
    }

    /// Read options from a target's `params`, starting from the defaults for its path.
    ///
    /// # Errors
    /// Returns `SqlConnectorError::ConfigError` for unparseable values or an unknown journal mode.
    pub fn from_target(target: &ConnectionTarget) -> Result<Self, SqlConnectorError> {
        let mut opts = Self::for_path(&target.database);
        for key in target.params.keys() {
            if !KNOWN_PARAMS.contains(&key.as_str()) {
                warn!(param = %key, "ignoring unknown sqlite connection parameter");
            }
        }
        if let Some(ms) = target.parsed_param::<u64>("busy_timeout_ms")? {
            opts.busy_timeout = Duration::from_millis(ms);
        }
        if let Some(mode) = target.param("journal_mode") {
            opts.journal_mode = Some(normalize_journal_mode(mode)?);
        }
        if let Some(on) = target.parsed_param::<bool>("foreign_keys")? {
            opts.foreign_keys = on;
        }
        if let Some(on) = target.parsed_param::<bool>("translate_placeholders")? {
            opts.translate_placeholders = on;
        }
        Ok(opts)
    }

    #[must_use]
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// # Errors
    /// Returns `SqlConnectorError::ConfigError` for an unknown journal mode.
    pub fn with_journal_mode(mut self, mode: &str) -> Result<Self, SqlConnectorError> {
        self.journal_mode = Some(normalize_journal_mode(mode)?);
        Ok(self)
    }

    #[must_use]
    pub fn with_foreign_keys(mut self, on: bool) -> Self {
        self.foreign_keys = on;
        self
    }

    #[must_use]
    pub fn with_translation(mut self, translate_placeholders: bool) -> Self {
        self.translate_placeholders = translate_placeholders;
        self
    }
}

fn normalize_journal_mode(mode: &str) -> Result<String, SqlConnectorError> {
    let upper = mode.trim().to_ascii_uppercase();
    if JOURNAL_MODES.contains(&upper.as_str()) {
        Ok(upper)
    } else {
        Err(SqlConnectorError::ConfigError(format!(
            "unknown sqlite journal_mode {mode:?}; expected one of {}",
            JOURNAL_MODES.join(", ")
        )))
    }
}

pub(crate) fn is_memory_path(path: &str) -> bool {
    path == ":memory:" || path.starts_with("file::memory:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_depend_on_path() {
        let file = SqliteOptions::for_path("/tmp/app.db");
        assert_eq!(file.journal_mode.as_deref(), Some("WAL"));
        assert_eq!(file.busy_timeout, Duration::from_secs(5));
        let memory = SqliteOptions::for_path(":memory:");
        assert!(memory.journal_mode.is_none());
    }

    #[test]
    fn params_override_defaults() {
        let mut target = ConnectionTarget::new("app.db");
        target.params.insert("busy_timeout_ms".into(), "250".into());
        target.params.insert("journal_mode".into(), "delete".into());
        target.params.insert("foreign_keys".into(), "true".into());
        let opts = SqliteOptions::from_target(&target).unwrap();
        assert_eq!(opts.busy_timeout, Duration::from_millis(250));
        assert_eq!(opts.journal_mode.as_deref(), Some("DELETE"));
        assert!(opts.foreign_keys);
        assert!(!opts.translate_placeholders);
    }

    #[test]
    fn bad_values_are_config_errors() {
        let mut target = ConnectionTarget::new("app.db");
        target.params.insert("journal_mode".into(), "sideways".into());
        assert!(matches!(
            SqliteOptions::from_target(&target),
            Err(SqlConnectorError::ConfigError(_))
        ));

        let mut target = ConnectionTarget::new("app.db");
        target.params.insert("foreign_keys".into(), "maybe".into());
        assert!(SqliteOptions::from_target(&target).is_err());
    }
}
