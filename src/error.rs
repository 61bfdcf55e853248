use std::fmt::Display;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqlConnectorError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Parameter conversion error: {0}")]
    ParameterError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    /// Caller misuse of the connector/transaction/statement contract.
    #[error("Contract violation: {0}")]
    ContractViolation(String),

    /// Fetched data does not fit the row sink, e.g. NULL into a required field.
    #[error("Consistency error: {0}")]
    ConsistencyError(String),

    #[error("Disconnect refused: {count} transaction(s) still open")]
    TransactionsOpen { count: usize },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Unimplemented feature: {0}")]
    Unimplemented(String),
}

/// Coarse classification of [`SqlConnectorError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Connectivity,
    Backend,
    ContractViolation,
    Consistency,
    Timeout,
}

impl SqlConnectorError {
    /// Wrap a backend-reported failure, keeping the operation label and the backend text.
    pub(crate) fn backend(operation: &str, err: impl Display) -> Self {
        SqlConnectorError::ExecutionError(format!("{operation} error: {err}"))
    }

    pub(crate) fn contract(message: impl Into<String>) -> Self {
        SqlConnectorError::ContractViolation(message.into())
    }

    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            SqlConnectorError::ConfigError(_) => ErrorCategory::Configuration,
            SqlConnectorError::ConnectionError(_) => ErrorCategory::Connectivity,
            SqlConnectorError::ParameterError(_)
            | SqlConnectorError::ExecutionError(_)
            | SqlConnectorError::Unimplemented(_) => ErrorCategory::Backend,
            SqlConnectorError::ContractViolation(_) | SqlConnectorError::TransactionsOpen { .. } => {
                ErrorCategory::ContractViolation
            }
            SqlConnectorError::ConsistencyError(_) => ErrorCategory::Consistency,
            SqlConnectorError::Timeout(_) => ErrorCategory::Timeout,
        }
    }

    /// True when the error signals caller misuse rather than a data or backend condition.
    #[must_use]
    pub fn is_contract_violation(&self) -> bool {
        self.category() == ErrorCategory::ContractViolation
    }
}
