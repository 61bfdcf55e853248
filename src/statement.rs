use std::fmt;

use crate::backend::ColumnMeta;
use crate::error::SqlConnectorError;
use crate::transaction::TransactionId;
use crate::types::StatementKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatementId(pub(crate) u64);

impl fmt::Display for StatementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stmt-{}", self.0)
    }
}

/// Lifecycle of a statement. Ordering follows the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StatementState {
    Created,
    Prepared,
    Executed,
    /// Result set exhausted; fetches return `false` until the next execute.
    Done,
}

/// Caller-side reference to a statement registered with a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatementHandle {
    pub(crate) transaction: TransactionId,
    pub(crate) id: StatementId,
}

impl StatementHandle {
    #[must_use]
    pub fn id(&self) -> StatementId {
        self.id
    }

    #[must_use]
    pub fn transaction_id(&self) -> TransactionId {
        self.transaction
    }
}

/// Snapshot of a statement's bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementInfo {
    pub kind: StatementKind,
    pub sql: String,
    pub state: StatementState,
    pub executions: u64,
    /// Cached once the first row after an execute has been read.
    pub columns: Option<Vec<ColumnMeta>>,
}

/// A registered statement wrapping the backend's handle.
pub(crate) struct Statement<S> {
    pub(crate) kind: StatementKind,
    pub(crate) sql: String,
    state: StatementState,
    param_count: usize,
    /// Values have been bound since the last prepare.
    bound: bool,
    columns: Option<Vec<ColumnMeta>>,
    executions: u64,
    pub(crate) inner: S,
}

impl<S> Statement<S> {
    pub(crate) fn new(kind: StatementKind, sql: &str, inner: S) -> Self {
        Self {
            kind,
            sql: sql.to_owned(),
            state: StatementState::Created,
            param_count: 0,
            bound: false,
            columns: None,
            executions: 0,
            inner,
        }
    }

    pub(crate) fn state(&self) -> StatementState {
        self.state
    }

    pub(crate) fn param_count(&self) -> usize {
        self.param_count
    }

    pub(crate) fn executions(&self) -> u64 {
        self.executions
    }

    pub(crate) fn columns(&self) -> Option<&[ColumnMeta]> {
        self.columns.as_deref()
    }

    pub(crate) fn cache_columns(&mut self, columns: Vec<ColumnMeta>) {
        self.columns = Some(columns);
    }

    /// Compare the backend-declared count with the caller's and move to Prepared.
    pub(crate) fn mark_prepared(
        &mut self,
        declared: usize,
        expected: usize,
    ) -> Result<(), SqlConnectorError> {
        if declared != expected {
            return Err(SqlConnectorError::ParameterError(format!(
                "statement declares {declared} parameter(s) but {expected} were expected"
            )));
        }
        self.param_count = declared;
        self.bound = false;
        self.columns = None;
        self.state = StatementState::Prepared;
        Ok(())
    }

    pub(crate) fn ensure_bindable(&self, supplied: usize) -> Result<(), SqlConnectorError> {
        if self.state != StatementState::Prepared {
            return Err(SqlConnectorError::contract(format!(
                "cannot bind values to a statement in state {:?}; prepare it first",
                self.state
            )));
        }
        if supplied != self.param_count {
            return Err(SqlConnectorError::ParameterError(format!(
                "{supplied} value(s) supplied for {} parameter(s)",
                self.param_count
            )));
        }
        Ok(())
    }

    pub(crate) fn mark_bound(&mut self) {
        self.bound = true;
    }

    pub(crate) fn ensure_executable(&self) -> Result<(), SqlConnectorError> {
        if self.state < StatementState::Prepared {
            return Err(SqlConnectorError::contract(
                "statement must be prepared before it is executed or fetched",
            ));
        }
        if self.param_count() > 0 && !self.bound {
            return Err(SqlConnectorError::contract(format!(
                "statement declares {} parameter(s) but no values were bound",
                self.param_count()
            )));
        }
        Ok(())
    }

    pub(crate) fn mark_executed(&mut self) {
        self.state = StatementState::Executed;
        self.executions += 1;
        self.columns = None;
    }

    pub(crate) fn mark_done(&mut self) {
        self.state = StatementState::Done;
    }

    pub(crate) fn info(&self) -> StatementInfo {
        StatementInfo {
            kind: self.kind,
            sql: self.sql.clone(),
            state: self.state,
            executions: self.executions,
            columns: self.columns.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Statement<()> {
        Statement::new(StatementKind::Select, "SELECT 1", ())
    }

    #[test]
    fn states_order_along_the_lifecycle() {
        assert!(StatementState::Created < StatementState::Prepared);
        assert!(StatementState::Prepared < StatementState::Executed);
        assert!(StatementState::Executed < StatementState::Done);
    }

    #[test]
    fn created_statements_reject_bind_and_execute() {
        let stmt = fresh();
        assert!(stmt.ensure_bindable(0).unwrap_err().is_contract_violation());
        assert!(stmt.ensure_executable().unwrap_err().is_contract_violation());
    }

    #[test]
    fn prepare_checks_declared_count() {
        let mut stmt = fresh();
        let err = stmt.mark_prepared(2, 1).unwrap_err();
        assert!(matches!(err, SqlConnectorError::ParameterError(_)));
        assert_eq!(stmt.state(), StatementState::Created);

        stmt.mark_prepared(1, 1).unwrap();
        assert_eq!(stmt.state(), StatementState::Prepared);
        assert!(stmt.ensure_bindable(1).is_ok());
        assert!(matches!(
            stmt.ensure_bindable(2),
            Err(SqlConnectorError::ParameterError(_))
        ));
    }

    #[test]
    fn parameters_must_be_bound_before_execute() {
        let mut stmt = fresh();
        stmt.mark_prepared(2, 2).unwrap();
        assert!(stmt.ensure_executable().unwrap_err().is_contract_violation());
        stmt.mark_bound();
        assert!(stmt.ensure_executable().is_ok());

        // Re-preparing discards the earlier binding.
        stmt.mark_prepared(2, 2).unwrap();
        assert!(stmt.ensure_executable().is_err());
    }

    #[test]
    fn execute_counts_and_resets_columns() {
        let mut stmt = fresh();
        stmt.mark_prepared(0, 0).unwrap();
        stmt.mark_executed();
        stmt.cache_columns(vec![ColumnMeta::new("1", None)]);
        assert!(stmt.columns().is_some());
        assert!(stmt.ensure_bindable(0).is_err());

        stmt.mark_done();
        assert!(stmt.ensure_executable().is_ok());
        stmt.mark_executed();
        assert_eq!(stmt.executions(), 2);
        assert!(stmt.columns().is_none());

        let info = stmt.info();
        assert_eq!(info.state, StatementState::Executed);
        assert_eq!(info.sql, "SELECT 1");
    }

    #[test]
    fn reprepare_returns_to_prepared() {
        let mut stmt = fresh();
        stmt.mark_prepared(0, 0).unwrap();
        stmt.mark_executed();
        stmt.mark_done();
        stmt.mark_prepared(0, 0).unwrap();
        assert_eq!(stmt.state(), StatementState::Prepared);
        assert_eq!(stmt.executions(), 1);
    }
}
