use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

use crate::backend::{Backend, BackendConnection};
use crate::connector::{ConnectionId, Pooled, Shared};
use crate::error::SqlConnectorError;
use crate::marshal::{integer_into_tag, reject_denormalized, require_scalar_field};
use crate::reflect::RowSink;
use crate::statement::{Statement, StatementHandle, StatementId, StatementInfo, StatementState};
use crate::types::{StatementKind, Value};

type BackendStatement<B> = <<B as Backend>::Connection as BackendConnection>::Statement;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub(crate) u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

/// Metadata about an open transaction, for listing without touching it.
#[derive(Debug, Clone)]
pub struct TransactionMetadata {
    pub transaction_id: TransactionId,
    pub connection_id: ConnectionId,
    /// When the transaction borrowed its connection
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

/// Log a backend failure with its context and pass the result through.
fn logged<T>(
    transaction_id: TransactionId,
    statement_id: Option<StatementId>,
    operation: &'static str,
    result: Result<T, SqlConnectorError>,
) -> Result<T, SqlConnectorError> {
    if let Err(err) = &result {
        match statement_id {
            Some(statement_id) => error!(
                transaction_id = %transaction_id,
                statement_id = %statement_id,
                operation,
                error = %err,
                "statement operation failed"
            ),
            None => error!(
                transaction_id = %transaction_id,
                operation,
                error = %err,
                "transaction operation failed"
            ),
        }
    }
    result
}

/// One borrowed connection plus the statements opened on it.
///
/// Obtained from [`Connector::create_transaction`](crate::Connector::create_transaction) and
/// handed back with [`Connector::close_transaction`](crate::Connector::close_transaction).
/// Dropping it instead logs a warning, rolls back if needed, and returns the connection.
pub struct Transaction<B: Backend> {
    id: TransactionId,
    connection_id: ConnectionId,
    shared: Arc<Shared<B>>,
    conn: Option<Pooled<B::Connection>>,
    statements: HashMap<StatementId, Statement<BackendStatement<B>>>,
    next_statement: u64,
    begun: bool,
}

impl<B: Backend> Transaction<B> {
    pub(crate) fn new(id: TransactionId, shared: Arc<Shared<B>>, pooled: Pooled<B::Connection>) -> Self {
        Self {
            id,
            connection_id: pooled.id,
            shared,
            conn: Some(pooled),
            statements: HashMap::new(),
            next_statement: 0,
            begun: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    #[must_use]
    pub fn open_statements(&self) -> usize {
        self.statements.len()
    }

    /// True between a successful `begin` and the matching `commit` or `rollback`.
    #[must_use]
    pub fn in_progress(&self) -> bool {
        self.begun
    }

    pub(crate) fn shared(&self) -> &Arc<Shared<B>> {
        &self.shared
    }

    fn conn_mut(&mut self) -> Result<&mut B::Connection, SqlConnectorError> {
        self.conn
            .as_mut()
            .map(|pooled| &mut pooled.conn)
            .ok_or_else(|| SqlConnectorError::contract("transaction already completed"))
    }

    fn check_owner(&self, handle: StatementHandle) -> Result<(), SqlConnectorError> {
        if handle.transaction != self.id {
            return Err(SqlConnectorError::contract(format!(
                "statement {} belongs to transaction {}, not {}",
                handle.id, handle.transaction, self.id
            )));
        }
        if !self.statements.contains_key(&handle.id) {
            return Err(SqlConnectorError::contract(format!(
                "statement {} is not registered with transaction {}",
                handle.id, self.id
            )));
        }
        Ok(())
    }

    /// Split borrows of the connection and one registered statement.
    fn parts(
        &mut self,
        handle: StatementHandle,
    ) -> Result<(&mut B::Connection, &mut Statement<BackendStatement<B>>), SqlConnectorError> {
        self.check_owner(handle)?;
        let conn = self
            .conn
            .as_mut()
            .map(|pooled| &mut pooled.conn)
            .ok_or_else(|| SqlConnectorError::contract("transaction already completed"))?;
        let stmt = self.statements.get_mut(&handle.id).ok_or_else(|| {
            SqlConnectorError::contract(format!("statement {} is not registered", handle.id))
        })?;
        Ok((conn, stmt))
    }

    /// # Errors
    /// Returns `SqlConnectorError::ExecutionError` carrying the backend text.
    pub fn begin(&mut self) -> Result<(), SqlConnectorError> {
        let id = self.id;
        let conn = self.conn_mut()?;
        logged(id, None, "begin", conn.begin())?;
        self.begun = true;
        Ok(())
    }

    /// # Errors
    /// Returns `SqlConnectorError::ExecutionError` carrying the backend text.
    pub fn commit(&mut self) -> Result<(), SqlConnectorError> {
        let id = self.id;
        let conn = self.conn_mut()?;
        logged(id, None, "commit", conn.commit())?;
        self.begun = false;
        Ok(())
    }

    /// # Errors
    /// Returns `SqlConnectorError::ExecutionError` carrying the backend text.
    pub fn rollback(&mut self) -> Result<(), SqlConnectorError> {
        let id = self.id;
        let conn = self.conn_mut()?;
        logged(id, None, "rollback", conn.rollback())?;
        self.begun = false;
        Ok(())
    }

    /// Run parameterless SQL (DDL, pragmas, seed data) outside the statement registry.
    ///
    /// # Errors
    /// Returns `SqlConnectorError::ExecutionError` carrying the backend text.
    pub fn execute_batch(&mut self, sql: &str) -> Result<(), SqlConnectorError> {
        let id = self.id;
        let conn = self.conn_mut()?;
        logged(id, None, "execute_batch", conn.execute_batch(sql))
    }

    /// Allocate and register a statement for `sql`.
    ///
    /// # Errors
    /// Returns `SqlConnectorError::ExecutionError` if the backend refuses the allocation, e.g.
    /// for empty query text. Nothing is registered in that case.
    pub fn create_statement(
        &mut self,
        kind: StatementKind,
        sql: &str,
    ) -> Result<StatementHandle, SqlConnectorError> {
        let tx_id = self.id;
        let conn = self.conn_mut()?;
        let inner = logged(tx_id, None, "allocate", conn.allocate(kind, sql))?;
        self.next_statement += 1;
        let id = StatementId(self.next_statement);
        self.statements.insert(id, Statement::new(kind, sql, inner));
        debug!(transaction_id = %tx_id, statement_id = %id, ?kind, "statement created");
        Ok(StatementHandle {
            transaction: tx_id,
            id,
        })
    }

    /// Compile the statement and check its placeholder count against `param_count`.
    ///
    /// Preparing again resets the statement to Prepared and drops buffered rows.
    ///
    /// # Errors
    /// Returns `SqlConnectorError::ExecutionError` on backend rejection, or
    /// `SqlConnectorError::ParameterError` when the counts differ.
    pub fn prepare(
        &mut self,
        handle: StatementHandle,
        param_count: usize,
    ) -> Result<(), SqlConnectorError> {
        let tx_id = self.id;
        let (conn, stmt) = self.parts(handle)?;
        let declared = logged(tx_id, Some(handle.id), "prepare", conn.prepare(&mut stmt.inner))?;
        logged(
            tx_id,
            Some(handle.id),
            "prepare",
            stmt.mark_prepared(declared, param_count),
        )?;
        debug!(
            transaction_id = %tx_id,
            statement_id = %handle.id,
            params = declared,
            "statement prepared"
        );
        Ok(())
    }

    /// Bind one value per declared parameter, in order. `Value::Null` binds SQL NULL.
    ///
    /// # Errors
    /// Returns `SqlConnectorError::ContractViolation` unless the statement is Prepared, or when
    /// a value is a nested object or array; `SqlConnectorError::ParameterError` when the count is
    /// wrong or a value does not fit its wire type.
    pub fn bind_values(
        &mut self,
        handle: StatementHandle,
        values: &[Value],
    ) -> Result<(), SqlConnectorError> {
        let tx_id = self.id;
        let (conn, stmt) = self.parts(handle)?;
        stmt.ensure_bindable(values.len())?;
        for (position, value) in values.iter().enumerate() {
            reject_denormalized(position, value)?;
        }
        logged(tx_id, Some(handle.id), "bind", conn.bind(&mut stmt.inner, values))?;
        stmt.mark_bound();
        Ok(())
    }

    /// Run the statement with its bound values; returns the affected row count.
    ///
    /// Executing an Executed or Done statement runs it again.
    ///
    /// # Errors
    /// Returns `SqlConnectorError::ContractViolation` before prepare or while declared parameters
    /// are unbound, or the backend error; the statement state is unchanged on failure.
    pub fn exec_statement(&mut self, handle: StatementHandle) -> Result<u64, SqlConnectorError> {
        let tx_id = self.id;
        let (conn, stmt) = self.parts(handle)?;
        stmt.ensure_executable()?;
        let affected = logged(tx_id, Some(handle.id), "execute", conn.execute(&mut stmt.inner))?;
        stmt.mark_executed();
        debug!(
            transaction_id = %tx_id,
            statement_id = %handle.id,
            affected,
            executions = stmt.executions(),
            "statement executed"
        );
        Ok(affected)
    }

    /// Read the next row into `sink`; `false` once the result set is exhausted.
    ///
    /// A Prepared statement is executed first. Columns without a matching field are skipped.
    ///
    /// # Errors
    /// Returns `SqlConnectorError::ConsistencyError` when NULL arrives for a required field,
    /// `SqlConnectorError::ParameterError` when a column cannot become its field's tag, or any
    /// error from the implicit execute.
    pub fn fetch_next<S>(
        &mut self,
        handle: StatementHandle,
        sink: &mut S,
    ) -> Result<bool, SqlConnectorError>
    where
        S: RowSink + ?Sized,
    {
        let tx_id = self.id;
        let (conn, stmt) = self.parts(handle)?;
        stmt.ensure_executable()?;
        match stmt.state() {
            StatementState::Done => return Ok(false),
            StatementState::Prepared => {
                logged(tx_id, Some(handle.id), "execute", conn.execute(&mut stmt.inner))?;
                stmt.mark_executed();
            }
            _ => {}
        }

        let Some(row) = conn.fetch_row(&mut stmt.inner) else {
            stmt.mark_done();
            return Ok(false);
        };
        if stmt.columns().is_none() {
            let columns = conn.columns(&stmt.inner);
            stmt.cache_columns(columns);
        }

        for (index, column) in stmt.columns().unwrap_or_default().iter().enumerate() {
            let Some(field) = sink.field(&column.name) else {
                debug!(
                    transaction_id = %tx_id,
                    statement_id = %handle.id,
                    column = %column.name,
                    "column has no matching field; skipped"
                );
                continue;
            };
            require_scalar_field(&column.name, field.tag())?;
            let value = logged(
                tx_id,
                Some(handle.id),
                "fetch",
                conn.decode(&row, index, &field),
            )?;
            if value.is_none() && !field.nullable() {
                return Err(SqlConnectorError::ConsistencyError(format!(
                    "required field received NULL: {} (column {})",
                    field.name(),
                    column.name
                )));
            }
            sink.write(&field, value)?;
        }
        Ok(true)
    }

    /// Write the backend's last insert id into the sink's primary-key field.
    ///
    /// Returns `false` without touching the sink when it declares no primary key or the
    /// session has not inserted anything.
    ///
    /// # Errors
    /// Returns `SqlConnectorError::ParameterError` if the id does not fit the key's tag.
    pub fn get_last_insert_id<S>(
        &mut self,
        handle: StatementHandle,
        sink: &mut S,
    ) -> Result<bool, SqlConnectorError>
    where
        S: RowSink + ?Sized,
    {
        let tx_id = self.id;
        let (conn, stmt) = self.parts(handle)?;
        let Some(key) = sink.primary_key() else {
            return Ok(false);
        };
        let Some(id) = logged(
            tx_id,
            Some(handle.id),
            "last_insert_id",
            conn.last_insert_id(&stmt.inner),
        )?
        else {
            return Ok(false);
        };
        let value = integer_into_tag(id, key.tag())?;
        sink.write(&key, Some(value))?;
        Ok(true)
    }

    /// Release the statement's backend resources and deregister it.
    ///
    /// # Errors
    /// Returns `SqlConnectorError::ContractViolation` if the handle is not registered here.
    pub fn close_statement(&mut self, handle: StatementHandle) -> Result<(), SqlConnectorError> {
        self.check_owner(handle)?;
        let stmt = self.statements.remove(&handle.id).ok_or_else(|| {
            SqlConnectorError::contract(format!("statement {} is not registered", handle.id))
        })?;
        let conn = self.conn_mut()?;
        conn.release(stmt.inner);
        debug!(transaction_id = %self.id, statement_id = %handle.id, "statement closed");
        Ok(())
    }

    /// # Errors
    /// Returns `SqlConnectorError::ContractViolation` if the handle is not registered here.
    pub fn statement_info(&self, handle: StatementHandle) -> Result<StatementInfo, SqlConnectorError> {
        self.check_owner(handle)?;
        self.statements
            .get(&handle.id)
            .map(Statement::info)
            .ok_or_else(|| {
                SqlConnectorError::contract(format!("statement {} is not registered", handle.id))
            })
    }

    /// Drop statements, roll back if begun, and return the connection to its pool.
    pub(crate) fn finish(&mut self) {
        let Some(mut pooled) = self.conn.take() else {
            return;
        };
        if !self.statements.is_empty() {
            warn!(
                transaction_id = %self.id,
                open_statements = self.statements.len(),
                "closing transaction with open statements"
            );
        }
        for (_, stmt) in self.statements.drain() {
            pooled.conn.release(stmt.inner);
        }
        if self.begun {
            match pooled.conn.rollback() {
                Ok(()) => debug!(transaction_id = %self.id, "rolled back unfinished transaction"),
                Err(err) => warn!(
                    transaction_id = %self.id,
                    error = %err,
                    "rollback of unfinished transaction failed"
                ),
            }
            self.begun = false;
        }
        self.shared.release(self.id, pooled);
    }
}

impl<B: Backend> Drop for Transaction<B> {
    fn drop(&mut self) {
        if self.conn.is_some() {
            warn!(
                transaction_id = %self.id,
                "transaction dropped without close_transaction; releasing its connection"
            );
            self.finish();
        }
    }
}

impl<B: Backend> fmt::Debug for Transaction<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("connection_id", &self.connection_id)
            .field("open_statements", &self.statements.len())
            .field("begun", &self.begun)
            .finish_non_exhaustive()
    }
}
