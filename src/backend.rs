//! The seam between orchestration and a concrete database driver.
//!
//! A [`Backend`] opens and closes sessions; a [`BackendConnection`] is one session and
//! drives statements through allocate, prepare, bind, execute and fetch. Connectors and
//! transactions are generic over these traits, so each driver keeps its handle types private.

use crate::error::SqlConnectorError;
use crate::reflect::FieldDescriptor;
use crate::types::{DatabaseType, StatementKind, Value};

/// Column name and declared type as reported by the backend after prepare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    pub decl_type: Option<String>,
}

impl ColumnMeta {
    #[must_use]
    pub fn new(name: impl Into<String>, decl_type: Option<String>) -> Self {
        Self {
            name: name.into(),
            decl_type,
        }
    }
}

/// A database driver that opens sessions against one configured target.
pub trait Backend: Send + Sync + 'static {
    type Connection: BackendConnection;

    fn database_type(&self) -> DatabaseType;

    /// # Errors
    /// Returns `SqlConnectorError::ConnectionError` when the session cannot be established.
    fn open(&self) -> Result<Self::Connection, SqlConnectorError>;

    /// # Errors
    /// Returns the backend's error if the session does not close cleanly.
    fn close(&self, conn: Self::Connection) -> Result<(), SqlConnectorError>;
}

/// One live backend session.
pub trait BackendConnection: Send + 'static {
    type Statement: Send;
    type Row;

    /// # Errors
    /// Returns `SqlConnectorError::ExecutionError` carrying the backend text.
    fn begin(&mut self) -> Result<(), SqlConnectorError>;

    /// # Errors
    /// Returns `SqlConnectorError::ExecutionError` carrying the backend text.
    fn commit(&mut self) -> Result<(), SqlConnectorError>;

    /// # Errors
    /// Returns `SqlConnectorError::ExecutionError` carrying the backend text.
    fn rollback(&mut self) -> Result<(), SqlConnectorError>;

    /// Run parameterless SQL, possibly several statements.
    ///
    /// # Errors
    /// Returns `SqlConnectorError::ExecutionError` carrying the backend text.
    fn execute_batch(&mut self, sql: &str) -> Result<(), SqlConnectorError>;

    /// Allocate a statement handle for `sql`. Nothing is compiled yet.
    ///
    /// # Errors
    /// Returns `SqlConnectorError::ExecutionError` when the handle cannot be allocated.
    fn allocate(
        &mut self,
        kind: StatementKind,
        sql: &str,
    ) -> Result<Self::Statement, SqlConnectorError>;

    /// Compile the statement; returns the placeholder count the backend declares.
    ///
    /// # Errors
    /// Returns `SqlConnectorError::ExecutionError` on syntax or backend rejection.
    fn prepare(&mut self, stmt: &mut Self::Statement) -> Result<usize, SqlConnectorError>;

    /// Convert `values` to wire types and store them on the statement.
    ///
    /// # Errors
    /// Returns `SqlConnectorError::ParameterError` when a value cannot be represented.
    fn bind(&mut self, stmt: &mut Self::Statement, values: &[Value])
    -> Result<(), SqlConnectorError>;

    /// Run with the bound values; returns affected rows (produced rows for selects).
    ///
    /// # Errors
    /// Returns `SqlConnectorError::ExecutionError` carrying the backend text.
    fn execute(&mut self, stmt: &mut Self::Statement) -> Result<u64, SqlConnectorError>;

    fn columns(&self, stmt: &Self::Statement) -> Vec<ColumnMeta>;

    /// Advance to the next buffered row.
    fn fetch_row(&mut self, stmt: &mut Self::Statement) -> Option<Self::Row>;

    /// Marshal column `index` of `row` into `field`'s tag; `None` is SQL NULL.
    ///
    /// # Errors
    /// Returns `SqlConnectorError::ParameterError` when the column cannot become that tag.
    fn decode(
        &self,
        row: &Self::Row,
        index: usize,
        field: &FieldDescriptor,
    ) -> Result<Option<Value>, SqlConnectorError>;

    /// The id generated by the most recent insert on this session, if any.
    ///
    /// # Errors
    /// Returns `SqlConnectorError::ExecutionError` if the backend query for it fails.
    fn last_insert_id(&mut self, stmt: &Self::Statement) -> Result<Option<i64>, SqlConnectorError>;

    /// Free backend resources held by the statement.
    fn release(&mut self, stmt: Self::Statement);
}
