use std::collections::VecDeque;

use rusqlite::types::Value as SqlValue;
use tracing::debug;

use crate::backend::{Backend, BackendConnection, ColumnMeta};
use crate::error::SqlConnectorError;
use crate::reflect::FieldDescriptor;
use crate::translation::{PlaceholderStyle, translate_placeholders};
use crate::types::{DatabaseType, StatementKind, Value};

use super::config::SqliteOptions;
use super::params::convert_params;
use super::query::sqlite_to_value;

/// Opens `rusqlite` connections to one database file.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    path: String,
    options: SqliteOptions,
}

impl SqliteBackend {
    /// A backend for `path` with default options. `:memory:` gives every pooled connection its
    /// own private database, so pair it with a pool size of 1.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let options = SqliteOptions::for_path(&path);
        Self { path, options }
    }

    #[must_use]
    pub fn with_options(path: impl Into<String>, options: SqliteOptions) -> Self {
        Self {
            path: path.into(),
            options,
        }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn options(&self) -> &SqliteOptions {
        &self.options
    }
}

impl Backend for SqliteBackend {
    type Connection = SqliteConnection;

    fn database_type(&self) -> DatabaseType {
        DatabaseType::Sqlite
    }

    fn open(&self) -> Result<SqliteConnection, SqlConnectorError> {
        let connect_err = |e: rusqlite::Error| {
            SqlConnectorError::ConnectionError(format!("sqlite open {}: {e}", self.path))
        };
        let conn = rusqlite::Connection::open(&self.path).map_err(connect_err)?;
        conn.busy_timeout(self.options.busy_timeout)
            .map_err(connect_err)?;
        if let Some(mode) = &self.options.journal_mode {
            // `mode` comes from a fixed list, so it is safe to splice into the pragma.
            let applied: String = conn
                .query_row(&format!("PRAGMA journal_mode = {mode}"), [], |row| row.get(0))
                .map_err(connect_err)?;
            debug!(path = %self.path, requested = %mode, applied = %applied, "sqlite journal mode set");
        }
        if self.options.foreign_keys {
            conn.execute_batch("PRAGMA foreign_keys = ON")
                .map_err(connect_err)?;
        }
        Ok(SqliteConnection {
            conn,
            translate_placeholders: self.options.translate_placeholders,
        })
    }

    fn close(&self, conn: SqliteConnection) -> Result<(), SqlConnectorError> {
        conn.conn
            .close()
            .map_err(|(_, e)| SqlConnectorError::backend("sqlite close", e))
    }
}

/// One `rusqlite` session.
pub struct SqliteConnection {
    conn: rusqlite::Connection,
    translate_placeholders: bool,
}

/// Statement state kept between calls; compiled statements live in the connection's cache.
#[derive(Debug)]
pub struct SqliteStatement {
    kind: StatementKind,
    sql: String,
    params: Vec<SqlValue>,
    param_count: usize,
    columns: Vec<ColumnMeta>,
    rows: VecDeque<Vec<SqlValue>>,
    last_insert_id: Option<i64>,
}

impl SqliteConnection {
    fn run(&self, stmt: &mut SqliteStatement) -> Result<u64, rusqlite::Error> {
        let mut compiled = self.conn.prepare_cached(&stmt.sql)?;
        for (idx, value) in stmt.params.iter().enumerate() {
            compiled.raw_bind_parameter(idx + 1, value)?;
        }

        // Buffered rows are replaced only once the whole result has been stepped.
        let column_count = compiled.column_count();
        let affected = if column_count > 0 {
            let mut buffered = VecDeque::new();
            let mut rows = compiled.raw_query();
            while let Some(row) = rows.next()? {
                let mut cells = Vec::with_capacity(column_count);
                for idx in 0..column_count {
                    cells.push(row.get::<_, SqlValue>(idx)?);
                }
                buffered.push_back(cells);
            }
            let produced = buffered.len();
            stmt.rows = buffered;
            produced
        } else {
            let affected = compiled.raw_execute()?;
            stmt.rows.clear();
            affected
        };
        Ok(u64::try_from(affected).unwrap_or(u64::MAX))
    }
}

impl BackendConnection for SqliteConnection {
    type Statement = SqliteStatement;
    type Row = Vec<SqlValue>;

    fn begin(&mut self) -> Result<(), SqlConnectorError> {
        self.conn
            .execute_batch("BEGIN")
            .map_err(|e| SqlConnectorError::backend("sqlite begin", e))
    }

    fn commit(&mut self) -> Result<(), SqlConnectorError> {
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| SqlConnectorError::backend("sqlite commit", e))
    }

    fn rollback(&mut self) -> Result<(), SqlConnectorError> {
        self.conn
            .execute_batch("ROLLBACK")
            .map_err(|e| SqlConnectorError::backend("sqlite rollback", e))
    }

    fn execute_batch(&mut self, sql: &str) -> Result<(), SqlConnectorError> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| SqlConnectorError::backend("sqlite execute_batch", e))
    }

    fn allocate(
        &mut self,
        kind: StatementKind,
        sql: &str,
    ) -> Result<SqliteStatement, SqlConnectorError> {
        if sql.trim().is_empty() {
            return Err(SqlConnectorError::backend(
                "sqlite allocate",
                "empty query text",
            ));
        }
        let sql = translate_placeholders(sql, PlaceholderStyle::Sqlite, self.translate_placeholders);
        Ok(SqliteStatement {
            kind,
            sql: sql.into_owned(),
            params: Vec::new(),
            param_count: 0,
            columns: Vec::new(),
            rows: VecDeque::new(),
            last_insert_id: None,
        })
    }

    fn prepare(&mut self, stmt: &mut SqliteStatement) -> Result<usize, SqlConnectorError> {
        let compiled = self
            .conn
            .prepare_cached(&stmt.sql)
            .map_err(|e| SqlConnectorError::backend("sqlite prepare", e))?;
        stmt.param_count = compiled.parameter_count();
        stmt.columns = compiled
            .columns()
            .iter()
            .map(|col| ColumnMeta::new(col.name(), col.decl_type().map(str::to_owned)))
            .collect();
        stmt.params.clear();
        stmt.rows.clear();
        Ok(stmt.param_count)
    }

    fn bind(&mut self, stmt: &mut SqliteStatement, values: &[Value]) -> Result<(), SqlConnectorError> {
        stmt.params = convert_params(values)?;
        Ok(())
    }

    fn execute(&mut self, stmt: &mut SqliteStatement) -> Result<u64, SqlConnectorError> {
        let affected = self
            .run(stmt)
            .map_err(|e| SqlConnectorError::backend("sqlite execute", e))?;
        // The rowid is per-session, so only inserts take a fresh reading.
        if stmt.kind == StatementKind::Insert {
            let rowid = self.conn.last_insert_rowid();
            stmt.last_insert_id = (rowid != 0).then_some(rowid);
        }
        Ok(affected)
    }

    fn columns(&self, stmt: &SqliteStatement) -> Vec<ColumnMeta> {
        stmt.columns.clone()
    }

    fn fetch_row(&mut self, stmt: &mut SqliteStatement) -> Option<Vec<SqlValue>> {
        stmt.rows.pop_front()
    }

    fn decode(
        &self,
        row: &Vec<SqlValue>,
        index: usize,
        field: &FieldDescriptor,
    ) -> Result<Option<Value>, SqlConnectorError> {
        let cell = row.get(index).ok_or_else(|| {
            SqlConnectorError::ParameterError(format!(
                "row has {} column(s); index {index} is out of range",
                row.len()
            ))
        })?;
        sqlite_to_value(field.name(), cell, field)
    }

    fn last_insert_id(&mut self, stmt: &SqliteStatement) -> Result<Option<i64>, SqlConnectorError> {
        Ok(stmt.last_insert_id)
    }

    fn release(&mut self, stmt: SqliteStatement) {
        if !stmt.rows.is_empty() {
            debug!(buffered = stmt.rows.len(), "discarding unread sqlite rows");
        }
    }
}
