//! Runtime backend selection from a [`ConnectorConfig`].

use crate::backend::{Backend, BackendConnection, ColumnMeta};
use crate::config::ConnectorConfig;
use crate::connector::Connector;
use crate::error::SqlConnectorError;
use crate::reflect::FieldDescriptor;
use crate::types::{DatabaseType, StatementKind, Value};

#[cfg(feature = "postgres")]
use crate::postgres::{PgStatement, PostgresBackend, PostgresConnection};
#[cfg(feature = "sqlite")]
use crate::sqlite::{SqliteBackend, SqliteConnection, SqliteStatement};

macro_rules! dispatch {
    ($conn:expr, $c:ident => $body:expr) => {
        match $conn {
            #[cfg(feature = "sqlite")]
            AnyConnection::Sqlite($c) => $body,
            #[cfg(feature = "postgres")]
            AnyConnection::Postgres($c) => $body,
        }
    };
}

macro_rules! dispatch_pair {
    ($conn:expr, $other:expr, $other_ty:ident, ($c:ident, $o:ident) => $body:expr) => {
        match ($conn, $other) {
            #[cfg(feature = "sqlite")]
            (AnyConnection::Sqlite($c), $other_ty::Sqlite($o)) => $body,
            #[cfg(feature = "postgres")]
            (AnyConnection::Postgres($c), $other_ty::Postgres($o)) => $body,
            #[allow(unreachable_patterns)]
            _ => Err(backend_mismatch()),
        }
    };
}

fn backend_mismatch() -> SqlConnectorError {
    SqlConnectorError::contract("statement was allocated by a different backend")
}

#[cfg(not(all(feature = "sqlite", feature = "postgres")))]
fn feature_disabled(db_type: DatabaseType) -> SqlConnectorError {
    SqlConnectorError::Unimplemented(format!(
        "{db_type} support is not enabled; rebuild with the `{db_type}` feature"
    ))
}

/// A backend chosen at runtime.
#[derive(Debug, Clone)]
pub enum AnyBackend {
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteBackend),
    #[cfg(feature = "postgres")]
    Postgres(PostgresBackend),
}

impl AnyBackend {
    /// # Errors
    /// Returns `SqlConnectorError::ConfigError` for invalid targets, or
    /// `SqlConnectorError::Unimplemented` when the backend's feature is disabled.
    pub fn from_config(config: &ConnectorConfig) -> Result<Self, SqlConnectorError> {
        match config.db_type {
            #[cfg(feature = "sqlite")]
            DatabaseType::Sqlite => Ok(AnyBackend::Sqlite(SqliteBackend::from_target(
                &config.target,
            )?)),
            #[cfg(feature = "postgres")]
            DatabaseType::Postgres => Ok(AnyBackend::Postgres(PostgresBackend::from_target(
                &config.target,
            )?)),
            #[cfg(not(all(feature = "sqlite", feature = "postgres")))]
            other => Err(feature_disabled(other)),
        }
    }
}

impl Connector<AnyBackend> {
    /// Build an unconnected connector for whichever backend `config` names.
    ///
    /// ```rust
    /// use sql_connector::prelude::*;
    ///
    /// let config = ConnectorConfig::builder(DatabaseType::Sqlite)
    ///     .database(":memory:")
    ///     .pool_size(1)
    ///     .build()
    ///     .unwrap();
    /// let connector = Connector::<AnyBackend>::from_config(&config).unwrap();
    /// assert_eq!(connector.database_type(), DatabaseType::Sqlite);
    /// assert!(!connector.status().connected);
    /// ```
    ///
    /// # Errors
    /// Returns the errors of [`AnyBackend::from_config`].
    pub fn from_config(config: &ConnectorConfig) -> Result<Self, SqlConnectorError> {
        Ok(Connector::new(
            AnyBackend::from_config(config)?,
            config.pool_size,
        ))
    }
}

impl Backend for AnyBackend {
    type Connection = AnyConnection;

    fn database_type(&self) -> DatabaseType {
        match self {
            #[cfg(feature = "sqlite")]
            AnyBackend::Sqlite(_) => DatabaseType::Sqlite,
            #[cfg(feature = "postgres")]
            AnyBackend::Postgres(_) => DatabaseType::Postgres,
        }
    }

    fn open(&self) -> Result<AnyConnection, SqlConnectorError> {
        match self {
            #[cfg(feature = "sqlite")]
            AnyBackend::Sqlite(b) => b.open().map(AnyConnection::Sqlite),
            #[cfg(feature = "postgres")]
            AnyBackend::Postgres(b) => b.open().map(AnyConnection::Postgres),
        }
    }

    fn close(&self, conn: AnyConnection) -> Result<(), SqlConnectorError> {
        match (self, conn) {
            #[cfg(feature = "sqlite")]
            (AnyBackend::Sqlite(b), AnyConnection::Sqlite(c)) => b.close(c),
            #[cfg(feature = "postgres")]
            (AnyBackend::Postgres(b), AnyConnection::Postgres(c)) => b.close(c),
            #[allow(unreachable_patterns)]
            _ => Err(SqlConnectorError::contract(
                "connection was opened by a different backend",
            )),
        }
    }
}

pub enum AnyConnection {
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteConnection),
    #[cfg(feature = "postgres")]
    Postgres(PostgresConnection),
}

#[derive(Debug)]
pub enum AnyStatement {
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteStatement),
    #[cfg(feature = "postgres")]
    Postgres(PgStatement),
}

pub enum AnyRow {
    #[cfg(feature = "sqlite")]
    Sqlite(<SqliteConnection as BackendConnection>::Row),
    #[cfg(feature = "postgres")]
    Postgres(<PostgresConnection as BackendConnection>::Row),
}

impl BackendConnection for AnyConnection {
    type Statement = AnyStatement;
    type Row = AnyRow;

    fn begin(&mut self) -> Result<(), SqlConnectorError> {
        dispatch!(self, c => c.begin())
    }

    fn commit(&mut self) -> Result<(), SqlConnectorError> {
        dispatch!(self, c => c.commit())
    }

    fn rollback(&mut self) -> Result<(), SqlConnectorError> {
        dispatch!(self, c => c.rollback())
    }

    fn execute_batch(&mut self, sql: &str) -> Result<(), SqlConnectorError> {
        dispatch!(self, c => c.execute_batch(sql))
    }

    fn allocate(
        &mut self,
        kind: StatementKind,
        sql: &str,
    ) -> Result<AnyStatement, SqlConnectorError> {
        match self {
            #[cfg(feature = "sqlite")]
            AnyConnection::Sqlite(c) => c.allocate(kind, sql).map(AnyStatement::Sqlite),
            #[cfg(feature = "postgres")]
            AnyConnection::Postgres(c) => c.allocate(kind, sql).map(AnyStatement::Postgres),
        }
    }

    fn prepare(&mut self, stmt: &mut AnyStatement) -> Result<usize, SqlConnectorError> {
        dispatch_pair!(self, stmt, AnyStatement, (c, s) => c.prepare(s))
    }

    fn bind(&mut self, stmt: &mut AnyStatement, values: &[Value]) -> Result<(), SqlConnectorError> {
        dispatch_pair!(self, stmt, AnyStatement, (c, s) => c.bind(s, values))
    }

    fn execute(&mut self, stmt: &mut AnyStatement) -> Result<u64, SqlConnectorError> {
        dispatch_pair!(self, stmt, AnyStatement, (c, s) => c.execute(s))
    }

    fn columns(&self, stmt: &AnyStatement) -> Vec<ColumnMeta> {
        match (self, stmt) {
            #[cfg(feature = "sqlite")]
            (AnyConnection::Sqlite(c), AnyStatement::Sqlite(s)) => c.columns(s),
            #[cfg(feature = "postgres")]
            (AnyConnection::Postgres(c), AnyStatement::Postgres(s)) => c.columns(s),
            #[allow(unreachable_patterns)]
            _ => Vec::new(),
        }
    }

    fn fetch_row(&mut self, stmt: &mut AnyStatement) -> Option<AnyRow> {
        match (self, stmt) {
            #[cfg(feature = "sqlite")]
            (AnyConnection::Sqlite(c), AnyStatement::Sqlite(s)) => c.fetch_row(s).map(AnyRow::Sqlite),
            #[cfg(feature = "postgres")]
            (AnyConnection::Postgres(c), AnyStatement::Postgres(s)) => {
                c.fetch_row(s).map(AnyRow::Postgres)
            }
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    fn decode(
        &self,
        row: &AnyRow,
        index: usize,
        field: &FieldDescriptor,
    ) -> Result<Option<Value>, SqlConnectorError> {
        dispatch_pair!(self, row, AnyRow, (c, r) => c.decode(r, index, field))
    }

    fn last_insert_id(&mut self, stmt: &AnyStatement) -> Result<Option<i64>, SqlConnectorError> {
        dispatch_pair!(self, stmt, AnyStatement, (c, s) => c.last_insert_id(s))
    }

    fn release(&mut self, stmt: AnyStatement) {
        match (self, stmt) {
            #[cfg(feature = "sqlite")]
            (AnyConnection::Sqlite(c), AnyStatement::Sqlite(s)) => c.release(s),
            #[cfg(feature = "postgres")]
            (AnyConnection::Postgres(c), AnyStatement::Postgres(s)) => c.release(s),
            #[allow(unreachable_patterns)]
            _ => {}
        }
    }
}
