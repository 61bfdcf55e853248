use std::collections::VecDeque;
use std::sync::Arc;

use tokio::runtime::Runtime;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, NoTls, Row, Statement};
use tracing::{debug, error};

use crate::backend::{Backend, BackendConnection, ColumnMeta};
use crate::config::ConnectionTarget;
use crate::error::SqlConnectorError;
use crate::reflect::FieldDescriptor;
use crate::translation::{PlaceholderStyle, translate_placeholders};
use crate::types::{DatabaseType, StatementKind, Value};

use super::config::PostgresOptions;
use super::params::{as_refs, check_params};
use super::query::{read_wire, wire_into_tag};

const LASTVAL_SAVEPOINT: &str = "sql_connector_lastval";

fn lastval_undefined(err: &tokio_postgres::Error) -> bool {
    err.code() == Some(&SqlState::OBJECT_NOT_IN_PREREQUISITE_STATE)
}

/// Opens `tokio-postgres` sessions driven by a private multi-threaded runtime.
///
/// Every call blocks the calling thread until the server answers, so it must not be used from
/// inside another Tokio runtime.
#[derive(Clone)]
pub struct PostgresBackend {
    options: PostgresOptions,
    config: tokio_postgres::Config,
    runtime: Arc<Runtime>,
}

impl std::fmt::Debug for PostgresBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresBackend")
            .field("host", &self.options.host)
            .field("port", &self.options.port)
            .field("dbname", &self.options.dbname)
            .field("translate_placeholders", &self.options.translate_placeholders)
            .finish_non_exhaustive()
    }
}

impl PostgresBackend {
    /// # Errors
    /// Returns `SqlConnectorError::ConnectionError` if the runtime cannot start.
    pub fn new(options: PostgresOptions) -> Result<Self, SqlConnectorError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("sql-connector-pg")
            .enable_all()
            .build()
            .map_err(|e| {
                SqlConnectorError::ConnectionError(format!("failed to start postgres runtime: {e}"))
            })?;
        Ok(Self {
            config: options.to_pg_config(),
            options,
            runtime: Arc::new(runtime),
        })
    }

    /// # Errors
    /// Returns `SqlConnectorError::ConfigError` for an incomplete target, or
    /// `SqlConnectorError::ConnectionError` if the runtime cannot start.
    pub fn from_target(target: &ConnectionTarget) -> Result<Self, SqlConnectorError> {
        Self::new(PostgresOptions::from_target(target)?)
    }

    #[must_use]
    pub fn options(&self) -> &PostgresOptions {
        &self.options
    }
}

impl Backend for PostgresBackend {
    type Connection = PostgresConnection;

    fn database_type(&self) -> DatabaseType {
        DatabaseType::Postgres
    }

    fn open(&self) -> Result<PostgresConnection, SqlConnectorError> {
        let (client, connection) = self
            .runtime
            .block_on(self.config.connect(NoTls))
            .map_err(|e| {
                SqlConnectorError::ConnectionError(format!(
                    "postgres connect to {}:{} failed: {e}",
                    self.options.host, self.options.port
                ))
            })?;
        self.runtime.spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "postgres connection task ended with an error");
            }
        });
        Ok(PostgresConnection {
            client,
            runtime: Arc::clone(&self.runtime),
            translate_placeholders: self.options.translate_placeholders,
            in_transaction: false,
        })
    }

    fn close(&self, conn: PostgresConnection) -> Result<(), SqlConnectorError> {
        // Dropping the client ends the connection task.
        drop(conn);
        Ok(())
    }
}

/// One `tokio-postgres` session.
pub struct PostgresConnection {
    client: Client,
    runtime: Arc<Runtime>,
    translate_placeholders: bool,
    in_transaction: bool,
}

#[derive(Debug)]
pub struct PgStatement {
    sql: String,
    prepared: Option<Statement>,
    params: Vec<Value>,
    rows: VecDeque<Row>,
}

impl PostgresConnection {
    fn simple(&self, operation: &str, sql: &str) -> Result<(), SqlConnectorError> {
        self.runtime
            .block_on(self.client.batch_execute(sql))
            .map_err(|e| SqlConnectorError::backend(operation, e))
    }

    fn compiled<'a>(&self, stmt: &'a PgStatement) -> Result<&'a Statement, SqlConnectorError> {
        stmt.prepared
            .as_ref()
            .ok_or_else(|| SqlConnectorError::contract("postgres statement has not been prepared"))
    }

    fn query_lastval(&self) -> Result<Option<i64>, tokio_postgres::Error> {
        self.runtime
            .block_on(self.client.query_one("SELECT lastval()", &[]))
            .and_then(|row| row.try_get::<_, Option<i64>>(0))
    }
}

impl BackendConnection for PostgresConnection {
    type Statement = PgStatement;
    type Row = Row;

    fn begin(&mut self) -> Result<(), SqlConnectorError> {
        self.simple("postgres begin", "BEGIN")?;
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), SqlConnectorError> {
        let result = self.simple("postgres commit", "COMMIT");
        self.in_transaction = false;
        result
    }

    fn rollback(&mut self) -> Result<(), SqlConnectorError> {
        let result = self.simple("postgres rollback", "ROLLBACK");
        self.in_transaction = false;
        result
    }

    fn execute_batch(&mut self, sql: &str) -> Result<(), SqlConnectorError> {
        self.simple("postgres execute_batch", sql)
    }

    fn allocate(
        &mut self,
        _kind: StatementKind,
        sql: &str,
    ) -> Result<PgStatement, SqlConnectorError> {
        if sql.trim().is_empty() {
            return Err(SqlConnectorError::backend(
                "postgres allocate",
                "empty query text",
            ));
        }
        let sql =
            translate_placeholders(sql, PlaceholderStyle::Postgres, self.translate_placeholders);
        Ok(PgStatement {
            sql: sql.into_owned(),
            prepared: None,
            params: Vec::new(),
            rows: VecDeque::new(),
        })
    }

    fn prepare(&mut self, stmt: &mut PgStatement) -> Result<usize, SqlConnectorError> {
        let prepared = self
            .runtime
            .block_on(self.client.prepare(&stmt.sql))
            .map_err(|e| SqlConnectorError::backend("postgres prepare", e))?;
        let declared = prepared.params().len();
        stmt.prepared = Some(prepared);
        stmt.params.clear();
        stmt.rows.clear();
        Ok(declared)
    }

    fn bind(&mut self, stmt: &mut PgStatement, values: &[Value]) -> Result<(), SqlConnectorError> {
        let compiled = self.compiled(stmt)?;
        check_params(values, compiled.params())?;
        stmt.params = values.to_vec();
        Ok(())
    }

    fn execute(&mut self, stmt: &mut PgStatement) -> Result<u64, SqlConnectorError> {
        let compiled = self.compiled(stmt)?;
        let params = as_refs(&stmt.params);
        if compiled.columns().is_empty() {
            let affected = self
                .runtime
                .block_on(self.client.execute(compiled, &params))
                .map_err(|e| SqlConnectorError::backend("postgres execute", e))?;
            stmt.rows.clear();
            Ok(affected)
        } else {
            let rows = self
                .runtime
                .block_on(self.client.query(compiled, &params))
                .map_err(|e| SqlConnectorError::backend("postgres execute", e))?;
            let produced = u64::try_from(rows.len()).unwrap_or(u64::MAX);
            stmt.rows = rows.into();
            Ok(produced)
        }
    }

    fn columns(&self, stmt: &PgStatement) -> Vec<ColumnMeta> {
        stmt.prepared
            .as_ref()
            .map(|prepared| {
                prepared
                    .columns()
                    .iter()
                    .map(|col| ColumnMeta::new(col.name(), Some(col.type_().name().to_owned())))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn fetch_row(&mut self, stmt: &mut PgStatement) -> Option<Row> {
        stmt.rows.pop_front()
    }

    fn decode(
        &self,
        row: &Row,
        index: usize,
        field: &FieldDescriptor,
    ) -> Result<Option<Value>, SqlConnectorError> {
        let column = row
            .columns()
            .get(index)
            .map_or_else(|| field.name().to_owned(), |c| c.name().to_owned());
        read_wire(row, index)?
            .map(|wire| wire_into_tag(&column, wire, field))
            .transpose()
    }

    fn last_insert_id(&mut self, _stmt: &PgStatement) -> Result<Option<i64>, SqlConnectorError> {
        // lastval() fails when no sequence has been used yet; inside a transaction that failure
        // would abort it, so it runs under a savepoint there.
        if !self.in_transaction {
            return match self.query_lastval() {
                Ok(id) => Ok(id),
                Err(e) if lastval_undefined(&e) => Ok(None),
                Err(e) => Err(SqlConnectorError::backend("postgres last_insert_id", e)),
            };
        }
        self.simple("postgres last_insert_id", &format!("SAVEPOINT {LASTVAL_SAVEPOINT}"))?;
        match self.query_lastval() {
            Ok(id) => {
                self.simple(
                    "postgres last_insert_id",
                    &format!("RELEASE SAVEPOINT {LASTVAL_SAVEPOINT}"),
                )?;
                Ok(id)
            }
            Err(e) => {
                debug!(error = %e, "lastval unavailable in this session");
                let undefined = lastval_undefined(&e);
                self.simple(
                    "postgres last_insert_id",
                    &format!("ROLLBACK TO SAVEPOINT {LASTVAL_SAVEPOINT}"),
                )?;
                if undefined {
                    Ok(None)
                } else {
                    Err(SqlConnectorError::backend("postgres last_insert_id", e))
                }
            }
        }
    }

    fn release(&mut self, stmt: PgStatement) {
        // Dropping the prepared statement queues its Close on the connection task.
        drop(stmt);
    }
}
