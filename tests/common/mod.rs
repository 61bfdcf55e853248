#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use sql_connector::prelude::*;
use sql_connector::sqlite::{SqliteBackend, SqliteConnection};
use sql_connector::Backend;
use tempfile::tempdir;

pub fn unique_db_path(prefix: &str) -> String {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join(format!("{prefix}.db"));
    // Leak the tempdir so the file persists for the duration of the test binary.
    std::mem::forget(dir);
    path.to_string_lossy().into_owned()
}

pub fn sqlite_connector(prefix: &str, size: u32) -> Connector<SqliteBackend> {
    Connector::new(
        SqliteBackend::new(unique_db_path(prefix)),
        PoolSize::new(size).expect("pool size"),
    )
}

/// Counts opens and closes, and fails the open numbered `fail_on` (1-based) if set.
#[derive(Debug, Default)]
pub struct OpenLog {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
}

impl OpenLog {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct FlakyBackend {
    inner: SqliteBackend,
    fail_on: Option<usize>,
    pub log: Arc<OpenLog>,
}

impl FlakyBackend {
    pub fn new(prefix: &str, fail_on: Option<usize>) -> Self {
        Self {
            inner: SqliteBackend::new(unique_db_path(prefix)),
            fail_on,
            log: Arc::new(OpenLog::default()),
        }
    }
}

impl Backend for FlakyBackend {
    type Connection = SqliteConnection;

    fn database_type(&self) -> DatabaseType {
        DatabaseType::Sqlite
    }

    fn open(&self) -> Result<SqliteConnection, SqlConnectorError> {
        let attempt = self.log.opens.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on == Some(attempt) {
            return Err(SqlConnectorError::ConnectionError(format!(
                "refusing open {attempt}"
            )));
        }
        self.inner.open()
    }

    fn close(&self, conn: SqliteConnection) -> Result<(), SqlConnectorError> {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close(conn)
    }
}

/// Row sink used across the sqlite tests.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub note: Option<String>,
}

impl_row_sink!(Item { id, name, note }, primary_key = id);

pub fn seed_items(tx: &mut Transaction<SqliteBackend>) -> Result<(), SqlConnectorError> {
    tx.execute_batch(
        "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL, note TEXT);
         INSERT INTO items (id, name, note) VALUES (42, 'answer', NULL);
         INSERT INTO items (id, name, note) VALUES (7, 'seven', 'lucky');",
    )
}
