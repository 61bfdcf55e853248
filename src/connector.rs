//! Connection pooling and transaction borrowing.
//!
//! A [`Connector`] opens a fixed number of backend sessions on [`Connector::connect`] and lends
//! each to at most one [`Transaction`] at a time. Borrowers block on a condition variable until a
//! session is returned or the connector is disconnected.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::backend::Backend;
use crate::config::PoolSize;
use crate::error::SqlConnectorError;
use crate::transaction::{Transaction, TransactionId, TransactionMetadata};
use crate::types::DatabaseType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A backend session tagged with the id the pool tracks it by.
pub(crate) struct Pooled<C> {
    pub(crate) id: ConnectionId,
    pub(crate) conn: C,
}

struct PoolState<C> {
    connected: bool,
    size: PoolSize,
    free: Vec<Pooled<C>>,
    used: HashSet<ConnectionId>,
    next_conn_id: u64,
}

impl<C> PoolState<C> {
    fn next_id(&mut self) -> ConnectionId {
        self.next_conn_id += 1;
        ConnectionId(self.next_conn_id)
    }
}

struct RegisteredTransaction {
    connection_id: ConnectionId,
    started_at: chrono::DateTime<Utc>,
    created: Instant,
}

/// State shared by a connector and every transaction it has lent out.
pub(crate) struct Shared<B: Backend> {
    pub(crate) backend: B,
    pool: Mutex<PoolState<B::Connection>>,
    available: Condvar,
    transactions: Mutex<HashMap<TransactionId, RegisteredTransaction>>,
    next_tx_id: AtomicU64,
}

impl<B: Backend> Shared<B> {
    fn lock_pool(&self) -> MutexGuard<'_, PoolState<B::Connection>> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_registry(&self) -> MutexGuard<'_, HashMap<TransactionId, RegisteredTransaction>> {
        self.transactions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn is_registered(&self, id: TransactionId) -> bool {
        self.lock_registry().contains_key(&id)
    }

    /// Deregister a transaction and hand its connection back to the pool.
    pub(crate) fn release(&self, tx_id: TransactionId, pooled: Pooled<B::Connection>) {
        let deregistered = self.lock_registry().remove(&tx_id).is_some();
        if !deregistered {
            warn!(transaction_id = %tx_id, "releasing a transaction that was not registered");
        }

        let mut pool = self.lock_pool();
        pool.used.remove(&pooled.id);
        if pool.connected {
            debug!(
                transaction_id = %tx_id,
                connection_id = %pooled.id,
                free = pool.free.len() + 1,
                "connection returned to pool"
            );
            pool.free.push(pooled);
            drop(pool);
            self.available.notify_all();
        } else {
            drop(pool);
            let id = pooled.id;
            if let Err(err) = self.backend.close(pooled.conn) {
                warn!(connection_id = %id, error = %err, "closing orphaned connection failed");
            }
        }
    }
}

/// Point-in-time view of a connector's pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub connected: bool,
    pub size: PoolSize,
    pub free: usize,
    pub used: usize,
    pub open_transactions: usize,
}

/// A bounded pool of connections to one database target.
///
/// Share it across threads behind an `Arc`. Dropping the last handle disconnects, unless
/// transactions are still open.
///
/// ```rust,no_run
/// use sql_connector::prelude::*;
/// use sql_connector::sqlite::SqliteBackend;
///
/// # fn demo() -> Result<(), SqlConnectorError> {
/// let connector = Connector::new(SqliteBackend::new("app.db"), PoolSize::new(2)?);
/// connector.connect()?;
/// let mut tx = connector.create_transaction()?;
/// tx.execute_batch("CREATE TABLE IF NOT EXISTS t (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")?;
/// connector.close_transaction(tx)?;
/// connector.disconnect()?;
/// # Ok(())
/// # }
/// ```
pub struct Connector<B: Backend> {
    shared: Arc<Shared<B>>,
}

impl<B: Backend> Connector<B> {
    #[must_use]
    pub fn new(backend: B, size: PoolSize) -> Self {
        Self {
            shared: Arc::new(Shared {
                backend,
                pool: Mutex::new(PoolState {
                    connected: false,
                    size,
                    free: Vec::new(),
                    used: HashSet::new(),
                    next_conn_id: 0,
                }),
                available: Condvar::new(),
                transactions: Mutex::new(HashMap::new()),
                next_tx_id: AtomicU64::new(1),
            }),
        }
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.shared.backend
    }

    #[must_use]
    pub fn database_type(&self) -> DatabaseType {
        self.shared.backend.database_type()
    }

    /// Open every pooled connection. Calling it while connected does nothing.
    ///
    /// # Errors
    /// Returns `SqlConnectorError::ConnectionError` if any connection fails to open; the ones
    /// already opened in this attempt are closed first.
    pub fn connect(&self) -> Result<(), SqlConnectorError> {
        let mut pool = self.shared.lock_pool();
        if pool.connected {
            debug!("connect called on a connected pool");
            return Ok(());
        }

        let size = pool.size.as_usize();
        let mut opened: Vec<Pooled<B::Connection>> = Vec::with_capacity(size);
        for attempt in 1..=size {
            match self.shared.backend.open() {
                Ok(conn) => {
                    let id = pool.next_id();
                    opened.push(Pooled { id, conn });
                }
                Err(err) => {
                    error!(
                        attempt,
                        size,
                        error = %err,
                        "opening pooled connection failed; unwinding"
                    );
                    for pooled in opened {
                        if let Err(close_err) = self.shared.backend.close(pooled.conn) {
                            warn!(
                                connection_id = %pooled.id,
                                error = %close_err,
                                "closing connection during unwind failed"
                            );
                        }
                    }
                    return Err(SqlConnectorError::ConnectionError(format!(
                        "opening connection {attempt} of {size} failed: {err}"
                    )));
                }
            }
        }

        pool.free = opened;
        pool.used.clear();
        pool.connected = true;
        info!(
            database_type = %self.shared.backend.database_type(),
            size,
            "connector connected"
        );
        Ok(())
    }

    /// Close every pooled connection and wake blocked borrowers.
    ///
    /// # Errors
    /// Returns `SqlConnectorError::TransactionsOpen` while any transaction is still open.
    pub fn disconnect(&self) -> Result<(), SqlConnectorError> {
        let registry = self.shared.lock_registry();
        let mut pool = self.shared.lock_pool();
        if !pool.connected {
            return Ok(());
        }

        // A borrower may hold a connection it has not registered yet.
        let open = registry.len().max(pool.used.len());
        if open > 0 {
            warn!(open_transactions = open, "disconnect refused: transactions still open");
            return Err(SqlConnectorError::TransactionsOpen { count: open });
        }

        let free = std::mem::take(&mut pool.free);
        pool.connected = false;
        drop(pool);
        drop(registry);
        self.shared.available.notify_all();

        let closing = free.len();
        for pooled in free {
            if let Err(err) = self.shared.backend.close(pooled.conn) {
                warn!(connection_id = %pooled.id, error = %err, "closing connection failed");
            }
        }
        info!(closed = closing, "connector disconnected");
        Ok(())
    }

    /// Change the pool size used by the next [`connect`](Self::connect).
    ///
    /// # Errors
    /// Returns `SqlConnectorError::ConfigError` if `n` is outside `[1, 10]`, or
    /// `SqlConnectorError::ContractViolation` while connected.
    pub fn set_pool_size(&self, n: u32) -> Result<(), SqlConnectorError> {
        let size = PoolSize::new(n)?;
        let mut pool = self.shared.lock_pool();
        if pool.connected {
            return Err(SqlConnectorError::contract(
                "pool size cannot change while connected",
            ));
        }
        pool.size = size;
        Ok(())
    }

    #[must_use]
    pub fn pool_size(&self) -> PoolSize {
        self.shared.lock_pool().size
    }

    /// Borrow a connection, blocking until one is free.
    ///
    /// # Errors
    /// Returns `SqlConnectorError::ContractViolation` if the connector is not connected, or is
    /// disconnected while waiting.
    pub fn create_transaction(&self) -> Result<Transaction<B>, SqlConnectorError> {
        let pooled = self.checkout(None)?;
        Ok(self.register(pooled))
    }

    /// Like [`create_transaction`](Self::create_transaction), but gives up after `timeout`.
    ///
    /// # Errors
    /// Returns `SqlConnectorError::Timeout` if no connection frees up in time.
    pub fn create_transaction_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Transaction<B>, SqlConnectorError> {
        let pooled = self.checkout(Some(timeout))?;
        Ok(self.register(pooled))
    }

    fn checkout(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Pooled<B::Connection>, SqlConnectorError> {
        let pool = self.shared.lock_pool();
        if !pool.connected {
            return Err(SqlConnectorError::contract(
                "create_transaction called on a disconnected connector",
            ));
        }

        let waiting = |state: &mut PoolState<B::Connection>| state.connected && state.free.is_empty();
        let mut pool = match timeout {
            None => self
                .shared
                .available
                .wait_while(pool, waiting)
                .unwrap_or_else(PoisonError::into_inner),
            Some(timeout) => {
                let (pool, result) = self
                    .shared
                    .available
                    .wait_timeout_while(pool, timeout, waiting)
                    .unwrap_or_else(PoisonError::into_inner);
                if result.timed_out() && pool.connected && pool.free.is_empty() {
                    debug!(?timeout, "no connection freed in time");
                    return Err(SqlConnectorError::Timeout(format!(
                        "no connection became free within {timeout:?}"
                    )));
                }
                pool
            }
        };

        if !pool.connected {
            return Err(SqlConnectorError::contract(
                "connector was disconnected while waiting for a connection",
            ));
        }
        let pooled = pool.free.pop().ok_or_else(|| {
            SqlConnectorError::contract("woke with no free connection available")
        })?;
        pool.used.insert(pooled.id);
        Ok(pooled)
    }

    fn register(&self, pooled: Pooled<B::Connection>) -> Transaction<B> {
        let id = TransactionId(self.shared.next_tx_id.fetch_add(1, Ordering::Relaxed));
        self.shared.lock_registry().insert(
            id,
            RegisteredTransaction {
                connection_id: pooled.id,
                started_at: Utc::now(),
                created: Instant::now(),
            },
        );
        debug!(transaction_id = %id, connection_id = %pooled.id, "transaction created");
        Transaction::new(id, Arc::clone(&self.shared), pooled)
    }

    /// End a transaction: roll back if still open, drop its statements, return its connection.
    ///
    /// A transaction from another connector is refused; it is released to its own connector when
    /// dropped.
    ///
    /// # Errors
    /// Returns `SqlConnectorError::ContractViolation` if `tx` was not created by this connector.
    pub fn close_transaction(&self, mut tx: Transaction<B>) -> Result<(), SqlConnectorError> {
        let id = tx.id();
        if !Arc::ptr_eq(&self.shared, tx.shared()) || !self.shared.is_registered(id) {
            warn!(transaction_id = %id, "close_transaction on a transaction this connector does not own");
            return Err(SqlConnectorError::contract(format!(
                "transaction {id} is not registered with this connector"
            )));
        }
        tx.finish();
        Ok(())
    }

    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let registry = self.shared.lock_registry();
        let pool = self.shared.lock_pool();
        PoolStatus {
            connected: pool.connected,
            size: pool.size,
            free: pool.free.len(),
            used: pool.used.len(),
            open_transactions: registry.len(),
        }
    }

    /// Metadata for every open transaction, oldest first.
    #[must_use]
    pub fn list_transactions(&self) -> Vec<TransactionMetadata> {
        let registry = self.shared.lock_registry();
        let mut out: Vec<TransactionMetadata> = registry
            .iter()
            .map(|(id, entry)| TransactionMetadata {
                transaction_id: *id,
                connection_id: entry.connection_id,
                started_at: entry.started_at,
                duration: entry.created.elapsed(),
            })
            .collect();
        out.sort_by_key(|meta| meta.transaction_id);
        out
    }
}

impl<B: Backend> Drop for Connector<B> {
    fn drop(&mut self) {
        if let Err(err) = self.disconnect() {
            warn!(error = %err, "connector dropped with open transactions; connections stay lent");
        }
    }
}

impl<B: Backend> fmt::Debug for Connector<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("database_type", &self.database_type())
            .field("status", &self.status())
            .finish()
    }
}
