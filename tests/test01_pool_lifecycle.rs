#![cfg(feature = "sqlite")]

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use common::{FlakyBackend, sqlite_connector};
use sql_connector::prelude::*;

#[test]
fn connect_opens_every_connection() -> Result<(), Box<dyn std::error::Error>> {
    for size in [1, 10] {
        let connector = sqlite_connector(&format!("size_{size}"), size);
        connector.connect()?;
        let status = connector.status();
        assert!(status.connected);
        assert_eq!(status.free, size as usize);
        assert_eq!(status.used, 0);
        connector.disconnect()?;
        assert!(!connector.status().connected);
    }
    Ok(())
}

#[test]
fn failed_open_unwinds_the_attempt() {
    let backend = FlakyBackend::new("flaky", Some(3));
    let log = Arc::clone(&backend.log);
    let connector = Connector::new(backend, PoolSize::new(4).unwrap());

    let err = connector.connect().unwrap_err();
    assert!(matches!(err, SqlConnectorError::ConnectionError(ref msg) if msg.contains("3 of 4")));
    assert_eq!(log.opens(), 3);
    assert_eq!(log.closes(), 2);
    let status = connector.status();
    assert!(!status.connected);
    assert_eq!(status.free, 0);
    assert_eq!(status.used, 0);
    assert!(connector.create_transaction().unwrap_err().is_contract_violation());
}

#[test]
fn connect_twice_is_a_no_op() -> Result<(), Box<dyn std::error::Error>> {
    let backend = FlakyBackend::new("twice", None);
    let log = Arc::clone(&backend.log);
    let connector = Connector::new(backend, PoolSize::new(2)?);
    connector.connect()?;
    connector.connect()?;
    assert_eq!(log.opens(), 2);
    connector.disconnect()?;
    connector.disconnect()?;
    assert_eq!(log.closes(), 2);
    Ok(())
}

#[test]
fn disconnect_refused_while_transactions_open() -> Result<(), Box<dyn std::error::Error>> {
    let connector = sqlite_connector("refuse", 2);
    connector.connect()?;
    let tx = connector.create_transaction()?;

    match connector.disconnect() {
        Err(SqlConnectorError::TransactionsOpen { count }) => assert_eq!(count, 1),
        other => panic!("expected TransactionsOpen, got {other:?}"),
    }
    assert!(connector.status().connected);

    connector.close_transaction(tx)?;
    connector.disconnect()?;
    Ok(())
}

#[test]
fn pool_size_bounds_and_connected_guard() -> Result<(), Box<dyn std::error::Error>> {
    assert!(matches!(PoolSize::new(0), Err(SqlConnectorError::ConfigError(_))));
    assert!(matches!(PoolSize::new(11), Err(SqlConnectorError::ConfigError(_))));

    let connector = sqlite_connector("resize", 1);
    connector.set_pool_size(3)?;
    assert_eq!(connector.pool_size().get(), 3);
    assert!(connector.set_pool_size(0).is_err());

    connector.connect()?;
    assert_eq!(connector.status().free, 3);
    assert!(connector.set_pool_size(2).unwrap_err().is_contract_violation());
    connector.disconnect()?;
    Ok(())
}

#[test]
fn close_transaction_rejects_foreign_transactions() -> Result<(), Box<dyn std::error::Error>> {
    let first = sqlite_connector("owner_a", 1);
    let second = sqlite_connector("owner_b", 1);
    first.connect()?;
    second.connect()?;

    let tx = first.create_transaction()?;
    let err = second.close_transaction(tx).unwrap_err();
    assert!(err.is_contract_violation());

    // The rejected transaction was dropped, which hands its connection back to its own pool.
    let status = first.status();
    assert_eq!(status.free, 1);
    assert_eq!(status.open_transactions, 0);
    assert_eq!(second.status().free, 1);

    first.disconnect()?;
    second.disconnect()?;
    Ok(())
}

#[test]
fn list_transactions_reports_open_ones() -> Result<(), Box<dyn std::error::Error>> {
    let connector = sqlite_connector("listing", 3);
    connector.connect()?;
    let a = connector.create_transaction()?;
    let b = connector.create_transaction()?;

    let listed = connector.list_transactions();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].transaction_id, a.id());
    assert_eq!(listed[1].transaction_id, b.id());
    assert_eq!(listed[1].connection_id, b.connection_id());
    assert_ne!(a.connection_id(), b.connection_id());

    connector.close_transaction(a)?;
    connector.close_transaction(b)?;
    assert!(connector.list_transactions().is_empty());
    connector.disconnect()?;
    Ok(())
}

#[test]
fn third_borrower_blocks_until_release() -> Result<(), Box<dyn std::error::Error>> {
    let connector = Arc::new(sqlite_connector("blocking", 2));
    connector.connect()?;

    let first = connector.create_transaction()?;
    let second = connector.create_transaction()?;
    assert_eq!(connector.status().free, 0);

    let (sent, received) = mpsc::channel();
    let waiter = {
        let connector = Arc::clone(&connector);
        thread::spawn(move || -> Result<(), SqlConnectorError> {
            let tx = connector.create_transaction()?;
            sent.send(tx.connection_id()).ok();
            connector.close_transaction(tx)
        })
    };

    assert!(received.recv_timeout(Duration::from_millis(200)).is_err());
    let released = first.connection_id();
    connector.close_transaction(first)?;
    let handed_over = received.recv_timeout(Duration::from_secs(5))?;
    assert_eq!(handed_over, released);
    waiter.join().expect("waiter thread panicked")?;

    connector.close_transaction(second)?;
    connector.disconnect()?;
    Ok(())
}

#[test]
fn each_release_wakes_one_borrower() -> Result<(), Box<dyn std::error::Error>> {
    let connector = Arc::new(sqlite_connector("fairness", 1));
    connector.connect()?;
    let held = connector.create_transaction()?;

    let acquired = Arc::new(AtomicUsize::new(0));
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let release_rx = Arc::new(std::sync::Mutex::new(release_rx));
    let mut waiters = Vec::new();
    for _ in 0..3 {
        let connector = Arc::clone(&connector);
        let acquired = Arc::clone(&acquired);
        let release_rx = Arc::clone(&release_rx);
        waiters.push(thread::spawn(move || -> Result<(), SqlConnectorError> {
            let tx = connector.create_transaction()?;
            acquired.fetch_add(1, Ordering::SeqCst);
            release_rx
                .lock()
                .expect("release channel")
                .recv()
                .expect("release signal");
            connector.close_transaction(tx)
        }));
    }

    thread::sleep(Duration::from_millis(100));
    assert_eq!(acquired.load(Ordering::SeqCst), 0);

    connector.close_transaction(held)?;
    for expected in 1..=3 {
        while acquired.load(Ordering::SeqCst) < expected {
            thread::sleep(Duration::from_millis(5));
        }
        thread::sleep(Duration::from_millis(50));
        assert_eq!(acquired.load(Ordering::SeqCst), expected);
        assert_eq!(connector.status().used, 1);
        release_tx.send(())?;
    }
    for waiter in waiters {
        waiter.join().expect("waiter thread panicked")?;
    }
    assert_eq!(connector.status().free, 1);
    connector.disconnect()?;
    Ok(())
}

#[test]
fn timed_checkout_gives_up() -> Result<(), Box<dyn std::error::Error>> {
    let connector = sqlite_connector("timeout", 1);
    connector.connect()?;
    let held = connector.create_transaction()?;

    let err = connector
        .create_transaction_timeout(Duration::from_millis(50))
        .unwrap_err();
    assert!(matches!(err, SqlConnectorError::Timeout(_)));
    assert_eq!(err.category(), ErrorCategory::Timeout);

    connector.close_transaction(held)?;
    let tx = connector.create_transaction_timeout(Duration::from_millis(50))?;
    connector.close_transaction(tx)?;
    connector.disconnect()?;
    Ok(())
}

#[test]
fn dropped_transaction_returns_its_connection() -> Result<(), Box<dyn std::error::Error>> {
    let connector = sqlite_connector("dropped", 1);
    connector.connect()?;
    {
        let mut tx = connector.create_transaction()?;
        tx.execute_batch("CREATE TABLE t (id INTEGER)")?;
        tx.begin()?;
        tx.execute_batch("INSERT INTO t VALUES (1)")?;
    }
    assert_eq!(connector.status().free, 1);

    let mut tx = connector.create_transaction()?;
    let count = tx.create_statement(StatementKind::Select, "SELECT COUNT(*) AS n FROM t")?;
    tx.prepare(count, 0)?;
    let mut row = Record::builder().field("n", ValueTag::Int64).build();
    assert!(tx.fetch_next(count, &mut row)?);
    assert_eq!(row.get("n"), Some(&Value::Int64(0)));
    connector.close_transaction(tx)?;
    connector.disconnect()?;
    Ok(())
}
