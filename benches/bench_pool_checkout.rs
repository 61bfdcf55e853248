//! Criterion benchmark for concurrent transaction checkout against a `SQLite` file.
//!
//! Each iteration fans a batch of single-row lookups out over several threads that share one
//! connector, so the numbers include time spent waiting on the pool's condition variable.

use std::hint::black_box;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::thread;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use sql_connector::prelude::*;
use sql_connector::sqlite::SqliteBackend;

const SELECT_BY_ID: &str = "SELECT id, name, score FROM bench WHERE id = ?1";

#[derive(Debug, Default)]
#[allow(dead_code)]
struct BenchRow {
    id: i64,
    name: String,
    score: f64,
}

impl_row_sink!(BenchRow { id, name, score });

/// Resolve how many lookups each iteration should perform.
fn lookups_to_run() -> usize {
    std::env::var("BENCH_LOOKUPS")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(512)
}

/// Resolve how many worker threads share the connector.
fn concurrency_to_run() -> usize {
    std::env::var("BENCH_CONCURRENCY")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8)
}

// Dataset written once and reused by every pool size.
static DATASET: LazyLock<String> = LazyLock::new(|| {
    let path = PathBuf::from("benchmark_pool_checkout.db");
    if path.exists() {
        let _ = std::fs::remove_file(&path);
    }
    let path = path.to_string_lossy().into_owned();
    seed(&path, lookups_to_run()).expect("seed benchmark dataset");
    path
});

fn seed(path: &str, rows: usize) -> Result<(), SqlConnectorError> {
    let connector = Connector::new(SqliteBackend::new(path), PoolSize::new(1)?);
    connector.connect()?;
    let mut tx = connector.create_transaction()?;
    tx.execute_batch(
        "CREATE TABLE bench (id INTEGER PRIMARY KEY, name TEXT NOT NULL, score REAL NOT NULL)",
    )?;
    tx.begin()?;
    let insert = tx.create_statement(
        StatementKind::Insert,
        "INSERT INTO bench (id, name, score) VALUES (?1, ?2, ?3)",
    )?;
    for id in 1..=rows {
        let id = i64::try_from(id).unwrap_or(i64::MAX);
        tx.prepare(insert, 3)?;
        tx.bind_values(
            insert,
            &[
                Value::Int64(id),
                Value::String(format!("name-{id}")),
                Value::Int64(id * 3),
            ],
        )?;
        tx.exec_statement(insert)?;
    }
    tx.commit()?;
    connector.close_transaction(tx)?;
    connector.disconnect()
}

fn lookup_batch(connector: &Connector<SqliteBackend>, ids: &[i64]) -> Result<f64, SqlConnectorError> {
    let mut total = 0.0;
    for &id in ids {
        let mut tx = connector.create_transaction()?;
        let stmt = tx.create_statement(StatementKind::Select, SELECT_BY_ID)?;
        tx.prepare(stmt, 1)?;
        tx.bind_values(stmt, &[Value::Int64(id)])?;
        let mut row = BenchRow::default();
        if tx.fetch_next(stmt, &mut row)? {
            total += row.score;
        }
        tx.close_statement(stmt)?;
        connector.close_transaction(tx)?;
    }
    Ok(total)
}

fn bench_pool_checkout(c: &mut Criterion) {
    let path = DATASET.as_str();
    let lookups = lookups_to_run();
    let workers = concurrency_to_run().max(1);
    let ids: Vec<i64> = (1..=i64::try_from(lookups).unwrap_or(i64::MAX)).collect();
    let chunk = ids.len().div_ceil(workers).max(1);

    let mut group = c.benchmark_group("pool_checkout");
    group.throughput(Throughput::Elements(lookups as u64));
    for size in [1_u32, 4, 10] {
        let connector = Connector::new(
            SqliteBackend::new(path),
            PoolSize::new(size).expect("pool size"),
        );
        connector.connect().expect("connect benchmark pool");
        group.bench_with_input(BenchmarkId::new("pool_size", size), &size, |b, _| {
            let shared = &connector;
            b.iter(|| {
                thread::scope(|scope| {
                    let handles: Vec<_> = ids
                        .chunks(chunk)
                        .map(|part| scope.spawn(move || lookup_batch(shared, part)))
                        .collect();
                    for handle in handles {
                        let total = handle
                            .join()
                            .expect("lookup worker panicked")
                            .expect("lookup batch");
                        black_box(total);
                    }
                });
            });
        });
        connector.disconnect().expect("disconnect benchmark pool");
    }
    group.finish();
}

criterion_group!(benches, bench_pool_checkout);
criterion_main!(benches);
