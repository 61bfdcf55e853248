#![cfg(feature = "sqlite")]

mod common;

use common::unique_db_path;
use serde_json::json;
use sql_connector::prelude::*;

#[derive(Debug, Default)]
struct Pair {
    lhs: i64,
    rhs: String,
}

impl_row_sink!(Pair { lhs, rhs });

fn sqlite_config(prefix: &str, params: serde_json::Value) -> ConnectorConfig {
    serde_json::from_value(json!({
        "db_type": "sqlite",
        "target": { "database": unique_db_path(prefix), "params": params },
        "pool_size": 2,
    }))
    .expect("valid config")
}

#[test]
fn config_selects_the_sqlite_backend() -> Result<(), Box<dyn std::error::Error>> {
    let config = sqlite_config("any_sqlite", json!({ "translate_placeholders": "true" }));
    let connector = Connector::<AnyBackend>::from_config(&config)?;
    assert_eq!(connector.database_type(), DatabaseType::Sqlite);
    assert_eq!(connector.pool_size().get(), 2);

    connector.connect()?;
    assert_eq!(connector.status().free, 2);
    let mut tx = connector.create_transaction()?;
    tx.execute_batch("CREATE TABLE pairs (lhs INTEGER NOT NULL, rhs TEXT NOT NULL)")?;

    // `$N` placeholders are rewritten for sqlite when translation is on.
    let insert = tx.create_statement(
        StatementKind::Insert,
        "INSERT INTO pairs (lhs, rhs) VALUES ($1, $2)",
    )?;
    tx.prepare(insert, 2)?;
    tx.bind_values(insert, &[Value::Int32(3), Value::String("three".into())])?;
    tx.exec_statement(insert)?;

    let select = tx.create_statement(StatementKind::Select, "SELECT lhs, rhs FROM pairs")?;
    tx.prepare(select, 0)?;
    let mut pair = Pair::default();
    assert!(tx.fetch_next(select, &mut pair)?);
    assert_eq!(pair.lhs, 3);
    assert_eq!(pair.rhs, "three");

    connector.close_transaction(tx)?;
    connector.disconnect()?;
    Ok(())
}

#[test]
fn invalid_backend_params_fail_at_build_time() {
    let config = sqlite_config("any_bad_param", json!({ "journal_mode": "sideways" }));
    assert!(matches!(
        Connector::<AnyBackend>::from_config(&config),
        Err(SqlConnectorError::ConfigError(_))
    ));

    let config = sqlite_config("any_bad_bool", json!({ "foreign_keys": "maybe" }));
    assert!(matches!(
        Connector::<AnyBackend>::from_config(&config),
        Err(SqlConnectorError::ConfigError(_))
    ));
}

#[test]
fn pool_size_is_validated_when_deserializing() {
    let parsed = serde_json::from_value::<ConnectorConfig>(json!({
        "db_type": "sqlite",
        "target": { "database": "unused.db" },
        "pool_size": 0,
    }));
    assert!(parsed.is_err());

    let defaulted: ConnectorConfig = serde_json::from_value(json!({
        "db_type": "sqlite",
        "target": { "database": "unused.db" },
    }))
    .expect("pool size defaults");
    assert_eq!(defaulted.pool_size, PoolSize::DEFAULT);
}

#[cfg(feature = "postgres")]
#[test]
fn postgres_config_requires_a_host() {
    let config = ConnectorConfig::new(DatabaseType::Postgres, ConnectionTarget::new("appdb"));
    assert!(matches!(
        Connector::<AnyBackend>::from_config(&config),
        Err(SqlConnectorError::ConfigError(ref msg)) if msg.contains("host")
    ));
}
