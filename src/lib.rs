//! Pooled, thread-safe SQL connector.
//!
//! A [`Connector`] owns a fixed pool of backend connections. Callers check a connection out as a
//! [`Transaction`], create statements on it, and drive each statement through
//! prepare, bind, execute, fetch. Values cross the boundary as tagged [`Value`]s; fetched rows are
//! written into any [`RowSink`], usually a generated struct impl or a [`Record`].
//!
//! ```rust
//! use sql_connector::prelude::*;
//! use sql_connector::sqlite::SqliteBackend;
//!
//! # fn main() -> Result<(), SqlConnectorError> {
//! let connector = Connector::new(SqliteBackend::new(":memory:"), PoolSize::new(1)?);
//! connector.connect()?;
//!
//! let mut tx = connector.create_transaction()?;
//! tx.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")?;
//! let insert = tx.create_statement(StatementKind::Insert, "INSERT INTO t (name) VALUES (?1)")?;
//! tx.prepare(insert, 1)?;
//! tx.bind_values(insert, &[Value::String("alpha".into())])?;
//! tx.exec_statement(insert)?;
//!
//! let select = tx.create_statement(StatementKind::Select, "SELECT id, name FROM t")?;
//! tx.prepare(select, 0)?;
//! let mut row = Record::builder()
//!     .field("id", ValueTag::Int64)
//!     .field("name", ValueTag::String)
//!     .build();
//! assert!(tx.fetch_next(select, &mut row)?);
//! assert_eq!(row.get("name"), Some(&Value::String("alpha".into())));
//!
//! connector.close_transaction(tx)?;
//! connector.disconnect()?;
//! # Ok(())
//! # }
//! ```

#[cfg(not(any(feature = "sqlite", feature = "postgres")))]
compile_error!("enable at least one of the `sqlite` or `postgres` features");

pub mod any;
pub mod backend;
pub mod config;
pub mod connector;
pub mod error;
pub mod marshal;
pub mod prelude;
pub mod reflect;
pub mod statement;
pub mod transaction;
pub mod translation;
pub mod types;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use any::AnyBackend;
pub use backend::{Backend, BackendConnection, ColumnMeta};
pub use config::{ConnectionTarget, ConnectorConfig, ConnectorConfigBuilder, PoolSize};
pub use connector::{ConnectionId, Connector, PoolStatus};
pub use error::{ErrorCategory, SqlConnectorError};
pub use reflect::{EnumValue, FieldDescriptor, FieldValue, Record, RecordBuilder, RowSink};
pub use statement::{StatementHandle, StatementId, StatementInfo, StatementState};
pub use transaction::{Transaction, TransactionId, TransactionMetadata};
pub use translation::{PlaceholderStyle, translate_placeholders};
pub use types::{DatabaseType, StatementKind, Value, ValueTag};
