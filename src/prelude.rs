//! Convenient imports for common functionality.
//!
//! This module re-exports the types most callers need to open a pool, run statements, and read
//! rows.

pub use crate::any::AnyBackend;
pub use crate::config::{ConnectionTarget, ConnectorConfig, PoolSize};
pub use crate::connector::{Connector, PoolStatus};
pub use crate::error::{ErrorCategory, SqlConnectorError};
pub use crate::reflect::{EnumValue, FieldDescriptor, FieldValue, Record, RowSink};
pub use crate::statement::{StatementHandle, StatementInfo, StatementState};
pub use crate::transaction::{Transaction, TransactionMetadata};
pub use crate::types::{DatabaseType, StatementKind, Value, ValueTag};

pub use crate::impl_row_sink;
