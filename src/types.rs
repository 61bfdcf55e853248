use std::fmt;

use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

/// Tagged values exchanged across the bind/fetch boundary.
///
/// Every backend takes the same enum, so query builders never branch on driver types:
/// ```rust
/// use sql_connector::prelude::*;
///
/// let params = vec![
///     Value::Int64(42),
///     Value::String("alice".into()),
///     Value::Bool(true),
///     Value::Null,
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    String(String),
    /// Calendar timestamp; only whole seconds survive marshaling.
    DateTime(NaiveDateTime),
    /// Enumeration discriminant, carried as a 32-bit integer.
    Enum(i32),
    /// Denormalized object; never bindable as a scalar parameter.
    Object(JsonMap<String, JsonValue>),
    /// Denormalized array; never bindable as a scalar parameter.
    Array(Vec<JsonValue>),
    /// SQL NULL
    Null,
}

/// The closed set of value tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueTag {
    Bool,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    String,
    DateTime,
    Enum,
    Object,
    Array,
}

impl ValueTag {
    /// Nested objects and arrays have no scalar SQL representation.
    #[must_use]
    pub fn is_denormalized(self) -> bool {
        matches!(self, ValueTag::Object | ValueTag::Array)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ValueTag::Bool => "bool",
            ValueTag::Int32 => "int32",
            ValueTag::UInt32 => "uint32",
            ValueTag::Int64 => "int64",
            ValueTag::UInt64 => "uint64",
            ValueTag::Float32 => "float32",
            ValueTag::Float64 => "float64",
            ValueTag::String => "string",
            ValueTag::DateTime => "datetime",
            ValueTag::Enum => "enum",
            ValueTag::Object => "nested-object",
            ValueTag::Array => "nested-array",
        }
    }
}

impl fmt::Display for ValueTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Value {
    /// The value's tag, or `None` for SQL NULL.
    #[must_use]
    pub fn tag(&self) -> Option<ValueTag> {
        let tag = match self {
            Value::Bool(_) => ValueTag::Bool,
            Value::Int32(_) => ValueTag::Int32,
            Value::UInt32(_) => ValueTag::UInt32,
            Value::Int64(_) => ValueTag::Int64,
            Value::UInt64(_) => ValueTag::UInt64,
            Value::Float32(_) => ValueTag::Float32,
            Value::Float64(_) => ValueTag::Float64,
            Value::String(_) => ValueTag::String,
            Value::DateTime(_) => ValueTag::DateTime,
            Value::Enum(_) => ValueTag::Enum,
            Value::Object(_) => ValueTag::Object,
            Value::Array(_) => ValueTag::Array,
            Value::Null => return None,
        };
        Some(tag)
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(v) | Value::Enum(v) => Some(i64::from(*v)),
            Value::UInt32(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            Value::UInt64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        if let Value::String(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float32(v) => Some(f64::from(*v)),
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        if let Value::Bool(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        if let Value::DateTime(value) = self {
            Some(*value)
        } else {
            None
        }
    }
}

/// The database engines this crate can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// `PostgreSQL` database
    Postgres,
    /// `SQLite` database
    Sqlite,
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseType::Postgres => f.write_str("postgres"),
            DatabaseType::Sqlite => f.write_str("sqlite"),
        }
    }
}

/// What kind of statement a query is; decided by the caller, not by parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}
