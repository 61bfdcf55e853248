use rusqlite::types::Value as SqlValue;

use crate::error::SqlConnectorError;
use crate::marshal::{DateTimeParts, integer_into_tag, string_from_wire};
use crate::reflect::FieldDescriptor;
use crate::types::{Value, ValueTag};

fn storage_class(value: &SqlValue) -> &'static str {
    match value {
        SqlValue::Null => "NULL",
        SqlValue::Integer(_) => "INTEGER",
        SqlValue::Real(_) => "REAL",
        SqlValue::Text(_) => "TEXT",
        SqlValue::Blob(_) => "BLOB",
    }
}

/// Marshal one `SQLite` cell into the tag `field` declares; `None` is SQL NULL.
///
/// # Errors
/// Returns `SqlConnectorError::ParameterError` when the storage class cannot become the tag.
pub fn sqlite_to_value(
    column: &str,
    cell: &SqlValue,
    field: &FieldDescriptor,
) -> Result<Option<Value>, SqlConnectorError> {
    let tag = field.tag();
    let mismatch = || {
        SqlConnectorError::ParameterError(format!(
            "column {column} holds {} which cannot fill a {tag} field",
            storage_class(cell)
        ))
    };

    let value = match (tag, cell) {
        (_, SqlValue::Null) => return Ok(None),
        (
            ValueTag::Bool
            | ValueTag::Int32
            | ValueTag::UInt32
            | ValueTag::Int64
            | ValueTag::UInt64
            | ValueTag::Enum,
            SqlValue::Integer(i),
        ) => integer_into_tag(*i, tag)?,
        #[allow(clippy::cast_possible_truncation)]
        (ValueTag::Float32, SqlValue::Real(f)) => Value::Float32(*f as f32),
        (ValueTag::Float64, SqlValue::Real(f)) => Value::Float64(*f),
        (ValueTag::Float32 | ValueTag::Float64, SqlValue::Integer(i)) => integer_into_tag(*i, tag)?,
        (ValueTag::String, SqlValue::Text(s)) => Value::String(string_from_wire(column, s.as_bytes())?),
        (ValueTag::String, SqlValue::Blob(b)) => Value::String(string_from_wire(column, b)?),
        (ValueTag::String, SqlValue::Integer(i)) => Value::String(i.to_string()),
        (ValueTag::String, SqlValue::Real(f)) => Value::String(f.to_string()),
        (ValueTag::DateTime, SqlValue::Text(s)) => {
            Value::DateTime(DateTimeParts::parse_sql_text(s)?.to_datetime()?)
        }
        (ValueTag::DateTime, SqlValue::Integer(secs)) => integer_into_tag(*secs, tag)?,
        (ValueTag::Object | ValueTag::Array, _) => {
            return Err(SqlConnectorError::contract(format!(
                "column {column} cannot be fetched into a denormalized field"
            )));
        }
        _ => return Err(mismatch()),
    };
    Ok(Some(value))
}
