use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tokio_postgres::Row;
use tokio_postgres::types::FromSql;

use crate::error::SqlConnectorError;
use crate::marshal::{DateTimeParts, integer_into_tag, string_from_wire};
use crate::reflect::FieldDescriptor;
use crate::types::{Value, ValueTag};

/// A column value in the widest Rust type its wire type maps to.
#[derive(Debug, Clone, PartialEq)]
pub enum Wire {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Timestamp(NaiveDateTime),
}

fn get<'a, T: FromSql<'a>>(row: &'a Row, idx: usize) -> Result<Option<T>, SqlConnectorError> {
    row.try_get::<_, Option<T>>(idx).map_err(|e| {
        SqlConnectorError::ParameterError(format!(
            "column {} could not be read: {e}",
            row.columns()[idx].name()
        ))
    })
}

/// Read column `idx` according to its declared wire type; `None` is SQL NULL.
///
/// # Errors
/// Returns `SqlConnectorError::ParameterError` for wire types with no scalar mapping.
pub fn read_wire(row: &Row, idx: usize) -> Result<Option<Wire>, SqlConnectorError> {
    let column = row.columns().get(idx).ok_or_else(|| {
        SqlConnectorError::ParameterError(format!("column index {idx} is out of range"))
    })?;
    let type_name = column.type_().name();
    Ok(match type_name {
        "int2" => get::<i16>(row, idx)?.map(|v| Wire::Int(i64::from(v))),
        "int4" => get::<i32>(row, idx)?.map(|v| Wire::Int(i64::from(v))),
        "int8" => get::<i64>(row, idx)?.map(Wire::Int),
        "oid" => get::<u32>(row, idx)?.map(|v| Wire::Int(i64::from(v))),
        "float4" => get::<f32>(row, idx)?.map(|v| Wire::Float(f64::from(v))),
        "float8" => get::<f64>(row, idx)?.map(Wire::Float),
        "bool" => get::<bool>(row, idx)?.map(Wire::Bool),
        "timestamp" => get::<NaiveDateTime>(row, idx)?.map(Wire::Timestamp),
        "timestamptz" => get::<DateTime<Utc>>(row, idx)?.map(|v| Wire::Timestamp(v.naive_utc())),
        "date" => get::<NaiveDate>(row, idx)?
            .map(|d| Wire::Timestamp(d.and_time(chrono::NaiveTime::MIN))),
        "json" | "jsonb" => get::<serde_json::Value>(row, idx)?.map(|v| Wire::Text(v.to_string())),
        "text" | "varchar" | "bpchar" | "name" | "unknown" => get::<&str>(row, idx)?
            .map(|s| string_from_wire(column.name(), s.as_bytes()).map(Wire::Text))
            .transpose()?,
        other => {
            return Err(SqlConnectorError::ParameterError(format!(
                "column {} has unsupported type {other}",
                column.name()
            )));
        }
    })
}

/// Narrow a wire value into the tag `field` declares.
///
/// # Errors
/// Returns `SqlConnectorError::ParameterError` when the wire value cannot become that tag.
pub fn wire_into_tag(
    column: &str,
    wire: Wire,
    field: &FieldDescriptor,
) -> Result<Value, SqlConnectorError> {
    let tag = field.tag();
    if tag.is_denormalized() {
        return Err(SqlConnectorError::contract(format!(
            "column {column} cannot be fetched into a denormalized field"
        )));
    }
    match (tag, wire) {
        (ValueTag::Bool, Wire::Bool(b)) => Ok(Value::Bool(b)),
        (_, Wire::Int(i)) => integer_into_tag(i, tag),
        #[allow(clippy::cast_possible_truncation)]
        (ValueTag::Float32, Wire::Float(f)) => Ok(Value::Float32(f as f32)),
        (ValueTag::Float64, Wire::Float(f)) => Ok(Value::Float64(f)),
        (ValueTag::String, Wire::Text(s)) => Ok(Value::String(s)),
        (ValueTag::String, Wire::Bool(b)) => Ok(Value::String(b.to_string())),
        (ValueTag::DateTime, Wire::Timestamp(ts)) => Ok(Value::DateTime(
            DateTimeParts::from_datetime(&ts).to_datetime()?,
        )),
        (tag, wire) => Err(SqlConnectorError::ParameterError(format!(
            "column {column} value {wire:?} cannot fill a {tag} field"
        ))),
    }
}
