use rusqlite::types::Value as SqlValue;

use crate::error::SqlConnectorError;
use crate::marshal::{DateTimeParts, integer_to_wire};
use crate::types::Value;

/// Convert one tagged value to its `SQLite` storage class.
///
/// # Errors
/// Returns `SqlConnectorError::ParameterError` for `uint64` values above `i64::MAX`, or
/// `SqlConnectorError::ContractViolation` for nested objects and arrays.
pub fn value_to_sqlite(value: &Value) -> Result<SqlValue, SqlConnectorError> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(_)
        | Value::Int32(_)
        | Value::UInt32(_)
        | Value::Int64(_)
        | Value::UInt64(_)
        | Value::Enum(_) => match integer_to_wire(value)? {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Null,
        },
        Value::Float32(f) => SqlValue::Real(f64::from(*f)),
        Value::Float64(f) => SqlValue::Real(*f),
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::DateTime(dt) => SqlValue::Text(DateTimeParts::from_datetime(dt).to_sql_text()),
        Value::Object(_) | Value::Array(_) => {
            return Err(SqlConnectorError::contract(
                "denormalized values cannot be bound to sqlite parameters",
            ));
        }
    })
}

/// Convert a full parameter list, in order.
///
/// # Errors
/// Returns the first conversion failure, naming its position.
pub fn convert_params(values: &[Value]) -> Result<Vec<SqlValue>, SqlConnectorError> {
    values
        .iter()
        .enumerate()
        .map(|(idx, value)| {
            value_to_sqlite(value).map_err(|err| match err {
                SqlConnectorError::ParameterError(msg) => {
                    SqlConnectorError::ParameterError(format!("parameter {}: {msg}", idx + 1))
                }
                other => other,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn scalars_map_to_storage_classes() {
        assert_eq!(value_to_sqlite(&Value::Bool(true)).unwrap(), SqlValue::Integer(1));
        assert_eq!(value_to_sqlite(&Value::Enum(-3)).unwrap(), SqlValue::Integer(-3));
        assert_eq!(
            value_to_sqlite(&Value::UInt32(u32::MAX)).unwrap(),
            SqlValue::Integer(i64::from(u32::MAX))
        );
        assert_eq!(value_to_sqlite(&Value::Float32(0.5)).unwrap(), SqlValue::Real(0.5));
        assert_eq!(value_to_sqlite(&Value::Null).unwrap(), SqlValue::Null);
    }

    #[test]
    fn datetimes_bind_as_calendar_text() {
        let dt = NaiveDate::from_ymd_opt(2023, 7, 4)
            .unwrap()
            .and_hms_milli_opt(9, 8, 7, 654)
            .unwrap();
        assert_eq!(
            value_to_sqlite(&Value::DateTime(dt)).unwrap(),
            SqlValue::Text("2023-07-04 09:08:07".into())
        );
    }

    #[test]
    fn out_of_range_and_nested_values_fail() {
        let err = convert_params(&[Value::Int32(1), Value::UInt64(u64::MAX)]).unwrap_err();
        assert!(err.to_string().contains("parameter 2"));
        let err = value_to_sqlite(&Value::Object(serde_json::Map::new())).unwrap_err();
        assert!(err.is_contract_violation());
    }
}
