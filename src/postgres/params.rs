use std::error::Error;

use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use tokio_util::bytes;

use crate::error::SqlConnectorError;
use crate::marshal::{DateTimeParts, integer_to_wire};
use crate::types::Value;

type BoxError = Box<dyn Error + Sync + Send>;

fn unsupported(value: &Value, ty: &Type) -> BoxError {
    let tag = value.tag().map_or("null", |tag| tag.name());
    format!("cannot bind a {tag} value to a parameter of type {ty}").into()
}

fn is_text_type(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN
    )
}

fn integer_to_sql(
    value: &Value,
    v: i64,
    ty: &Type,
    out: &mut bytes::BytesMut,
) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(v)
            .map_err(|_| format!("{v} is out of range for int2"))?
            .to_sql(ty, out),
        Type::INT4 => i32::try_from(v)
            .map_err(|_| format!("{v} is out of range for int4"))?
            .to_sql(ty, out),
        Type::INT8 => v.to_sql(ty, out),
        Type::OID => u32::try_from(v)
            .map_err(|_| format!("{v} is out of range for oid"))?
            .to_sql(ty, out),
        #[allow(clippy::cast_precision_loss)]
        Type::FLOAT4 => (v as f32).to_sql(ty, out),
        #[allow(clippy::cast_precision_loss)]
        Type::FLOAT8 => (v as f64).to_sql(ty, out),
        Type::BOOL => (v != 0).to_sql(ty, out),
        _ if is_text_type(ty) => v.to_string().as_str().to_sql(ty, out),
        _ => Err(unsupported(value, ty)),
    }
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut bytes::BytesMut) -> Result<IsNull, BoxError> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) if *ty == Type::BOOL => b.to_sql(ty, out),
            Value::Bool(_)
            | Value::Int32(_)
            | Value::UInt32(_)
            | Value::Int64(_)
            | Value::UInt64(_)
            | Value::Enum(_) => {
                let v = integer_to_wire(self)?.ok_or_else(|| unsupported(self, ty))?;
                integer_to_sql(self, v, ty, out)
            }
            Value::Float32(f) => match *ty {
                Type::FLOAT4 => f.to_sql(ty, out),
                Type::FLOAT8 => f64::from(*f).to_sql(ty, out),
                _ => Err(unsupported(self, ty)),
            },
            Value::Float64(f) => match *ty {
                Type::FLOAT8 => f.to_sql(ty, out),
                #[allow(clippy::cast_possible_truncation)]
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                _ => Err(unsupported(self, ty)),
            },
            Value::String(s) => match *ty {
                Type::JSON | Type::JSONB => {
                    let json: serde_json::Value = serde_json::from_str(s)?;
                    json.to_sql(ty, out)
                }
                _ if is_text_type(ty) => s.as_str().to_sql(ty, out),
                _ => Err(unsupported(self, ty)),
            },
            Value::DateTime(dt) => {
                let whole = DateTimeParts::from_datetime(dt).to_datetime()?;
                match *ty {
                    Type::TIMESTAMP => whole.to_sql(ty, out),
                    Type::TIMESTAMPTZ => whole.and_utc().to_sql(ty, out),
                    Type::DATE => whole.date().to_sql(ty, out),
                    _ if is_text_type(ty) => DateTimeParts::from_datetime(dt)
                        .to_sql_text()
                        .as_str()
                        .to_sql(ty, out),
                    _ => Err(unsupported(self, ty)),
                }
            }
            Value::Object(_) | Value::Array(_) => {
                Err("denormalized values cannot be bound to postgres parameters".into())
            }
        }
    }

    fn accepts(ty: &Type) -> bool {
        matches!(
            *ty,
            Type::BOOL
                | Type::INT2
                | Type::INT4
                | Type::INT8
                | Type::OID
                | Type::FLOAT4
                | Type::FLOAT8
                | Type::JSON
                | Type::JSONB
                | Type::TIMESTAMP
                | Type::TIMESTAMPTZ
                | Type::DATE
        ) || is_text_type(ty)
    }

    to_sql_checked!();
}

/// Check each value against the parameter types the server declared, by encoding it once.
///
/// # Errors
/// Returns `SqlConnectorError::ParameterError` naming the first value that does not fit.
pub fn check_params(values: &[Value], types: &[Type]) -> Result<(), SqlConnectorError> {
    let mut scratch = bytes::BytesMut::new();
    for (idx, (value, ty)) in values.iter().zip(types).enumerate() {
        scratch.clear();
        value.to_sql_checked(ty, &mut scratch).map_err(|e| {
            SqlConnectorError::ParameterError(format!("parameter {}: {e}", idx + 1))
        })?;
    }
    Ok(())
}

/// Borrow values as the trait objects `tokio-postgres` expects.
#[must_use]
pub fn as_refs(values: &[Value]) -> Vec<&(dyn ToSql + Sync)> {
    values.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn encodes(value: &Value, ty: &Type) -> bool {
        let mut out = bytes::BytesMut::new();
        value.to_sql_checked(ty, &mut out).is_ok()
    }

    #[test]
    fn integers_adapt_to_declared_width() {
        assert!(encodes(&Value::Int64(7), &Type::INT2));
        assert!(!encodes(&Value::Int64(70_000), &Type::INT2));
        assert!(encodes(&Value::UInt32(u32::MAX), &Type::INT8));
        assert!(!encodes(&Value::UInt32(u32::MAX), &Type::INT4));
        assert!(!encodes(&Value::UInt64(u64::MAX), &Type::INT8));
        assert!(encodes(&Value::Enum(2), &Type::INT4));
        assert!(encodes(&Value::Bool(true), &Type::BOOL));
    }

    #[test]
    fn strings_and_datetimes() {
        assert!(encodes(&Value::String("x".into()), &Type::VARCHAR));
        assert!(encodes(&Value::String("{\"a\":1}".into()), &Type::JSONB));
        assert!(!encodes(&Value::String("{not json".into()), &Type::JSON));
        assert!(!encodes(&Value::String("1".into()), &Type::INT4));

        let dt = NaiveDate::from_ymd_opt(2020, 5, 6)
            .unwrap()
            .and_hms_opt(7, 8, 9)
            .unwrap();
        for ty in [Type::TIMESTAMP, Type::TIMESTAMPTZ, Type::DATE] {
            assert!(encodes(&Value::DateTime(dt), &ty));
        }
    }

    #[test]
    fn null_binds_to_anything_accepted() {
        let mut out = bytes::BytesMut::new();
        assert!(matches!(
            Value::Null.to_sql_checked(&Type::INT4, &mut out),
            Ok(IsNull::Yes)
        ));
    }

    #[test]
    fn check_params_names_position() {
        let err = check_params(
            &[Value::Int32(1), Value::Float64(1.5)],
            &[Type::INT4, Type::TEXT],
        )
        .unwrap_err();
        assert!(err.to_string().contains("parameter 2"));
    }
}
