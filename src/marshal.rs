//! Backend-neutral pieces of value marshaling.
//!
//! Each backend keeps its own bind table (`params`) and fetch table (`query`); the
//! helpers here are the parts they share: calendar decomposition of timestamps,
//! rejection of denormalized values, integer narrowing into a field's tag, and
//! sizing string buffers from the backend-reported length.

use std::fmt::Write;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::error::SqlConnectorError;
use crate::types::{Value, ValueTag};

/// A timestamp broken into calendar components plus a negative-year flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTimeParts {
    pub year: u32,
    /// 1-based
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub negative: bool,
}

impl DateTimeParts {
    /// Decompose a timestamp; sub-second precision is dropped.
    #[must_use]
    pub fn from_datetime(dt: &NaiveDateTime) -> Self {
        let year = dt.year();
        Self {
            year: year.unsigned_abs(),
            month: dt.month(),
            day: dt.day(),
            hour: dt.hour(),
            minute: dt.minute(),
            second: dt.second(),
            negative: year < 0,
        }
    }

    /// Rebuild a timestamp from the six calendar components.
    ///
    /// # Errors
    /// Returns `SqlConnectorError::ParameterError` if the components do not name a real instant.
    pub fn to_datetime(&self) -> Result<NaiveDateTime, SqlConnectorError> {
        let year = i32::try_from(self.year).map_err(|_| {
            SqlConnectorError::ParameterError(format!("year {} out of range", self.year))
        })?;
        let year = if self.negative { -year } else { year };
        NaiveDate::from_ymd_opt(year, self.month, self.day)
            .and_then(|date| date.and_hms_opt(self.hour, self.minute, self.second))
            .ok_or_else(|| {
                SqlConnectorError::ParameterError(format!("invalid calendar components: {self:?}"))
            })
    }

    /// Render as `[-]YYYY-MM-DD HH:MM:SS`.
    #[must_use]
    pub fn to_sql_text(&self) -> String {
        let mut out = String::with_capacity(20);
        if self.negative {
            out.push('-');
        }
        // Writing into a String cannot fail.
        let _ = write!(
            out,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        );
        out
    }

    /// Parse `[-]YYYY-MM-DD[ T]HH:MM:SS[.fff]` or a bare `[-]YYYY-MM-DD`.
    ///
    /// # Errors
    /// Returns `SqlConnectorError::ParameterError` when the text is not a timestamp.
    pub fn parse_sql_text(text: &str) -> Result<Self, SqlConnectorError> {
        let invalid =
            || SqlConnectorError::ParameterError(format!("unparseable datetime text: {text:?}"));
        let trimmed = text.trim();
        let (negative, body) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let (date, time) = match body.split_once([' ', 'T']) {
            Some((date, time)) => (date, Some(time)),
            None => (body, None),
        };

        let mut date_fields = date.splitn(3, '-').map(str::parse::<u32>);
        let year = date_fields.next().and_then(Result::ok).ok_or_else(invalid)?;
        let month = date_fields.next().and_then(Result::ok).ok_or_else(invalid)?;
        let day = date_fields.next().and_then(Result::ok).ok_or_else(invalid)?;

        let (hour, minute, second) = match time {
            None => (0, 0, 0),
            Some(time) => {
                // Fractional seconds and a trailing zone marker are not calendar components.
                let time = time.trim_end_matches('Z');
                let whole = time.split_once('.').map_or(time, |(whole, _)| whole);
                let mut time_fields = whole.splitn(3, ':').map(str::parse::<u32>);
                let hour = time_fields.next().and_then(Result::ok).ok_or_else(invalid)?;
                let minute = time_fields.next().and_then(Result::ok).ok_or_else(invalid)?;
                let second = match time_fields.next() {
                    Some(parsed) => parsed.map_err(|_| invalid())?,
                    None => 0,
                };
                (hour, minute, second)
            }
        };

        Ok(Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
            negative,
        })
    }
}

/// Refuse nested objects and arrays at the bind boundary.
///
/// # Errors
/// Returns `SqlConnectorError::ContractViolation` naming the offending parameter position.
pub fn reject_denormalized(position: usize, value: &Value) -> Result<(), SqlConnectorError> {
    match value.tag() {
        Some(tag) if tag.is_denormalized() => Err(SqlConnectorError::contract(format!(
            "parameter {} is a {tag} value; denormalized data cannot be bound as a scalar",
            position + 1
        ))),
        _ => Ok(()),
    }
}

/// Refuse nested-object/nested-array fields at the fetch boundary.
///
/// # Errors
/// Returns `SqlConnectorError::ContractViolation` for denormalized tags.
pub fn require_scalar_field(column: &str, tag: ValueTag) -> Result<(), SqlConnectorError> {
    if tag.is_denormalized() {
        return Err(SqlConnectorError::contract(format!(
            "field for column {column} is declared {tag}; denormalized fields cannot be fetched"
        )));
    }
    Ok(())
}

/// Narrow a backend integer into an integer-like tag.
///
/// # Errors
/// Returns `SqlConnectorError::ParameterError` when the value does not fit the tag, or when
/// the tag is not integer-like.
pub fn integer_into_tag(value: i64, tag: ValueTag) -> Result<Value, SqlConnectorError> {
    let out_of_range =
        || SqlConnectorError::ParameterError(format!("integer {value} does not fit {tag}"));
    match tag {
        ValueTag::Bool => Ok(Value::Bool(value != 0)),
        ValueTag::Int32 => i32::try_from(value).map(Value::Int32).map_err(|_| out_of_range()),
        ValueTag::Enum => i32::try_from(value).map(Value::Enum).map_err(|_| out_of_range()),
        ValueTag::UInt32 => u32::try_from(value).map(Value::UInt32).map_err(|_| out_of_range()),
        ValueTag::Int64 => Ok(Value::Int64(value)),
        ValueTag::UInt64 => u64::try_from(value).map(Value::UInt64).map_err(|_| out_of_range()),
        #[allow(clippy::cast_precision_loss)]
        ValueTag::Float32 => Ok(Value::Float32(value as f32)),
        #[allow(clippy::cast_precision_loss)]
        ValueTag::Float64 => Ok(Value::Float64(value as f64)),
        ValueTag::String => Ok(Value::String(value.to_string())),
        ValueTag::DateTime => chrono::DateTime::from_timestamp(value, 0)
            .map(|dt| Value::DateTime(dt.naive_utc()))
            .ok_or_else(out_of_range),
        ValueTag::Object | ValueTag::Array => Err(SqlConnectorError::contract(format!(
            "cannot marshal an integer into a {tag} field"
        ))),
    }
}

/// Convert a bound integer-like value to a signed 64-bit wire integer.
///
/// # Errors
/// Returns `SqlConnectorError::ParameterError` for `uint64` values above `i64::MAX`.
pub fn integer_to_wire(value: &Value) -> Result<Option<i64>, SqlConnectorError> {
    Ok(match value {
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Int32(v) | Value::Enum(v) => Some(i64::from(*v)),
        Value::UInt32(v) => Some(i64::from(*v)),
        Value::Int64(v) => Some(*v),
        Value::UInt64(v) => Some(i64::try_from(*v).map_err(|_| {
            SqlConnectorError::ParameterError(format!(
                "uint64 value {v} exceeds the backend's signed 64-bit range"
            ))
        })?),
        _ => None,
    })
}

/// Fill a string field from backend bytes, sized to the reported byte length first.
///
/// # Errors
/// Returns `SqlConnectorError::ParameterError` if the bytes are not UTF-8.
pub fn string_from_wire(column: &str, bytes: &[u8]) -> Result<String, SqlConnectorError> {
    let text = std::str::from_utf8(bytes).map_err(|e| {
        SqlConnectorError::ParameterError(format!("column {column} is not valid UTF-8: {e}"))
    })?;
    let mut out = String::with_capacity(bytes.len());
    out.push_str(text);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn datetime_parts_roundtrip_through_text() {
        let original = dt(2024, 2, 29, 23, 59, 58);
        let parts = DateTimeParts::from_datetime(&original);
        assert_eq!(parts.month, 2);
        assert!(!parts.negative);
        let text = parts.to_sql_text();
        assert_eq!(text, "2024-02-29 23:59:58");
        let parsed = DateTimeParts::parse_sql_text(&text).unwrap();
        assert_eq!(parsed, parts);
        assert_eq!(parsed.to_datetime().unwrap(), original);
    }

    #[test]
    fn negative_years_keep_their_sign() {
        let original = dt(-44, 3, 15, 12, 0, 0);
        let parts = DateTimeParts::from_datetime(&original);
        assert!(parts.negative);
        assert_eq!(parts.year, 44);
        assert_eq!(parts.to_sql_text(), "-0044-03-15 12:00:00");
        let back = DateTimeParts::parse_sql_text("-0044-03-15 12:00:00")
            .unwrap()
            .to_datetime()
            .unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn parse_accepts_date_only_iso_and_fractions() {
        let d = DateTimeParts::parse_sql_text("1999-12-31").unwrap();
        assert_eq!((d.hour, d.minute, d.second), (0, 0, 0));
        let iso = DateTimeParts::parse_sql_text("2001-01-02T03:04:05.678Z").unwrap();
        assert_eq!(iso.to_datetime().unwrap(), dt(2001, 1, 2, 3, 4, 5));
        assert!(DateTimeParts::parse_sql_text("yesterday").is_err());
        let bad = DateTimeParts::parse_sql_text("2023-02-30 00:00:00").unwrap();
        assert!(bad.to_datetime().is_err());
    }

    #[test]
    fn denormalized_values_are_contract_violations() {
        let err = reject_denormalized(1, &Value::Array(vec![])).unwrap_err();
        assert!(err.is_contract_violation());
        assert!(err.to_string().contains("parameter 2"));
        assert!(reject_denormalized(0, &Value::Null).is_ok());
        assert!(reject_denormalized(0, &Value::Int32(1)).is_ok());
        assert!(require_scalar_field("payload", ValueTag::Object).is_err());
    }

    #[test]
    fn integers_narrow_with_range_checks() {
        assert_eq!(integer_into_tag(7, ValueTag::Int32).unwrap(), Value::Int32(7));
        assert_eq!(integer_into_tag(1, ValueTag::Bool).unwrap(), Value::Bool(true));
        assert!(integer_into_tag(-1, ValueTag::UInt32).is_err());
        assert!(integer_into_tag(i64::from(i32::MAX) + 1, ValueTag::Enum).is_err());
        assert!(integer_to_wire(&Value::UInt64(u64::MAX)).is_err());
        assert_eq!(integer_to_wire(&Value::UInt32(5)).unwrap(), Some(5));
        assert_eq!(integer_to_wire(&Value::Float64(1.0)).unwrap(), None);
    }

    #[test]
    fn strings_are_copied_byte_for_byte() {
        let s = string_from_wire("name", "naïve ☃ text".as_bytes()).unwrap();
        assert_eq!(s.as_bytes(), "naïve ☃ text".as_bytes());
        assert!(string_from_wire("name", &[0xff, 0xfe]).is_err());
    }
}
