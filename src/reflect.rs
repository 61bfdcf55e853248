//! The row-sink seam: how fetched columns find their way into caller records.
//!
//! The connector never knows a record's concrete type. It asks the sink for a
//! [`FieldDescriptor`] by column name, then writes a marshaled [`Value`] (or
//! `None` for SQL NULL) through it. Two sinks ship with the crate: the dynamic
//! [`Record`], and [`impl_row_sink!`](crate::impl_row_sink) for plain structs
//! whose fields implement [`FieldValue`].

use std::collections::HashMap;

use chrono::NaiveDateTime;

use crate::error::SqlConnectorError;
use crate::types::{Value, ValueTag};

/// Name, tag, and nullability of one record field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    name: String,
    tag: ValueTag,
    nullable: bool,
}

impl FieldDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, tag: ValueTag, nullable: bool) -> Self {
        Self {
            name: name.into(),
            tag,
            nullable,
        }
    }

    /// Describe a struct field from its Rust type.
    #[must_use]
    pub fn describe<T: FieldValue>(name: &str, _field: &T) -> Self {
        Self::new(name, T::TAG, T::NULLABLE)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn tag(&self) -> ValueTag {
        self.tag
    }

    #[must_use]
    pub fn nullable(&self) -> bool {
        self.nullable
    }
}

/// A record that fetched rows are written into.
pub trait RowSink {
    /// Resolve the field receiving `column`, if the record has one.
    fn field(&self, column: &str) -> Option<FieldDescriptor>;

    /// Store a marshaled value (`None` for SQL NULL) into `field`.
    ///
    /// # Errors
    /// Returns `SqlConnectorError::ConsistencyError` if the value does not fit the field.
    fn write(&mut self, field: &FieldDescriptor, value: Option<Value>)
    -> Result<(), SqlConnectorError>;

    /// Read the current value of `field`; `None` when unset or NULL.
    fn read(&self, field: &FieldDescriptor) -> Option<Value>;

    /// The field holding the record's primary key, if it declares one.
    fn primary_key(&self) -> Option<FieldDescriptor> {
        None
    }
}

/// Rust types that can back a record field.
pub trait FieldValue: Sized {
    const TAG: ValueTag;
    const NULLABLE: bool = false;

    /// # Errors
    /// Returns `SqlConnectorError::ConsistencyError` on a tag mismatch or NULL into a
    /// non-optional field.
    fn from_value(value: Option<Value>) -> Result<Self, SqlConnectorError>;

    fn to_value(&self) -> Option<Value>;
}

fn mismatch(expected: ValueTag, got: Option<&Value>) -> SqlConnectorError {
    match got {
        Some(value) => SqlConnectorError::ConsistencyError(format!(
            "expected a {expected} value, received {value:?}"
        )),
        None => SqlConnectorError::ConsistencyError(format!(
            "required {expected} field received NULL"
        )),
    }
}

macro_rules! impl_field_value {
    ($ty:ty, $tag:ident) => {
        impl FieldValue for $ty {
            const TAG: ValueTag = ValueTag::$tag;

            fn from_value(value: Option<Value>) -> Result<Self, SqlConnectorError> {
                match value {
                    Some(Value::$tag(v)) => Ok(v),
                    other => Err(mismatch(ValueTag::$tag, other.as_ref())),
                }
            }

            fn to_value(&self) -> Option<Value> {
                Some(Value::$tag(self.clone()))
            }
        }
    };
}

impl_field_value!(bool, Bool);
impl_field_value!(i32, Int32);
impl_field_value!(u32, UInt32);
impl_field_value!(i64, Int64);
impl_field_value!(u64, UInt64);
impl_field_value!(f32, Float32);
impl_field_value!(f64, Float64);
impl_field_value!(String, String);
impl_field_value!(NaiveDateTime, DateTime);

/// An enumeration discriminant stored in a struct field.
///
/// Convert a `#[repr(i32)]` enum with `EnumValue(shade as i32)` on the way in and match on
/// `.0` on the way out.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnumValue(pub i32);

impl From<i32> for EnumValue {
    fn from(discriminant: i32) -> Self {
        EnumValue(discriminant)
    }
}

impl From<EnumValue> for i32 {
    fn from(value: EnumValue) -> Self {
        value.0
    }
}

impl FieldValue for EnumValue {
    const TAG: ValueTag = ValueTag::Enum;

    fn from_value(value: Option<Value>) -> Result<Self, SqlConnectorError> {
        match value {
            Some(Value::Enum(v)) => Ok(EnumValue(v)),
            other => Err(mismatch(ValueTag::Enum, other.as_ref())),
        }
    }

    fn to_value(&self) -> Option<Value> {
        Some(Value::Enum(self.0))
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    const TAG: ValueTag = T::TAG;
    const NULLABLE: bool = true;

    fn from_value(value: Option<Value>) -> Result<Self, SqlConnectorError> {
        match value {
            None | Some(Value::Null) => Ok(None),
            some => T::from_value(some).map(Some),
        }
    }

    fn to_value(&self) -> Option<Value> {
        self.as_ref().and_then(FieldValue::to_value)
    }
}

/// A record with fields declared at runtime.
///
/// ```rust
/// use sql_connector::prelude::*;
///
/// let mut user = Record::builder()
///     .field("id", ValueTag::Int64)
///     .nullable_field("nickname", ValueTag::String)
///     .primary_key("id")
///     .build();
/// user.set("nickname", Value::String("al".into())).unwrap();
/// assert_eq!(user.get("nickname"), Some(&Value::String("al".into())));
/// assert!(user.get("id").is_none());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    fields: Vec<FieldDescriptor>,
    values: HashMap<String, Value>,
    primary_key: Option<usize>,
}

impl Record {
    #[must_use]
    pub fn builder() -> RecordBuilder {
        RecordBuilder::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Assign a field directly; the value's tag must match the declaration.
    ///
    /// # Errors
    /// Returns `SqlConnectorError::ConsistencyError` for unknown fields or mismatched tags.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), SqlConnectorError> {
        let field = self.field(name).ok_or_else(|| {
            SqlConnectorError::ConsistencyError(format!("record has no field named {name}"))
        })?;
        self.write(&field, Some(value))
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Drop every stored value, keeping the field declarations.
    pub fn clear(&mut self) {
        self.values.clear();
    }
}

impl RowSink for Record {
    fn field(&self, column: &str) -> Option<FieldDescriptor> {
        self.fields.iter().find(|f| f.name == column).cloned()
    }

    fn write(
        &mut self,
        field: &FieldDescriptor,
        value: Option<Value>,
    ) -> Result<(), SqlConnectorError> {
        match value {
            None | Some(Value::Null) => {
                if !field.nullable {
                    return Err(mismatch(field.tag, None));
                }
                self.values.remove(&field.name);
            }
            Some(value) => {
                if value.tag() != Some(field.tag) {
                    return Err(mismatch(field.tag, Some(&value)));
                }
                self.values.insert(field.name.clone(), value);
            }
        }
        Ok(())
    }

    fn read(&self, field: &FieldDescriptor) -> Option<Value> {
        self.values.get(&field.name).cloned()
    }

    fn primary_key(&self) -> Option<FieldDescriptor> {
        self.primary_key.map(|idx| self.fields[idx].clone())
    }
}

/// Fluent builder for [`Record`].
#[derive(Debug, Default)]
pub struct RecordBuilder {
    fields: Vec<FieldDescriptor>,
    primary_key: Option<String>,
}

impl RecordBuilder {
    #[must_use]
    pub fn field(mut self, name: &str, tag: ValueTag) -> Self {
        self.fields.push(FieldDescriptor::new(name, tag, false));
        self
    }

    #[must_use]
    pub fn nullable_field(mut self, name: &str, tag: ValueTag) -> Self {
        self.fields.push(FieldDescriptor::new(name, tag, true));
        self
    }

    /// Mark an already-declared field as the primary key.
    #[must_use]
    pub fn primary_key(mut self, name: &str) -> Self {
        self.primary_key = Some(name.to_owned());
        self
    }

    /// A primary key naming an undeclared field is ignored.
    #[must_use]
    pub fn build(self) -> Record {
        let primary_key = self
            .primary_key
            .and_then(|pk| self.fields.iter().position(|f| f.name == pk));
        Record {
            fields: self.fields,
            values: HashMap::new(),
            primary_key,
        }
    }
}

/// Implement [`RowSink`] for a struct whose fields implement [`FieldValue`].
///
/// Column names match field names. `Option<T>` fields are nullable.
///
/// ```rust
/// use sql_connector::impl_row_sink;
///
/// #[derive(Debug, Default)]
/// struct User {
///     id: i64,
///     name: String,
///     email: Option<String>,
/// }
///
/// impl_row_sink!(User { id, name, email }, primary_key = id);
/// ```
#[macro_export]
macro_rules! impl_row_sink {
    ($ty:ident { $($field:ident),+ $(,)? } $(, primary_key = $pk:ident)?) => {
        impl $crate::reflect::RowSink for $ty {
            fn field(&self, column: &str) -> Option<$crate::reflect::FieldDescriptor> {
                match column {
                    $(
                        stringify!($field) => Some($crate::reflect::FieldDescriptor::describe(
                            stringify!($field),
                            &self.$field,
                        )),
                    )+
                    _ => None,
                }
            }

            fn write(
                &mut self,
                field: &$crate::reflect::FieldDescriptor,
                value: Option<$crate::types::Value>,
            ) -> Result<(), $crate::error::SqlConnectorError> {
                match field.name() {
                    $(
                        stringify!($field) => {
                            self.$field = $crate::reflect::FieldValue::from_value(value)?;
                            Ok(())
                        }
                    )+
                    other => Err($crate::error::SqlConnectorError::ConsistencyError(format!(
                        "{} has no field named {}",
                        stringify!($ty),
                        other
                    ))),
                }
            }

            fn read(
                &self,
                field: &$crate::reflect::FieldDescriptor,
            ) -> Option<$crate::types::Value> {
                match field.name() {
                    $(
                        stringify!($field) => $crate::reflect::FieldValue::to_value(&self.$field),
                    )+
                    _ => None,
                }
            }

            $(
                fn primary_key(&self) -> Option<$crate::reflect::FieldDescriptor> {
                    $crate::reflect::RowSink::field(self, stringify!($pk))
                }
            )?
        }
    };
}
