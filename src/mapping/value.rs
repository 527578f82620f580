use std::{cmp::Ordering, fmt};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::CsvError;

/// Target type of a string conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Text,
    Bool,
    Integer,
    Float,
    Date,
    Time,
    DateTime,
}

/// A typed field value, as stored in records and compared by filters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Time(NaiveTime),
    /// Date and time, in UTC when a timezone is involved.
    DateTime(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ValueType::Bool),
            Value::Integer(_) => Some(ValueType::Integer),
            Value::Float(_) => Some(ValueType::Float),
            Value::Text(_) => Some(ValueType::Text),
            Value::Date(_) => Some(ValueType::Date),
            Value::Time(_) => Some(ValueType::Time),
            Value::DateTime(_) => Some(ValueType::DateTime),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Orders two values of compatible types; integers and floats compare numerically.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Integer(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(value) => write!(f, "{}", value),
            Value::Integer(value) => write!(f, "{}", value),
            Value::Float(value) => write!(f, "{}", value),
            Value::Text(value) => f.write_str(value),
            Value::Date(value) => write!(f, "{}", value),
            Value::Time(value) => write!(f, "{}", value),
            Value::DateTime(value) => write!(f, "{}", value.format("%Y-%m-%d %H:%M:%S%.f")),
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value.into())
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Integer(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl From<NaiveTime> for Value {
    fn from(value: NaiveTime) -> Self {
        Value::Time(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::DateTime(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Conversion from a [`Value`] into a record field type.
///
/// Null converts to the type's default for plain std types and to `None` for
/// `Option`s; chrono types have no default and reject null.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, CsvError>;
}

fn mismatch<T>(expected: &str, value: &Value) -> Result<T, CsvError> {
    Err(CsvError::Conversion(format!(
        "expected {} but got {:?}",
        expected, value
    )))
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, CsvError> {
        match value {
            Value::Null => Ok(String::new()),
            Value::Text(text) => Ok(text),
            other => Ok(other.to_string()),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, CsvError> {
        match value {
            Value::Null => Ok(false),
            Value::Bool(value) => Ok(value),
            other => mismatch("a boolean", &other),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self, CsvError> {
        match value {
            Value::Null => Ok(0),
            Value::Integer(value) => Ok(value),
            Value::Float(value) if value.fract() == 0.0 => Ok(value as i64),
            other => mismatch("an integer", &other),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Result<Self, CsvError> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide)
            .map_err(|_| CsvError::Conversion(format!("{} does not fit in i32", wide)))
    }
}

impl FromValue for u32 {
    fn from_value(value: Value) -> Result<Self, CsvError> {
        let wide = i64::from_value(value)?;
        u32::try_from(wide)
            .map_err(|_| CsvError::Conversion(format!("{} does not fit in u32", wide)))
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, CsvError> {
        match value {
            Value::Null => Ok(0.0),
            Value::Float(value) => Ok(value),
            Value::Integer(value) => Ok(value as f64),
            other => mismatch("a number", &other),
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: Value) -> Result<Self, CsvError> {
        match value {
            Value::Date(value) => Ok(value),
            Value::DateTime(value) => Ok(value.date()),
            other => mismatch("a date", &other),
        }
    }
}

impl FromValue for NaiveTime {
    fn from_value(value: Value) -> Result<Self, CsvError> {
        match value {
            Value::Time(value) => Ok(value),
            Value::DateTime(value) => Ok(value.time()),
            other => mismatch("a time", &other),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> Result<Self, CsvError> {
        match value {
            Value::DateTime(value) => Ok(value),
            Value::Date(value) => Ok(value.and_time(NaiveTime::MIN)),
            other => mismatch("a date-time", &other),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, CsvError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}
