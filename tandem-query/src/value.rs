//! Driver-neutral column and parameter values.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{QueryError, QueryResult};

/// A single SQL value, used both for bound parameters and for fetched columns.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Any integer column.
    Int(i64),
    /// Any floating point column.
    Float(f64),
    /// Text.
    Text(String),
    /// Binary data.
    Bytes(Vec<u8>),
    /// JSON document.
    Json(serde_json::Value),
    /// Timestamp without time zone (UTC for zoned columns).
    Timestamp(NaiveDateTime),
    /// UUID.
    Uuid(Uuid),
}

impl Value {
    /// Check if the value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Name of the variant, used in conversion errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Json(_) => "json",
            Self::Timestamp(_) => "timestamp",
            Self::Uuid(_) => "uuid",
        }
    }

    /// Interpret the value as an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Interpret the value as a boolean.
    ///
    /// MySQL and SQLite have no boolean storage type, so integers are accepted.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(i) => Some(*i != 0),
            _ => None,
        }
    }
}

macro_rules! impl_from_for_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(v.into())
                }
            }
        )*
    };
}

impl_from_for_value! {
    bool => Bool,
    i16 => Int,
    i32 => Int,
    i64 => Int,
    u8 => Int,
    u16 => Int,
    u32 => Int,
    f32 => Float,
    f64 => Float,
    String => Text,
    Vec<u8> => Bytes,
    serde_json::Value => Json,
    NaiveDateTime => Timestamp,
    Uuid => Uuid,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v.naive_utc())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Conversion from a fetched [`Value`] into a Rust type.
pub trait FromValue: Sized {
    /// Convert the value, failing with [`QueryError::invalid_type`] on a mismatch.
    fn from_value(value: Value) -> QueryResult<Self>;
}

fn mismatch(expected: &str, value: &Value) -> QueryError {
    QueryError::invalid_type(format!(
        "expected {}, found {} value",
        expected,
        value.type_name()
    ))
}

impl FromValue for Value {
    fn from_value(value: Value) -> QueryResult<Self> {
        Ok(value)
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> QueryResult<Self> {
        value.as_i64().ok_or_else(|| mismatch("int", &value))
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> QueryResult<Self> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide).map_err(|_| QueryError::invalid_type(format!("{} overflows i32", wide)))
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> QueryResult<Self> {
        value.as_bool().ok_or_else(|| mismatch("bool", &value))
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> QueryResult<Self> {
        match value {
            Value::Float(f) => Ok(f),
            Value::Int(i) => Ok(i as f64),
            other => Err(mismatch("float", &other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> QueryResult<Self> {
        match value {
            Value::Text(s) => Ok(s),
            Value::Bytes(b) => String::from_utf8(b)
                .map_err(|e| QueryError::invalid_type(format!("invalid utf-8: {}", e))),
            other => Err(mismatch("text", &other)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> QueryResult<Self> {
        match value {
            Value::Bytes(b) => Ok(b),
            Value::Text(s) => Ok(s.into_bytes()),
            other => Err(mismatch("bytes", &other)),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: Value) -> QueryResult<Self> {
        match value {
            Value::Json(j) => Ok(j),
            Value::Text(s) => serde_json::from_str(&s)
                .map_err(|e| QueryError::invalid_type(format!("invalid json: {}", e))),
            other => Err(mismatch("json", &other)),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> QueryResult<Self> {
        match value {
            Value::Timestamp(ts) => Ok(ts),
            Value::Text(s) => NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S%.f"))
                .map_err(|e| QueryError::invalid_type(format!("invalid timestamp: {}", e))),
            other => Err(mismatch("timestamp", &other)),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: Value) -> QueryResult<Self> {
        match value {
            Value::Uuid(u) => Ok(u),
            Value::Text(s) => Uuid::parse_str(&s)
                .map_err(|e| QueryError::invalid_type(format!("invalid uuid: {}", e))),
            Value::Bytes(b) => Uuid::from_slice(&b)
                .map_err(|e| QueryError::invalid_type(format!("invalid uuid: {}", e))),
            other => Err(mismatch("uuid", &other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> QueryResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_into_value() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(7_i32)), Value::Int(7));
        assert_eq!(Value::from("x"), Value::Text("x".into()));
    }

    #[test]
    fn test_bool_from_int() {
        assert!(bool::from_value(Value::Int(1)).unwrap());
        assert!(!bool::from_value(Value::Int(0)).unwrap());
        assert!(bool::from_value(Value::Text("yes".into())).is_err());
    }

    #[test]
    fn test_i32_overflow() {
        let err = i32::from_value(Value::Int(i64::MAX)).unwrap_err();
        assert!(err.message.contains("overflows"));
    }

    #[test]
    fn test_option_from_null() {
        assert_eq!(Option::<String>::from_value(Value::Null).unwrap(), None);
        assert_eq!(
            Option::<String>::from_value(Value::Text("a".into())).unwrap(),
            Some("a".to_string())
        );
    }

    #[test]
    fn test_timestamp_from_text() {
        let ts = NaiveDateTime::from_value(Value::Text("2024-01-02 03:04:05".into())).unwrap();
        assert_eq!(ts.to_string(), "2024-01-02 03:04:05");
    }
}
