use std::borrow::Cow;

use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;

/// Values that can be bound as statement parameters or read back from a row.
///
/// ```rust
/// use sql_exec::prelude::*;
///
/// let params = vec![
///     Value::Int(1),
///     Value::Text("alice".into()),
///     Value::Bool(true),
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

/// A [`Value`] lowered to one of the storage classes an embedded engine understands.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageValue<'a> {
    Integer(i64),
    Real(f64),
    Text(Cow<'a, str>),
    Blob(&'a [u8]),
    Null,
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let Value::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let Value::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let Value::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let Value::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    /// Lower to an engine storage class. Booleans become 0/1, timestamps become
    /// `YYYY-MM-DD HH:MM:SS[.fff]` text and JSON is serialized to text.
    #[must_use]
    pub fn to_storage(&self) -> StorageValue<'_> {
        match self {
            Value::Int(i) => StorageValue::Integer(*i),
            Value::Float(f) => StorageValue::Real(*f),
            Value::Text(s) => StorageValue::Text(Cow::Borrowed(s)),
            Value::Bool(b) => StorageValue::Integer(i64::from(*b)),
            Value::Timestamp(dt) => {
                StorageValue::Text(Cow::Owned(dt.format("%F %T%.f").to_string()))
            }
            Value::Null => StorageValue::Null,
            Value::JSON(jval) => StorageValue::Text(Cow::Owned(jval.to_string())),
            Value::Blob(bytes) => StorageValue::Blob(bytes),
        }
    }
}

impl From<StorageValue<'_>> for Value {
    fn from(value: StorageValue<'_>) -> Self {
        match value {
            StorageValue::Integer(i) => Value::Int(i),
            StorageValue::Real(f) => Value::Float(f),
            StorageValue::Text(s) => Value::Text(s.into_owned()),
            StorageValue::Blob(b) => Value::Blob(b.to_vec()),
            StorageValue::Null => Value::Null,
        }
    }
}
