//! Scalar property values.
//!
//! Properties hold exactly one of a closed set of scalar shapes. Anything
//! else (JSON `null`, arrays, objects, non-finite floats) is rejected at the
//! store boundary as a validation failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Short name of the variant, used in logs and error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Boolean(_) => "boolean",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Timestamp(_) => "timestamp",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(v) => Some(*v),
            _ => None,
        }
    }

    /// Check the value is storable. Only floats can be malformed: NaN and
    /// infinities have no stable equality and are refused.
    pub(crate) fn validate(&self, name: &str) -> Result<(), StoreError> {
        match self {
            Value::Float(v) if !v.is_finite() => Err(StoreError::InvalidValue {
                name: name.to_owned(),
                details: format!("float must be finite, got {v}"),
            }),
            _ => Ok(()),
        }
    }

    /// Convert a dynamic JSON value into a property value.
    ///
    /// Numbers map to `Integer` when they fit an `i64` and to `Float`
    /// otherwise. `null`, arrays and objects are rejected.
    pub fn from_json(name: &str, json: serde_json::Value) -> Result<Self, StoreError> {
        let value = match json {
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => match n.as_f64() {
                    Some(f) => Value::Float(f),
                    None => {
                        return Err(StoreError::InvalidValue {
                            name: name.to_owned(),
                            details: format!("number {n} is not representable"),
                        })
                    }
                },
            },
            other => {
                let shape = match other {
                    serde_json::Value::Null => "null",
                    serde_json::Value::Array(_) => "array",
                    _ => "object",
                };
                return Err(StoreError::InvalidValue {
                    name: name.to_owned(),
                    details: format!("{shape} is not a scalar property value"),
                });
            }
        };
        value.validate(name)?;
        Ok(value)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v:?}"),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}

impl TryFrom<serde_json::Value> for Value {
    type Error = StoreError;

    fn try_from(json: serde_json::Value) -> Result<Self, Self::Error> {
        Value::from_json("<unnamed>", json)
    }
}

// -- From impls -------------------------------------------------------------

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
