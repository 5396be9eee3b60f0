//! Captured argument values and their declared types.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A captured argument value.
///
/// Only flat, self-contained values cross the boundary. There are no
/// references, so a procedure cannot smuggle an object graph across.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    /// Absence of a value. Also the wire form of a context slot.
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The most specific declared type this value satisfies.
    pub fn arg_type(&self) -> ArgType {
        match self {
            Value::Null => ArgType::Any,
            Value::Bool(_) => ArgType::Bool,
            Value::Integer(_) => ArgType::Integer,
            Value::Float(_) => ArgType::Float,
            Value::String(_) => ArgType::String,
            Value::Bytes(_) => ArgType::Bytes,
            Value::Array(_) => ArgType::Array,
            Value::Map(_) => ArgType::Map,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Declared type of a captured field or a reconstruction parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgType {
    /// The receiving context. Never carried on the wire.
    Context,
    Bool,
    Integer,
    Float,
    String,
    Bytes,
    Array,
    Map,
    /// Any value, including null.
    Any,
}

impl ArgType {
    /// Whether `value` may be bound to a parameter of this type.
    ///
    /// `Null` is accepted by every non-context type. Context parameters are
    /// never bound from the wire.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (ArgType::Context, _) => false,
            (ArgType::Any, _) => true,
            (_, Value::Null) => true,
            (ty, v) => *ty == v.arg_type(),
        }
    }
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArgType::Context => "context",
            ArgType::Bool => "bool",
            ArgType::Integer => "integer",
            ArgType::Float => "float",
            ArgType::String => "string",
            ArgType::Bytes => "bytes",
            ArgType::Array => "array",
            ArgType::Map => "map",
            ArgType::Any => "any",
        };
        f.write_str(name)
    }
}
