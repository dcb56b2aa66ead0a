//! Dynamically typed RPC values
//!
//! Remote objects are opaque to this crate: records come back as
//! [`Value::Struct`] maps and object handles as plain strings.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::ProtocolError;

/// A single XML-RPC value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `<int>`, `<i4>` or `<i8>`
    Int(i64),
    /// `<boolean>`
    Bool(bool),
    /// `<string>` or an untyped `<value>`
    String(String),
    /// `<double>`
    Double(f64),
    /// `<dateTime.iso8601>`, kept verbatim
    DateTime(String),
    /// `<base64>`, kept verbatim (still encoded)
    Base64(String),
    /// `<struct>` of named members
    Struct(BTreeMap<String, Value>),
    /// `<array>`
    Array(Vec<Value>),
    /// `<nil/>`
    Nil,
}

impl Value {
    /// Build a struct value from name/value pairs
    pub fn structure<K, I>(members: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Struct(members.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Human-readable name of this value's type
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Bool(_) => "boolean",
            Value::String(_) => "string",
            Value::Double(_) => "double",
            Value::DateTime(_) => "dateTime.iso8601",
            Value::Base64(_) => "base64",
            Value::Struct(_) => "struct",
            Value::Array(_) => "array",
            Value::Nil => "nil",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric view; integers widen to `f64`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Struct(members) => Some(members),
            _ => None,
        }
    }

    /// Look up a struct member by name
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_struct().and_then(|members| members.get(key))
    }

    /// Take the string out of a string value
    pub fn into_string(self) -> Result<String, ProtocolError> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(ProtocolError::UnexpectedType {
                expected: "string",
                found: other.type_name(),
            }),
        }
    }

    /// Take the items out of an array value
    pub fn into_array(self) -> Result<Vec<Value>, ProtocolError> {
        match self {
            Value::Array(items) => Ok(items),
            other => Err(ProtocolError::UnexpectedType {
                expected: "array",
                found: other.type_name(),
            }),
        }
    }

    /// Interpret an array of strings, as used by error descriptions and task error info
    pub fn into_string_list(self) -> Result<Vec<String>, ProtocolError> {
        self.into_array()?
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                Value::Struct(_) | Value::Array(_) => Err(ProtocolError::UnexpectedType {
                    expected: "string",
                    found: item.type_name(),
                }),
                scalar => Ok(scalar.to_string()),
            })
            .collect()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Bool(b) => write!(f, "{}", b),
            Value::String(s) | Value::DateTime(s) | Value::Base64(s) => f.write_str(s),
            Value::Double(d) => write!(f, "{}", d),
            Value::Struct(members) => {
                f.write_str("{")?;
                for (i, (k, v)) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                f.write_str("}")
            }
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                f.write_str("]")
            }
            Value::Nil => f.write_str("nil"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::String(s.clone())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(members: BTreeMap<String, Value>) -> Self {
        Value::Struct(members)
    }
}
