/*!
 * Core data types for buslink.
 *
 * This module defines the value model shared by the protocol pipelines and
 * the host-state surface.
 */
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unique identifier for buslink resources
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Id(String);

impl Id {
    /// Create a new ID with a random UUID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create an ID from a string
    pub fn from_string<S: AsRef<str>>(s: S) -> Self {
        Self(s.as_ref().to_string())
    }

    /// Get the string representation of the ID
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Self::from_string(s)
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Self::from_string(s)
    }
}

/// A dynamically-typed value carried between a bus device and the host state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Integer(i64),
    /// Floating-point value
    Float(f64),
    /// String value
    String(String),
    /// Array of values
    Array(Vec<Value>),
    /// Map of string keys to values
    Object(HashMap<String, Value>),
    /// Binary data
    Binary(Vec<u8>),
}

impl Value {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if the value is numeric (integer or float)
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    /// Try to get a boolean value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get an integer value
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) if *f == (*f as i64) as f64 => Some(*f as i64),
            _ => None,
        }
    }

    /// Try to get a float value
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get an array value
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Try to get an object value
    pub fn as_object(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Try to get binary data
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i as i64)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<u8> for Value {
    fn from(i: u8) -> Self {
        Value::Integer(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
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

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Binary(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(a: Vec<Value>) -> Self {
        Value::Array(a)
    }
}

impl From<HashMap<String, Value>> for Value {
    fn from(o: HashMap<String, Value>) -> Self {
        Value::Object(o)
    }
}

/// A key-value map of entity attributes or resource metadata
pub type Metadata = HashMap<String, Value>;

/// A reference-counted value
pub type SharedValue = Arc<Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_creation() {
        let id = Id::new();
        assert!(!id.as_str().is_empty());

        let id = Id::from_string("sensor.kitchen");
        assert_eq!(id.as_str(), "sensor.kitchen");

        let id: Id = "light.hall".into();
        assert_eq!(format!("{}", id), "light.hall");
    }

    #[test]
    fn test_value_accessors() {
        let v = Value::Bool(true);
        assert_eq!(v.as_bool(), Some(true));
        assert_eq!(v.as_integer(), None);

        let v = Value::Integer(42);
        assert!(v.is_numeric());
        assert_eq!(v.as_integer(), Some(42));
        assert_eq!(v.as_float(), Some(42.0));

        let v = Value::Float(21.5);
        assert_eq!(v.as_integer(), None);
        assert_eq!(v.as_float(), Some(21.5));

        let v = Value::Float(3.0);
        assert_eq!(v.as_integer(), Some(3));

        let v = Value::String("on".to_string());
        assert_eq!(v.as_str(), Some("on"));

        let v = Value::Binary(vec![0xfc]);
        assert_eq!(v.as_binary(), Some(&[0xfc][..]));

        assert!(Value::Null.is_null());
        assert!(Value::default().is_null());
    }

    #[test]
    fn test_value_conversions() {
        let v: Value = true.into();
        assert_eq!(v, Value::Bool(true));

        let v: Value = 99i64.into();
        assert_eq!(v, Value::Integer(99));

        let v: Value = 0xfcu8.into();
        assert_eq!(v, Value::Integer(252));

        let v: Value = "open".into();
        assert_eq!(v, Value::String("open".to_string()));

        let v: Value = vec![1u8, 2, 3].into();
        assert_eq!(v.as_binary(), Some(&[1u8, 2, 3][..]));
    }
}
