// rust/corpus-core/src/value.rs

//! Plain nested values.
//!
//! `Value` is the only shape that crosses a persistence boundary: dataset
//! `to_dict`/`to_pointer` output, eager sample payload fields and descriptor
//! payloads are all built from it. It never holds a live object reference.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CorpusError, Result};

/// A string-keyed mapping of values.
pub type ValueMap = BTreeMap<String, Value>;

/// A plain nested value: primitives, bytes, lists and string-keyed maps.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    /// Dense float array, typically a decoded waveform.
    Floats(Vec<f32>),
    List(Vec<Value>),
    Map(ValueMap),
}

impl Value {
    /// Builds a map value from key/value pairs.
    pub fn map<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Map(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view; integers widen to `f64`.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_floats(&self) -> Option<&[f32]> {
        match self {
            Value::Floats(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Unwraps a map value; anything else is a serialization error.
    pub fn into_map(self) -> Result<ValueMap> {
        match self {
            Value::Map(m) => Ok(m),
            other => Err(CorpusError::serialization(format!(
                "expected a map, got {}",
                other.kind()
            ))),
        }
    }

    /// Looks up `key` when this value is a map.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Floats(_) => "floats",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn require(&self, key: &str) -> Result<&Value> {
        let map = self.as_map().ok_or_else(|| {
            CorpusError::serialization(format!(
                "expected a map holding '{key}', got {}",
                self.kind()
            ))
        })?;
        map.get(key)
            .ok_or_else(|| CorpusError::serialization(format!("missing key '{key}'")))
    }

    pub fn require_str(&self, key: &str) -> Result<&str> {
        let value = self.require(key)?;
        value.as_str().ok_or_else(|| shape_error(key, "string", value))
    }

    pub fn require_int(&self, key: &str) -> Result<i64> {
        let value = self.require(key)?;
        value.as_int().ok_or_else(|| shape_error(key, "int", value))
    }

    pub fn require_float(&self, key: &str) -> Result<f64> {
        let value = self.require(key)?;
        value.as_float().ok_or_else(|| shape_error(key, "float", value))
    }

    pub fn require_list(&self, key: &str) -> Result<&[Value]> {
        let value = self.require(key)?;
        value.as_list().ok_or_else(|| shape_error(key, "list", value))
    }

    /// Reads `key` as a list of strings.
    pub fn require_str_list(&self, key: &str) -> Result<Vec<String>> {
        self.require_list(key)?
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| shape_error(key, "list of strings", v))
            })
            .collect()
    }

    /// Reads a non-negative integer stored under `key`.
    pub fn require_usize(&self, key: &str) -> Result<usize> {
        let raw = self.require_int(key)?;
        usize::try_from(raw).map_err(|_| {
            CorpusError::serialization(format!("key '{key}' must be non-negative, got {raw}"))
        })
    }

    /// Encodes this value as JSON text.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| CorpusError::serialization(format!("failed to encode JSON: {e}")))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| CorpusError::serialization(format!("failed to decode JSON: {e}")))
    }
}

fn shape_error(key: &str, expected: &str, got: &Value) -> CorpusError {
    CorpusError::serialization(format!(
        "key '{key}' must be a {expected}, got {}",
        got.kind()
    ))
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<f32>> for Value {
    fn from(v: Vec<f32>) -> Self {
        Value::Floats(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::List(v.into_iter().map(Value::Str).collect())
    }
}

impl From<ValueMap> for Value {
    fn from(v: ValueMap) -> Self {
        Value::Map(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
