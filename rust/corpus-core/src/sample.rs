// rust/corpus-core/src/sample.rs

//! Samples: an identity plus a payload bag.
//!
//! Payload fields are either eager [`Value`]s or lazy loaders. Expensive
//! fields such as decoded audio are stored as loaders under a well-known key
//! so consumers decide when the work happens.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::{CorpusError, Result};
use crate::value::{Value, ValueMap};

/// Lazy waveform loader.
pub const LOAD_AUDIO: &str = "load_audio";
/// Reference transcript.
pub const REF: &str = "ref";
/// List of diarization segment maps.
pub const DIARIZATION: &str = "diarization";
/// Source file the sample was derived from.
pub const FILE: &str = "file";
/// Identifier as it appeared in the source corpus, before sanitizing.
pub const ORIGINAL_ID: &str = "original_id";

/// Maximum length of a derived sample id.
pub const MAX_ID_LEN: usize = 255;

/// Zero-argument loader for an expensive payload field.
pub type Loader = Arc<dyn Fn() -> Result<Value> + Send + Sync>;

/// A payload field: either already materialized or produced on demand.
#[derive(Clone)]
pub enum Field {
    Value(Value),
    Lazy(Loader),
}

impl Field {
    pub fn lazy<F>(loader: F) -> Self
    where
        F: Fn() -> Result<Value> + Send + Sync + 'static,
    {
        Field::Lazy(Arc::new(loader))
    }

    /// The eager value, if this field is not lazy.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Field::Value(v) => Some(v),
            Field::Lazy(_) => None,
        }
    }

    pub fn is_lazy(&self) -> bool {
        matches!(self, Field::Lazy(_))
    }

    /// Produces the value, running the loader if needed.
    pub fn resolve(&self) -> Result<Value> {
        match self {
            Field::Value(v) => Ok(v.clone()),
            Field::Lazy(loader) => loader(),
        }
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Field::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

impl From<Value> for Field {
    fn from(v: Value) -> Self {
        Field::Value(v)
    }
}

/// A single corpus item.
///
/// Equality and hashing use the id only; the payload is never compared.
/// Cloning is cheap: the payload is shared.
#[derive(Clone)]
pub struct Sample {
    id: String,
    data: Arc<BTreeMap<String, Field>>,
}

impl Sample {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: Arc::new(BTreeMap::new()),
        }
    }

    pub fn with_data(id: impl Into<String>, data: BTreeMap<String, Field>) -> Self {
        Self {
            id: id.into(),
            data: Arc::new(data),
        }
    }

    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        Arc::make_mut(&mut self.data).insert(key.into(), Field::Value(value.into()));
        self
    }

    #[must_use]
    pub fn with_loader<F>(mut self, key: impl Into<String>, loader: F) -> Self
    where
        F: Fn() -> Result<Value> + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.data).insert(key.into(), Field::lazy(loader));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn data(&self) -> &BTreeMap<String, Field> {
        &self.data
    }

    pub fn field(&self, key: &str) -> Option<&Field> {
        self.data.get(key)
    }

    /// The eager value stored under `key`.
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.field(key).and_then(Field::as_value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Resolves the field under `key`, running its loader if it is lazy.
    pub fn load(&self, key: &str) -> Result<Value> {
        self.field(key)
            .ok_or_else(|| CorpusError::missing_field(key, &self.id))?
            .resolve()
    }

    /// Plain-value form `{id, data}`. Fails if any field is lazy.
    pub fn to_value(&self) -> Result<Value> {
        let mut data = ValueMap::new();
        for (key, field) in self.data.iter() {
            match field {
                Field::Value(v) => {
                    data.insert(key.clone(), v.clone());
                }
                Field::Lazy(_) => {
                    return Err(CorpusError::serialization(format!(
                        "sample '{}' field '{key}' is a lazy loader and cannot be serialized",
                        self.id
                    )));
                }
            }
        }
        Ok(Value::map([
            ("id", Value::from(self.id.as_str())),
            ("data", Value::Map(data)),
        ]))
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let id = value.require_str("id")?;
        let data = match value.get("data") {
            None | Some(Value::Null) => BTreeMap::new(),
            Some(Value::Map(map)) => map
                .iter()
                .map(|(k, v)| (k.clone(), Field::Value(v.clone())))
                .collect(),
            Some(other) => {
                return Err(CorpusError::serialization(format!(
                    "sample '{id}' data must be a map, got {}",
                    other.kind()
                )))
            }
        };
        Ok(Self::with_data(id, data))
    }
}

impl PartialEq for Sample {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Sample {}

impl Hash for Sample {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sample")
            .field("id", &self.id)
            .field("fields", &self.data.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Derives a stable sample id from a raw string such as a file path.
///
/// Whitespace and punctuation are removed and only the trailing
/// [`MAX_ID_LEN`] characters are kept.
pub fn sanitize_id(raw: &str) -> String {
    let kept: Vec<char> = raw.chars().filter(|c| c.is_alphanumeric()).collect();
    let skip = kept.len().saturating_sub(MAX_ID_LEN);
    kept[skip..].iter().collect()
}
