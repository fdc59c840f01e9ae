// rust/corpus-core/src/dataset/registry.rs

//! Runtime type registry used to rebuild datasets from pointers.
//!
//! A pointer carries an identity triple (`module`, `qualname`, `type`). The
//! registry maps `(module, qualname)` to a constructor and checks that the
//! declared `type` agrees with the registered one before delegating to that
//! type's `from_dict`. Adapters compiled outside this crate register
//! themselves at startup with [`DatasetRegistry::register`].

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::concat::ConcatDataset;
use super::traits::Dataset;
use crate::corpus::{AudioDecoder, MemoryDataset, TalkDataset, UtteranceDataset};
use crate::error::{CorpusError, Result};
use crate::value::{Value, ValueMap};
use crate::wrapper::asr::{AsrConcatDataset, AsrDataset};
use crate::wrapper::DatasetWrapper;

pub const MODULE_KEY: &str = "module";
pub const QUALNAME_KEY: &str = "qualname";
pub const TYPE_KEY: &str = "type";
pub const METHOD_KEY: &str = "method";

/// `method` value for embedded reconstruction data.
pub const FROM_DICT: &str = "from_dict";
/// `method` value for nested pointer data.
pub const FROM_POINTER: &str = "from_pointer";

const ABSTRACT_TYPES: [&str; 2] = ["Dataset", "DatasetWrapper"];

/// Identity of a concrete dataset or wrapper type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeIdentity {
    pub module: String,
    pub qualname: String,
    pub type_name: String,
}

impl TypeIdentity {
    pub fn new(module: impl Into<String>, type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        Self {
            module: module.into(),
            qualname: type_name.clone(),
            type_name,
        }
    }

    pub fn write_into(&self, map: &mut ValueMap) {
        map.insert(MODULE_KEY.to_string(), Value::from(self.module.as_str()));
        map.insert(QUALNAME_KEY.to_string(), Value::from(self.qualname.as_str()));
        map.insert(TYPE_KEY.to_string(), Value::from(self.type_name.as_str()));
    }

    pub fn to_value(&self) -> Value {
        let mut map = ValueMap::new();
        self.write_into(&mut map);
        Value::Map(map)
    }

    /// Reads the identity triple from a map.
    ///
    /// Returns `None` when all three fields are absent; a partial triple is
    /// an invalid argument.
    pub fn read(data: &Value) -> Result<Option<Self>> {
        let present = [MODULE_KEY, QUALNAME_KEY, TYPE_KEY]
            .iter()
            .filter(|key| data.get(key).is_some())
            .count();
        match present {
            0 => Ok(None),
            3 => Ok(Some(Self {
                module: data.require_str(MODULE_KEY)?.to_string(),
                qualname: data.require_str(QUALNAME_KEY)?.to_string(),
                type_name: data.require_str(TYPE_KEY)?.to_string(),
            })),
            _ => Err(CorpusError::invalid_argument(
                "Invalid pointer data: missing module, qualname, or type",
            )),
        }
    }

    /// Copy of `data` without the identity fields.
    pub fn strip(data: &Value) -> Result<Value> {
        let mut map = data.clone().into_map()?;
        for key in [MODULE_KEY, QUALNAME_KEY, TYPE_KEY] {
            map.remove(key);
        }
        Ok(Value::Map(map))
    }

    fn key(&self) -> (String, String) {
        (self.module.clone(), self.qualname.clone())
    }
}

impl fmt::Display for TypeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.module, self.qualname)
    }
}

/// A concrete dataset type that can be rebuilt from its dict form.
pub trait DatasetType: Dataset + Sized {
    const MODULE: &'static str;
    const TYPE_NAME: &'static str;

    fn from_dict(data: &Value, registry: &DatasetRegistry) -> Result<Self>;

    fn type_identity() -> TypeIdentity {
        TypeIdentity::new(Self::MODULE, Self::TYPE_NAME)
    }

    /// Resolves a pointer through the registry and requires the result to
    /// be `Self`.
    fn from_pointer(data: &Value, registry: &DatasetRegistry) -> Result<Self> {
        let dataset = registry.dataset_from_pointer(data)?;
        let found = dataset.type_name();
        dataset
            .into_any()
            .downcast::<Self>()
            .map(|d| *d)
            .map_err(|_| {
                CorpusError::type_mismatch(format!(
                    "expected {}, got {found}",
                    Self::TYPE_NAME
                ))
            })
    }
}

type DatasetCtor = fn(&Value, &DatasetRegistry) -> Result<Box<dyn Dataset>>;
type WrapperCtor = fn(&Value, &DatasetRegistry) -> Result<Box<dyn Any + Send>>;

#[derive(Clone, Copy)]
enum Constructor {
    Dataset(DatasetCtor),
    Wrapper(WrapperCtor),
}

#[derive(Clone, Copy)]
struct Entry {
    type_name: &'static str,
    ctor: Constructor,
}

fn construct_dataset<T: DatasetType>(
    data: &Value,
    registry: &DatasetRegistry,
) -> Result<Box<dyn Dataset>> {
    Ok(Box::new(T::from_dict(data, registry)?))
}

fn construct_wrapper<W: DatasetWrapper>(
    data: &Value,
    registry: &DatasetRegistry,
) -> Result<Box<dyn Any + Send>> {
    Ok(Box::new(W::from_dict(data, registry)?))
}

/// Maps type identities to constructors, plus the collaborators adapters
/// need while decoding (the audio decoder).
#[derive(Clone)]
pub struct DatasetRegistry {
    entries: HashMap<(String, String), Entry>,
    decoder: Option<Arc<dyn AudioDecoder>>,
}

impl DatasetRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            decoder: None,
        }
    }

    /// A registry pre-loaded with every dataset and wrapper type in this
    /// crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register::<MemoryDataset>()
            .register::<UtteranceDataset>()
            .register::<TalkDataset>()
            .register::<ConcatDataset>()
            .register_wrapper::<AsrDataset>()
            .register_wrapper::<AsrConcatDataset>();
        registry
    }

    pub fn register<T: DatasetType>(&mut self) -> &mut Self {
        self.insert(
            T::type_identity(),
            T::TYPE_NAME,
            Constructor::Dataset(construct_dataset::<T>),
        )
    }

    pub fn register_wrapper<W: DatasetWrapper>(&mut self) -> &mut Self {
        self.insert(
            W::type_identity(),
            W::TYPE_NAME,
            Constructor::Wrapper(construct_wrapper::<W>),
        )
    }

    fn insert(
        &mut self,
        identity: TypeIdentity,
        type_name: &'static str,
        ctor: Constructor,
    ) -> &mut Self {
        self.entries.insert(identity.key(), Entry { type_name, ctor });
        self
    }

    #[must_use]
    pub fn with_decoder(mut self, decoder: Arc<dyn AudioDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn set_decoder(&mut self, decoder: Arc<dyn AudioDecoder>) {
        self.decoder = Some(decoder);
    }

    pub fn decoder(&self) -> Option<Arc<dyn AudioDecoder>> {
        self.decoder.clone()
    }

    pub fn contains(&self, identity: &TypeIdentity) -> bool {
        self.entries.contains_key(&identity.key())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, identity: &TypeIdentity) -> Result<Entry> {
        if ABSTRACT_TYPES.contains(&identity.qualname.as_str()) {
            return Err(CorpusError::type_mismatch(format!(
                "Cannot instantiate {} directly",
                identity.qualname
            )));
        }
        let entry = self.entries.get(&identity.key()).copied().ok_or_else(|| {
            CorpusError::type_mismatch(format!("{identity} is not a registered type"))
        })?;
        if entry.type_name != identity.type_name {
            return Err(CorpusError::type_mismatch(format!(
                "expected {}, got {}",
                entry.type_name, identity.type_name
            )));
        }
        Ok(entry)
    }

    /// Builds a dataset of the given type from its dict form.
    pub fn dataset_from_dict(
        &self,
        identity: &TypeIdentity,
        data: &Value,
    ) -> Result<Box<dyn Dataset>> {
        match self.lookup(identity)?.ctor {
            Constructor::Dataset(ctor) => ctor(data, self),
            Constructor::Wrapper(_) => Err(CorpusError::type_mismatch(format!(
                "{identity} is not a Dataset type"
            ))),
        }
    }

    /// Builds a dataset from a pointer, which must carry a full identity.
    pub fn dataset_from_pointer(&self, data: &Value) -> Result<Box<dyn Dataset>> {
        let identity = TypeIdentity::read(data)?.ok_or_else(|| {
            CorpusError::serialization("dataset pointer has no module, qualname or type")
        })?;
        self.dataset_from_dict(&identity, &TypeIdentity::strip(data)?)
    }

    /// Builds a wrapper of the given type from data with the identity
    /// already stripped.
    pub fn wrapper_from_dict(
        &self,
        identity: &TypeIdentity,
        data: &Value,
    ) -> Result<Box<dyn Any + Send>> {
        match self.lookup(identity)?.ctor {
            Constructor::Wrapper(ctor) => ctor(data, self),
            Constructor::Dataset(_) => Err(CorpusError::type_mismatch(format!(
                "{identity} is not a DatasetWrapper type"
            ))),
        }
    }
}

impl Default for DatasetRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for DatasetRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.entries.values().map(|e| e.type_name).collect();
        types.sort_unstable();
        f.debug_struct("DatasetRegistry")
            .field("types", &types)
            .field("decoder", &self.decoder.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::testing::dummy_dataset;
    use crate::dataset::TaskSet;

    #[test]
    fn test_builtins_are_registered() {
        let registry = DatasetRegistry::with_builtins();
        assert!(registry.contains(&MemoryDataset::type_identity()));
        assert!(registry.contains(&ConcatDataset::type_identity()));
        assert!(registry.contains(&AsrDataset::type_identity()));
        assert_eq!(registry.len(), 6);
        assert!(DatasetRegistry::new().is_empty());
    }

    #[test]
    fn test_identity_read_all_or_none() {
        let identity = TypeIdentity::new("corpus_core::corpus::memory", "MemoryDataset");
        let mut map = ValueMap::new();
        identity.write_into(&mut map);
        map.insert("task".to_string(), TaskSet::new(["asr"]).to_value());
        let data = Value::Map(map);

        assert_eq!(TypeIdentity::read(&data).unwrap(), Some(identity));
        let stripped = TypeIdentity::strip(&data).unwrap();
        assert_eq!(TypeIdentity::read(&stripped).unwrap(), None);
        assert!(stripped.get("task").is_some());

        let partial = Value::map([("module", Value::from("m")), ("type", Value::from("T"))]);
        let err = TypeIdentity::read(&partial).unwrap_err();
        assert!(matches!(err, CorpusError::InvalidArgument { .. }));
    }

    #[test]
    fn test_pointer_resolution_checks() {
        let registry = DatasetRegistry::with_builtins();
        let pointer = dummy_dataset(5, 0).to_pointer().unwrap();

        let restored = registry.dataset_from_pointer(&pointer).unwrap();
        assert_eq!(restored.type_name(), "MemoryDataset");
        assert_eq!(restored.length().unwrap(), 5);

        let mut renamed = pointer.clone().into_map().unwrap();
        renamed.insert(TYPE_KEY.to_string(), Value::from("OtherDataset"));
        let err = registry.dataset_from_pointer(&Value::Map(renamed)).unwrap_err();
        assert!(err.to_string().contains("Type mismatch"));

        let mut unknown = pointer.clone().into_map().unwrap();
        unknown.insert(QUALNAME_KEY.to_string(), Value::from("Missing"));
        let err = registry.dataset_from_pointer(&Value::Map(unknown)).unwrap_err();
        assert!(err.to_string().contains("not a registered type"));

        let mut base = pointer.into_map().unwrap();
        TypeIdentity::new("corpus_core::dataset::traits", "Dataset").write_into(&mut base);
        let err = registry.dataset_from_pointer(&Value::Map(base)).unwrap_err();
        assert!(err.to_string().contains("Cannot instantiate Dataset"));
    }

    #[test]
    fn test_kind_mismatch() {
        let registry = DatasetRegistry::with_builtins();
        let data = Value::Map(ValueMap::new());

        let err = registry
            .dataset_from_dict(&AsrDataset::type_identity(), &data)
            .unwrap_err();
        assert!(err.to_string().contains("is not a Dataset type"));

        let err = registry
            .wrapper_from_dict(&MemoryDataset::type_identity(), &data)
            .unwrap_err();
        assert!(err.to_string().contains("is not a DatasetWrapper type"));
    }

    #[test]
    fn test_typed_from_pointer_rejects_other_types() {
        let registry = DatasetRegistry::with_builtins();
        let pointer = dummy_dataset(3, 0).to_pointer().unwrap();

        let restored = MemoryDataset::from_pointer(&pointer, &registry).unwrap();
        assert_eq!(restored.length().unwrap(), 3);

        let err = ConcatDataset::from_pointer(&pointer, &registry).unwrap_err();
        assert!(matches!(err, CorpusError::TypeMismatch { .. }));
    }
}
