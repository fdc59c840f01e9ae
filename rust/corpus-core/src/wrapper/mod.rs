// rust/corpus-core/src/wrapper/mod.rs

//! Typed facades over datasets.
//!
//! A [`DatasetWrapper`] owns a dataset and narrows its generic samples into
//! a domain view. Indexing, composition, caching and serialization are all
//! delegated to the wrapped dataset; derived datasets come back re-wrapped
//! in the same facade type.

pub mod asr;
pub mod prefetch;

use std::fmt;
use std::marker::PhantomData;

use rand::RngCore;

use crate::dataset::{
    Dataset, DatasetIter, DatasetRegistry, Item, Key, SliceSpec, TaskSet, TypeIdentity,
    FROM_DICT, FROM_POINTER, METHOD_KEY,
};
use crate::error::{CorpusError, Result};
use crate::sample::Sample;
use crate::value::{Value, ValueMap};

pub use prefetch::{Prefetch, PrefetchConfig, ThreadedPrefetchIterator};

/// Result of [`DatasetWrapper::getitem`].
pub enum WrapperItem<W: DatasetWrapper> {
    Sample(W::Sample),
    Wrapper(W),
}

impl<W: DatasetWrapper> WrapperItem<W> {
    pub fn into_sample(self) -> Result<W::Sample> {
        match self {
            WrapperItem::Sample(s) => Ok(s),
            WrapperItem::Wrapper(_) => Err(CorpusError::type_mismatch(
                "expected a sample, got a dataset wrapper",
            )),
        }
    }

    pub fn into_wrapper(self) -> Result<W> {
        match self {
            WrapperItem::Wrapper(w) => Ok(w),
            WrapperItem::Sample(_) => Err(CorpusError::type_mismatch(
                "expected a dataset wrapper, got a sample",
            )),
        }
    }
}

impl<W> fmt::Debug for WrapperItem<W>
where
    W: DatasetWrapper + fmt::Debug,
    W::Sample: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WrapperItem::Sample(s) => f.debug_tuple("Sample").field(s).finish(),
            WrapperItem::Wrapper(w) => f.debug_tuple("Wrapper").field(w).finish(),
        }
    }
}

/// A typed facade over an owned dataset.
pub trait DatasetWrapper: Sized + Send + 'static {
    type Sample: Prefetch;

    const MODULE: &'static str;
    const TYPE_NAME: &'static str;

    fn dataset(&self) -> &dyn Dataset;

    fn dataset_mut(&mut self) -> &mut dyn Dataset;

    fn into_dataset(self) -> Box<dyn Dataset>;

    /// Wraps `dataset`, checking whatever this facade requires of it.
    fn wrap(dataset: Box<dyn Dataset>) -> Result<Self>;

    fn narrow(sample: Sample) -> Self::Sample;

    fn type_identity() -> TypeIdentity {
        TypeIdentity::new(Self::MODULE, Self::TYPE_NAME)
    }

    fn name(&self) -> &'static str {
        self.dataset().name()
    }

    fn task(&self) -> &TaskSet {
        self.dataset().task()
    }

    fn is_cleaned(&self) -> bool {
        self.dataset().is_cleaned()
    }

    fn length(&self) -> Result<usize> {
        self.dataset().length()
    }

    fn get(&self, idx: i64) -> Result<Self::Sample> {
        self.dataset().get(idx).map(Self::narrow)
    }

    fn getitem(&self, key: Key, use_cache: usize) -> Result<WrapperItem<Self>> {
        match self.dataset().getitem(key, use_cache)? {
            Item::Sample(sample) => Ok(WrapperItem::Sample(Self::narrow(sample))),
            Item::Dataset(dataset) => Self::wrap(dataset).map(WrapperItem::Wrapper),
        }
    }

    fn select(&self, indices: &[i64], use_cache: usize) -> Result<Self> {
        Self::wrap(self.dataset().select(indices, use_cache)?)
    }

    fn slice(&self, spec: SliceSpec, use_cache: usize) -> Result<Self> {
        Self::wrap(self.dataset().slice(spec, use_cache)?)
    }

    fn sample(
        &self,
        size: i64,
        start: i64,
        rng: Option<&mut dyn RngCore>,
        use_cache: usize,
    ) -> Result<Self> {
        Self::wrap(self.dataset().sample(size, start, rng, use_cache)?)
    }

    fn clean(&mut self) {
        self.dataset_mut().clean();
    }

    fn iter(&self) -> WrapperIter<'_, Self> {
        WrapperIter {
            inner: self.dataset().iter(),
            _wrapper: PhantomData,
        }
    }

    /// Iterates with each sample's load step run ahead on a worker pool.
    fn thread_iter(
        &self,
        config: &PrefetchConfig,
    ) -> Result<ThreadedPrefetchIterator<'_, Self::Sample>> {
        ThreadedPrefetchIterator::new(self.iter(), config)
    }

    /// `{dataset, class, method: "from_dict"}` with the dataset embedded as
    /// its dict and `class` holding the dataset's type identity.
    fn to_dict(&self) -> Result<Value> {
        let dataset = self.dataset();
        Ok(Value::map([
            ("dataset", dataset.to_dict()?),
            ("class", dataset.identity().to_value()),
            (METHOD_KEY, Value::from(FROM_DICT)),
        ]))
    }

    fn from_dict(data: &Value, registry: &DatasetRegistry) -> Result<Self> {
        let dataset = match data.require_str(METHOD_KEY)? {
            FROM_DICT => {
                let identity = TypeIdentity::read(data.require("class")?)?.ok_or_else(|| {
                    CorpusError::serialization("wrapper class identity is missing")
                })?;
                registry.dataset_from_dict(&identity, data.require("dataset")?)?
            }
            FROM_POINTER => registry.dataset_from_pointer(data.require("dataset")?)?,
            other => {
                return Err(CorpusError::invalid_argument(format!(
                    "Invalid method for deserialization: {other}"
                )))
            }
        };
        Self::wrap(dataset)
    }

    /// The wrapper's identity plus the dataset as a nested pointer.
    fn to_pointer(&self) -> Result<Value> {
        let mut map = ValueMap::new();
        Self::type_identity().write_into(&mut map);
        map.insert("dataset".to_string(), self.dataset().to_pointer()?);
        map.insert(METHOD_KEY.to_string(), Value::from(FROM_POINTER));
        Ok(Value::Map(map))
    }

    /// Rebuilds a wrapper from pointer data.
    ///
    /// With a full identity triple the named wrapper type is resolved
    /// through the registry and must be `Self`; with none, `Self` is used
    /// directly.
    fn from_pointer(data: &Value, registry: &DatasetRegistry) -> Result<Self> {
        let Some(identity) = TypeIdentity::read(data)? else {
            return Self::from_dict(data, registry);
        };
        registry
            .wrapper_from_dict(&identity, &TypeIdentity::strip(data)?)?
            .downcast::<Self>()
            .map(|wrapper| *wrapper)
            .map_err(|_| {
                CorpusError::type_mismatch(format!(
                    "expected {}, got {}",
                    Self::TYPE_NAME,
                    identity.type_name
                ))
            })
    }
}

/// Iterator over a wrapper's narrowed samples, in index order.
pub struct WrapperIter<'a, W: DatasetWrapper> {
    inner: DatasetIter<'a>,
    _wrapper: PhantomData<fn() -> W>,
}

impl<W: DatasetWrapper> Iterator for WrapperIter<'_, W> {
    type Item = Result<W::Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|r| r.map(W::narrow))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
