// rust/corpus-core/src/dataset/mod.rs

//! Lazily materializing, composable sample datasets.
//!
//! Every dataset implements [`Dataset`]: indexed access with negative
//! indices, slicing and index selection into new datasets, random sampling,
//! a per-instance LRU cache and an explicit `clean` that makes the instance
//! unusable. [`ConcatDataset`] composes datasets into trees, and
//! [`DatasetRegistry`] rebuilds any registered dataset from its pointer
//! form.
//!
//! # Example
//!
//! ```ignore
//! use corpus_core::corpus::MemoryDataset;
//! use corpus_core::dataset::{Dataset, DatasetRegistry, TaskSet};
//!
//! let ds = MemoryDataset::from_ids(["a", "b", "c"], TaskSet::new(["asr"]), 16);
//! let head = ds.slice((0..2).into(), 0)?;
//! let joined = head.concat(Box::new(ds), 0)?;
//!
//! let pointer = joined.to_pointer()?;
//! let restored = DatasetRegistry::with_builtins().dataset_from_pointer(&pointer)?;
//! assert_eq!(restored.length()?, 5);
//! ```

mod cache;
mod concat;
mod indexed;
mod registry;
mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::SampleCache;
pub use concat::ConcatDataset;
pub use indexed::{CorpusRows, IndexedDataset};
pub use registry::{
    DatasetRegistry, DatasetType, TypeIdentity, FROM_DICT, FROM_POINTER, METHOD_KEY, MODULE_KEY,
    QUALNAME_KEY, TYPE_KEY,
};
pub use traits::{
    normalize_index, AsAny, Dataset, DatasetIter, DatasetState, Item, Key, SliceSpec, TaskSet,
};
