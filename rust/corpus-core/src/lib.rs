// rust/corpus-core/src/lib.rs

//! Speech Corpus Loader - Core Library
//!
//! This crate provides the dataset layer of a speech-corpus toolkit:
//! uniformly indexable datasets with lazy per-sample loading, composition by
//! concatenation and subsetting, an LRU sample cache, persistence through
//! dict and pointer forms, and typed facades with threaded prefetching.

pub mod config;
pub mod error;
pub mod value;

// Re-export commonly used types for convenience
pub use config::{CorpusConfig, PrefetchConfig};
pub use error::{CorpusError, Result};
pub use value::{Value, ValueMap};

pub mod sample;
pub use sample::{Field, Loader, Sample};

pub mod dataset;
pub use dataset::{
    ConcatDataset, Dataset, DatasetRegistry, IndexedDataset, Item, Key, SampleCache, SliceSpec,
    TaskSet,
};

pub mod corpus;
pub use corpus::{AudioDecoder, MemoryDataset, TalkDataset, UtteranceDataset, Waveform};

pub mod wrapper;
pub use wrapper::asr::{AsrConcatDataset, AsrDataset, AsrSample, DiarizationSegment};
pub use wrapper::{DatasetWrapper, ThreadedPrefetchIterator, WrapperItem};

pub mod descriptor;
pub use descriptor::{DescriptorReader, DescriptorWriter};
