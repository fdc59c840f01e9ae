// rust/corpus-core/src/corpus/mod.rs

//! Corpus adapters: leaf datasets over concrete row tables.
//!
//! Each adapter is an [`IndexedDataset`](crate::dataset::IndexedDataset)
//! over its own [`CorpusRows`](crate::dataset::CorpusRows) implementation.
//! Parsing corpus archives and downloading them is left to applications;
//! adapters start from already-parsed records.

pub mod audio;
mod memory;
mod talk;
mod utterance;

pub use audio::{AudioDecoder, Waveform};
pub use memory::{MemoryDataset, MemoryRows};
pub use talk::{
    SegmentRecord, TalkDataset, TalkEntry, TalkIndex, TalkRows, DEFAULT_IGNORE_SET,
};
pub use utterance::{UtteranceDataset, UtteranceRows};
