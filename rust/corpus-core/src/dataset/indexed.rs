// rust/corpus-core/src/dataset/indexed.rs

//! Generic leaf dataset over an injected row table.
//!
//! Corpus adapters describe their rows through [`CorpusRows`]; the
//! [`IndexedDataset`] around them supplies the dataset contract: bounds
//! checks, derivation, caching, cleanup and the dict layout.

use std::fmt;

use super::registry::{DatasetRegistry, DatasetType};
use super::traits::{normalize_index, Dataset, DatasetState, SliceSpec, TaskSet};
use crate::config::CorpusConfig;
use crate::error::{CorpusError, Result};
use crate::sample::Sample;
use crate::value::Value;

/// Row storage of a corpus adapter.
pub trait CorpusRows: fmt::Debug + Send + Sync + Sized + 'static {
    const MODULE: &'static str;
    const TYPE_NAME: &'static str;

    fn row_count(&self) -> usize;

    /// New table holding `rows` in the given order. Rows may repeat and are
    /// already bounds-checked.
    fn take(&self, rows: &[usize]) -> Self;

    /// Builds the sample for one row. Must be pure given the row.
    fn materialize(&self, row: usize) -> Result<Sample>;

    /// Drops heavy handles when the dataset is cleaned.
    fn release(&mut self) {}

    /// Row-specific constructor fields, as a map.
    fn encode(&self) -> Result<Value>;

    fn decode(data: &Value, registry: &DatasetRegistry) -> Result<Self>;

    fn sample_rate(&self) -> Option<u32> {
        None
    }

    fn set_sample_rate(&mut self, rate: u32) -> Result<()> {
        Err(CorpusError::invalid_argument(format!(
            "{} does not carry a sample rate (requested {rate})",
            Self::TYPE_NAME
        )))
    }
}

/// A leaf dataset: a row table plus the shared dataset state.
pub struct IndexedDataset<R: CorpusRows> {
    rows: R,
    state: DatasetState,
}

impl<R: CorpusRows> IndexedDataset<R> {
    pub fn new(rows: R, task: TaskSet, use_cache: usize) -> Self {
        Self {
            rows,
            state: DatasetState::new(task, use_cache),
        }
    }

    /// Like [`new`](Self::new), with the cache capacity taken from `config`.
    pub fn with_config(rows: R, task: TaskSet, config: &CorpusConfig) -> Self {
        Self::new(rows, task, config.cache.capacity)
    }

    pub fn rows(&self) -> &R {
        &self.rows
    }

    fn derive(&self, rows: &[usize], use_cache: usize) -> Box<dyn Dataset> {
        Box::new(Self::new(
            self.rows.take(rows),
            self.task().clone(),
            use_cache,
        ))
    }
}

impl<R: CorpusRows> Dataset for IndexedDataset<R> {
    fn type_name(&self) -> &'static str {
        R::TYPE_NAME
    }

    fn module(&self) -> &'static str {
        R::MODULE
    }

    fn state(&self) -> &DatasetState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut DatasetState {
        &mut self.state
    }

    fn length(&self) -> Result<usize> {
        self.ensure_live("measure")?;
        Ok(self.rows.row_count())
    }

    fn select(&self, indices: &[i64], use_cache: usize) -> Result<Box<dyn Dataset>> {
        self.ensure_live("select from")?;
        let len = self.rows.row_count();
        let rows = indices
            .iter()
            .map(|&idx| normalize_index(idx, len))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.derive(&rows, use_cache))
    }

    fn slice(&self, spec: SliceSpec, use_cache: usize) -> Result<Box<dyn Dataset>> {
        self.ensure_live("slice")?;
        let rows = spec.indices(self.rows.row_count())?;
        Ok(self.derive(&rows, use_cache))
    }

    fn fetch(&self, idx: usize) -> Result<Sample> {
        self.rows.materialize(idx)
    }

    fn release(&mut self) {
        self.rows.release();
    }

    fn sample_rate(&self) -> Option<u32> {
        self.rows.sample_rate()
    }

    fn set_sample_rate(&mut self, rate: u32) -> Result<()> {
        self.ensure_live("resample")?;
        self.rows.set_sample_rate(rate)?;
        // Cached samples hold loaders bound to the old rate.
        self.state.cache().clear();
        Ok(())
    }

    fn to_dict(&self) -> Result<Value> {
        self.ensure_live("serialize")?;
        let mut map = self.state.to_dict();
        map.extend(self.rows.encode()?.into_map()?);
        Ok(Value::Map(map))
    }
}

impl<R: CorpusRows> DatasetType for IndexedDataset<R> {
    const MODULE: &'static str = R::MODULE;
    const TYPE_NAME: &'static str = R::TYPE_NAME;

    fn from_dict(data: &Value, registry: &DatasetRegistry) -> Result<Self> {
        let state = DatasetState::from_dict(data)?;
        let rows = R::decode(data, registry)?;
        Ok(Self { rows, state })
    }
}

impl<R: CorpusRows> fmt::Debug for IndexedDataset<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(R::TYPE_NAME)
            .field("task", self.task())
            .field("rows", &self.rows)
            .field("cache", self.state.cache())
            .field("cleaned", &self.is_cleaned())
            .finish()
    }
}
