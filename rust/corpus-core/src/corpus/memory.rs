// rust/corpus-core/src/corpus/memory.rs

//! Datasets over samples already held in memory.

use crate::dataset::{CorpusRows, DatasetRegistry, IndexedDataset, TaskSet};
use crate::error::{CorpusError, Result};
use crate::sample::Sample;
use crate::value::Value;

/// Rows backed by a vector of materialized samples.
#[derive(Debug, Clone, Default)]
pub struct MemoryRows {
    samples: Vec<Sample>,
}

impl MemoryRows {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }
}

impl CorpusRows for MemoryRows {
    const MODULE: &'static str = module_path!();
    const TYPE_NAME: &'static str = "MemoryDataset";

    fn row_count(&self) -> usize {
        self.samples.len()
    }

    fn take(&self, rows: &[usize]) -> Self {
        Self::new(rows.iter().map(|&row| self.samples[row].clone()).collect())
    }

    fn materialize(&self, row: usize) -> Result<Sample> {
        self.samples
            .get(row)
            .cloned()
            .ok_or_else(|| CorpusError::index_out_of_range(row as i64, self.samples.len()))
    }

    fn release(&mut self) {
        self.samples = Vec::new();
    }

    /// Fails if any sample carries a lazy field.
    fn encode(&self) -> Result<Value> {
        let samples = self
            .samples
            .iter()
            .map(Sample::to_value)
            .collect::<Result<Vec<_>>>()?;
        Ok(Value::map([("samples", Value::List(samples))]))
    }

    fn decode(data: &Value, _registry: &DatasetRegistry) -> Result<Self> {
        data.require_list("samples")?
            .iter()
            .map(Sample::from_value)
            .collect::<Result<Vec<_>>>()
            .map(Self::new)
    }
}

/// A dataset over in-memory samples.
pub type MemoryDataset = IndexedDataset<MemoryRows>;

impl IndexedDataset<MemoryRows> {
    pub fn from_samples(samples: Vec<Sample>, task: TaskSet, use_cache: usize) -> Self {
        Self::new(MemoryRows::new(samples), task, use_cache)
    }

    /// Payload-free samples with the given ids.
    pub fn from_ids<I, S>(ids: I, task: TaskSet, use_cache: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_samples(ids.into_iter().map(Sample::new).collect(), task, use_cache)
    }
}
