// rust/corpus-core/src/dataset/concat.rs

//! Ordered concatenation of child datasets.

use std::fmt;

use super::registry::{
    DatasetRegistry, DatasetType, TypeIdentity, FROM_DICT, FROM_POINTER, METHOD_KEY,
    MODULE_KEY, QUALNAME_KEY, TYPE_KEY,
};
use super::traits::{normalize_index, Dataset, DatasetState, SliceSpec, TaskSet};
use crate::error::{CorpusError, Result};
use crate::sample::Sample;
use crate::value::Value;

/// A dataset presenting its children back to back.
///
/// A global index maps to `(child, local index)` by scanning child lengths in
/// order; offsets are never stored. Children are owned: cleaning the
/// concatenation cleans every child and then drops them.
///
/// A concatenation always has at least one child, so a derivation that
/// would select nothing (an empty slice or index list, `sample(0, ..)`)
/// fails with [`CorpusError::InvalidArgument`] where a leaf returns an
/// empty dataset.
pub struct ConcatDataset {
    datasets: Vec<Box<dyn Dataset>>,
    state: DatasetState,
}

impl ConcatDataset {
    /// Builds a concatenation using the first child's task set.
    pub fn new(datasets: Vec<Box<dyn Dataset>>, use_cache: usize) -> Result<Self> {
        let task = datasets
            .first()
            .map(|ds| ds.task().clone())
            .ok_or_else(|| CorpusError::invalid_argument("At least one dataset is required"))?;
        Self::with_task(datasets, task, use_cache)
    }

    /// Builds a concatenation whose children must all have exactly `task`.
    pub fn with_task(
        datasets: Vec<Box<dyn Dataset>>,
        task: TaskSet,
        use_cache: usize,
    ) -> Result<Self> {
        if datasets.is_empty() {
            return Err(CorpusError::invalid_argument(
                "At least one dataset is required",
            ));
        }
        if let Some(ds) = datasets.iter().find(|ds| ds.task() != &task) {
            return Err(CorpusError::invalid_argument(format!(
                "All datasets must have the same task: {} has {}, expected {task}",
                ds.name(),
                ds.task()
            )));
        }
        Ok(Self {
            datasets,
            state: DatasetState::new(task, use_cache),
        })
    }

    pub fn datasets(&self) -> &[Box<dyn Dataset>] {
        &self.datasets
    }

    pub fn into_datasets(self) -> Vec<Box<dyn Dataset>> {
        self.datasets
    }

    /// Maps a global index to `(child, local index)`.
    fn locate(&self, idx: usize) -> Result<(usize, usize)> {
        let mut offset = 0;
        for (child, ds) in self.datasets.iter().enumerate() {
            let len = ds.length()?;
            if idx < offset + len {
                return Ok((child, idx - offset));
            }
            offset += len;
        }
        Err(CorpusError::index_out_of_range(idx as i64, offset))
    }

    fn child_lengths(&self) -> Result<Vec<usize>> {
        self.datasets.iter().map(|ds| ds.length()).collect()
    }
}

impl Dataset for ConcatDataset {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn module(&self) -> &'static str {
        Self::MODULE
    }

    fn state(&self) -> &DatasetState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut DatasetState {
        &mut self.state
    }

    fn length(&self) -> Result<usize> {
        self.ensure_live("measure")?;
        Ok(self.child_lengths()?.iter().sum())
    }

    /// Routes each requested index to its child.
    ///
    /// Consecutive requests landing in the same child become one child
    /// `select`, so row `i` of the result is always request `i`. Children
    /// that receive no index do not appear in the result.
    fn select(&self, indices: &[i64], use_cache: usize) -> Result<Box<dyn Dataset>> {
        self.ensure_live("select from")?;
        let lengths = self.child_lengths()?;
        let total: usize = lengths.iter().sum();

        let mut runs: Vec<(usize, Vec<i64>)> = Vec::new();
        for &raw in indices {
            let idx = normalize_index(raw, total)?;
            let mut offset = 0;
            let mut child = 0;
            while idx >= offset + lengths[child] {
                offset += lengths[child];
                child += 1;
            }
            let local = (idx - offset) as i64;
            match runs.last_mut() {
                Some((last, run)) if *last == child => run.push(local),
                _ => runs.push((child, vec![local])),
            }
        }

        let selected = runs
            .into_iter()
            .map(|(child, run)| self.datasets[child].select(&run, 0))
            .collect::<Result<Vec<_>>>()?;
        Ok(Box::new(Self::with_task(
            selected,
            self.task().clone(),
            use_cache,
        )?))
    }

    fn slice(&self, spec: SliceSpec, use_cache: usize) -> Result<Box<dyn Dataset>> {
        self.ensure_live("slice")?;
        let indices: Vec<i64> = spec
            .indices(self.length()?)?
            .into_iter()
            .map(|i| i as i64)
            .collect();
        self.select(&indices, use_cache)
    }

    fn fetch(&self, idx: usize) -> Result<Sample> {
        let (child, local) = self.locate(idx)?;
        self.datasets[child].get(local as i64)
    }

    fn release(&mut self) {
        for ds in &mut self.datasets {
            ds.clean();
        }
        self.datasets.clear();
    }

    /// Reports a rate only when every child agrees on one.
    fn sample_rate(&self) -> Option<u32> {
        let first = self.datasets.first()?.sample_rate()?;
        self.datasets
            .iter()
            .all(|ds| ds.sample_rate() == Some(first))
            .then_some(first)
    }

    fn set_sample_rate(&mut self, rate: u32) -> Result<()> {
        self.ensure_live("resample")?;
        for ds in &mut self.datasets {
            ds.set_sample_rate(rate)?;
        }
        self.state.cache().clear();
        Ok(())
    }

    fn to_dict(&self) -> Result<Value> {
        self.ensure_live("serialize")?;
        let mut map = self.state.to_dict();
        let mut dicts = Vec::with_capacity(self.datasets.len());
        let mut modules = Vec::with_capacity(self.datasets.len());
        let mut qualnames = Vec::with_capacity(self.datasets.len());
        let mut types = Vec::with_capacity(self.datasets.len());
        for ds in &self.datasets {
            let identity = ds.identity();
            dicts.push(ds.to_dict()?);
            modules.push(Value::Str(identity.module));
            qualnames.push(Value::Str(identity.qualname));
            types.push(Value::Str(identity.type_name));
        }
        map.insert("datasets".to_string(), Value::List(dicts));
        map.insert(MODULE_KEY.to_string(), Value::List(modules));
        map.insert(QUALNAME_KEY.to_string(), Value::List(qualnames));
        map.insert(TYPE_KEY.to_string(), Value::List(types));
        map.insert(METHOD_KEY.to_string(), Value::from(FROM_DICT));
        Ok(Value::Map(map))
    }

    fn to_pointer(&self) -> Result<Value> {
        self.ensure_live("serialize")?;
        let mut map = self.state.to_dict();
        let pointers = self
            .datasets
            .iter()
            .map(|ds| ds.to_pointer())
            .collect::<Result<Vec<_>>>()?;
        map.insert("datasets".to_string(), Value::List(pointers));
        map.insert(METHOD_KEY.to_string(), Value::from(FROM_POINTER));
        self.identity().write_into(&mut map);
        Ok(Value::Map(map))
    }
}

impl DatasetType for ConcatDataset {
    const MODULE: &'static str = module_path!();
    const TYPE_NAME: &'static str = "ConcatDataset";

    /// Rebuilds every child through the registry. With `method =
    /// "from_dict"` the children are embedded dicts typed by the parallel
    /// `module`/`qualname`/`type` lists; with `"from_pointer"` each child is
    /// itself a pointer.
    fn from_dict(data: &Value, registry: &DatasetRegistry) -> Result<Self> {
        let state = DatasetState::from_dict(data)?;
        let children = data.require_list("datasets")?;
        let method = match data.get(METHOD_KEY) {
            Some(_) => data.require_str(METHOD_KEY)?,
            None => FROM_DICT,
        };

        let datasets = match method {
            FROM_DICT => {
                let modules = data.require_str_list(MODULE_KEY)?;
                let qualnames = data.require_str_list(QUALNAME_KEY)?;
                let types = match data.get(TYPE_KEY) {
                    Some(_) => data.require_str_list(TYPE_KEY)?,
                    None => qualnames.clone(),
                };
                if [modules.len(), qualnames.len(), types.len()]
                    .iter()
                    .any(|&n| n != children.len())
                {
                    return Err(CorpusError::serialization(
                        "datasets, module, qualname and type lists differ in length",
                    ));
                }
                children
                    .iter()
                    .zip(modules)
                    .zip(qualnames)
                    .zip(types)
                    .map(|(((child, module), qualname), type_name)| {
                        let identity = TypeIdentity {
                            module,
                            qualname,
                            type_name,
                        };
                        registry.dataset_from_dict(&identity, child)
                    })
                    .collect::<Result<Vec<_>>>()?
            }
            FROM_POINTER => children
                .iter()
                .map(|child| registry.dataset_from_pointer(child))
                .collect::<Result<Vec<_>>>()?,
            other => {
                return Err(CorpusError::invalid_argument(format!(
                    "Invalid method for deserialization: {other}"
                )))
            }
        };

        let use_cache = state.cache().capacity();
        Self::with_task(datasets, state.task().clone(), use_cache)
    }
}

impl fmt::Debug for ConcatDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcatDataset")
            .field("task", self.task())
            .field("datasets", &self.datasets)
            .field("cleaned", &self.is_cleaned())
            .finish()
    }
}
