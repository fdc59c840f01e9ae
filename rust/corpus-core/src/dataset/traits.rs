// rust/corpus-core/src/dataset/traits.rs

//! The dataset contract.
//!
//! [`Dataset`] is object safe: composites hold `Box<dyn Dataset>` children and
//! every derivation (`select`, `slice`, `sample`) returns a new boxed dataset.
//! Concrete types supply a handful of primitives; bounds checking, cache
//! lookups, key dispatch, sampling clamps and cleanup are provided once here.

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::ops::Range;

use rand::RngCore;
use tracing::debug;

use super::cache::SampleCache;
use super::concat::ConcatDataset;
use super::registry::TypeIdentity;
use crate::error::{CorpusError, Result};
use crate::sample::Sample;
use crate::value::{Value, ValueMap};

/// Downcasting support for trait objects.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Sorted, de-duplicated set of task names a dataset supports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TaskSet(BTreeSet<String>);

impl TaskSet {
    pub fn new<I, S>(tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(tasks.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, task: &str) -> bool {
        self.0.contains(task)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_value(&self) -> Value {
        Value::List(self.0.iter().cloned().map(Value::Str).collect())
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let list = value.as_list().ok_or_else(|| {
            CorpusError::serialization(format!("task must be a list, got {}", value.kind()))
        })?;
        list.iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| {
                    CorpusError::serialization(format!(
                        "task names must be strings, got {}",
                        v.kind()
                    ))
                })
            })
            .collect::<Result<BTreeSet<_>>>()
            .map(Self)
    }
}

impl<S: Into<String>> FromIterator<S> for TaskSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl fmt::Display for TaskSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, task) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{task}")?;
        }
        write!(f, ")")
    }
}

/// Python-style slice bounds over the logical index range.
///
/// Negative bounds count from the end. Reverse slicing is not supported:
/// a non-positive step or a stop before the start is an invalid slice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SliceSpec {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<i64>,
}

impl SliceSpec {
    pub fn new(start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Self {
        Self { start, stop, step }
    }

    /// Every index, in order.
    pub fn full() -> Self {
        Self::default()
    }

    pub fn range(start: i64, stop: i64) -> Self {
        Self::new(Some(start), Some(stop), None)
    }

    #[must_use]
    pub fn with_step(mut self, step: i64) -> Self {
        self.step = Some(step);
        self
    }

    /// Resolves the slice against a dataset of `len` samples.
    ///
    /// Defaults are substituted and negative bounds wrapped before
    /// validation; the stop is then clamped to `len`.
    pub fn indices(&self, len: usize) -> Result<Vec<usize>> {
        let step = self.step.unwrap_or(1);
        if step <= 0 {
            return Err(CorpusError::invalid_slice(format!(
                "step must be a positive integer, got {step}"
            )));
        }
        let start = resolve_bound(self.start.unwrap_or(0), len)?;
        let stop = match self.stop {
            Some(stop) => resolve_bound(stop, len)?,
            None => len,
        };
        if stop < start {
            return Err(CorpusError::invalid_slice(format!(
                "stop index {stop} is less than start index {start}"
            )));
        }
        let (start, stop) = (start.min(len), stop.min(len));
        Ok((start..stop).step_by(step as usize).collect())
    }

    fn from_value(map: &ValueMap) -> Result<Self> {
        let mut spec = Self::default();
        for (key, value) in map {
            let bound = match value {
                Value::Null => None,
                Value::Int(i) => Some(*i),
                other => {
                    return Err(CorpusError::type_mismatch(format!(
                        "slice bound '{key}' must be an int or null, got {}",
                        other.kind()
                    )))
                }
            };
            match key.as_str() {
                "start" => spec.start = bound,
                "stop" => spec.stop = bound,
                "step" => spec.step = bound,
                _ => {
                    return Err(CorpusError::type_mismatch(format!(
                        "unexpected slice key '{key}'"
                    )))
                }
            }
        }
        Ok(spec)
    }
}

impl From<Range<i64>> for SliceSpec {
    fn from(range: Range<i64>) -> Self {
        Self::range(range.start, range.end)
    }
}

fn resolve_bound(bound: i64, len: usize) -> Result<usize> {
    let wrapped = if bound < 0 { bound + len as i64 } else { bound };
    usize::try_from(wrapped).map_err(|_| CorpusError::index_out_of_range(bound, len))
}

/// Resolves a possibly negative index against `len`.
pub fn normalize_index(idx: i64, len: usize) -> Result<usize> {
    let wrapped = if idx < 0 { idx + len as i64 } else { idx };
    match usize::try_from(wrapped) {
        Ok(i) if i < len => Ok(i),
        _ => Err(CorpusError::index_out_of_range(idx, len)),
    }
}

/// Key accepted by [`Dataset::getitem`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Index(i64),
    Slice(SliceSpec),
    Indices(Vec<i64>),
}

impl From<i64> for Key {
    fn from(idx: i64) -> Self {
        Key::Index(idx)
    }
}

impl From<SliceSpec> for Key {
    fn from(spec: SliceSpec) -> Self {
        Key::Slice(spec)
    }
}

impl From<Range<i64>> for Key {
    fn from(range: Range<i64>) -> Self {
        Key::Slice(range.into())
    }
}

impl From<Vec<i64>> for Key {
    fn from(indices: Vec<i64>) -> Self {
        Key::Indices(indices)
    }
}

impl From<&[i64]> for Key {
    fn from(indices: &[i64]) -> Self {
        Key::Indices(indices.to_vec())
    }
}

/// Keys arriving as plain values: an int, a list of ints, or a map of
/// `start`/`stop`/`step`. Any other shape is a type mismatch.
impl TryFrom<&Value> for Key {
    type Error = CorpusError;

    fn try_from(value: &Value) -> Result<Self> {
        match value {
            Value::Int(i) => Ok(Key::Index(*i)),
            Value::List(items) => items
                .iter()
                .map(|v| {
                    v.as_int().ok_or_else(|| {
                        CorpusError::type_mismatch(format!(
                            "index sequences must hold ints, got {}",
                            v.kind()
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()
                .map(Key::Indices),
            Value::Map(map) => SliceSpec::from_value(map).map(Key::Slice),
            other => Err(CorpusError::type_mismatch(format!(
                "Invalid key type: {}",
                other.kind()
            ))),
        }
    }
}

/// Result of [`Dataset::getitem`].
pub enum Item {
    Sample(Sample),
    Dataset(Box<dyn Dataset>),
}

impl Item {
    pub fn into_sample(self) -> Result<Sample> {
        match self {
            Item::Sample(s) => Ok(s),
            Item::Dataset(_) => Err(CorpusError::type_mismatch(
                "expected a sample, got a dataset",
            )),
        }
    }

    pub fn into_dataset(self) -> Result<Box<dyn Dataset>> {
        match self {
            Item::Dataset(d) => Ok(d),
            Item::Sample(_) => Err(CorpusError::type_mismatch(
                "expected a dataset, got a sample",
            )),
        }
    }
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Sample(s) => f.debug_tuple("Sample").field(s).finish(),
            Item::Dataset(d) => f.debug_tuple("Dataset").field(d).finish(),
        }
    }
}

/// State every dataset owns: its task set, its private cache and the
/// terminal cleaned flag.
#[derive(Debug)]
pub struct DatasetState {
    task: TaskSet,
    cache: SampleCache,
    cleaned: bool,
}

impl DatasetState {
    pub fn new(task: TaskSet, use_cache: usize) -> Self {
        Self {
            task,
            cache: SampleCache::new(use_cache),
            cleaned: false,
        }
    }

    /// Reads the `task` and optional `use_cache` fields of a dataset dict.
    pub fn from_dict(data: &Value) -> Result<Self> {
        let task = TaskSet::from_value(data.require("task")?)?;
        let use_cache = match data.get("use_cache") {
            None | Some(Value::Null) => 0,
            Some(_) => data.require_usize("use_cache")?,
        };
        Ok(Self::new(task, use_cache))
    }

    /// The `task` and `use_cache` fields every dataset dict starts with.
    pub fn to_dict(&self) -> ValueMap {
        let mut map = ValueMap::new();
        map.insert("task".to_string(), self.task.to_value());
        map.insert("use_cache".to_string(), Value::from(self.cache.capacity()));
        map
    }

    pub fn task(&self) -> &TaskSet {
        &self.task
    }

    pub fn cache(&self) -> &SampleCache {
        &self.cache
    }

    pub fn is_cleaned(&self) -> bool {
        self.cleaned
    }
}

/// An indexable, lazily materializing sequence of samples.
///
/// Implementors supply the primitives (`length`, `select`, `slice`, `fetch`,
/// `release`, `to_dict`); everything else is provided. Derivations never
/// mutate the receiver and each derived dataset gets its own cache sized by
/// the `use_cache` argument. Once [`clean`](Dataset::clean) has run, every
/// read, compose and serialize call fails with [`CorpusError::Cleaned`].
pub trait Dataset: AsAny + Send + Sync {
    /// Concrete type name, also the declared `type` of a pointer.
    fn type_name(&self) -> &'static str;

    /// Module path used in the pointer identity.
    fn module(&self) -> &'static str;

    fn state(&self) -> &DatasetState;

    fn state_mut(&mut self) -> &mut DatasetState;

    /// Number of samples. Fails once cleaned.
    fn length(&self) -> Result<usize>;

    /// New dataset holding the samples at `indices`, in the given order.
    /// Indices may repeat; negative indices count from the end.
    fn select(&self, indices: &[i64], use_cache: usize) -> Result<Box<dyn Dataset>>;

    /// New dataset over the index range described by `spec`.
    fn slice(&self, spec: SliceSpec, use_cache: usize) -> Result<Box<dyn Dataset>>;

    /// Materializes the sample at an already bounds-checked index.
    fn fetch(&self, idx: usize) -> Result<Sample>;

    /// Drops owned resources. Called once by [`clean`](Dataset::clean).
    fn release(&mut self);

    /// Full constructor arguments as a plain value.
    fn to_dict(&self) -> Result<Value>;

    /// `size` samples starting at `start`: a contiguous slice without an
    /// rng, otherwise a without-replacement draw from `[start, length)`
    /// kept in index order.
    fn sample_span(
        &self,
        size: usize,
        start: usize,
        rng: Option<&mut dyn RngCore>,
        use_cache: usize,
    ) -> Result<Box<dyn Dataset>> {
        let len = self.length()?;
        if start > len || size > len - start {
            return Err(CorpusError::invalid_argument(format!(
                "cannot draw {size} samples from {start} in a dataset of {len}"
            )));
        }
        match rng {
            Some(rng) if size != len - start => {
                // Ascending, so a concatenation keeps one run per child.
                let mut indices: Vec<i64> = rand::seq::index::sample(rng, len - start, size)
                    .into_iter()
                    .map(|i| (start + i) as i64)
                    .collect();
                indices.sort_unstable();
                self.select(&indices, use_cache)
            }
            _ => self.slice(
                SliceSpec::range(start as i64, (start + size) as i64),
                use_cache,
            ),
        }
    }

    fn sample_rate(&self) -> Option<u32> {
        None
    }

    fn set_sample_rate(&mut self, rate: u32) -> Result<()> {
        Err(CorpusError::invalid_argument(format!(
            "{} does not carry a sample rate (requested {rate})",
            self.type_name()
        )))
    }

    fn identity(&self) -> TypeIdentity {
        TypeIdentity::new(self.module(), self.type_name())
    }

    /// The dict form with this type's identity attached.
    fn to_pointer(&self) -> Result<Value> {
        self.ensure_live("serialize")?;
        let mut map = self.to_dict()?.into_map()?;
        self.identity().write_into(&mut map);
        Ok(Value::Map(map))
    }

    fn name(&self) -> &'static str {
        self.type_name()
    }

    fn task(&self) -> &TaskSet {
        self.state().task()
    }

    fn use_cache(&self) -> usize {
        self.state().cache().capacity()
    }

    fn is_cleaned(&self) -> bool {
        self.state().is_cleaned()
    }

    fn ensure_live(&self, operation: &'static str) -> Result<()> {
        if self.is_cleaned() {
            Err(CorpusError::cleaned(self.name(), operation))
        } else {
            Ok(())
        }
    }

    /// Bounds-checked, cached access to a single sample.
    fn get(&self, idx: i64) -> Result<Sample> {
        self.ensure_live("read from")?;
        let idx = normalize_index(idx, self.length()?)?;
        let cache = self.state().cache();
        if let Some(sample) = cache.get(idx) {
            return Ok(sample);
        }
        let sample = self.fetch(idx)?;
        cache.insert(idx, sample.clone());
        Ok(sample)
    }

    /// Dispatches on the key shape: an index yields a sample, a slice or an
    /// index sequence yields a derived dataset.
    fn getitem(&self, key: Key, use_cache: usize) -> Result<Item> {
        match key {
            Key::Index(idx) => self.get(idx).map(Item::Sample),
            Key::Slice(spec) => self.slice(spec, use_cache).map(Item::Dataset),
            Key::Indices(indices) => self.select(&indices, use_cache).map(Item::Dataset),
        }
    }

    /// Validates `start`, clamps `size` and delegates to
    /// [`sample_span`](Dataset::sample_span). A negative `size` takes
    /// everything from `start` on.
    fn sample(
        &self,
        size: i64,
        start: i64,
        rng: Option<&mut dyn RngCore>,
        use_cache: usize,
    ) -> Result<Box<dyn Dataset>> {
        self.ensure_live("sample from")?;
        let len = self.length()?;
        let start = match usize::try_from(start) {
            Ok(s) if s < len => s,
            _ => return Err(CorpusError::index_out_of_range(start, len)),
        };
        let remaining = len - start;
        let size = match usize::try_from(size) {
            Ok(size) => size.min(remaining),
            Err(_) => remaining,
        };
        self.sample_span(size, start, rng, use_cache)
    }

    /// Releases resources and marks the dataset cleaned. Idempotent.
    fn clean(&mut self) {
        if self.is_cleaned() {
            return;
        }
        self.release();
        let state = self.state_mut();
        state.cache.clear();
        state.cleaned = true;
        debug!(dataset = self.name(), "dataset cleaned");
    }

    fn samples_to_list(&self) -> Result<Vec<Sample>> {
        let len = self.length()?;
        (0..len as i64).map(|i| self.get(i)).collect()
    }
}

impl dyn Dataset {
    pub fn iter(&self) -> DatasetIter<'_> {
        DatasetIter::new(self)
    }

    pub fn is<T: Dataset>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Dataset>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Dataset>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }

    /// Concatenates two datasets, consuming both.
    ///
    /// A [`ConcatDataset`] on either side contributes its children rather
    /// than itself, so one level of nesting is flattened. Both sides must be
    /// live and share a task set.
    pub fn concat(
        self: Box<Self>,
        other: Box<dyn Dataset>,
        use_cache: usize,
    ) -> Result<ConcatDataset> {
        self.ensure_live("concatenate")?;
        other.ensure_live("concatenate")?;
        if self.task() != other.task() {
            return Err(CorpusError::invalid_argument(format!(
                "Datasets have different tasks: {} vs {}",
                self.task(),
                other.task()
            )));
        }
        let task = self.task().clone();
        let mut datasets = flatten(self)?;
        datasets.extend(flatten(other)?);
        ConcatDataset::with_task(datasets, task, use_cache)
    }
}

fn flatten(dataset: Box<dyn Dataset>) -> Result<Vec<Box<dyn Dataset>>> {
    if !dataset.is::<ConcatDataset>() {
        return Ok(vec![dataset]);
    }
    dataset
        .into_any()
        .downcast::<ConcatDataset>()
        .map(|concat| concat.into_datasets())
        .map_err(|_| CorpusError::type_mismatch("Invalid type for concatenation"))
}

impl fmt::Debug for dyn Dataset + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(self.name())
            .field("task", self.task())
            .field("use_cache", &self.use_cache())
            .field("cleaned", &self.is_cleaned())
            .finish()
    }
}

/// Iterator over every sample of a dataset, in index order.
pub struct DatasetIter<'a> {
    dataset: &'a dyn Dataset,
    next: usize,
    len: Option<usize>,
    done: bool,
}

impl<'a> DatasetIter<'a> {
    pub fn new(dataset: &'a dyn Dataset) -> Self {
        Self {
            dataset,
            next: 0,
            len: None,
            done: false,
        }
    }
}

impl Iterator for DatasetIter<'_> {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let len = match self.len {
            Some(len) => len,
            None => match self.dataset.length() {
                Ok(len) => *self.len.insert(len),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            },
        };
        if self.next >= len {
            self.done = true;
            return None;
        }
        let result = self.dataset.get(self.next as i64);
        self.next += 1;
        if result.is_err() {
            self.done = true;
        }
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.len {
            Some(len) if !self.done => {
                let left = len.saturating_sub(self.next);
                (left, Some(left))
            }
            Some(_) => (0, Some(0)),
            None => (0, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_defaults() {
        assert_eq!(SliceSpec::full().indices(4).unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(
            SliceSpec::new(Some(1), None, Some(2)).indices(6).unwrap(),
            vec![1, 3, 5]
        );
    }

    #[test]
    fn test_slice_negative_bounds_wrap() {
        assert_eq!(SliceSpec::new(Some(-2), None, None).indices(5).unwrap(), vec![3, 4]);
        assert_eq!(SliceSpec::range(0, -3).indices(5).unwrap(), vec![0, 1]);

        let err = SliceSpec::range(-9, 2).indices(5).unwrap_err();
        assert!(matches!(err, CorpusError::IndexOutOfRange { .. }));
    }

    #[test]
    fn test_slice_clamps_stop() {
        assert_eq!(SliceSpec::range(3, 100).indices(5).unwrap(), vec![3, 4]);
        assert!(SliceSpec::range(7, 9).indices(5).unwrap().is_empty());
    }

    #[test]
    fn test_slice_rejects_reverse() {
        let err = SliceSpec::full().with_step(0).indices(5).unwrap_err();
        assert!(matches!(err, CorpusError::InvalidSlice { .. }));

        let err = SliceSpec::full().with_step(-1).indices(5).unwrap_err();
        assert!(matches!(err, CorpusError::InvalidSlice { .. }));

        let err = SliceSpec::range(4, 2).indices(5).unwrap_err();
        assert!(matches!(err, CorpusError::InvalidSlice { .. }));
    }

    #[test]
    fn test_normalize_index() {
        assert_eq!(normalize_index(0, 3).unwrap(), 0);
        assert_eq!(normalize_index(-1, 3).unwrap(), 2);
        assert!(normalize_index(3, 3).is_err());
        assert!(normalize_index(-4, 3).is_err());
        assert!(normalize_index(0, 0).is_err());
    }

    #[test]
    fn test_key_from_value() {
        assert_eq!(Key::try_from(&Value::Int(-1)).unwrap(), Key::Index(-1));
        assert_eq!(
            Key::try_from(&Value::List(vec![Value::Int(2), Value::Int(0)])).unwrap(),
            Key::Indices(vec![2, 0])
        );
        let slice = Value::map([("start", Value::Int(1)), ("stop", Value::Null)]);
        assert_eq!(
            Key::try_from(&slice).unwrap(),
            Key::Slice(SliceSpec::new(Some(1), None, None))
        );

        for bad in [
            Value::from("0"),
            Value::Float(1.0),
            Value::List(vec![Value::from("x")]),
            Value::map([("begin", Value::Int(0))]),
        ] {
            let err = Key::try_from(&bad).unwrap_err();
            assert!(matches!(err, CorpusError::TypeMismatch { .. }), "{bad:?}");
        }
    }

    #[test]
    fn test_task_set_is_sorted_and_deduplicated() {
        let tasks = TaskSet::new(["diarization", "asr", "asr"]);
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks.iter().collect::<Vec<_>>(), vec!["asr", "diarization"]);
        assert_eq!(tasks.to_string(), "(asr, diarization)");
        assert_eq!(TaskSet::from_value(&tasks.to_value()).unwrap(), tasks);
        assert_eq!(tasks, TaskSet::new(["asr", "diarization"]));
    }

    #[test]
    fn test_state_dict_round_trip() {
        let state = DatasetState::new(TaskSet::new(["asr"]), 8);
        let restored = DatasetState::from_dict(&Value::Map(state.to_dict())).unwrap();
        assert_eq!(restored.task(), state.task());
        assert_eq!(restored.cache().capacity(), 8);

        let without_cache = Value::map([("task", TaskSet::new(["asr"]).to_value())]);
        assert_eq!(
            DatasetState::from_dict(&without_cache).unwrap().cache().capacity(),
            0
        );
    }
}
