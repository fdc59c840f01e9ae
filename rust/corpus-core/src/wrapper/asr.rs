// rust/corpus-core/src/wrapper/asr.rs

//! Speech-recognition facade.
//!
//! [`AsrSample`] exposes decoded audio, the reference transcript and the
//! diarization of a sample. Audio is decoded at most once per `AsrSample`
//! and kept for that instance's lifetime; clones of the underlying sample
//! obtained elsewhere decode again.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use super::prefetch::Prefetch;
use super::DatasetWrapper;
use crate::dataset::{ConcatDataset, Dataset};
use crate::error::{CorpusError, Result};
use crate::sample::{Loader, Sample, DIARIZATION, LOAD_AUDIO, REF};
use crate::value::Value;

/// One speaker turn.
#[derive(Debug, Clone, PartialEq)]
pub struct DiarizationSegment {
    pub start: f64,
    pub end: f64,
    pub label: String,
    pub gender: String,
}

impl DiarizationSegment {
    pub fn to_value(&self) -> Value {
        Value::map([
            ("start", Value::from(self.start)),
            ("end", Value::from(self.end)),
            ("label", Value::from(self.label.as_str())),
            ("gender", Value::from(self.gender.as_str())),
        ])
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(Self {
            start: value.require_float("start")?,
            end: value.require_float("end")?,
            label: value.require_str("label")?.to_string(),
            gender: value.require_str("gender")?.to_string(),
        })
    }
}

/// A sample narrowed to the ASR view.
pub struct AsrSample {
    sample: Sample,
    audio: OnceLock<Vec<f32>>,
}

impl AsrSample {
    pub fn new(sample: Sample) -> Self {
        Self {
            sample,
            audio: OnceLock::new(),
        }
    }

    /// Builds a sample from parts. A given `audio` takes precedence over
    /// `loader` and is served without decoding.
    pub fn create(
        id: impl Into<String>,
        loader: Option<Loader>,
        audio: Option<Vec<f32>>,
        ref_text: Option<&str>,
        diarization: Option<&[DiarizationSegment]>,
    ) -> Self {
        let mut sample = Sample::new(id);
        let cached = OnceLock::new();
        match (audio, loader) {
            (Some(audio), _) => {
                let shared = audio.clone();
                sample = sample.with_loader(LOAD_AUDIO, move || Ok(Value::Floats(shared.clone())));
                let _ = cached.set(audio);
            }
            (None, Some(loader)) => {
                sample = sample.with_loader(LOAD_AUDIO, move || loader());
            }
            (None, None) => {}
        }
        if let Some(text) = ref_text {
            sample = sample.with_value(REF, text);
        }
        if let Some(segments) = diarization {
            sample = sample.with_value(
                DIARIZATION,
                Value::List(segments.iter().map(DiarizationSegment::to_value).collect()),
            );
        }
        Self {
            sample,
            audio: cached,
        }
    }

    pub fn id(&self) -> &str {
        self.sample.id()
    }

    pub fn sample(&self) -> &Sample {
        &self.sample
    }

    pub fn into_sample(self) -> Sample {
        self.sample
    }

    pub fn is_audio_loaded(&self) -> bool {
        self.audio.get().is_some()
    }

    /// Decoded waveform, running the loader on first access.
    pub fn audio(&self) -> Result<&[f32]> {
        if let Some(audio) = self.audio.get() {
            return Ok(audio);
        }
        let decoded = match self.sample.load(LOAD_AUDIO)? {
            Value::Floats(samples) => samples,
            other => {
                return Err(CorpusError::type_mismatch(format!(
                    "audio loader of '{}' produced {}, expected floats",
                    self.id(),
                    other.kind()
                )))
            }
        };
        Ok(self.audio.get_or_init(|| decoded))
    }

    /// Reference transcript. A null value counts as absent.
    pub fn ref_text(&self) -> Result<&str> {
        match self.present(REF)? {
            Value::Str(text) => Ok(text),
            other => Err(CorpusError::type_mismatch(format!(
                "'{REF}' of '{}' is {}, expected a string",
                self.id(),
                other.kind()
            ))),
        }
    }

    pub fn diarization(&self) -> Result<Vec<DiarizationSegment>> {
        let value = self.present(DIARIZATION)?;
        let list = value.as_list().ok_or_else(|| {
            CorpusError::type_mismatch(format!(
                "'{DIARIZATION}' of '{}' is {}, expected a list",
                self.id(),
                value.kind()
            ))
        })?;
        list.iter().map(DiarizationSegment::from_value).collect()
    }

    fn present(&self, key: &str) -> Result<&Value> {
        match self.sample.value(key) {
            Some(value) if !value.is_null() => Ok(value),
            _ => Err(CorpusError::missing_field(key, self.id())),
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        self.sample.to_value()
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        Sample::from_value(value).map(Self::new)
    }
}

impl Prefetch for AsrSample {
    fn id(&self) -> &str {
        self.sample.id()
    }

    fn prefetch(&self) -> Result<()> {
        self.audio().map(|_| ())
    }
}

impl PartialEq for AsrSample {
    fn eq(&self, other: &Self) -> bool {
        self.sample == other.sample
    }
}

impl Eq for AsrSample {}

impl Hash for AsrSample {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sample.hash(state);
    }
}

impl fmt::Debug for AsrSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsrSample")
            .field("id", &self.id())
            .field("audio_loaded", &self.is_audio_loaded())
            .finish()
    }
}

/// Concatenates two ASR facades into one, flattening nested
/// concatenations.
fn concat_facades<A, B>(left: A, right: B, use_cache: usize) -> Result<AsrConcatDataset>
where
    A: DatasetWrapper<Sample = AsrSample>,
    B: DatasetWrapper<Sample = AsrSample>,
{
    let joined = left
        .into_dataset()
        .concat(right.into_dataset(), use_cache)?;
    AsrConcatDataset::new(Box::new(joined))
}

/// ASR facade over a single dataset that carries a sample rate.
#[derive(Debug)]
pub struct AsrDataset {
    dataset: Box<dyn Dataset>,
}

impl AsrDataset {
    pub fn new(dataset: Box<dyn Dataset>) -> Result<Self> {
        if dataset.sample_rate().is_none() {
            return Err(CorpusError::invalid_argument(format!(
                "AsrDataset requires a dataset with a sample rate, {} has none",
                dataset.name()
            )));
        }
        Ok(Self { dataset })
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.dataset.sample_rate()
    }

    pub fn set_sample_rate(&mut self, rate: u32) -> Result<()> {
        self.dataset.set_sample_rate(rate)
    }

    pub fn concat<O>(self, other: O, use_cache: usize) -> Result<AsrConcatDataset>
    where
        O: DatasetWrapper<Sample = AsrSample>,
    {
        concat_facades(self, other, use_cache)
    }
}

impl DatasetWrapper for AsrDataset {
    type Sample = AsrSample;

    const MODULE: &'static str = module_path!();
    const TYPE_NAME: &'static str = "AsrDataset";

    fn dataset(&self) -> &dyn Dataset {
        &*self.dataset
    }

    fn dataset_mut(&mut self) -> &mut dyn Dataset {
        &mut *self.dataset
    }

    fn into_dataset(self) -> Box<dyn Dataset> {
        self.dataset
    }

    fn wrap(dataset: Box<dyn Dataset>) -> Result<Self> {
        Self::new(dataset)
    }

    fn narrow(sample: Sample) -> AsrSample {
        AsrSample::new(sample)
    }
}

/// ASR facade over a [`ConcatDataset`] whose children share one sample
/// rate.
#[derive(Debug)]
pub struct AsrConcatDataset {
    dataset: Box<dyn Dataset>,
}

impl AsrConcatDataset {
    pub fn new(dataset: Box<dyn Dataset>) -> Result<Self> {
        let concat = dataset.downcast_ref::<ConcatDataset>().ok_or_else(|| {
            CorpusError::type_mismatch(format!(
                "AsrConcatDataset requires a ConcatDataset, got {}",
                dataset.name()
            ))
        })?;
        let mut rates = concat.datasets().iter().map(|ds| ds.sample_rate());
        let first = rates.next().flatten();
        if first.is_none() || rates.any(|rate| rate != first) {
            return Err(CorpusError::invalid_argument(
                "All datasets must have the same sampling rate",
            ));
        }
        Ok(Self { dataset })
    }

    pub fn from_concat(concat: ConcatDataset) -> Result<Self> {
        Self::new(Box::new(concat))
    }

    pub fn datasets(&self) -> &[Box<dyn Dataset>] {
        match self.dataset.downcast_ref::<ConcatDataset>() {
            Some(concat) => concat.datasets(),
            None => &[],
        }
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.dataset.sample_rate()
    }

    /// Resamples every child.
    pub fn set_sample_rate(&mut self, rate: u32) -> Result<()> {
        self.dataset.set_sample_rate(rate)
    }

    pub fn concat<O>(self, other: O, use_cache: usize) -> Result<AsrConcatDataset>
    where
        O: DatasetWrapper<Sample = AsrSample>,
    {
        concat_facades(self, other, use_cache)
    }
}

impl DatasetWrapper for AsrConcatDataset {
    type Sample = AsrSample;

    const MODULE: &'static str = module_path!();
    const TYPE_NAME: &'static str = "AsrConcatDataset";

    fn dataset(&self) -> &dyn Dataset {
        &*self.dataset
    }

    fn dataset_mut(&mut self) -> &mut dyn Dataset {
        &mut *self.dataset
    }

    fn into_dataset(self) -> Box<dyn Dataset> {
        self.dataset
    }

    fn wrap(dataset: Box<dyn Dataset>) -> Result<Self> {
        Self::new(dataset)
    }

    fn narrow(sample: Sample) -> AsrSample {
        AsrSample::new(sample)
    }
}
