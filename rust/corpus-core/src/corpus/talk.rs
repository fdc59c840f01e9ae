// rust/corpus-core/src/corpus/talk.rs

//! Long-form talk corpora assembled from segment records.
//!
//! Source corpora ship one record per segment. [`TalkIndex`] groups them
//! into whole recordings once, at construction: segments of the same file
//! are ordered by start time, their transcripts are joined, and one
//! diarization entry is kept per segment. The grouped index is what gets
//! serialized and subset, so derived datasets never regroup.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::audio::AudioDecoder;
use crate::dataset::{CorpusRows, DatasetRegistry, IndexedDataset};
use crate::error::{CorpusError, Result};
use crate::sample::{sanitize_id, Sample, DIARIZATION, FILE, LOAD_AUDIO, REF};
use crate::value::Value;
use crate::wrapper::asr::DiarizationSegment;

/// Transcript tokens dropped when joining segment texts.
pub const DEFAULT_IGNORE_SET: [&str; 3] =
    ["ignore_time_segment_in_scoring", "inter_segment_gap", "<unk>"];

/// One segment as shipped by the source corpus.
///
/// `segment_id` has the form `<talk>-<start>-<end>` with times in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRecord {
    pub segment_id: String,
    pub file: String,
    pub speaker: String,
    pub gender: String,
    pub text: String,
    pub audio_path: PathBuf,
}

impl SegmentRecord {
    /// Start and end time parsed from the segment id.
    pub fn span(&self) -> Result<(f64, f64)> {
        let mut parts = self.segment_id.rsplitn(3, '-');
        let (end, start) = match (parts.next(), parts.next(), parts.next()) {
            (Some(end), Some(start), Some(_talk)) => (end, start),
            _ => {
                return Err(CorpusError::invalid_argument(format!(
                    "segment id '{}' is not of the form <talk>-<start>-<end>",
                    self.segment_id
                )))
            }
        };
        let parse = |raw: &str| {
            raw.parse::<f64>().map_err(|e| {
                CorpusError::invalid_argument(format!(
                    "segment id '{}' has a bad time '{raw}': {e}",
                    self.segment_id
                ))
            })
        };
        Ok((parse(start)?, parse(end)?))
    }
}

/// A whole recording built from its segments.
#[derive(Debug, Clone, PartialEq)]
pub struct TalkEntry {
    pub id: String,
    pub file: String,
    pub audio_paths: Vec<PathBuf>,
    pub text: String,
    pub segments: Vec<DiarizationSegment>,
}

impl TalkEntry {
    fn to_value(&self) -> Result<Value> {
        let paths = self
            .audio_paths
            .iter()
            .map(|p| path_to_value(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(Value::map([
            ("id", Value::from(self.id.as_str())),
            ("file", Value::from(self.file.as_str())),
            ("audio_paths", Value::List(paths)),
            ("text", Value::from(self.text.as_str())),
            (
                "segments",
                Value::List(self.segments.iter().map(DiarizationSegment::to_value).collect()),
            ),
        ]))
    }

    fn from_value(value: &Value) -> Result<Self> {
        Ok(Self {
            id: value.require_str("id")?.to_string(),
            file: value.require_str("file")?.to_string(),
            audio_paths: value
                .require_str_list("audio_paths")?
                .into_iter()
                .map(PathBuf::from)
                .collect(),
            text: value.require_str("text")?.to_string(),
            segments: value
                .require_list("segments")?
                .iter()
                .map(DiarizationSegment::from_value)
                .collect::<Result<_>>()?,
        })
    }

    fn diarization(&self) -> Value {
        Value::List(self.segments.iter().map(DiarizationSegment::to_value).collect())
    }
}

fn path_to_value(path: &Path) -> Result<Value> {
    path.to_str().map(Value::from).ok_or_else(|| {
        CorpusError::serialization(format!("path {} is not valid UTF-8", path.display()))
    })
}

/// Segment records grouped into recordings, in first-seen file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TalkIndex {
    entries: Vec<TalkEntry>,
}

impl TalkIndex {
    pub fn build(records: Vec<SegmentRecord>, ignore_set: &BTreeSet<String>) -> Result<Self> {
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<(f64, f64, SegmentRecord)>> = HashMap::new();
        for record in records {
            let (start, end) = record.span()?;
            let group = groups.entry(record.file.clone()).or_insert_with(|| {
                order.push(record.file.clone());
                Vec::new()
            });
            group.push((start, end, record));
        }

        let mut entries = Vec::with_capacity(order.len());
        let mut seen: HashMap<String, String> = HashMap::with_capacity(order.len());
        for file in order {
            let Some(mut group) = groups.remove(&file) else {
                continue;
            };
            group.sort_by(|a, b| a.0.total_cmp(&b.0));

            let text = group
                .iter()
                .map(|(_, _, r)| r.text.as_str())
                .filter(|t| !ignore_set.contains(*t))
                .collect::<Vec<_>>()
                .join(" ");
            let segments = group
                .iter()
                .map(|(start, end, r)| DiarizationSegment {
                    start: *start,
                    end: *end,
                    label: r.speaker.clone(),
                    gender: r.gender.clone(),
                })
                .collect();
            let audio_paths = group.into_iter().map(|(_, _, r)| r.audio_path).collect();

            let id = sanitize_id(&file);
            if let Some(previous) = seen.insert(id.clone(), file.clone()) {
                return Err(CorpusError::invalid_argument(format!(
                    "talk files '{previous}' and '{file}' both map to id '{id}'"
                )));
            }
            entries.push(TalkEntry {
                id,
                file,
                audio_paths,
                text,
                segments,
            });
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[TalkEntry] {
        &self.entries
    }

    /// Entries at `rows`, which must be in bounds.
    pub(crate) fn subset(&self, rows: &[usize]) -> Self {
        Self {
            entries: rows.iter().map(|&r| self.entries[r].clone()).collect(),
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        self.entries
            .iter()
            .map(TalkEntry::to_value)
            .collect::<Result<Vec<_>>>()
            .map(Value::List)
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let list = value.as_list().ok_or_else(|| {
            CorpusError::serialization(format!("talk index must be a list, got {}", value.kind()))
        })?;
        list.iter()
            .map(TalkEntry::from_value)
            .collect::<Result<Vec<_>>>()
            .map(|entries| Self { entries })
    }
}

#[derive(Clone)]
pub struct TalkRows {
    index: TalkIndex,
    ignore_set: BTreeSet<String>,
    root: Option<PathBuf>,
    sample_rate: u32,
    decoder: Option<Arc<dyn AudioDecoder>>,
}

impl TalkRows {
    /// Groups `records` with the default ignore set.
    pub fn new(records: Vec<SegmentRecord>, sample_rate: u32) -> Result<Self> {
        Self::with_ignore_set(records, DEFAULT_IGNORE_SET, sample_rate)
    }

    pub fn with_ignore_set<I, S>(
        records: Vec<SegmentRecord>,
        ignore_set: I,
        sample_rate: u32,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if sample_rate == 0 {
            return Err(CorpusError::invalid_argument("sample_rate must be positive"));
        }
        let ignore_set: BTreeSet<String> = ignore_set.into_iter().map(Into::into).collect();
        let index = TalkIndex::build(records, &ignore_set)?;
        Ok(Self {
            index,
            ignore_set,
            root: None,
            sample_rate,
            decoder: None,
        })
    }

    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    #[must_use]
    pub fn with_decoder(mut self, decoder: Arc<dyn AudioDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn index(&self) -> &TalkIndex {
        &self.index
    }

    pub fn ignore_set(&self) -> &BTreeSet<String> {
        &self.ignore_set
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

/// Decodes every segment and joins them, requiring one shared rate.
fn load_talk(
    id: &str,
    paths: &[PathBuf],
    sample_rate: u32,
    decoder: Option<&Arc<dyn AudioDecoder>>,
) -> Result<Value> {
    let decoder = decoder.ok_or_else(|| CorpusError::load(id, "no audio decoder configured"))?;
    let mut joined: Vec<f32> = Vec::new();
    let mut rate = None;
    for path in paths {
        let wave = decoder.decode(path, sample_rate).map_err(|e| {
            CorpusError::load_with_source(id, format!("cannot decode {}", path.display()), e)
        })?;
        match rate {
            None => rate = Some(wave.sample_rate),
            Some(r) if r != wave.sample_rate => {
                return Err(CorpusError::load(
                    id,
                    format!(
                        "Sampling rate mismatch: {} is {} Hz, expected {r} Hz",
                        path.display(),
                        wave.sample_rate
                    ),
                ))
            }
            Some(_) => {}
        }
        joined.extend(wave.samples);
    }
    Ok(Value::Floats(joined))
}

impl CorpusRows for TalkRows {
    const MODULE: &'static str = module_path!();
    const TYPE_NAME: &'static str = "TalkDataset";

    fn row_count(&self) -> usize {
        self.index.len()
    }

    fn take(&self, rows: &[usize]) -> Self {
        Self {
            index: self.index.subset(rows),
            ignore_set: self.ignore_set.clone(),
            root: self.root.clone(),
            sample_rate: self.sample_rate,
            decoder: self.decoder.clone(),
        }
    }

    fn materialize(&self, row: usize) -> Result<Sample> {
        let entry = &self.index.entries[row];
        let id = entry.id.clone();
        let paths: Vec<PathBuf> = entry.audio_paths.iter().map(|p| self.resolve(p)).collect();
        let sample_rate = self.sample_rate;
        let decoder = self.decoder.clone();

        Ok(Sample::new(entry.id.as_str())
            .with_value(FILE, entry.file.as_str())
            .with_value(REF, entry.text.as_str())
            .with_value(DIARIZATION, entry.diarization())
            .with_loader(LOAD_AUDIO, move || {
                load_talk(&id, &paths, sample_rate, decoder.as_ref())
            }))
    }

    fn release(&mut self) {
        self.decoder = None;
    }

    fn encode(&self) -> Result<Value> {
        Ok(Value::map([
            ("index", self.index.to_value()?),
            (
                "ignore_set",
                Value::from(self.ignore_set.iter().cloned().collect::<Vec<_>>()),
            ),
            (
                "root",
                self.root.as_deref().map(path_to_value).transpose()?.into(),
            ),
            ("sample_rate", Value::from(self.sample_rate)),
        ]))
    }

    fn decode(data: &Value, registry: &DatasetRegistry) -> Result<Self> {
        let sample_rate = u32::try_from(data.require_usize("sample_rate")?)
            .map_err(|_| CorpusError::serialization("sample_rate does not fit in 32 bits"))?;
        if sample_rate == 0 {
            return Err(CorpusError::serialization("sample_rate must be positive"));
        }
        Ok(Self {
            index: TalkIndex::from_value(data.require("index")?)?,
            ignore_set: data.require_str_list("ignore_set")?.into_iter().collect(),
            root: data.get("root").and_then(Value::as_str).map(PathBuf::from),
            sample_rate,
            decoder: registry.decoder(),
        })
    }

    fn sample_rate(&self) -> Option<u32> {
        Some(self.sample_rate)
    }

    fn set_sample_rate(&mut self, rate: u32) -> Result<()> {
        if rate == 0 {
            return Err(CorpusError::invalid_argument("sample_rate must be positive"));
        }
        self.sample_rate = rate;
        Ok(())
    }
}

impl fmt::Debug for TalkRows {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TalkRows")
            .field("talks", &self.index.len())
            .field("ignore_set", &self.ignore_set)
            .field("root", &self.root)
            .field("sample_rate", &self.sample_rate)
            .field("decoder", &self.decoder.is_some())
            .finish()
    }
}

/// A dataset of whole talks.
pub type TalkDataset = IndexedDataset<TalkRows>;
