// rust/corpus-core/src/corpus/utterance.rs

//! Manifest-style corpora: one audio file and one transcript per utterance.
//!
//! Rows are three parallel lists (`ids`, `audio_paths`, `references`).
//! Relative audio paths resolve against an optional storage root when the
//! loader runs, so a serialized dataset stays portable between machines
//! that keep the corpus in different places.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::audio::AudioDecoder;
use crate::config::CorpusConfig;
use crate::dataset::{CorpusRows, DatasetRegistry, IndexedDataset};
use crate::error::{CorpusError, Result};
use crate::sample::{Sample, LOAD_AUDIO, REF};
use crate::value::Value;

#[derive(Clone)]
pub struct UtteranceRows {
    ids: Vec<String>,
    audio_paths: Vec<PathBuf>,
    references: Vec<String>,
    root: Option<PathBuf>,
    sample_rate: u32,
    decoder: Option<Arc<dyn AudioDecoder>>,
}

impl UtteranceRows {
    pub fn new(
        ids: Vec<String>,
        audio_paths: Vec<PathBuf>,
        references: Vec<String>,
        sample_rate: u32,
    ) -> Result<Self> {
        if ids.len() != audio_paths.len() || ids.len() != references.len() {
            return Err(CorpusError::invalid_argument(
                "ids, audio_paths, and references must have the same length",
            ));
        }
        if sample_rate == 0 {
            return Err(CorpusError::invalid_argument("sample_rate must be positive"));
        }
        Ok(Self {
            ids,
            audio_paths,
            references,
            root: None,
            sample_rate,
            decoder: None,
        })
    }

    /// Rows for the corpus directory `corpus` under the configured storage
    /// root, at the configured sample rate.
    pub fn from_config(
        corpus: &str,
        ids: Vec<String>,
        audio_paths: Vec<PathBuf>,
        references: Vec<String>,
        config: &CorpusConfig,
    ) -> Result<Self> {
        Ok(Self::new(ids, audio_paths, references, config.audio.sample_rate)?
            .with_root(config.storage.corpus_dir(corpus)))
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

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Location of a row's audio, joined onto the root when relative.
    pub(crate) fn resolve_path(&self, row: usize) -> PathBuf {
        let path = &self.audio_paths[row];
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.clone(),
        }
    }
}

fn path_to_value(path: &Path) -> Result<Value> {
    path.to_str().map(Value::from).ok_or_else(|| {
        CorpusError::serialization(format!("path {} is not valid UTF-8", path.display()))
    })
}

fn paths_to_value(paths: &[PathBuf]) -> Result<Value> {
    paths
        .iter()
        .map(|p| path_to_value(p))
        .collect::<Result<Vec<_>>>()
        .map(Value::List)
}

impl CorpusRows for UtteranceRows {
    const MODULE: &'static str = module_path!();
    const TYPE_NAME: &'static str = "UtteranceDataset";

    fn row_count(&self) -> usize {
        self.ids.len()
    }

    fn take(&self, rows: &[usize]) -> Self {
        Self {
            ids: rows.iter().map(|&r| self.ids[r].clone()).collect(),
            audio_paths: rows.iter().map(|&r| self.audio_paths[r].clone()).collect(),
            references: rows.iter().map(|&r| self.references[r].clone()).collect(),
            root: self.root.clone(),
            sample_rate: self.sample_rate,
            decoder: self.decoder.clone(),
        }
    }

    fn materialize(&self, row: usize) -> Result<Sample> {
        let id = self.ids[row].clone();
        let path = self.resolve_path(row);
        let sample_rate = self.sample_rate;
        let decoder = self.decoder.clone();
        let loader_id = id.clone();

        Ok(Sample::new(id)
            .with_value(REF, self.references[row].as_str())
            .with_loader(LOAD_AUDIO, move || {
                let decoder = decoder
                    .as_ref()
                    .ok_or_else(|| CorpusError::load(&loader_id, "no audio decoder configured"))?;
                decoder
                    .decode(&path, sample_rate)
                    .map(|wave| wave.into_value())
                    .map_err(|e| {
                        CorpusError::load_with_source(
                            &loader_id,
                            format!("cannot decode {}", path.display()),
                            e,
                        )
                    })
            }))
    }

    fn release(&mut self) {
        self.decoder = None;
    }

    fn encode(&self) -> Result<Value> {
        Ok(Value::map([
            ("ids", Value::from(self.ids.clone())),
            ("audio_paths", paths_to_value(&self.audio_paths)?),
            ("references", Value::from(self.references.clone())),
            (
                "root",
                self.root.as_deref().map(path_to_value).transpose()?.into(),
            ),
            ("sample_rate", Value::from(self.sample_rate)),
        ]))
    }

    fn decode(data: &Value, registry: &DatasetRegistry) -> Result<Self> {
        let sample_rate = u32::try_from(data.require_usize("sample_rate")?).map_err(|_| {
            CorpusError::serialization("sample_rate does not fit in 32 bits")
        })?;
        let mut rows = Self::new(
            data.require_str_list("ids")?,
            data.require_str_list("audio_paths")?
                .into_iter()
                .map(PathBuf::from)
                .collect(),
            data.require_str_list("references")?,
            sample_rate,
        )?;
        if let Some(Value::Str(root)) = data.get("root") {
            rows.root = Some(PathBuf::from(root));
        }
        rows.decoder = registry.decoder();
        Ok(rows)
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

impl fmt::Debug for UtteranceRows {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UtteranceRows")
            .field("len", &self.ids.len())
            .field("root", &self.root)
            .field("sample_rate", &self.sample_rate)
            .field("decoder", &self.decoder.is_some())
            .finish()
    }
}

/// A dataset over an utterance manifest.
pub type UtteranceDataset = IndexedDataset<UtteranceRows>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::audio::testing::StubDecoder;
    use crate::corpus::audio::Waveform;
    use crate::dataset::testing::{assert_dataset_contract, ids};
    use crate::dataset::{ConcatDataset, Dataset, DatasetType, TaskSet};

    /// Decoder whose single output sample is the rate it was asked for.
    struct RateEchoDecoder;

    impl AudioDecoder for RateEchoDecoder {
        fn decode(&self, _path: &Path, sample_rate: u32) -> Result<Waveform> {
            Ok(Waveform::new(vec![sample_rate as f32], sample_rate))
        }
    }

    fn decoded_rate(ds: &dyn Dataset, idx: i64) -> f32 {
        ds.get(idx).unwrap().load(LOAD_AUDIO).unwrap().as_floats().unwrap()[0]
    }

    fn rows(n: usize) -> UtteranceRows {
        UtteranceRows::new(
            (0..n).map(|i| format!("spk1-ch2-{i:04}")).collect(),
            (0..n).map(|i| PathBuf::from(format!("train/{i:04}.flac"))).collect(),
            (0..n).map(|i| format!("utterance number {i}")).collect(),
            16_000,
        )
        .unwrap()
    }

    #[test]
    fn test_length_mismatch() {
        let err = UtteranceRows::new(
            vec!["a".into(), "b".into()],
            vec![PathBuf::from("a.flac")],
            vec!["x".into(), "y".into()],
            16_000,
        )
        .unwrap_err();
        assert!(err.to_string().contains("must have the same length"));
    }

    #[test]
    fn test_contract() {
        for use_cache in [0, 50, 100] {
            assert_dataset_contract(|| {
                Box::new(UtteranceDataset::new(rows(12), TaskSet::new(["asr"]), use_cache))
            });
        }
    }

    #[test]
    fn test_loader_is_lazy_and_resolves_root() {
        let decoder = Arc::new(StubDecoder::default());
        let ds = UtteranceDataset::new(
            rows(3).with_root("/corpora/libri").with_decoder(decoder.clone()),
            TaskSet::new(["asr"]),
            0,
        );

        let sample = ds.get(1).unwrap();
        assert_eq!(sample.value(REF), Some(&Value::from("utterance number 1")));
        assert_eq!(decoder.calls(), 0);

        let audio = sample.load(LOAD_AUDIO).unwrap();
        let expected = "/corpora/libri/train/0001.flac".len() as f32 / 100.0;
        assert_eq!(audio.as_floats().unwrap(), &[expected; 4]);
        assert_eq!(decoder.calls(), 1);
    }

    #[test]
    fn test_loader_without_decoder_fails_on_load() {
        let ds = UtteranceDataset::new(rows(2), TaskSet::new(["asr"]), 0);
        let sample = ds.get(0).unwrap();
        assert!(matches!(
            sample.load(LOAD_AUDIO).unwrap_err(),
            CorpusError::Load { .. }
        ));
    }

    #[test]
    fn test_round_trip_takes_decoder_from_registry() {
        let decoder = Arc::new(StubDecoder::default());
        let registry = DatasetRegistry::with_builtins().with_decoder(decoder.clone());
        let ds = UtteranceDataset::new(rows(4).with_root("/data"), TaskSet::new(["asr"]), 0);

        let restored = UtteranceDataset::from_pointer(&ds.to_pointer().unwrap(), &registry).unwrap();
        assert_eq!(ids(&restored), ids(&ds));
        assert_eq!(restored.rows().root(), Some(Path::new("/data")));
        assert_eq!(restored.sample_rate(), Some(16_000));

        restored.get(2).unwrap().load(LOAD_AUDIO).unwrap();
        assert_eq!(decoder.calls(), 1);
    }

    #[test]
    fn test_sample_rate_propagates_to_derived() {
        let mut ds = UtteranceDataset::new(rows(5), TaskSet::new(["asr"]), 0);
        ds.set_sample_rate(8_000).unwrap();
        let derived = ds.select(&[0, 4], 0).unwrap();
        assert_eq!(derived.sample_rate(), Some(8_000));
        assert!(ds.set_sample_rate(0).is_err());
    }

    #[test]
    fn test_set_sample_rate_invalidates_cache() {
        for use_cache in [0, 4] {
            let mut ds = UtteranceDataset::new(
                rows(3).with_decoder(Arc::new(RateEchoDecoder)),
                TaskSet::new(["asr"]),
                use_cache,
            );
            assert_eq!(decoded_rate(&ds, 0), 16_000.0);

            ds.set_sample_rate(8_000).unwrap();
            assert_eq!(ds.sample_rate(), Some(8_000));
            assert_eq!(decoded_rate(&ds, 0), 8_000.0, "use_cache={use_cache}");
        }
    }

    #[test]
    fn test_concat_set_sample_rate_invalidates_cache() {
        for use_cache in [0, 4] {
            let child = |n| -> Box<dyn Dataset> {
                Box::new(UtteranceDataset::new(
                    rows(n).with_decoder(Arc::new(RateEchoDecoder)),
                    TaskSet::new(["asr"]),
                    use_cache,
                ))
            };
            let mut concat = ConcatDataset::new(vec![child(2), child(3)], use_cache).unwrap();
            assert_eq!(decoded_rate(&concat, 3), 16_000.0);

            concat.set_sample_rate(22_050).unwrap();
            assert_eq!(concat.sample_rate(), Some(22_050));
            assert_eq!(decoded_rate(&concat, 3), 22_050.0, "use_cache={use_cache}");
            assert_eq!(decoded_rate(&*concat.datasets()[1], 1), 22_050.0);
        }
    }

    #[test]
    fn test_from_config_uses_corpus_dir() {
        let mut config = CorpusConfig::default();
        config.storage.root = PathBuf::from("/mnt/datasets");
        config.audio.sample_rate = 22_050;
        let rows = UtteranceRows::from_config(
            "librispeech",
            vec!["u1".into()],
            vec![PathBuf::from("a.flac")],
            vec!["hi".into()],
            &config,
        )
        .unwrap();
        assert_eq!(
            rows.resolve_path(0),
            PathBuf::from("/mnt/datasets/librispeech/a.flac")
        );
        assert_eq!(rows.sample_rate(), Some(22_050));

        config.cache.capacity = 7;
        let ds = UtteranceDataset::with_config(rows, TaskSet::new(["asr"]), &config);
        assert_eq!(ds.use_cache(), 7);
        assert_eq!(ds.sample_rate(), Some(22_050));
    }
}
