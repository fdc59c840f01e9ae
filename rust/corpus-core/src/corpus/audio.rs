// rust/corpus-core/src/corpus/audio.rs

//! The audio decoding collaborator.
//!
//! The core ships no decoder. Applications hand one to the
//! [`DatasetRegistry`](crate::dataset::DatasetRegistry) or directly to an
//! adapter; lazy `load_audio` loaders call it when forced.

use std::fmt;
use std::path::Path;

use crate::error::Result;
use crate::value::Value;

/// A mono waveform at a known sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Floats(self.samples)
    }
}

/// Decodes an audio file into a mono waveform.
///
/// `sample_rate` is the rate the caller wants; implementations that cannot
/// resample report the rate they actually produced in the returned
/// [`Waveform`].
pub trait AudioDecoder: Send + Sync {
    fn decode(&self, path: &Path, sample_rate: u32) -> Result<Waveform>;
}

impl fmt::Debug for dyn AudioDecoder + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AudioDecoder")
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::error::CorpusError;

    /// Decoder producing a short constant waveform per path, with an
    /// optional fixed rate per path and a call counter.
    #[derive(Default)]
    pub(crate) struct StubDecoder {
        rates: Mutex<HashMap<PathBuf, u32>>,
        pub(crate) calls: AtomicUsize,
    }

    impl StubDecoder {
        pub(crate) fn with_rate(self, path: impl Into<PathBuf>, rate: u32) -> Self {
            self.rates.lock().unwrap().insert(path.into(), rate);
            self
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl AudioDecoder for StubDecoder {
        fn decode(&self, path: &Path, sample_rate: u32) -> Result<Waveform> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if path.to_string_lossy().contains("missing") {
                return Err(CorpusError::io(path, "no such audio file"));
            }
            let rate = self
                .rates
                .lock()
                .unwrap()
                .get(path)
                .copied()
                .unwrap_or(sample_rate);
            let level = path.to_string_lossy().len() as f32 / 100.0;
            Ok(Waveform::new(vec![level; 4], rate))
        }
    }
}
