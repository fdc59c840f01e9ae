// rust/corpus-core/src/descriptor/mod.rs

//! On-disk dataset descriptors.
//!
//! A descriptor stores a dataset's pointer form, not its samples: loading
//! one rebuilds the dataset through a [`DatasetRegistry`], and lazy fields
//! such as audio are resolved again from the dataset's own sources.
//!
//! # Format
//!
//! ```text
//! +------------------------+
//! | Header Length (4 bytes)|  <- u32 little-endian
//! +------------------------+
//! | Header (bincode)       |  <- DescriptorHeader
//! +------------------------+
//! | Payload                |  <- bincode or JSON encoded Value
//! +------------------------+
//! ```
//!
//! # Example
//!
//! ```no_run
//! use corpus_core::dataset::{Dataset, DatasetRegistry, TaskSet};
//! use corpus_core::corpus::MemoryDataset;
//! use corpus_core::descriptor::{load_dataset, save_dataset, DescriptorWriter};
//!
//! let dataset = MemoryDataset::from_ids(["a", "b"], TaskSet::new(["asr"]), 0);
//! let writer = DescriptorWriter::new("/tmp/descriptors");
//! let path = save_dataset(&writer, "dev", &dataset).unwrap();
//!
//! let restored = load_dataset(&path, &DatasetRegistry::with_builtins()).unwrap();
//! assert_eq!(restored.length().unwrap(), 2);
//! ```

mod format;
mod reader;
mod writer;

use std::path::{Path, PathBuf};

pub use format::{DescriptorHeader, Encoding};
pub use reader::DescriptorReader;
pub use writer::DescriptorWriter;

use crate::dataset::{Dataset, DatasetRegistry};
use crate::error::Result;
use crate::wrapper::DatasetWrapper;

/// Saves `dataset`'s pointer as the descriptor `name`.
pub fn save_dataset(writer: &DescriptorWriter, name: &str, dataset: &dyn Dataset) -> Result<PathBuf> {
    let pointer = dataset.to_pointer()?;
    let description = format!("{} with {} samples", dataset.name(), dataset.length()?);
    writer.write(name, &pointer, &description)
}

/// Rebuilds the dataset stored at `path`.
pub fn load_dataset(path: &Path, registry: &DatasetRegistry) -> Result<Box<dyn Dataset>> {
    let pointer = DescriptorReader::new().read(path)?;
    registry.dataset_from_pointer(&pointer)
}

/// Saves a facade's pointer as the descriptor `name`.
pub fn save_wrapper<W: DatasetWrapper>(
    writer: &DescriptorWriter,
    name: &str,
    wrapper: &W,
) -> Result<PathBuf> {
    let pointer = wrapper.to_pointer()?;
    let description = format!("{} over {}", W::TYPE_NAME, wrapper.name());
    writer.write(name, &pointer, &description)
}

/// Rebuilds a facade of type `W` from the descriptor at `path`.
pub fn load_wrapper<W: DatasetWrapper>(path: &Path, registry: &DatasetRegistry) -> Result<W> {
    let pointer = DescriptorReader::new().read(path)?;
    W::from_pointer(&pointer, registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf as StdPathBuf;
    use std::sync::Arc;

    use tempfile::TempDir;

    use crate::corpus::audio::testing::StubDecoder;
    use crate::corpus::{MemoryDataset, UtteranceDataset, UtteranceRows};
    use crate::dataset::testing::{ids, prefixed_dataset};
    use crate::dataset::TaskSet;
    use crate::error::CorpusError;
    use crate::wrapper::asr::{AsrConcatDataset, AsrDataset};

    #[test]
    fn test_dataset_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let registry = DatasetRegistry::with_builtins();
        for encoding in [Encoding::Bincode, Encoding::Json] {
            let writer = DescriptorWriter::new(temp_dir.path()).with_encoding(encoding);
            let dataset = MemoryDataset::from_ids(["a", "b", "c"], TaskSet::new(["asr"]), 0);

            let path = save_dataset(&writer, "memory", &dataset).unwrap();
            let header = DescriptorReader::new().read_header(&path).unwrap();
            assert_eq!(header.description, "MemoryDataset with 3 samples");

            let restored = load_dataset(&path, &registry).unwrap();
            assert_eq!(ids(&*restored), vec!["a", "b", "c"]);
        }
    }

    #[test]
    fn test_concat_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let writer = DescriptorWriter::new(temp_dir.path());
        let left: Box<dyn Dataset> = Box::new(prefixed_dataset("l", 2, 0));
        let joined = left.concat(Box::new(prefixed_dataset("r", 3, 0)), 0).unwrap();

        let path = save_dataset(&writer, "joined", &joined).unwrap();
        let restored = load_dataset(&path, &DatasetRegistry::with_builtins()).unwrap();

        assert_eq!(restored.name(), "ConcatDataset");
        assert_eq!(ids(&*restored), ids(&joined));
    }

    #[test]
    fn test_cleaned_dataset_is_not_saved() {
        let temp_dir = TempDir::new().unwrap();
        let writer = DescriptorWriter::new(temp_dir.path());
        let mut dataset = prefixed_dataset("x", 2, 0);
        dataset.clean();

        let err = save_dataset(&writer, "gone", &dataset).unwrap_err();
        assert!(err.is_cleaned());
        assert!(!writer.path_for("gone").exists());
    }

    #[test]
    fn test_wrapper_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let writer = DescriptorWriter::new(temp_dir.path()).with_encoding(Encoding::Json);
        let decoder = Arc::new(StubDecoder::default());
        let make = |prefix: &str| {
            let rows = UtteranceRows::new(
                vec![format!("{prefix}-0"), format!("{prefix}-1")],
                vec![StdPathBuf::from("0.flac"), StdPathBuf::from("1.flac")],
                vec!["zero".into(), "one".into()],
                16_000,
            )
            .unwrap()
            .with_root(temp_dir.path().join(prefix))
            .with_decoder(decoder.clone());
            AsrDataset::new(Box::new(UtteranceDataset::new(rows, TaskSet::new(["asr"]), 0)))
                .unwrap()
        };
        let joined = make("a").concat(make("b"), 0).unwrap();

        let path = save_wrapper(&writer, "asr", &joined).unwrap();
        let registry = DatasetRegistry::with_builtins().with_decoder(decoder.clone());
        let restored: AsrConcatDataset = load_wrapper(&path, &registry).unwrap();

        assert_eq!(restored.length().unwrap(), 4);
        assert_eq!(restored.sample_rate(), Some(16_000));
        let last = restored.get(-1).unwrap();
        assert_eq!(last.id(), "b-1");
        assert_eq!(last.ref_text().unwrap(), "one");
        assert_eq!(last.audio().unwrap().len(), 4);

        let err = load_wrapper::<AsrDataset>(&path, &registry).unwrap_err();
        assert!(matches!(err, CorpusError::TypeMismatch { .. }));
    }
}
