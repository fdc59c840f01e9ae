// rust/corpus-core/src/descriptor/writer.rs

//! Descriptor writer.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{CorpusError, Result};
use crate::value::Value;

use super::format::{checksum, DescriptorHeader, Encoding};

/// Writes descriptor files into one directory.
///
/// Every write goes to a hidden temporary file first and is renamed into
/// place, so a reader never observes a partially written descriptor.
#[derive(Debug, Clone)]
pub struct DescriptorWriter {
    dir: PathBuf,
    encoding: Encoding,
}

impl DescriptorWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            encoding: Encoding::default(),
        }
    }

    #[must_use]
    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Path the descriptor called `name` is written to.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir
            .join(format!("{name}.{}", DescriptorHeader::EXTENSION))
    }

    /// Writes `value` as the descriptor `name`, replacing any existing one,
    /// and returns its path.
    pub fn write(&self, name: &str, value: &Value, description: &str) -> Result<PathBuf> {
        if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
            return Err(CorpusError::invalid_argument(format!(
                "invalid descriptor name '{name}'"
            )));
        }
        fs::create_dir_all(&self.dir).map_err(|e| {
            CorpusError::io_with_source(&self.dir, "failed to create descriptor directory", e)
        })?;

        let payload = self.encoding.encode(value)?;
        let header = DescriptorHeader::new(
            self.encoding,
            payload.len() as u64,
            checksum(&payload),
            description,
        );
        let header_bytes = bincode::serialize(&header).map_err(|e| {
            CorpusError::serialization(format!("failed to serialize descriptor header: {e}"))
        })?;

        let header_len = u32::try_from(header_bytes.len()).map_err(|_| {
            CorpusError::serialization("descriptor header does not fit a u32 length")
        })?;
        let mut data = Vec::with_capacity(4 + header_bytes.len() + payload.len());
        data.extend_from_slice(&header_len.to_le_bytes());
        data.extend_from_slice(&header_bytes);
        data.extend_from_slice(&payload);

        let final_path = self.path_for(name);
        let temp_path = self
            .dir
            .join(format!(".{name}.{}.tmp", DescriptorHeader::EXTENSION));
        write_synced(&temp_path, &data)?;
        fs::rename(&temp_path, &final_path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            CorpusError::io_with_source(&final_path, "failed to move descriptor into place", e)
        })?;

        debug!(
            path = %final_path.display(),
            encoding = %self.encoding,
            bytes = data.len(),
            "descriptor written"
        );
        Ok(final_path)
    }
}

fn write_synced(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = File::create(path)
        .map_err(|e| CorpusError::io_with_source(path, "failed to create descriptor file", e))?;
    file.write_all(data)
        .map_err(|e| CorpusError::io_with_source(path, "failed to write descriptor data", e))?;
    file.sync_all()
        .map_err(|e| CorpusError::io_with_source(path, "failed to sync descriptor file", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn value() -> Value {
        Value::map([("samples", Value::List(vec![Value::from("a"), Value::from("b")]))])
    }

    #[test]
    fn test_write_creates_file() {
        let temp_dir = TempDir::new().unwrap();
        let writer = DescriptorWriter::new(temp_dir.path().join("descriptors"));

        let path = writer.write("dev", &value(), "dev split").unwrap();

        assert_eq!(path, temp_dir.path().join("descriptors/dev.scds"));
        assert!(path.exists());
    }

    #[test]
    fn test_file_layout() {
        let temp_dir = TempDir::new().unwrap();
        let writer = DescriptorWriter::new(temp_dir.path()).with_encoding(Encoding::Json);

        let path = writer.write("dev", &value(), "dev split").unwrap();
        let data = fs::read(&path).unwrap();

        let header_len = u32::from_le_bytes(data[..4].try_into().unwrap()) as usize;
        let header: DescriptorHeader = bincode::deserialize(&data[4..4 + header_len]).unwrap();
        let payload = &data[4 + header_len..];

        assert!(header.validate_magic());
        assert_eq!(header.encoding, Encoding::Json);
        assert_eq!(header.payload_size, payload.len() as u64);
        assert_eq!(header.checksum, checksum(payload));
        assert_eq!(header.description, "dev split");
        assert_eq!(Encoding::Json.decode(payload).unwrap(), value());
    }

    #[test]
    fn test_no_temp_files_remain() {
        let temp_dir = TempDir::new().unwrap();
        let writer = DescriptorWriter::new(temp_dir.path());

        writer.write("dev", &value(), "").unwrap();
        writer.write("dev", &Value::Null, "").unwrap();

        let entries: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(entries, vec!["dev.scds".to_string()]);
    }

    #[test]
    fn test_rejects_invalid_names() {
        let temp_dir = TempDir::new().unwrap();
        let writer = DescriptorWriter::new(temp_dir.path());
        for name in ["", ".hidden", "nested/dev", "..\\dev"] {
            let err = writer.write(name, &value(), "").unwrap_err();
            assert!(matches!(err, CorpusError::InvalidArgument { .. }), "{name}");
        }
    }
}
