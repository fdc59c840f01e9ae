// rust/corpus-core/src/descriptor/reader.rs

//! Descriptor reader.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::error::{CorpusError, Result};
use crate::value::Value;

use super::format::{checksum, DescriptorHeader};

/// Reads and verifies descriptor files.
///
/// Magic, version, payload size and checksum are all checked before the
/// payload is decoded; any mismatch is a serialization error.
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptorReader;

impl DescriptorReader {
    pub fn new() -> Self {
        Self
    }

    /// Reads the descriptor at `path` and decodes its payload.
    pub fn read(&self, path: &Path) -> Result<Value> {
        let data = std::fs::read(path)
            .map_err(|e| CorpusError::io_with_source(path, "failed to read descriptor file", e))?;

        let (header, header_end) = parse_header(&data)?;
        validate(&header)?;

        let payload = &data[header_end..];
        if payload.len() as u64 != header.payload_size {
            return Err(CorpusError::serialization(format!(
                "descriptor size mismatch: expected {}, got {}",
                header.payload_size,
                payload.len()
            )));
        }
        let computed = checksum(payload);
        if computed != header.checksum {
            return Err(CorpusError::serialization(format!(
                "descriptor checksum mismatch: expected {}, got {}",
                header.checksum, computed
            )));
        }

        let value = header.encoding.decode(payload)?;
        debug!(path = %path.display(), encoding = %header.encoding, "descriptor read");
        Ok(value)
    }

    /// Reads only the header, leaving the payload unread.
    pub fn read_header(&self, path: &Path) -> Result<DescriptorHeader> {
        let mut file = File::open(path)
            .map_err(|e| CorpusError::io_with_source(path, "failed to open descriptor file", e))?;

        let mut len_bytes = [0u8; 4];
        file.read_exact(&mut len_bytes)
            .map_err(|e| CorpusError::io_with_source(path, "failed to read header length", e))?;
        let mut header_bytes = vec![0u8; u32::from_le_bytes(len_bytes) as usize];
        file.read_exact(&mut header_bytes)
            .map_err(|e| CorpusError::io_with_source(path, "failed to read header", e))?;

        let header = decode_header(&header_bytes)?;
        validate(&header)?;
        Ok(header)
    }
}

fn parse_header(data: &[u8]) -> Result<(DescriptorHeader, usize)> {
    let Some(len_bytes) = data.get(..4) else {
        return Err(CorpusError::serialization("descriptor file too small"));
    };
    let mut len = [0u8; 4];
    len.copy_from_slice(len_bytes);
    let header_end = 4 + u32::from_le_bytes(len) as usize;

    let Some(header_bytes) = data.get(4..header_end) else {
        return Err(CorpusError::serialization(
            "descriptor file truncated: header incomplete",
        ));
    };
    Ok((decode_header(header_bytes)?, header_end))
}

fn decode_header(bytes: &[u8]) -> Result<DescriptorHeader> {
    bincode::deserialize(bytes).map_err(|e| {
        CorpusError::serialization(format!("failed to deserialize descriptor header: {e}"))
    })
}

fn validate(header: &DescriptorHeader) -> Result<()> {
    if !header.validate_magic() {
        return Err(CorpusError::serialization(format!(
            "invalid magic bytes: expected {:?}, got {:?}",
            DescriptorHeader::MAGIC,
            header.magic
        )));
    }
    if !header.validate_version() {
        return Err(CorpusError::serialization(format!(
            "unsupported descriptor version: expected {}, got {}",
            DescriptorHeader::VERSION,
            header.version
        )));
    }
    Ok(())
}
