// rust/corpus-core/src/descriptor/format.rs

//! Descriptor file format.
//!
//! ```text
//! +------------------------+
//! | Header Length (4 bytes)|  <- u32 little-endian
//! +------------------------+
//! | Header (bincode)       |  <- DescriptorHeader
//! +------------------------+
//! | Payload                |  <- Value encoded per header
//! +------------------------+
//! ```

use std::fmt;
use std::hash::Hasher;

use serde::{Deserialize, Serialize};
use twox_hash::XxHash64;

use crate::error::{CorpusError, Result};
use crate::value::Value;

/// Payload encoding of a descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    Bincode,
    /// Human-readable, for descriptors meant to be inspected or edited.
    Json,
}

impl Encoding {
    pub fn encode(self, value: &Value) -> Result<Vec<u8>> {
        match self {
            Encoding::Bincode => bincode::serialize(value).map_err(|e| {
                CorpusError::serialization(format!("failed to encode descriptor payload: {e}"))
            }),
            Encoding::Json => serde_json::to_vec_pretty(value).map_err(|e| {
                CorpusError::serialization(format!("failed to encode descriptor payload: {e}"))
            }),
        }
    }

    pub fn decode(self, bytes: &[u8]) -> Result<Value> {
        match self {
            Encoding::Bincode => bincode::deserialize(bytes).map_err(|e| {
                CorpusError::serialization(format!("failed to decode descriptor payload: {e}"))
            }),
            Encoding::Json => serde_json::from_slice(bytes).map_err(|e| {
                CorpusError::serialization(format!("failed to decode descriptor payload: {e}"))
            }),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoding::Bincode => f.write_str("bincode"),
            Encoding::Json => f.write_str("json"),
        }
    }
}

/// Header of a descriptor file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorHeader {
    /// Magic bytes identifying a descriptor file ("SCDS")
    pub magic: [u8; 4],
    /// Format version number
    pub version: u32,
    pub encoding: Encoding,
    /// Size of the encoded payload in bytes
    pub payload_size: u64,
    /// XXHash64 checksum of the encoded payload
    pub checksum: u64,
    /// Free-form description of the stored dataset
    pub description: String,
}

impl DescriptorHeader {
    pub const MAGIC: [u8; 4] = *b"SCDS";

    pub const VERSION: u32 = 1;

    /// File extension of descriptor files.
    pub const EXTENSION: &'static str = "scds";

    pub fn new(
        encoding: Encoding,
        payload_size: u64,
        checksum: u64,
        description: impl Into<String>,
    ) -> Self {
        Self {
            magic: Self::MAGIC,
            version: Self::VERSION,
            encoding,
            payload_size,
            checksum,
            description: description.into(),
        }
    }

    pub fn validate_magic(&self) -> bool {
        self.magic == Self::MAGIC
    }

    pub fn validate_version(&self) -> bool {
        self.version == Self::VERSION
    }
}

/// XXHash64 (seed 0) of `data`.
pub(crate) fn checksum(data: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(data);
    hasher.finish()
}
