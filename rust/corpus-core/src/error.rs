// rust/corpus-core/src/error.rs

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CorpusError {

    #[error("Index {index} out of range (length: {len})")]
    IndexOutOfRange {
        index: i64,
        len: usize,
    },

    #[error("Invalid slice bounds: {message}")]
    InvalidSlice {
        message: String,
    },

    #[error("Invalid argument: {message}")]
    InvalidArgument {
        message: String,
    },

    #[error("Cannot {operation} a cleaned dataset '{name}'")]
    Cleaned {
        name: String,
        operation: &'static str,
    },

    #[error("Type mismatch: {message}")]
    TypeMismatch {
        message: String,
    },

    #[error("Field '{field}' is not available in sample '{id}'")]
    MissingField {
        field: String,
        id: String,
    },

    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
    },

    #[error("Failed to load sample '{id}': {message}")]
    Load {
        id: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("I/O error at '{path}': {message}")]
    Io {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },
}

pub type Result<T> = std::result::Result<T, CorpusError>;

// Convenience constructors
impl CorpusError {

    pub fn index_out_of_range(index: i64, len: usize) -> Self {
        Self::IndexOutOfRange { index, len }
    }

    pub fn invalid_slice(message: impl Into<String>) -> Self {
        Self::InvalidSlice {
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn cleaned(name: impl Into<String>, operation: &'static str) -> Self {
        Self::Cleaned {
            name: name.into(),
            operation,
        }
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::TypeMismatch {
            message: message.into(),
        }
    }

    pub fn missing_field(field: impl Into<String>, id: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
            id: id.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    pub fn load(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Load {
            id: id.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn load_with_source(
        id: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Load {
            id: id.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn io(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Io {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn io_with_source(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::Io {
            path: path.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    /// Whether this error reports use of a dataset after `clean()`.
    pub fn is_cleaned(&self) -> bool {
        matches!(self, Self::Cleaned { .. })
    }
}
