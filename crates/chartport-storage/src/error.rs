//! Storage error types.

use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt blob metadata for {key}: {message}")]
    Metadata { key: String, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Digest(#[from] chartport_oci::OciError),
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
