//! Blob storage for chartport.
//!
//! This crate provides:
//! - The [`StorageBackend`] contract the registry front end writes images through
//! - An in-memory backend for tests and throwaway deployments
//! - A local filesystem backend with atomic, idempotent writes

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, memory::MemoryBackend};
pub use error::{StorageError, StorageResult};
pub use traits::{BlobDescriptor, BlobLocation, OBJECT_CONTENT_TYPE, StorageBackend};

use chartport_config::StorageConfig;
use std::sync::Arc;

/// Namespace every blob key lives under.
pub const BLOB_PREFIX: &str = "blobs";

/// Media type reported for blobs whose content type was never recorded.
pub const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

/// Create the configured storage backend.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn StorageBackend>> {
    match config {
        StorageConfig::Memory => Ok(Arc::new(MemoryBackend::new())),
        StorageConfig::Filesystem { path, public_url } => {
            let backend = FilesystemBackend::new(path, public_url.clone()).await?;
            Ok(Arc::new(backend))
        }
    }
}

/// Reject keys that could escape the blob namespace or collide with
/// backend bookkeeping.
pub(crate) fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("empty key".to_string()));
    }
    if key.starts_with('.') {
        return Err(StorageError::InvalidKey(format!(
            "key may not start with '.': {key}"
        )));
    }
    if key.contains(['/', '\\', '\0']) {
        return Err(StorageError::InvalidKey(format!(
            "key contains a path separator: {key}"
        )));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn validate_key_accepts_digests_and_aliases() {
        validate_key("sha256:abc").unwrap();
        validate_key("chartport-0123abcd").unwrap();
    }

    #[test]
    fn validate_key_rejects_traversal() {
        for key in ["", ".", "..", "../etc/passwd", "a/b", "a\\b", ".meta"] {
            assert!(
                matches!(validate_key(key), Err(StorageError::InvalidKey(_))),
                "{key:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn from_config_memory() {
        let store = from_config(&StorageConfig::Memory).await.unwrap();
        assert_eq!(store.backend_name(), "memory");
    }

    #[tokio::test]
    async fn from_config_filesystem() {
        let temp = tempdir().unwrap();
        let config = StorageConfig::Filesystem {
            path: temp.path().join("store"),
            public_url: None,
        };

        let store = from_config(&config).await.unwrap();
        assert_eq!(store.backend_name(), "filesystem");
        store.write_object("hello", "hi").await.unwrap();
        let desc = store.exists("hello").await.unwrap();
        assert_eq!(desc.size, 3);
        assert_eq!(desc.media_type, OBJECT_CONTENT_TYPE);
    }
}
