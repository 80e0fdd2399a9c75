//! In-process storage backend.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use chartport_oci::Digest;
use tokio::sync::RwLock;
use tracing::instrument;

use crate::error::{StorageError, StorageResult};
use crate::traits::{BlobDescriptor, BlobLocation, StorageBackend};

#[derive(Debug, Clone)]
struct StoredBlob {
    digest: Digest,
    content_type: String,
    data: Bytes,
}

impl StoredBlob {
    fn descriptor(&self) -> BlobDescriptor {
        BlobDescriptor {
            digest: Some(self.digest.clone()),
            media_type: self.content_type.clone(),
            size: self.data.len() as u64,
        }
    }
}

/// Blob store held in memory. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    blobs: RwLock<HashMap<String, StoredBlob>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Raw bytes stored under `key`.
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        self.blobs.read().await.get(key).map(|b| b.data.clone())
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    #[instrument(skip(self), fields(backend = "memory"))]
    async fn exists(&self, key: &str) -> StorageResult<BlobDescriptor> {
        crate::validate_key(key)?;
        self.blobs
            .read()
            .await
            .get(key)
            .map(StoredBlob::descriptor)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    #[instrument(skip(self), fields(backend = "memory"))]
    async fn blob(&self, key: &str) -> StorageResult<BlobLocation> {
        crate::validate_key(key)?;
        let blobs = self.blobs.read().await;
        let stored = blobs
            .get(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        Ok(BlobLocation::Content {
            descriptor: stored.descriptor(),
            data: stored.data.clone(),
        })
    }

    #[instrument(skip(self, data), fields(backend = "memory", size = data.len()))]
    async fn write_blob(
        &self,
        key: &str,
        digest: &Digest,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<()> {
        crate::validate_key(key)?;
        self.blobs
            .write()
            .await
            .entry(key.to_string())
            .or_insert_with(|| StoredBlob {
                digest: digest.clone(),
                content_type: content_type.to_string(),
                data,
            });
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chartport_oci::sha256_digest;
    use crate::test_support::sample_image;

    #[tokio::test]
    async fn missing_blob_is_not_found() {
        let store = MemoryBackend::new();
        assert!(matches!(
            store.exists("sha256:missing").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            store.blob("sha256:missing").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn write_then_exists_reports_descriptor() {
        let store = MemoryBackend::new();
        let data = Bytes::from_static(b"payload");
        let digest = sha256_digest(&data).unwrap();
        store
            .write_blob("k", &digest, data.clone(), "application/x-test")
            .await
            .unwrap();

        let desc = store.exists("k").await.unwrap();
        assert_eq!(desc.digest, Some(digest));
        assert_eq!(desc.media_type, "application/x-test");
        assert_eq!(desc.size, 7);

        match store.blob("k").await.unwrap() {
            BlobLocation::Content { data: got, .. } => assert_eq!(got, data),
            BlobLocation::Redirect(url) => panic!("unexpected redirect to {url}"),
        }
    }

    #[tokio::test]
    async fn second_write_is_a_noop() {
        let store = MemoryBackend::new();
        let first = Bytes::from_static(b"first");
        let digest = sha256_digest(&first).unwrap();
        store
            .write_blob("k", &digest, first.clone(), "text/plain")
            .await
            .unwrap();
        store
            .write_blob("k", &digest, Bytes::from_static(b"second"), "text/other")
            .await
            .unwrap();

        assert_eq!(store.get("k").await.unwrap(), first);
        assert_eq!(store.exists("k").await.unwrap().media_type, "text/plain");
    }

    #[tokio::test]
    async fn write_object_appends_newline() {
        let store = MemoryBackend::new();
        store.write_object("obj", "hello").await.unwrap();
        store.write_object("obj", "ignored").await.unwrap();
        assert_eq!(store.get("obj").await.unwrap(), Bytes::from_static(b"hello\n"));
    }

    #[tokio::test]
    async fn write_image_stores_every_blob_and_aliases() {
        let store = MemoryBackend::new();
        let image = sample_image();
        store
            .write_image(&image, &["alias-one".to_string(), "alias-two".to_string()])
            .await
            .unwrap();

        let mut expected = vec![
            image.config_name().to_string(),
            image.layers()[0].digest().to_string(),
            image.layers()[1].digest().to_string(),
            image.digest().to_string(),
            "alias-one".to_string(),
            "alias-two".to_string(),
        ];
        expected.sort();
        assert_eq!(store.keys().await, expected);

        let alias = store.exists("alias-one").await.unwrap();
        assert_eq!(alias.digest.as_ref(), Some(image.digest()));
        assert_eq!(alias.media_type, image.media_type().to_string());
        assert_eq!(alias.size, image.size());
        assert_eq!(
            store.get("alias-two").await.unwrap(),
            store.get(&image.digest().to_string()).await.unwrap()
        );
    }

    #[tokio::test]
    async fn write_image_twice_is_idempotent() {
        let store = MemoryBackend::new();
        let image = sample_image();
        store.write_image(&image, &[]).await.unwrap();
        let before = store.keys().await;
        store.write_image(&image, &[]).await.unwrap();
        assert_eq!(store.keys().await, before);
    }

    #[tokio::test]
    async fn invalid_key_is_rejected() {
        let store = MemoryBackend::new();
        assert!(matches!(
            store.exists("../escape").await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(store.is_empty().await);
    }
}
