//! Storage trait definitions.

use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use chartport_oci::{Digest, OciImage, sha256_digest};
use futures::future::try_join_all;
use tracing::debug;

use crate::error::StorageResult;

/// Content type recorded for objects written through [`StorageBackend::write_object`].
pub const OBJECT_CONTENT_TYPE: &str = "text/plain";

/// What an existence check knows about a stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobDescriptor {
    /// Content digest, if the store recorded one.
    pub digest: Option<Digest>,
    pub media_type: String,
    pub size: u64,
}

/// How a blob read is answered.
#[derive(Debug, Clone)]
pub enum BlobLocation {
    /// The bytes live elsewhere; send the client there.
    Redirect(String),
    /// The store hands the bytes back directly.
    Content {
        descriptor: BlobDescriptor,
        data: Bytes,
    },
}

/// Content-addressed blob store.
///
/// Keys are either content digests or cache-key aliases; all of them live in
/// the single `blobs/` namespace. Writes are idempotent: writing a key that
/// already exists succeeds without touching the stored bytes. A blob becomes
/// visible to [`exists`](StorageBackend::exists) only once fully written.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Look up a blob without fetching its body.
    async fn exists(&self, key: &str) -> StorageResult<BlobDescriptor>;

    /// Locate the bytes for `key`.
    async fn blob(&self, key: &str) -> StorageResult<BlobLocation>;

    /// Store `data` under `key`, recording `digest` and `content_type`.
    async fn write_blob(
        &self,
        key: &str,
        digest: &Digest,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<()>;

    /// Get the name of this storage backend.
    fn backend_name(&self) -> &'static str;

    /// Store a small text object. A trailing newline is appended.
    async fn write_object(&self, key: &str, contents: &str) -> StorageResult<()> {
        let data = Bytes::from(format!("{contents}\n"));
        let digest = sha256_digest(&data)?;
        self.write_blob(key, &digest, data, OBJECT_CONTENT_TYPE).await
    }

    /// Write every blob of `image`, then its manifest, then one copy of the
    /// manifest per alias key.
    ///
    /// Layer writes run concurrently, as do alias writes; the manifest is
    /// only written once every layer has landed.
    async fn write_image(&self, image: &OciImage, aliases: &[String]) -> StorageResult<()> {
        let start = Instant::now();
        let manifest_type = image.media_type().to_string();

        let config_digest = image.config_name();
        self.write_blob(
            &config_digest.to_string(),
            config_digest,
            image.raw_config().clone(),
            &image.config_media_type().to_string(),
        )
        .await?;

        try_join_all(image.layers().iter().map(|layer| async move {
            self.write_blob(
                &layer.digest().to_string(),
                layer.digest(),
                layer.data().clone(),
                &layer.media_type().to_string(),
            )
            .await
        }))
        .await?;

        let digest = image.digest();
        let manifest = image.raw_manifest();
        self.write_blob(
            &digest.to_string(),
            digest,
            manifest.clone(),
            &manifest_type,
        )
        .await?;

        let manifest_type = &manifest_type;
        try_join_all(aliases.iter().map(|alias| async move {
            self.write_blob(alias, digest, manifest.clone(), manifest_type)
                .await
        }))
        .await?;

        debug!(
            backend = self.backend_name(),
            digest = %digest,
            aliases = aliases.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "image written"
        );
        Ok(())
    }
}
