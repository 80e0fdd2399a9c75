//! Local filesystem storage backend.
//!
//! Blobs live flat under `<root>/blobs/<key>`. The digest and content type of
//! each blob are kept in a JSON sidecar under `<root>/blobs/.meta/<key>.json`.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use chartport_oci::Digest;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, instrument};

use crate::error::{StorageError, StorageResult};
use crate::traits::{BlobDescriptor, BlobLocation, StorageBackend};
use crate::{BLOB_PREFIX, DEFAULT_MEDIA_TYPE};

const META_DIR: &str = ".meta";
const TEMP_PREFIX: &str = ".tmp.";

#[derive(Debug, Serialize, Deserialize)]
struct BlobMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    digest: Option<Digest>,
    content_type: String,
}

/// Local filesystem blob store.
///
/// When `public_url` is set, reads are answered with a redirect to
/// `<public_url>/blobs/<key>`; something else (a static file server, a CDN)
/// is expected to serve the root directory there.
pub struct FilesystemBackend {
    blobs: PathBuf,
    public_url: Option<String>,
}

impl FilesystemBackend {
    /// Create a new filesystem backend rooted at `root`.
    pub async fn new(root: impl AsRef<Path>, public_url: Option<String>) -> StorageResult<Self> {
        let blobs = root.as_ref().join(BLOB_PREFIX);
        fs::create_dir_all(blobs.join(META_DIR)).await?;
        let public_url = public_url.map(|url| url.trim_end_matches('/').to_string());
        Ok(Self { blobs, public_url })
    }

    fn blob_path(&self, key: &str) -> StorageResult<PathBuf> {
        crate::validate_key(key)?;
        Ok(self.blobs.join(key))
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.blobs.join(META_DIR).join(format!("{key}.json"))
    }

    async fn read_meta(&self, key: &str) -> StorageResult<Option<BlobMeta>> {
        match fs::read(self.meta_path(key)).await {
            Ok(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(|e| StorageError::Metadata {
                    key: key.to_string(),
                    message: e.to_string(),
                }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Write `data` to a temporary file in `dir`, then rename it over `target`.
    ///
    /// The temporary file is removed when its guard drops, so a failed write
    /// leaves nothing behind. The write runs to completion on the blocking
    /// pool even if the calling future is dropped.
    async fn write_atomic(dir: &Path, target: &Path, data: Bytes) -> StorageResult<()> {
        let dir = dir.to_path_buf();
        let target = target.to_path_buf();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut temp = tempfile::Builder::new()
                .prefix(TEMP_PREFIX)
                .tempfile_in(&dir)?;
            temp.write_all(&data)?;
            temp.as_file().sync_all()?;
            temp.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(std::io::Error::other)??;
        Ok(())
    }
}

fn not_found(key: &str, e: std::io::Error) -> StorageError {
    if e.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::Io(e)
    }
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, key: &str) -> StorageResult<BlobDescriptor> {
        let path = self.blob_path(key)?;
        let metadata = fs::metadata(&path).await.map_err(|e| not_found(key, e))?;
        let meta = self.read_meta(key).await?;

        Ok(BlobDescriptor {
            digest: meta.as_ref().and_then(|m| m.digest.clone()),
            media_type: meta
                .map(|m| m.content_type)
                .unwrap_or_else(|| DEFAULT_MEDIA_TYPE.to_string()),
            size: metadata.len(),
        })
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn blob(&self, key: &str) -> StorageResult<BlobLocation> {
        if let Some(base) = &self.public_url {
            let path = self.blob_path(key)?;
            if !fs::try_exists(&path).await? {
                return Err(StorageError::NotFound(key.to_string()));
            }
            return Ok(BlobLocation::Redirect(format!("{base}/{BLOB_PREFIX}/{key}")));
        }

        let descriptor = self.exists(key).await?;
        let data = fs::read(self.blob_path(key)?)
            .await
            .map_err(|e| not_found(key, e))?;
        Ok(BlobLocation::Content {
            descriptor,
            data: Bytes::from(data),
        })
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn write_blob(
        &self,
        key: &str,
        digest: &Digest,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<()> {
        let path = self.blob_path(key)?;
        if fs::try_exists(&path).await? {
            debug!(key, "blob already present");
            return Ok(());
        }

        let start = Instant::now();
        let meta = BlobMeta {
            digest: Some(digest.clone()),
            content_type: content_type.to_string(),
        };
        let raw_meta = serde_json::to_vec(&meta).map_err(|e| StorageError::Metadata {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::write_atomic(
            &self.blobs.join(META_DIR),
            &self.meta_path(key),
            Bytes::from(raw_meta),
        )
        .await?;

        // The data rename is what makes the blob visible.
        Self::write_atomic(&self.blobs, &path, data).await?;

        debug!(
            key,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "blob written"
        );
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}
