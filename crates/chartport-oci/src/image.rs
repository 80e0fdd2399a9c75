use std::io::Read;

use bytes::Bytes;
use oci_spec::image::{
    Arch, ConfigBuilder, Descriptor, DescriptorBuilder, History, ImageConfigurationBuilder,
    ImageManifestBuilder, MediaType, Os, RootFsBuilder,
};
use sha2::{Digest as _, Sha256};

use crate::digest::{from_hasher, sha256_digest};
use crate::{Digest, OciError};

/// The zero timestamp recorded in image history and config.
pub const ZERO_TIME: &str = "0001-01-01T00:00:00Z";

const SCHEMA_VERSION: u32 = 2;

/// An immutable layer blob.
#[derive(Debug, Clone)]
pub struct Layer {
    descriptor: Descriptor,
    data: Bytes,
    diff_id: Digest,
}

impl Layer {
    /// A layer stored exactly as given; its diff-id equals its digest.
    pub fn uncompressed(data: impl Into<Bytes>, media_type: MediaType) -> Result<Self, OciError> {
        let data = data.into();
        let digest = sha256_digest(&data)?;
        Self::new(data, media_type, digest.clone(), digest)
    }

    /// A gzip-compressed layer. The diff-id is the digest of the inflated content.
    pub fn gzip(data: impl Into<Bytes>, media_type: MediaType) -> Result<Self, OciError> {
        let data = data.into();
        let diff_id = inflated_digest(&data)?;
        let digest = sha256_digest(&data)?;
        Self::new(data, media_type, digest, diff_id)
    }

    fn new(
        data: Bytes,
        media_type: MediaType,
        digest: Digest,
        diff_id: Digest,
    ) -> Result<Self, OciError> {
        let descriptor = DescriptorBuilder::default()
            .media_type(media_type)
            .digest(digest)
            .size(data.len() as u64)
            .build()?;
        Ok(Self {
            descriptor,
            data,
            diff_id,
        })
    }

    pub fn media_type(&self) -> &MediaType {
        self.descriptor.media_type()
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn digest(&self) -> &Digest {
        self.descriptor.digest()
    }

    pub fn diff_id(&self) -> &Digest {
        &self.diff_id
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }
}

fn inflated_digest(data: &[u8]) -> Result<Digest, OciError> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = decoder
            .read(&mut buf)
            .map_err(|e| OciError::InvalidLayer(format!("inflate gzip layer: {e}")))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    from_hasher(hasher)
}

/// Assembles an image from layers, like appending to an empty image.
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    media_type: MediaType,
    config_media_type: MediaType,
    layers: Vec<Layer>,
    history: Vec<History>,
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self {
            media_type: MediaType::ImageManifest,
            config_media_type: MediaType::ImageConfig,
            layers: Vec::new(),
            history: Vec::new(),
        }
    }
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layer(mut self, layer: Layer, history: History) -> Self {
        self.layers.push(layer);
        self.history.push(history);
        self
    }

    pub fn media_type(mut self, media_type: MediaType) -> Self {
        self.media_type = media_type;
        self
    }

    pub fn config_media_type(mut self, media_type: MediaType) -> Self {
        self.config_media_type = media_type;
        self
    }

    /// Serialize config and manifest and compute their digests.
    ///
    /// The config has an empty architecture and OS, a zero creation time and
    /// an empty runtime config, so its bytes depend on the layers alone.
    pub fn build(self) -> Result<OciImage, OciError> {
        let rootfs = RootFsBuilder::default()
            .typ("layers")
            .diff_ids(
                self.layers
                    .iter()
                    .map(|layer| layer.diff_id().to_string())
                    .collect::<Vec<_>>(),
            )
            .build()?;
        let config = ImageConfigurationBuilder::default()
            .created(ZERO_TIME)
            .architecture(Arch::Other(String::new()))
            .os(Os::Other(String::new()))
            .config(ConfigBuilder::default().build()?)
            .rootfs(rootfs)
            .history(self.history.clone())
            .build()?;
        let raw_config = serde_json::to_vec(&config).map_err(|source| OciError::Encode {
            what: "image config",
            source,
        })?;
        let config_descriptor = DescriptorBuilder::default()
            .media_type(self.config_media_type)
            .digest(sha256_digest(&raw_config)?)
            .size(raw_config.len() as u64)
            .build()?;

        let manifest = ImageManifestBuilder::default()
            .schema_version(SCHEMA_VERSION)
            .media_type(self.media_type.clone())
            .config(config_descriptor.clone())
            .layers(
                self.layers
                    .iter()
                    .map(|layer| layer.descriptor().clone())
                    .collect::<Vec<_>>(),
            )
            .build()?;
        let raw_manifest = serde_json::to_vec(&manifest).map_err(|source| OciError::Encode {
            what: "image manifest",
            source,
        })?;
        let digest = sha256_digest(&raw_manifest)?;

        Ok(OciImage {
            media_type: self.media_type,
            config: config_descriptor,
            raw_config: Bytes::from(raw_config),
            layers: self.layers,
            history: self.history,
            raw_manifest: Bytes::from(raw_manifest),
            digest,
        })
    }
}

/// A fully serialized image, ready to be written to a blob store.
#[derive(Debug, Clone)]
pub struct OciImage {
    media_type: MediaType,
    config: Descriptor,
    raw_config: Bytes,
    layers: Vec<Layer>,
    history: Vec<History>,
    raw_manifest: Bytes,
    digest: Digest,
}

impl OciImage {
    pub fn builder() -> ImageBuilder {
        ImageBuilder::new()
    }

    /// Manifest media type.
    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }

    pub fn config_media_type(&self) -> &MediaType {
        self.config.media_type()
    }

    /// Digest of the config blob.
    pub fn config_name(&self) -> &Digest {
        self.config.digest()
    }

    pub fn raw_config(&self) -> &Bytes {
        &self.raw_config
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn history(&self) -> &[History] {
        &self.history
    }

    pub fn raw_manifest(&self) -> &Bytes {
        &self.raw_manifest
    }

    /// Digest of the manifest.
    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    /// Size of the manifest in bytes.
    pub fn size(&self) -> u64 {
        self.raw_manifest.len() as u64
    }
}
