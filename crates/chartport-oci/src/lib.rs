//! OCI image model and the Helm chart packager.
//!
//! Every image built here is a pure function of its input bytes: no
//! timestamps, no random identifiers. Building the same chart twice yields
//! the same manifest digest.

mod digest;
mod image;
mod packager;

pub use digest::{Digest, is_digest_reference, sha256_digest};
pub use image::{ImageBuilder, Layer, OciImage, ZERO_TIME};
pub use oci_spec::image::{Descriptor, History, MediaType};
pub use packager::{HISTORY_AUTHOR, HISTORY_COMMENT, HISTORY_CREATED_BY, package_chart};

// String forms of `MediaType::ImageConfig`, `MediaType::ImageLayerGzip` and
// `MediaType::ImageManifest`, as recorded by the blob stores.

/// Media type of the chart metadata layer and of the image config.
pub const CONFIG_MEDIA_TYPE: &str = "application/vnd.oci.image.config.v1+json";
/// Media type of the chart archive layer.
pub const CHART_LAYER_MEDIA_TYPE: &str = "application/vnd.oci.image.layer.v1.tar+gzip";
/// Media type of the image manifest.
pub const OCI_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

#[derive(Debug, thiserror::Error)]
pub enum OciError {
    #[error("invalid layer: {0}")]
    InvalidLayer(String),
    #[error("encode {what}: {source}")]
    Encode {
        what: &'static str,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Spec(#[from] oci_spec::OciSpecError),
}
