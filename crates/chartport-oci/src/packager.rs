use bytes::Bytes;
use oci_spec::image::{History, HistoryBuilder, MediaType};

use crate::{Layer, OciError, OciImage, ZERO_TIME};

pub const HISTORY_AUTHOR: &str = "chartport";
pub const HISTORY_COMMENT: &str = "Proxied via chartport";
pub const HISTORY_CREATED_BY: &str = "chartport";

fn proxy_history() -> Result<History, OciError> {
    Ok(HistoryBuilder::default()
        .author(HISTORY_AUTHOR)
        .created(ZERO_TIME)
        .created_by(HISTORY_CREATED_BY)
        .comment(HISTORY_COMMENT)
        .build()?)
}

/// Package a chart as a two-layer OCI image.
///
/// Layer 0 is the chart metadata as JSON, layer 1 the chart archive as
/// downloaded. Both carry the same fixed history record.
pub fn package_chart(
    metadata_json: impl Into<Bytes>,
    archive: impl Into<Bytes>,
) -> Result<OciImage, OciError> {
    let config_layer = Layer::uncompressed(metadata_json, MediaType::ImageConfig)?;
    let chart_layer = Layer::gzip(archive, MediaType::ImageLayerGzip)?;

    OciImage::builder()
        .layer(config_layer, proxy_history()?)
        .layer(chart_layer, proxy_history()?)
        .config_media_type(MediaType::ImageConfig)
        .media_type(MediaType::ImageManifest)
        .build()
}
