mod archive;
mod fetch;
mod index;

use std::time::Duration;

pub use archive::{ChartArchive, ChartMetadata, Maintainer};
pub use fetch::{ChartFetcher, HelmCliFetcher, HttpFetcher};
pub use index::{ChartIndex, ChartIndexEntry, IndexClient, parse_index, resolve_url};

#[derive(Debug, thiserror::Error)]
pub enum HelmError {
    #[error("chart not found: {0}")]
    NotFound(String),
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("invalid chart: {0}")]
    InvalidChart(String),
    #[error("chart I/O error: {0}")]
    Io(String),
}

/// Build the HTTP client shared by index and archive fetches.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, HelmError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("chartport/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| HelmError::Io(format!("build HTTP client: {e}")))
}

/// GET a URL and return the body, treating any non-2xx status as an upstream failure.
pub(crate) async fn fetch_bytes(
    client: &reqwest::Client,
    name: &str,
    url: &str,
) -> Result<Vec<u8>, HelmError> {
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| HelmError::Upstream(format!("chart '{name}': fetch {url}: {e}")))?;

    if !resp.status().is_success() {
        return Err(HelmError::Upstream(format!(
            "chart '{name}': fetch {url} returned {}",
            resp.status()
        )));
    }

    resp.bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(|e| HelmError::Upstream(format!("chart '{name}': read body from {url}: {e}")))
}

#[cfg(test)]
pub(crate) mod test_support {
    use flate2::write::GzEncoder;
    use std::io::Write;

    /// Build a `.tgz` holding the given `(path, contents)` entries.
    pub fn make_tgz(files: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_path(path).unwrap();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append(&header, contents.as_bytes()).unwrap();
        }
        let tar_data = builder.into_inner().unwrap();

        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&tar_data).unwrap();
        encoder.finish().unwrap()
    }

    pub fn make_chart_tgz(name: &str, version: &str) -> Vec<u8> {
        let chart_yaml = format!(
            "apiVersion: v2\nname: {name}\nversion: {version}\ndescription: A test chart\n"
        );
        make_tgz(&[
            (&format!("{name}/Chart.yaml"), &chart_yaml),
            (&format!("{name}/values.yaml"), "replicaCount: 1\n"),
        ])
    }
}
