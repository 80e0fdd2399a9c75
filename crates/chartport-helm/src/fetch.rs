use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::HelmError;

/// Downloads a chart archive from its resolved URL.
///
/// The whole archive is buffered so it can be read more than once.
#[async_trait]
pub trait ChartFetcher: Send + Sync {
    async fn fetch(&self, chart: &str, url: &str) -> Result<Vec<u8>, HelmError>;

    fn transport(&self) -> &'static str;
}

/// Direct HTTP download.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChartFetcher for HttpFetcher {
    async fn fetch(&self, chart: &str, url: &str) -> Result<Vec<u8>, HelmError> {
        debug!(chart, url, "downloading chart archive");
        crate::fetch_bytes(&self.client, chart, url).await
    }

    fn transport(&self) -> &'static str {
        "http"
    }
}

/// Download through the `helm` binary (`helm pull <url> --destination <tmp>`).
///
/// The child process is killed if the request is dropped mid-download.
#[derive(Debug, Clone)]
pub struct HelmCliFetcher {
    binary: PathBuf,
}

impl HelmCliFetcher {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for HelmCliFetcher {
    fn default() -> Self {
        Self::new("helm")
    }
}

#[async_trait]
impl ChartFetcher for HelmCliFetcher {
    async fn fetch(&self, chart: &str, url: &str) -> Result<Vec<u8>, HelmError> {
        let temp_dir = tempfile::tempdir()
            .map_err(|e| HelmError::Io(format!("chart '{chart}': create temp dir: {e}")))?;

        debug!(chart, url, binary = %self.binary.display(), "pulling chart with helm");
        let output = tokio::process::Command::new(&self.binary)
            .args(["pull", url, "--destination"])
            .arg(temp_dir.path())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                HelmError::Io(format!(
                    "chart '{chart}': run {}: {e}",
                    self.binary.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HelmError::Upstream(format!(
                "chart '{chart}': helm pull {url} failed: {}",
                stderr.trim()
            )));
        }

        let archive = find_archive(temp_dir.path()).await.map_err(|e| {
            HelmError::Io(format!("chart '{chart}': locate pulled archive: {e}"))
        })?;
        let Some(archive) = archive else {
            return Err(HelmError::Upstream(format!(
                "chart '{chart}': helm pull {url} produced no archive"
            )));
        };

        tokio::fs::read(&archive).await.map_err(|e| {
            HelmError::Io(format!(
                "chart '{chart}': read {}: {e}",
                archive.display()
            ))
        })
    }

    fn transport(&self) -> &'static str {
        "helm"
    }
}

async fn find_archive(dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "tgz") {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn http_fetcher_downloads_archive() {
        let mut server = mockito::Server::new_async().await;
        let tgz = crate::test_support::make_chart_tgz("demo", "1.0.0");
        let _m = server
            .mock("GET", "/demo-1.0.0.tgz")
            .with_status(200)
            .with_body(tgz.clone())
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(crate::http_client(Duration::from_secs(5)).unwrap());
        let bytes = fetcher
            .fetch("demo", &format!("{}/demo-1.0.0.tgz", server.url()))
            .await
            .unwrap();
        assert_eq!(bytes, tgz);
        assert_eq!(fetcher.transport(), "http");
    }

    #[tokio::test]
    async fn http_fetcher_not_found_is_upstream_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/demo-1.0.0.tgz")
            .with_status(404)
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(crate::http_client(Duration::from_secs(5)).unwrap());
        let err = fetcher
            .fetch("demo", &format!("{}/demo-1.0.0.tgz", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, HelmError::Upstream(_)));
    }

    #[tokio::test]
    async fn helm_fetcher_missing_binary_is_io_error() {
        let fetcher = HelmCliFetcher::new("/nonexistent/helm-binary");
        let err = fetcher
            .fetch("demo", "https://example.com/demo-1.0.0.tgz")
            .await
            .unwrap_err();
        assert!(matches!(err, HelmError::Io(_)));
        assert_eq!(fetcher.transport(), "helm");
    }

    #[tokio::test]
    async fn find_archive_picks_tgz() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "x").unwrap();
        assert!(find_archive(tmp.path()).await.unwrap().is_none());

        std::fs::write(tmp.path().join("demo-1.0.0.tgz"), "x").unwrap();
        let found = find_archive(tmp.path()).await.unwrap().unwrap();
        assert_eq!(found.file_name().unwrap(), "demo-1.0.0.tgz");
    }
}
