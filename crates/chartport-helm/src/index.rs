use std::collections::HashMap;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::HelmError;

/// A parsed `index.yaml`. Entries keep their declaration order per chart name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChartIndex {
    #[serde(default)]
    pub entries: HashMap<String, Vec<ChartIndexEntry>>,
}

/// One version of one chart as listed in the index.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChartIndexEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub urls: Vec<String>,
}

impl ChartIndex {
    /// Find the entry for `chart` at exactly `version`.
    ///
    /// If the index lists the same version twice, the first declaration wins.
    pub fn find(&self, chart: &str, version: &str) -> Result<&ChartIndexEntry, HelmError> {
        let versions = self.entries.get(chart).ok_or_else(|| {
            HelmError::NotFound(format!("chart '{chart}' not found in repository index"))
        })?;

        let mut matches = versions.iter().filter(|e| e.version == version);
        let entry = matches.next().ok_or_else(|| {
            HelmError::NotFound(format!(
                "version '{version}' of chart '{chart}' not found in repository index"
            ))
        })?;

        let duplicates = matches.count();
        if duplicates > 0 {
            warn!(
                chart,
                version, duplicates, "index lists version more than once, using the first entry"
            );
        }

        Ok(entry)
    }

    /// Resolve the absolute archive URL for `chart` at `version`.
    pub fn chart_url(&self, repo_url: &str, chart: &str, version: &str) -> Result<String, HelmError> {
        let entry = self.find(chart, version)?;
        let url = entry.urls.first().ok_or_else(|| {
            HelmError::NotFound(format!(
                "no URLs listed for chart '{chart}' version '{version}'"
            ))
        })?;
        Ok(resolve_url(repo_url, url))
    }
}

/// Parse the contents of an `index.yaml`.
pub fn parse_index(yaml: &str) -> Result<ChartIndex, HelmError> {
    serde_yaml_ng::from_str(yaml)
        .map_err(|e| HelmError::Upstream(format!("parse index.yaml: {e}")))
}

/// Resolve an index URL against the repository base URL.
///
/// Absolute URLs are returned verbatim, whatever their scheme.
pub fn resolve_url(repo_url: &str, url: &str) -> String {
    if url.contains("://") {
        return url.to_string();
    }
    format!(
        "{}/{}",
        repo_url.trim_end_matches('/'),
        url.trim_start_matches('/')
    )
}

/// Fetches repository indexes over HTTP.
#[derive(Debug, Clone)]
pub struct IndexClient {
    client: reqwest::Client,
}

impl IndexClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Download and parse `{repo_url}/index.yaml`.
    pub async fn fetch_index(&self, repo_url: &str) -> Result<ChartIndex, HelmError> {
        let index_url = format!("{}/index.yaml", repo_url.trim_end_matches('/'));
        debug!(url = %index_url, "fetching repository index");
        let body = crate::fetch_bytes(&self.client, "index", &index_url).await?;
        let text = String::from_utf8(body)
            .map_err(|e| HelmError::Upstream(format!("index {index_url} is not UTF-8: {e}")))?;
        parse_index(&text)
    }

    /// Resolve the download URL of `chart` at `version` in the repository.
    pub async fn resolve_chart_url(
        &self,
        repo_url: &str,
        chart: &str,
        version: &str,
    ) -> Result<String, HelmError> {
        let index = self.fetch_index(repo_url).await?;
        index.chart_url(repo_url, chart, version)
    }
}
