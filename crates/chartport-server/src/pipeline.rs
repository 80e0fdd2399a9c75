//! Tag-addressed manifest requests: resolve, check the cache, build, persist.

use std::sync::Arc;
use std::time::Duration;

use chartport_config::RepositoryBinding;
use chartport_helm::{ChartArchive, ChartFetcher, IndexClient};
use chartport_oci::{OciImage, package_chart};
use chartport_storage::{BlobDescriptor, StorageBackend, StorageError};
use tracing::{debug, info, instrument};

use crate::cache::cache_key;
use crate::error::{ProxyError, ProxyResult};

/// Outcome of a tag-addressed manifest request.
#[derive(Debug, Clone)]
pub struct ResolvedManifest {
    /// Storage key the manifest can be read from.
    pub key: String,
    pub descriptor: BlobDescriptor,
    pub cache_hit: bool,
}

/// Pick the first binding whose prefix matches `name` and strip that prefix
/// (plus a following `/`) from the chart name.
pub fn resolve_binding<'a>(
    bindings: &'a [RepositoryBinding],
    name: &'a str,
) -> Option<(&'a RepositoryBinding, &'a str)> {
    let binding = bindings.iter().find(|b| name.starts_with(b.prefix.as_str()))?;
    let rest = &name[binding.prefix.len()..];
    let chart = if binding.prefix.is_empty() {
        rest
    } else {
        rest.strip_prefix('/').unwrap_or(rest)
    };
    Some((binding, chart))
}

/// Turns `<name>/manifests/<tag>` into a stored OCI manifest.
pub struct ManifestPipeline {
    bindings: Vec<RepositoryBinding>,
    storage: Arc<dyn StorageBackend>,
    index: IndexClient,
    fetcher: Arc<dyn ChartFetcher>,
    fetch_timeout: Duration,
}

impl ManifestPipeline {
    pub fn new(
        bindings: Vec<RepositoryBinding>,
        storage: Arc<dyn StorageBackend>,
        index: IndexClient,
        fetcher: Arc<dyn ChartFetcher>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            bindings,
            storage,
            index,
            fetcher,
            fetch_timeout,
        }
    }

    /// Serve `name` at `reference` from the cache, building it on a miss.
    #[instrument(skip(self), fields(tag = %reference))]
    pub async fn resolve(&self, name: &str, reference: &str) -> ProxyResult<ResolvedManifest> {
        let (binding, chart) = resolve_binding(&self.bindings, name)
            .ok_or_else(|| ProxyError::NotFound(format!("no repository matches chart '{name}'")))?;
        if chart.is_empty() {
            return Err(ProxyError::NotFound(format!(
                "chart name '{name}' is empty after removing prefix '{}'",
                binding.prefix
            )));
        }

        let key = cache_key(chart, reference);
        match self.storage.exists(&key).await {
            Ok(descriptor) => {
                info!(chart, key = %key, "serving cached manifest");
                return Ok(ResolvedManifest {
                    key,
                    descriptor,
                    cache_hit: true,
                });
            }
            Err(StorageError::NotFound(_)) => {
                debug!(chart, key = %key, "cache miss");
            }
            Err(e) => return Err(e.into()),
        }

        let image = self.build(&binding.url, chart, reference).await?;
        self.storage
            .write_image(&image, std::slice::from_ref(&key))
            .await?;

        let digest = image.digest().clone();
        info!(chart, digest = %digest, key = %key, "manifest stored");
        Ok(ResolvedManifest {
            key: digest.to_string(),
            descriptor: BlobDescriptor {
                digest: Some(digest),
                media_type: image.media_type().to_string(),
                size: image.size(),
            },
            cache_hit: false,
        })
    }

    /// Fetch the chart archive and package it.
    #[instrument(skip(self), fields(repo = %repo_url))]
    async fn build(&self, repo_url: &str, chart: &str, version: &str) -> ProxyResult<OciImage> {
        let url = self.index.resolve_chart_url(repo_url, chart, version).await?;
        info!(url = %url, transport = self.fetcher.transport(), "fetching chart archive");

        let bytes = tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(chart, &url))
            .await
            .map_err(|_| {
                ProxyError::Upstream(format!(
                    "chart '{chart}': fetch {url} timed out after {}s",
                    self.fetch_timeout.as_secs()
                ))
            })??;

        let archive = ChartArchive::load(bytes)?;
        let metadata = archive.metadata_json()?;
        let image = package_chart(metadata, archive.into_bytes())?;
        debug!(digest = %image.digest(), "chart packaged");
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(prefix: &str, url: &str) -> RepositoryBinding {
        RepositoryBinding {
            url: url.to_string(),
            prefix: prefix.to_string(),
        }
    }

    #[test]
    fn first_matching_prefix_wins() {
        let bindings = vec![
            binding("jetstack", "https://charts.jetstack.io"),
            binding("", "https://charts.example.com"),
        ];

        let (b, _) = resolve_binding(&bindings, "jetstack-cert-manager").unwrap();
        assert_eq!(b.url, "https://charts.jetstack.io");

        let (b, chart) = resolve_binding(&bindings, "anything-else").unwrap();
        assert_eq!(b.url, "https://charts.example.com");
        assert_eq!(chart, "anything-else");
    }

    #[test]
    fn prefix_and_slash_are_stripped() {
        let bindings = vec![binding("jetstack", "https://charts.jetstack.io")];
        let (_, chart) = resolve_binding(&bindings, "jetstack/cert-manager").unwrap();
        assert_eq!(chart, "cert-manager");
    }

    #[test]
    fn no_match_without_fallback() {
        let bindings = vec![binding("jetstack", "https://charts.jetstack.io")];
        assert!(resolve_binding(&bindings, "bitnami/redis").is_none());
    }

    #[test]
    fn empty_prefix_keeps_name_intact() {
        let bindings = vec![binding("", "https://charts.example.com")];
        let (_, chart) = resolve_binding(&bindings, "team/app").unwrap();
        assert_eq!(chart, "team/app");
    }
}
