//! Application state shared across handlers.

use std::sync::Arc;

use chartport_config::{FetcherConfig, ProxyConfig};
use chartport_helm::{ChartFetcher, HelmCliFetcher, HttpFetcher, IndexClient};
use chartport_storage::StorageBackend;

use crate::pipeline::ManifestPipeline;

/// Built once at startup; read-only afterwards.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ManifestPipeline>,
    pub storage: Arc<dyn StorageBackend>,
    /// Target of redirects for paths outside the registry API.
    pub homepage: Arc<str>,
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] chartport_config::ConfigError),
    #[error(transparent)]
    Storage(#[from] chartport_storage::StorageError),
    #[error(transparent)]
    Helm(#[from] chartport_helm::HelmError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(std::io::Error),
}

impl AppState {
    /// Wire the pipeline from a validated configuration and an already opened store.
    pub fn new(config: &ProxyConfig, storage: Arc<dyn StorageBackend>) -> Result<Self, StartupError> {
        let client = chartport_helm::http_client(config.upstream_timeout())?;
        let fetcher: Arc<dyn ChartFetcher> = match &config.fetcher {
            FetcherConfig::Http => Arc::new(HttpFetcher::new(client.clone())),
            FetcherConfig::Helm { binary: Some(path) } => Arc::new(HelmCliFetcher::new(path)),
            FetcherConfig::Helm { binary: None } => Arc::new(HelmCliFetcher::default()),
        };

        let pipeline = ManifestPipeline::new(
            config.repositories.clone(),
            Arc::clone(&storage),
            IndexClient::new(client),
            fetcher,
            config.upstream_timeout(),
        );

        Ok(Self {
            pipeline: Arc::new(pipeline),
            storage,
            homepage: Arc::from(config.homepage.as_str()),
        })
    }

    /// Validate `config`, open its storage backend and build the state.
    pub async fn from_config(config: &ProxyConfig) -> Result<Self, StartupError> {
        chartport_config::validate(config)?;
        let storage = chartport_storage::from_config(&config.storage).await?;
        Self::new(config, storage)
    }
}
