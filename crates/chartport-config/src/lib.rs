use std::path::{Path, PathBuf};

use serde::Deserialize;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_HOMEPAGE: &str = "https://github.com/chartport/chartport";
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },
    #[error("config validation error: {0}")]
    Validation(String),
}

/// Full proxy configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Where requests outside the registry API are redirected.
    #[serde(default = "default_homepage")]
    pub homepage: String,

    /// Timeout applied to every upstream index and archive fetch.
    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,

    #[serde(default)]
    pub fetcher: FetcherConfig,

    /// Ordered repository bindings. The first binding whose prefix matches
    /// the requested chart name wins.
    #[serde(default, alias = "repos")]
    pub repositories: Vec<RepositoryBinding>,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// A Helm chart repository exposed under an optional chart-name prefix.
///
/// `{ url = "https://charts.jetstack.io", prefix = "jetstack" }`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepositoryBinding {
    pub url: String,
    #[serde(default)]
    pub prefix: String,
}

/// Blob store selection. Chosen once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Process-local store, lost on restart.
    #[default]
    Memory,

    /// Blobs on the local filesystem under `path/blobs/`.
    /// With `public_url`, blob GETs redirect to `{public_url}/blobs/{key}`
    /// instead of being streamed by the proxy.
    Filesystem {
        path: PathBuf,
        #[serde(default)]
        public_url: Option<String>,
    },
}

impl StorageConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            StorageConfig::Memory => "memory",
            StorageConfig::Filesystem { .. } => "filesystem",
        }
    }
}

/// How chart archives are downloaded once their URL is known.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FetcherConfig {
    /// Plain HTTP GET.
    #[default]
    Http,

    /// Shell out to `helm pull`.
    Helm {
        #[serde(default)]
        binary: Option<PathBuf>,
    },
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_homepage() -> String {
    DEFAULT_HOMEPAGE.to_string()
}

fn default_upstream_timeout_secs() -> u64 {
    DEFAULT_UPSTREAM_TIMEOUT_SECS
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            homepage: default_homepage(),
            upstream_timeout_secs: DEFAULT_UPSTREAM_TIMEOUT_SECS,
            fetcher: FetcherConfig::default(),
            repositories: Vec::new(),
            storage: StorageConfig::default(),
        }
    }
}

impl ProxyConfig {
    /// Single repository with no prefix, for deployments configured only
    /// through the environment.
    pub fn single_repository(url: impl Into<String>) -> Self {
        Self {
            repositories: vec![RepositoryBinding {
                url: url.into(),
                prefix: String::new(),
            }],
            ..Default::default()
        }
    }

    pub fn upstream_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.upstream_timeout_secs)
    }
}

/// Load and validate a config file.
///
/// `.toml` files are parsed as TOML, everything else as YAML.
pub fn load(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;

    let config = if path.extension().is_some_and(|ext| ext == "toml") {
        parse_toml(&content)
    } else {
        parse_yaml(&content)
    }
    .map_err(|message| ConfigError::Parse {
        path: path.display().to_string(),
        message,
    })?;

    validate(&config)?;
    Ok(config)
}

fn parse_toml(content: &str) -> Result<ProxyConfig, String> {
    toml::from_str(content).map_err(|e| e.to_string())
}

fn parse_yaml(content: &str) -> Result<ProxyConfig, String> {
    serde_yaml_ng::from_str(content).map_err(|e| e.to_string())
}

pub fn validate(config: &ProxyConfig) -> Result<(), ConfigError> {
    if config.repositories.is_empty() {
        return Err(ConfigError::Validation(
            "no repositories configured".to_string(),
        ));
    }

    for (i, repo) in config.repositories.iter().enumerate() {
        if !(repo.url.starts_with("http://") || repo.url.starts_with("https://")) {
            return Err(ConfigError::Validation(format!(
                "repository '{}' must use http:// or https://",
                repo.url
            )));
        }

        // An empty prefix matches everything, so nothing after it is reachable
        if repo.prefix.is_empty() && i + 1 != config.repositories.len() {
            return Err(ConfigError::Validation(format!(
                "repository '{}' has an empty prefix but is not the last binding; \
                 bindings after it would never match",
                repo.url
            )));
        }
    }

    if config.upstream_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "upstream_timeout_secs must be greater than zero".to_string(),
        ));
    }

    if let StorageConfig::Filesystem { path, public_url } = &config.storage {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "filesystem storage requires a path".to_string(),
            ));
        }
        if let Some(url) = public_url
            && url.trim_end_matches('/').is_empty()
        {
            return Err(ConfigError::Validation(
                "filesystem public_url must not be empty".to_string(),
            ));
        }
    }

    Ok(())
}
