use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use chartport_config::{ConfigError, ProxyConfig, StorageConfig};
use chartport_server::{AppState, StartupError, create_router};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Serve a Helm chart repository as an OCI registry
#[derive(Parser, Debug)]
#[command(name = "chartport", version)]
#[command(long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CHARTPORT_GIT_COMMIT"), ")"))]
struct Args {
    /// Path to a YAML or TOML configuration file
    #[arg(short, long, env = "CHARTPORT_CONFIG")]
    config: Option<PathBuf>,

    /// Serve a single repository with no prefix (used when no config file is given)
    #[arg(long, env = "REPO_URL")]
    repo_url: Option<String>,

    /// Listen port, overriding the config file
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Store blobs on the local filesystem under this directory
    #[arg(long, env = "STORAGE_PATH")]
    storage_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "chartport failed");
            eprintln!("error: {e}");
            ExitCode::from(exit_code(&e))
        }
    }
}

fn exit_code(err: &StartupError) -> u8 {
    match err {
        StartupError::Config(_) => 2,
        StartupError::Storage(_) | StartupError::Helm(_) => 3,
        StartupError::Bind { .. } | StartupError::Serve(_) => 4,
    }
}

fn resolve_config(args: &Args) -> Result<ProxyConfig, ConfigError> {
    let mut config = match (&args.config, &args.repo_url) {
        (Some(path), _) => chartport_config::load(path)?,
        (None, Some(url)) => ProxyConfig::single_repository(url.clone()),
        (None, None) => {
            return Err(ConfigError::Validation(
                "no repositories configured; pass --config or --repo-url".to_string(),
            ));
        }
    };

    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(path) = &args.storage_path {
        let public_url = match &config.storage {
            StorageConfig::Filesystem { public_url, .. } => public_url.clone(),
            StorageConfig::Memory => None,
        };
        config.storage = StorageConfig::Filesystem {
            path: path.clone(),
            public_url,
        };
    }
    Ok(config)
}

async fn run(args: Args) -> Result<(), StartupError> {
    tracing::info!("chartport v{}", env!("CARGO_PKG_VERSION"));

    let config = resolve_config(&args)?;
    let state = AppState::from_config(&config).await?;

    for binding in &config.repositories {
        tracing::info!(repo = %binding.url, prefix = %binding.prefix, "repository bound");
    }
    tracing::info!(storage = config.storage.kind(), "storage backend ready");

    let app = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| StartupError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    tracing::info!(port = config.port, "listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(StartupError::Serve)?;

    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
