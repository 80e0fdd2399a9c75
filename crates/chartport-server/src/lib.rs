//! Helm chart repositories served through the OCI registry pull API.
//!
//! Requests under `/v2/` are classified by [`registry::classify`]. Blob and
//! digest-addressed manifest reads go straight to the configured
//! [`StorageBackend`](chartport_storage::StorageBackend); tag-addressed
//! manifests run through the [`ManifestPipeline`], which builds and caches an
//! OCI image for the chart on first request.

pub mod cache;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod state;

use axum::Router;
use axum::extract::State;
use axum::response::Redirect;
use axum::routing::any;
use tower_http::trace::TraceLayer;

pub use cache::cache_key;
pub use error::{ProxyError, ProxyResult};
pub use pipeline::{ManifestPipeline, ResolvedManifest, resolve_binding};
pub use state::{AppState, StartupError};

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/v2", any(registry::api_root))
        .route("/v2/", any(registry::api_root))
        .route("/v2/{*path}", any(registry::dispatch))
        .fallback(homepage)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Anything outside the registry API.
async fn homepage(State(state): State<AppState>) -> Redirect {
    Redirect::to(&state.homepage)
}
