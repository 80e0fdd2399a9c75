#![allow(dead_code)]
//! Shared helpers for the registry integration tests.
//!
//! Each test file declares `mod common;` to use these.

use std::io::Write;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use chartport_config::{ProxyConfig, RepositoryBinding};
use chartport_server::{AppState, create_router};
use chartport_storage::{MemoryBackend, StorageBackend};
use flate2::write::GzEncoder;
use tower::ServiceExt;

// ── Charts ────────────────────────────────────────────────────────────────────

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

/// An `index.yaml` listing one entry per `(name, version, url)`.
pub fn index_yaml(entries: &[(&str, &str, &str)]) -> String {
    let mut out = String::from("apiVersion: v1\nentries:\n");
    let mut names: Vec<&str> = entries.iter().map(|(n, _, _)| *n).collect();
    names.dedup();
    for name in names {
        out.push_str(&format!("  {name}:\n"));
        for (_, version, url) in entries.iter().filter(|(n, _, _)| *n == name) {
            out.push_str(&format!(
                "    - name: {name}\n      version: \"{version}\"\n      urls:\n        - {url}\n"
            ));
        }
    }
    out
}

// ── App ───────────────────────────────────────────────────────────────────────

pub fn binding(prefix: &str, url: &str) -> RepositoryBinding {
    RepositoryBinding {
        url: url.to_string(),
        prefix: prefix.to_string(),
    }
}

pub fn config(repositories: Vec<RepositoryBinding>) -> ProxyConfig {
    ProxyConfig {
        repositories,
        homepage: "https://chartport.example.com".to_string(),
        upstream_timeout_secs: 5,
        ..Default::default()
    }
}

/// Router over an in-memory store the test can inspect.
pub fn app(repositories: Vec<RepositoryBinding>) -> (Router, Arc<MemoryBackend>) {
    let store = Arc::new(MemoryBackend::new());
    (app_with(&config(repositories), store.clone()), store)
}

pub fn app_with(config: &ProxyConfig, storage: Arc<dyn StorageBackend>) -> Router {
    create_router(AppState::new(config, storage).unwrap())
}

pub async fn send(app: &Router, method: Method, uri: &str) -> Response<Body> {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.clone().oneshot(req).await.unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri).await
}

pub async fn head(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::HEAD, uri).await
}

pub async fn body_bytes(resp: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub fn header<'a>(resp: &'a Response<Body>, name: &str) -> &'a str {
    resp.headers()
        .get(name)
        .unwrap_or_else(|| panic!("missing header {name}"))
        .to_str()
        .unwrap()
}
