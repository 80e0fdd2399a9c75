//! Registry pull API: path classification and request dispatch.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use chartport_oci::is_digest_reference;
use chartport_storage::{BlobDescriptor, BlobLocation};
use tracing::debug;

use crate::error::{ProxyError, ProxyResult};
use crate::state::AppState;

pub const API_VERSION_HEADER: &str = "docker-distribution-api-version";
pub const API_VERSION: &str = "registry/2.0";
pub const CONTENT_DIGEST_HEADER: &str = "docker-content-digest";

/// Longest tag accepted in a manifest reference.
const MAX_TAG_LEN: usize = 128;

/// What a path under `/v2/` asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryRoute {
    /// `/v2/`
    ApiRoot,
    /// `/v2/<name>/blobs/<digest>`
    Blob { key: String },
    /// `/v2/<name>/manifests/sha256:<hex>`
    ManifestByDigest { name: String, digest: String },
    /// `/v2/<name>/manifests/<tag>`
    Manifest { name: String, reference: String },
}

/// Classify the part of a request path after `/v2/`.
pub fn classify(path: &str) -> ProxyResult<RegistryRoute> {
    if path.is_empty() || path == "/" {
        return Ok(RegistryRoute::ApiRoot);
    }

    let segments: Vec<&str> = path.split('/').collect();
    let inner = if segments.len() > 2 {
        &segments[1..segments.len() - 1]
    } else {
        &[][..]
    };
    if inner.contains(&"blobs") {
        let key = segments[segments.len() - 1];
        if key.is_empty() {
            return Err(ProxyError::InvalidRequest(format!("no digest in '{path}'")));
        }
        return Ok(RegistryRoute::Blob {
            key: key.to_string(),
        });
    }

    if segments.contains(&"manifests") {
        let (name, reference) = parse_manifest_path(&segments)
            .ok_or_else(|| ProxyError::InvalidRequest(format!("malformed manifest path '{path}'")))?;
        if is_digest_reference(reference) {
            return Ok(RegistryRoute::ManifestByDigest {
                name,
                digest: reference.to_string(),
            });
        }
        if !is_valid_tag(reference) {
            return Err(ProxyError::InvalidRequest(format!(
                "invalid tag '{reference}' in '{path}'"
            )));
        }
        return Ok(RegistryRoute::Manifest {
            name,
            reference: reference.to_string(),
        });
    }

    Err(ProxyError::NotFound(format!("no registry route for '{path}'")))
}

/// `<name...>/manifests/<reference>` into its name and reference.
fn parse_manifest_path<'a>(segments: &[&'a str]) -> Option<(String, &'a str)> {
    if segments.len() < 3 || segments[segments.len() - 2] != "manifests" {
        return None;
    }
    let name_segments = &segments[..segments.len() - 2];
    if name_segments.iter().any(|s| s.is_empty()) {
        return None;
    }
    Some((name_segments.join("/"), segments[segments.len() - 1]))
}

/// Tags are what Helm versions look like once pushed to a registry, plus `+`
/// for semver build metadata.
fn is_valid_tag(tag: &str) -> bool {
    !tag.is_empty()
        && tag.len() <= MAX_TAG_LEN
        && tag
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-' | b'+'))
}

/// `GET /v2/`
pub async fn api_root(method: Method) -> ProxyResult<Response> {
    ensure_readable(&method)?;
    Ok(api_version())
}

fn api_version() -> Response {
    (StatusCode::OK, [(API_VERSION_HEADER, API_VERSION)]).into_response()
}

fn ensure_readable(method: &Method) -> ProxyResult<()> {
    if method != Method::GET && method != Method::HEAD {
        return Err(ProxyError::NotFound(format!("{method} is not served")));
    }
    Ok(())
}

/// Every request under `/v2/`.
pub async fn dispatch(
    State(state): State<AppState>,
    method: Method,
    Path(path): Path<String>,
) -> ProxyResult<Response> {
    ensure_readable(&method)?;
    let head = method == Method::HEAD;

    match classify(&path)? {
        RegistryRoute::ApiRoot => Ok(api_version()),
        RegistryRoute::Blob { key } => serve_blob(&state, &key, head).await,
        RegistryRoute::ManifestByDigest { digest, .. } => serve_blob(&state, &digest, head).await,
        RegistryRoute::Manifest { name, reference } => {
            let resolved = state.pipeline.resolve(&name, &reference).await?;
            debug!(
                chart = %name,
                tag = %reference,
                cache_hit = resolved.cache_hit,
                "manifest resolved"
            );
            if head {
                return Ok(descriptor_response(&resolved.descriptor, None));
            }
            let location = match &resolved.descriptor.digest {
                Some(digest) => format!("/v2/{name}/manifests/{digest}"),
                None => format!("/v2/{name}/blobs/{}", resolved.key),
            };
            Ok(redirect(&location))
        }
    }
}

/// Digest-addressed reads go straight to storage.
async fn serve_blob(state: &AppState, key: &str, head: bool) -> ProxyResult<Response> {
    if head {
        let descriptor = state.storage.exists(key).await?;
        return Ok(descriptor_response(&descriptor, Some(key)));
    }

    match state.storage.blob(key).await? {
        BlobLocation::Redirect(url) => Ok(redirect(&url)),
        BlobLocation::Content { descriptor, data } => {
            let mut resp = descriptor_response(&descriptor, Some(key));
            *resp.body_mut() = Body::from(data);
            Ok(resp)
        }
    }
}

/// Headers-only response describing a stored blob.
fn descriptor_response(descriptor: &BlobDescriptor, requested: Option<&str>) -> Response {
    let mut headers = HeaderMap::new();
    let digest = descriptor
        .digest
        .as_ref()
        .map(ToString::to_string)
        .or_else(|| requested.filter(|r| is_digest_reference(r)).map(str::to_string));
    if let Some(digest) = digest {
        insert_header(&mut headers, HeaderName::from_static(CONTENT_DIGEST_HEADER), &digest);
    }
    insert_header(&mut headers, header::CONTENT_TYPE, &descriptor.media_type);
    insert_header(
        &mut headers,
        header::CONTENT_LENGTH,
        &descriptor.size.to_string(),
    );
    (StatusCode::OK, headers).into_response()
}

fn redirect(location: &str) -> Response {
    let mut headers = HeaderMap::new();
    insert_header(&mut headers, header::LOCATION, location);
    (StatusCode::SEE_OTHER, headers).into_response()
}

fn insert_header(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_path_is_api_root() {
        assert_eq!(classify("").unwrap(), RegistryRoute::ApiRoot);
    }

    #[test]
    fn blob_path() {
        assert_eq!(
            classify("demo/blobs/sha256:abc").unwrap(),
            RegistryRoute::Blob {
                key: "sha256:abc".to_string()
            }
        );
    }

    #[test]
    fn chart_named_blobs_is_still_a_manifest() {
        assert_eq!(
            classify("blobs/manifests/1.0.0").unwrap(),
            RegistryRoute::Manifest {
                name: "blobs".to_string(),
                reference: "1.0.0".to_string()
            }
        );
    }

    #[test]
    fn digest_manifest_takes_fast_path() {
        assert_eq!(
            classify("mychart/manifests/sha256:abc").unwrap(),
            RegistryRoute::ManifestByDigest {
                name: "mychart".to_string(),
                digest: "sha256:abc".to_string()
            }
        );
    }

    #[test]
    fn tag_manifest_goes_to_pipeline() {
        assert_eq!(
            classify("mychart/manifests/1.2.3").unwrap(),
            RegistryRoute::Manifest {
                name: "mychart".to_string(),
                reference: "1.2.3".to_string()
            }
        );
    }

    #[test]
    fn namespaced_name_is_joined() {
        assert_eq!(
            classify("jetstack/cert-manager/manifests/v1.14.0").unwrap(),
            RegistryRoute::Manifest {
                name: "jetstack/cert-manager".to_string(),
                reference: "v1.14.0".to_string()
            }
        );
    }

    #[test]
    fn malformed_manifest_paths_are_invalid() {
        for path in [
            "manifests/1.0.0",
            "demo/manifests/1.0.0/extra",
            "demo/manifests/",
            "demo//manifests/1.0.0",
            "demo/manifests/1,0",
        ] {
            assert!(
                matches!(classify(path), Err(ProxyError::InvalidRequest(_))),
                "{path:?} should be invalid"
            );
        }
    }

    #[test]
    fn unknown_paths_are_not_found() {
        assert!(matches!(
            classify("_catalog"),
            Err(ProxyError::NotFound(_))
        ));
        assert!(matches!(
            classify("demo/tags/list"),
            Err(ProxyError::NotFound(_))
        ));
    }

    #[test]
    fn tag_charset() {
        assert!(is_valid_tag("1.0.0"));
        assert!(is_valid_tag("v1.14.0-rc.1"));
        assert!(is_valid_tag("1.0.0+build.5"));
        assert!(!is_valid_tag(""));
        assert!(!is_valid_tag("a b"));
        assert!(!is_valid_tag(&"1".repeat(MAX_TAG_LEN + 1)));
    }
}
