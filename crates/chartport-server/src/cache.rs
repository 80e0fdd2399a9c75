use sha2::{Digest, Sha256};

/// Namespace of manifest alias keys in the blob store.
pub const CACHE_KEY_PREFIX: &str = "chartport-";

/// Alias key under which the manifest built for `chart` at `reference` is stored.
///
/// The pair is joined with `,` before hashing. References never contain a
/// comma (the router rejects them), so distinct pairs give distinct inputs.
pub fn cache_key(chart: &str, reference: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(chart.as_bytes());
    hasher.update(b",");
    hasher.update(reference.as_bytes());
    format!("{CACHE_KEY_PREFIX}{}", hex::encode(hasher.finalize()))
}
