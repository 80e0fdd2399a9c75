use sha2::{Digest as _, Sha256};

pub use oci_spec::image::Digest;

use crate::OciError;

const SHA256_PREFIX: &str = "sha256:";

/// `sha256:<hex>` digest of `data`.
pub fn sha256_digest(data: &[u8]) -> Result<Digest, OciError> {
    from_hasher(Sha256::new_with_prefix(data))
}

pub(crate) fn from_hasher(hasher: Sha256) -> Result<Digest, OciError> {
    let digest = format!("{SHA256_PREFIX}{}", hex::encode(hasher.finalize()));
    Ok(digest.parse()?)
}

/// Whether a manifest reference names a digest rather than a tag.
pub fn is_digest_reference(reference: &str) -> bool {
    reference.starts_with(SHA256_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(
            sha256_digest(b"").unwrap().to_string(),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn parses_back_to_the_same_digest() {
        let s = "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
        let digest: Digest = s.parse().unwrap();
        assert_eq!(digest, sha256_digest(b"hello").unwrap());
        assert_eq!(digest.to_string(), s);
    }

    #[test]
    fn short_sha256_is_rejected() {
        assert!("sha256:abc".parse::<Digest>().is_err());
    }

    #[test]
    fn serializes_as_string() {
        let digest = sha256_digest(b"hello").unwrap();
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, format!("\"{digest}\""));
        let back: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, digest);
    }

    #[test]
    fn digest_reference_detection() {
        assert!(is_digest_reference("sha256:abc"));
        assert!(!is_digest_reference("1.2.3"));
        assert!(!is_digest_reference("latest"));
    }
}
