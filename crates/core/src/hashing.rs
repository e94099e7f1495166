//! SHA-256 fingerprints for version payloads.
//!
//! The fingerprint covers `content`, `front_matter` and `metadata` only.
//! It is used to detect corruption on read, never to deduplicate versions.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Fingerprint a version payload.
///
/// The three parts are serialized as a JSON array. `serde_json` object keys
/// are kept sorted, so two maps with the same entries always hash the same
/// regardless of insertion order.
pub fn content_fingerprint(content: &str, front_matter: &Value, metadata: &Value) -> String {
    let canonical = Value::Array(vec![
        Value::String(content.to_string()),
        front_matter.clone(),
        metadata.clone(),
    ]);
    sha256_hex(canonical.to_string().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_input_produces_known_hash() {
        let hash = sha256_hex(b"");
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let fm = json!({"tags": ["rust"], "draft": false});
        let md = json!({"source": "import"});
        assert_eq!(
            content_fingerprint("body", &fm, &md),
            content_fingerprint("body", &fm, &md)
        );
        assert_eq!(content_fingerprint("body", &fm, &md).len(), 64);
    }

    #[test]
    fn fingerprint_ignores_key_order() {
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": 2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a": 2, "b": 1}"#).unwrap();
        assert_eq!(
            content_fingerprint("x", &a, &json!({})),
            content_fingerprint("x", &b, &json!({}))
        );
    }

    #[test]
    fn fingerprint_changes_with_each_part() {
        let base = content_fingerprint("x", &json!({}), &json!({}));
        assert_ne!(base, content_fingerprint("y", &json!({}), &json!({})));
        assert_ne!(base, content_fingerprint("x", &json!({"k": 1}), &json!({})));
        assert_ne!(base, content_fingerprint("x", &json!({}), &json!({"k": 1})));
    }
}
