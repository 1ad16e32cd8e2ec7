//! Request fingerprinting.

use sha2::{Digest, Sha256};

/// SHA-256 hex digest over the canonical JSON form of a request payload.
///
/// `serde_json` keeps object keys sorted (BTreeMap-backed maps), so two
/// structurally equal payloads produce the same fingerprint regardless of
/// field order at the call site.
pub fn request_fingerprint(payload: &serde_json::Value) -> String {
    let canonical = payload.to_string();
    let digest = Sha256::digest(canonical.as_bytes());
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn equal_payloads_share_fingerprint() {
        let a = json!({"amount": "50", "to": "acct-1"});
        let b = json!({"to": "acct-1", "amount": "50"});
        assert_eq!(request_fingerprint(&a), request_fingerprint(&b));
    }

    #[test]
    fn different_payloads_differ() {
        let a = json!({"amount": "50"});
        let b = json!({"amount": "51"});
        assert_ne!(request_fingerprint(&a), request_fingerprint(&b));
    }

    #[test]
    fn fingerprint_is_hex_sha256() {
        let fp = request_fingerprint(&json!({}));
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
