//! Canonical byte forms used as signing input.
//!
//! Both the request body and the request envelope are serialized with JCS
//! (RFC 8785): sorted keys, no whitespace, fixed number formatting. The bytes
//! that are signed are the bytes that go on the wire.

use serde::Serialize;

use crate::digest::sha256_hex_bytes;

/// Serialize any value to JCS bytes.
pub fn to_canonical_jcs_bytes<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Vec<u8>> {
    serde_jcs::to_vec(value)
}

/// Envelope signed by `request-signature`.
///
/// Every signed header has a field here: `idempotency-key`, `ucp-key-id`,
/// `ucp-timestamp` and `payment-mandate` (as a digest, `null` when absent).
#[derive(Debug, Serialize)]
struct CanonicalRequest<'a> {
    body_digest: String,
    idempotency_key: &'a str,
    key_id: &'a str,
    mandate_digest: Option<String>,
    method: &'a str,
    path: &'a str,
    timestamp: i64,
}

/// Canonical request material: JCS of method, path, body digest, idempotency
/// key, key id, mandate digest and timestamp.
pub fn canonical_request_bytes(
    method: &str,
    path: &str,
    body: &[u8],
    idempotency_key: &str,
    key_id: &str,
    mandate: Option<&str>,
    timestamp: i64,
) -> serde_json::Result<Vec<u8>> {
    let envelope = CanonicalRequest {
        body_digest: sha256_hex_bytes(body),
        idempotency_key,
        key_id,
        mandate_digest: mandate.map(|token| sha256_hex_bytes(token.as_bytes())),
        method,
        path,
        timestamp,
    };
    to_canonical_jcs_bytes(&envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_jcs_sorts_keys_without_whitespace() {
        let bytes = to_canonical_jcs_bytes(&json!({"z": 1, "a": {"y": true, "b": null}})).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"a":{"b":null,"y":true},"z":1}"#
        );
    }

    #[test]
    fn test_key_order_does_not_change_bytes() {
        let one = to_canonical_jcs_bytes(&json!({"currency": "USD", "line_items": []})).unwrap();
        let two = to_canonical_jcs_bytes(&json!({"line_items": [], "currency": "USD"})).unwrap();
        assert_eq!(one, two);
    }

    #[test]
    fn test_canonical_request_layout() {
        let bytes = canonical_request_bytes(
            "POST",
            "/checkout",
            b"{}",
            "key-1",
            "sha256:ab",
            None,
            1_700_000_000,
        )
        .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with(r#"{"body_digest":"sha256:"#));
        assert!(text.ends_with(
            r#""idempotency_key":"key-1","key_id":"sha256:ab","mandate_digest":null,"method":"POST","path":"/checkout","timestamp":1700000000}"#
        ));
    }

    #[test]
    fn test_mandate_is_bound_as_digest() {
        let bytes =
            canonical_request_bytes("POST", "/checkout", b"{}", "k", "kid", Some("h.p.s"), 1)
                .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains(&format!(
            r#""mandate_digest":"{}""#,
            sha256_hex_bytes(b"h.p.s")
        )));
        assert!(!text.contains("h.p.s"));
    }

    #[test]
    fn test_canonical_request_binds_every_field() {
        let canon = |method, path, body: &[u8], key, kid, mandate, ts| {
            canonical_request_bytes(method, path, body, key, kid, mandate, ts).unwrap()
        };
        let base = canon("POST", "/checkout", b"{}", "k", "kid", Some("m"), 1);
        assert_ne!(base, canon("PUT", "/checkout", b"{}", "k", "kid", Some("m"), 1));
        assert_ne!(base, canon("POST", "/checkout/1", b"{}", "k", "kid", Some("m"), 1));
        assert_ne!(base, canon("POST", "/checkout", b"{ }", "k", "kid", Some("m"), 1));
        assert_ne!(base, canon("POST", "/checkout", b"{}", "k2", "kid", Some("m"), 1));
        assert_ne!(base, canon("POST", "/checkout", b"{}", "k", "kid2", Some("m"), 1));
        assert_ne!(base, canon("POST", "/checkout", b"{}", "k", "kid", Some("m2"), 1));
        assert_ne!(base, canon("POST", "/checkout", b"{}", "k", "kid", None, 1));
        assert_ne!(base, canon("POST", "/checkout", b"{}", "k", "kid", Some("m"), 2));
    }
}
