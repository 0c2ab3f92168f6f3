use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hex HMAC-SHA256 of the raw request body. Providers that sign deliveries
/// (OnlinePBX, UTEL, MoiZvonki) send this value in a channel-specific header.
pub fn sign_body(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Signature policy for inbound webhooks:
/// - no secret configured: accept any or no signature (backward-compatible
///   unsigned mode);
/// - secret configured: the header must be present and match in constant time.
pub fn verify_signature(secret: Option<&str>, body: &[u8], header_value: Option<&str>) -> bool {
    let secret = match secret {
        Some(s) if !s.is_empty() => s,
        _ => return true,
    };

    let provided = match header_value {
        Some(v) => v,
        None => return false,
    };

    let expected = sign_body(secret, body);
    constant_time_compare(provided, &expected)
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_body_stable() {
        let a = sign_body("secret", b"payload");
        let b = sign_body("secret", b"payload");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_verify_valid_signature() {
        let body = br#"{"uuid":"abc","caller_id":"+1555"}"#;
        let signature = sign_body("s3cret", body);
        assert!(verify_signature(Some("s3cret"), body, Some(&signature)));
    }

    #[test]
    fn test_verify_rejects_wrong_signature() {
        let body = b"payload";
        assert!(!verify_signature(Some("s3cret"), body, Some("deadbeef")));
    }

    #[test]
    fn test_verify_rejects_missing_header_when_secret_set() {
        assert!(!verify_signature(Some("s3cret"), b"payload", None));
    }

    #[test]
    fn test_verify_accepts_unsigned_without_secret() {
        assert!(verify_signature(None, b"payload", None));
        assert!(verify_signature(None, b"payload", Some("anything")));
        assert!(verify_signature(Some(""), b"payload", None));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc123", "abc123"));
        assert!(!constant_time_compare("abc123", "abc124"));
        assert!(!constant_time_compare("abc", "abcd"));
    }

    #[test]
    fn test_signature_depends_on_body() {
        let sig = sign_body("s", b"body-a");
        assert!(!verify_signature(Some("s"), b"body-b", Some(&sig)));
    }
}
