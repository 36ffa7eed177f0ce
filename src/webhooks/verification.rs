//! Webhook signature verification.

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Verify an HMAC-SHA256 webhook signature.
///
/// The expected signature is the base64-encoded HMAC-SHA256 of the raw
/// request body under the shared secret. Comparison is constant time. An
/// empty secret, empty signature, or any internal failure verifies as
/// false; this function never panics.
#[must_use]
pub fn verify_signature(payload: &[u8], signature: &str, secret: &str) -> bool {
    if secret.is_empty() || signature.is_empty() {
        return false;
    }

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    let expected = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

    expected.as_bytes().ct_eq(signature.as_bytes()).into()
}

/// Compute the signature for a payload. For tests and outbound simulation.
#[must_use]
pub fn sign_payload(payload: &[u8], secret: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload);
    Some(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    #[test]
    fn test_valid_signature_verifies() {
        let payload = br#"{"type":"subscription.updated"}"#;
        let signature = sign_payload(payload, SECRET).unwrap();
        assert!(verify_signature(payload, &signature, SECRET));
    }

    #[test]
    fn test_tampered_payload_fails() {
        let payload = br#"{"type":"subscription.updated"}"#;
        let signature = sign_payload(payload, SECRET).unwrap();
        assert!(!verify_signature(
            br#"{"type":"subscription.deleted"}"#,
            &signature,
            SECRET
        ));
    }

    #[test]
    fn test_wrong_secret_fails() {
        let payload = b"body";
        let signature = sign_payload(payload, SECRET).unwrap();
        assert!(!verify_signature(payload, &signature, "whsec_other"));
    }

    #[test]
    fn test_garbage_and_empty_inputs_fail_closed() {
        assert!(!verify_signature(b"body", "", SECRET));
        assert!(!verify_signature(b"body", "not base64 at all!!", SECRET));
        assert!(!verify_signature(b"body", "c2lnbmF0dXJl", ""));
        assert!(!verify_signature(b"", "c2lnbmF0dXJl", SECRET));
    }
}
