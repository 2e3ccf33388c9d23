//! Shopify webhook signature verification.
//!
//! Shopify signs each webhook with HMAC-SHA256 over the exact raw body
//! bytes, base64-encoded into the `X-Shopify-Hmac-Sha256` header. The check
//! fails closed: a missing header or a digest of the wrong length rejects
//! the request, and the comparison is constant-time.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use thiserror::Error;

/// Why a webhook was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// The `X-Shopify-Hmac-Sha256` header was absent.
    #[error("missing webhook signature header")]
    MissingSignature,
    /// The claimed digest did not match the body.
    #[error("webhook signature mismatch")]
    SignatureMismatch,
    /// The shop-domain allow-list is configured and did not match.
    #[error("shop domain not allowed")]
    ShopNotAllowed,
}

/// Verifies that inbound webhook bodies were signed with the shared secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: SecretString,
    allowed_shop_domain: Option<String>,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"[REDACTED]")
            .field("allowed_shop_domain", &self.allowed_shop_domain)
            .finish()
    }
}

impl WebhookVerifier {
    /// Create a verifier for the given shared secret and optional
    /// shop-domain allow-list.
    #[must_use]
    pub const fn new(secret: SecretString, allowed_shop_domain: Option<String>) -> Self {
        Self {
            secret,
            allowed_shop_domain,
        }
    }

    /// Check the shop-domain allow-list and the body signature, in that
    /// order.
    ///
    /// # Errors
    ///
    /// Returns the first failed check; no error reveals how close the
    /// claimed signature was.
    pub fn verify(
        &self,
        shop_domain: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<(), VerifyError> {
        if let Some(allowed) = &self.allowed_shop_domain {
            if shop_domain != Some(allowed.as_str()) {
                return Err(VerifyError::ShopNotAllowed);
            }
        }

        let claimed = signature.ok_or(VerifyError::MissingSignature)?;
        let expected = self.expected_signature(body);

        if constant_time_compare(expected.as_bytes(), claimed.as_bytes()) {
            Ok(())
        } else {
            Err(VerifyError::SignatureMismatch)
        }
    }

    /// Base64 HMAC-SHA256 of the exact body bytes.
    fn expected_signature(&self, body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.expose_secret().as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(body);
        BASE64.encode(mac.finalize().into_bytes())
    }
}

/// Constant-time comparison to prevent timing attacks. A length mismatch
/// returns false without inspecting any bytes.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }

    result == 0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(SecretString::from("shpss_9f8e7d6c5b4a"), None)
    }

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        BASE64.encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare(b"hello", b"hello"));
        assert!(constant_time_compare(b"", b""));
        assert!(!constant_time_compare(b"hello", b"world"));
        assert!(!constant_time_compare(b"hello", b"hell"));
        assert!(!constant_time_compare(b"hello", b"helloo"));
    }

    #[test]
    fn test_accepts_correct_signature() {
        let body = br#"{"id": 1, "email": "buyer@example.com"}"#;
        let signature = sign("shpss_9f8e7d6c5b4a", body);

        assert!(verifier().verify(None, Some(&signature), body).is_ok());
    }

    #[test]
    fn test_rejects_flipped_body_byte() {
        let body = br#"{"id": 1, "email": "buyer@example.com"}"#.to_vec();
        let signature = sign("shpss_9f8e7d6c5b4a", &body);

        let mut tampered = body;
        if let Some(byte) = tampered.get_mut(8) {
            *byte ^= 0x01;
        }

        assert_eq!(
            verifier().verify(None, Some(&signature), &tampered),
            Err(VerifyError::SignatureMismatch)
        );
    }

    #[test]
    fn test_rejects_wrong_length_digest() {
        let body = b"payload";
        let signature = sign("shpss_9f8e7d6c5b4a", body);

        // A correct digest truncated to the wrong length must be rejected.
        let truncated = &signature[..signature.len() - 4];
        assert_eq!(
            verifier().verify(None, Some(truncated), body),
            Err(VerifyError::SignatureMismatch)
        );
    }

    #[test]
    fn test_rejects_missing_signature() {
        assert_eq!(
            verifier().verify(None, None, b"payload"),
            Err(VerifyError::MissingSignature)
        );
    }

    #[test]
    fn test_rejects_wrong_secret() {
        let body = b"payload";
        let signature = sign("some-other-secret-value", body);

        assert_eq!(
            verifier().verify(None, Some(&signature), body),
            Err(VerifyError::SignatureMismatch)
        );
    }

    #[test]
    fn test_shop_domain_allow_list() {
        let verifier = WebhookVerifier::new(
            SecretString::from("shpss_9f8e7d6c5b4a"),
            Some("allowed.myshopify.com".to_string()),
        );
        let body = b"payload";
        let signature = sign("shpss_9f8e7d6c5b4a", body);

        assert!(
            verifier
                .verify(Some("allowed.myshopify.com"), Some(&signature), body)
                .is_ok()
        );
        assert_eq!(
            verifier.verify(Some("other.myshopify.com"), Some(&signature), body),
            Err(VerifyError::ShopNotAllowed)
        );
        assert_eq!(
            verifier.verify(None, Some(&signature), body),
            Err(VerifyError::ShopNotAllowed)
        );
    }

    #[test]
    fn test_debug_redacts_secret() {
        let debug_output = format!("{:?}", verifier());
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("shpss_9f8e7d6c5b4a"));
    }
}
