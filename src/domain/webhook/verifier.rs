//! Webhook verification pipeline.
//!
//! Checks run in order and short-circuit at the first failure:
//!
//! 1. payload size ceiling (1 MiB)
//! 2. signature header present
//! 3. HMAC-SHA256 over the raw body, constant-time comparison
//! 4. timestamp freshness, when the marketplace supplies one
//!
//! Duplicate suppression runs after verification in the router, against the
//! injected dedup store.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted payload size (1 MiB).
pub const MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

/// Maximum accepted event age (5 minutes).
const MAX_EVENT_AGE_SECS: i64 = 300;

/// Clock skew tolerance for future timestamps (1 minute).
const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Errors from webhook verification.
///
/// Mapped to a uniform 4xx response; the variant is for operators, not for
/// the remote caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookError {
    #[error("Payload exceeds {MAX_PAYLOAD_BYTES} bytes")]
    PayloadTooLarge,

    #[error("Signature header is missing")]
    MissingSignature,

    #[error("Signature verification failed")]
    InvalidSignature,

    #[error("Event timestamp is too old")]
    StaleTimestamp,

    #[error("Event timestamp is in the future")]
    FutureTimestamp,

    #[error("Event was already processed")]
    Duplicate,

    #[error("Payload could not be parsed: {0}")]
    ParseError(String),
}

/// HMAC verifier for one marketplace's webhook secret.
pub struct WebhookVerifier {
    secret: SecretString,
}

impl WebhookVerifier {
    /// Creates a verifier keyed by the marketplace's webhook signing secret.
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Runs the verification pipeline over a raw request.
    ///
    /// # Errors
    ///
    /// Returns the first failed check; see [`WebhookError`].
    pub fn verify(
        &self,
        body: &[u8],
        signature_hex: Option<&str>,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<(), WebhookError> {
        if body.len() > MAX_PAYLOAD_BYTES {
            return Err(WebhookError::PayloadTooLarge);
        }

        let signature_hex = signature_hex.ok_or(WebhookError::MissingSignature)?;
        let provided =
            hex::decode(signature_hex).map_err(|_| WebhookError::InvalidSignature)?;
        let expected = self.compute_signature(body);
        if !constant_time_compare(&expected, &provided) {
            return Err(WebhookError::InvalidSignature);
        }

        if let Some(ts) = timestamp {
            self.validate_timestamp(ts)?;
        }

        Ok(())
    }

    /// Rejects timestamps older than the replay window or ahead of the
    /// clock beyond tolerated skew. Exposed separately because the event
    /// timestamp lives inside the payload and is only known after parsing.
    pub fn validate_timestamp(&self, timestamp: DateTime<Utc>) -> Result<(), WebhookError> {
        let age = (Utc::now() - timestamp).num_seconds();
        if age > MAX_EVENT_AGE_SECS {
            return Err(WebhookError::StaleTimestamp);
        }
        if age < -MAX_CLOCK_SKEW_SECS {
            return Err(WebhookError::FutureTimestamp);
        }
        Ok(())
    }

    fn compute_signature(&self, body: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(body);
        mac.finalize().into_bytes().to_vec()
    }
}

/// Constant-time comparison of two byte slices.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Computes the hex signature a marketplace would send. Test fixtures only.
#[cfg(test)]
pub fn compute_test_signature(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const SECRET: &str = "wh-secret-ebay";

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(SecretString::new(SECRET.to_string()))
    }

    #[test]
    fn accepts_valid_signature_and_fresh_timestamp() {
        let body = br#"{"notificationId":"n-1","eventType":"ITEM_SOLD"}"#;
        let sig = compute_test_signature(SECRET, body);
        let result = verifier().verify(body, Some(&sig), Some(Utc::now()));
        assert!(result.is_ok());
    }

    #[test]
    fn accepts_missing_timestamp() {
        let body = b"{}";
        let sig = compute_test_signature(SECRET, body);
        assert!(verifier().verify(body, Some(&sig), None).is_ok());
    }

    #[test]
    fn rejects_oversized_payload() {
        let body = vec![b'x'; MAX_PAYLOAD_BYTES + 1];
        let sig = compute_test_signature(SECRET, &body);
        assert_eq!(
            verifier().verify(&body, Some(&sig), None),
            Err(WebhookError::PayloadTooLarge)
        );
    }

    #[test]
    fn rejects_missing_signature() {
        assert_eq!(
            verifier().verify(b"{}", None, None),
            Err(WebhookError::MissingSignature)
        );
    }

    #[test]
    fn rejects_wrong_secret() {
        let body = b"{}";
        let sig = compute_test_signature("other-secret", body);
        assert_eq!(
            verifier().verify(body, Some(&sig), None),
            Err(WebhookError::InvalidSignature)
        );
    }

    #[test]
    fn rejects_tampered_body() {
        let sig = compute_test_signature(SECRET, b"{\"a\":1}");
        assert_eq!(
            verifier().verify(b"{\"a\":2}", Some(&sig), None),
            Err(WebhookError::InvalidSignature)
        );
    }

    #[test]
    fn rejects_non_hex_signature() {
        assert_eq!(
            verifier().verify(b"{}", Some("zz-not-hex"), None),
            Err(WebhookError::InvalidSignature)
        );
    }

    #[test]
    fn rejects_stale_timestamp() {
        let body = b"{}";
        let sig = compute_test_signature(SECRET, body);
        let old = Utc::now() - Duration::minutes(6);
        assert_eq!(
            verifier().verify(body, Some(&sig), Some(old)),
            Err(WebhookError::StaleTimestamp)
        );
    }

    #[test]
    fn rejects_future_timestamp() {
        let body = b"{}";
        let sig = compute_test_signature(SECRET, body);
        let future = Utc::now() + Duration::minutes(5);
        assert_eq!(
            verifier().verify(body, Some(&sig), Some(future)),
            Err(WebhookError::FutureTimestamp)
        );
    }

    #[test]
    fn size_check_runs_before_signature_check() {
        let body = vec![b'x'; MAX_PAYLOAD_BYTES + 1];
        assert_eq!(
            verifier().verify(&body, None, None),
            Err(WebhookError::PayloadTooLarge)
        );
    }
}
