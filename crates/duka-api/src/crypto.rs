//! Webhook signature verification.
//!
//! Each provider authenticates its deliveries differently: Paystack signs
//! the raw body with HMAC-SHA512, Stripe signs `{timestamp}.{body}` with
//! HMAC-SHA256 inside a structured header, Flutterwave sends a shared
//! secret verbatim. All comparisons are timing-safe.

use std::fmt;

use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// Result of signature validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    /// Whether the signature is valid.
    pub is_valid: bool,
    /// Error message if validation failed.
    pub error_message: Option<String>,
}

impl ValidationResult {
    /// Creates a successful validation result.
    pub fn valid() -> Self {
        Self { is_valid: true, error_message: None }
    }

    /// Creates a failed validation result with error message.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self { is_valid: false, error_message: Some(message.into()) }
    }
}

/// Signature generation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// Invalid secret key.
    InvalidSecret,
}

impl fmt::Display for SignatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSecret => write!(f, "invalid secret key"),
        }
    }
}

impl std::error::Error for SignatureError {}

/// Generates an HMAC-SHA256 signature as lowercase hex.
///
/// # Errors
///
/// Returns `SignatureError::InvalidSecret` if the secret key is rejected.
pub fn hmac_sha256_hex(payload: &[u8], secret: &str) -> Result<String, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureError::InvalidSecret)?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Generates an HMAC-SHA512 signature as lowercase hex.
///
/// # Errors
///
/// Returns `SignatureError::InvalidSecret` if the secret key is rejected.
pub fn hmac_sha512_hex(payload: &[u8], secret: &str) -> Result<String, SignatureError> {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureError::InvalidSecret)?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Validates a Paystack webhook: HMAC-SHA512 of the raw body, hex encoded,
/// in the `x-paystack-signature` header.
pub fn verify_paystack(body: &[u8], signature: &str, secret: &str) -> ValidationResult {
    if signature.is_empty() {
        return ValidationResult::invalid("signature header is empty");
    }

    let expected = match hmac_sha512_hex(body, secret) {
        Ok(expected) => expected,
        Err(err) => return ValidationResult::invalid(err.to_string()),
    };

    if timing_safe_eq(signature, &expected) {
        ValidationResult::valid()
    } else {
        ValidationResult::invalid("signature mismatch")
    }
}

/// Validates a Stripe webhook signature header.
///
/// The header carries `t=<timestamp>,v1=<hex>[,...]`; the signed payload is
/// `{timestamp}.{body}` under HMAC-SHA256.
pub fn verify_stripe(body: &[u8], header: &str, secret: &str) -> ValidationResult {
    let mut timestamp = None;
    let mut signature = None;

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signature = Some(value),
            _ => {},
        }
    }

    let (Some(timestamp), Some(signature)) = (timestamp, signature) else {
        return ValidationResult::invalid("expected 't=<ts>,v1=<hex>' signature header");
    };

    let mut signed_payload = Vec::with_capacity(timestamp.len() + 1 + body.len());
    signed_payload.extend_from_slice(timestamp.as_bytes());
    signed_payload.push(b'.');
    signed_payload.extend_from_slice(body);

    let expected = match hmac_sha256_hex(&signed_payload, secret) {
        Ok(expected) => expected,
        Err(err) => return ValidationResult::invalid(err.to_string()),
    };

    if timing_safe_eq(signature, &expected) {
        ValidationResult::valid()
    } else {
        ValidationResult::invalid("signature mismatch")
    }
}

/// Validates a Flutterwave webhook: the `verif-hash` header carries the
/// shared secret verbatim.
pub fn verify_flutterwave(header: &str, secret: &str) -> ValidationResult {
    if header.is_empty() {
        return ValidationResult::invalid("verif-hash header is empty");
    }

    if timing_safe_eq(header, secret) {
        ValidationResult::valid()
    } else {
        ValidationResult::invalid("verif-hash mismatch")
    }
}

/// Timing-safe string comparison to prevent timing attacks.
fn timing_safe_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (a_byte, b_byte) in a.bytes().zip(b.bytes()) {
        result |= a_byte ^ b_byte;
    }

    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paystack_signature_round_trip() {
        let body = br#"{"event":"charge.success"}"#;
        let secret = "sk_test_secret";

        let signature = hmac_sha512_hex(body, secret).unwrap();
        assert!(verify_paystack(body, &signature, secret).is_valid);
    }

    #[test]
    fn paystack_rejects_tampered_body() {
        let secret = "sk_test_secret";
        let signature = hmac_sha512_hex(br#"{"amount":100}"#, secret).unwrap();

        let result = verify_paystack(br#"{"amount":999}"#, &signature, secret);
        assert!(!result.is_valid);
    }

    #[test]
    fn paystack_rejects_empty_signature() {
        let result = verify_paystack(b"body", "", "secret");
        assert!(!result.is_valid);
        assert_eq!(result.error_message.unwrap(), "signature header is empty");
    }

    #[test]
    fn stripe_signature_round_trip() {
        let body = br#"{"id":"evt_1","type":"payment_intent.succeeded"}"#;
        let secret = "whsec_test";
        let timestamp = "1692000000";

        let signed = format!("{timestamp}.{}", std::str::from_utf8(body).unwrap());
        let signature = hmac_sha256_hex(signed.as_bytes(), secret).unwrap();
        let header = format!("t={timestamp},v1={signature}");

        assert!(verify_stripe(body, &header, secret).is_valid);
    }

    #[test]
    fn stripe_rejects_malformed_header() {
        assert!(!verify_stripe(b"body", "v1=abc", "secret").is_valid);
        assert!(!verify_stripe(b"body", "t=123", "secret").is_valid);
        assert!(!verify_stripe(b"body", "", "secret").is_valid);
    }

    #[test]
    fn stripe_rejects_wrong_timestamp() {
        let body = b"payload";
        let secret = "whsec_test";

        let signed = format!("111.{}", std::str::from_utf8(body).unwrap());
        let signature = hmac_sha256_hex(signed.as_bytes(), secret).unwrap();
        let header = format!("t=222,v1={signature}");

        assert!(!verify_stripe(body, &header, secret).is_valid);
    }

    #[test]
    fn flutterwave_compares_secret_verbatim() {
        assert!(verify_flutterwave("my-hash", "my-hash").is_valid);
        assert!(!verify_flutterwave("other", "my-hash").is_valid);
        assert!(!verify_flutterwave("", "my-hash").is_valid);
    }

    #[test]
    fn timing_safe_eq_cases() {
        assert!(timing_safe_eq("hello", "hello"));
        assert!(!timing_safe_eq("hello", "world"));
        assert!(!timing_safe_eq("hello", "hello_world"));
    }

    #[test]
    fn hmac_hex_is_deterministic() {
        let a = hmac_sha256_hex(b"payload", "secret").unwrap();
        let b = hmac_sha256_hex(b"payload", "secret").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_eq!(hmac_sha512_hex(b"payload", "secret").unwrap().len(), 128);
    }
}
