//! Idempotency key resolution.
//!
//! Keys are caller-supplied for client mutations and provider-supplied for
//! webhooks. The server never invents a key for a financial mutation: if
//! neither the header nor the body carries one, resolution fails and the
//! call site must reject the request.

/// Resolves the idempotency key for a client-initiated mutation.
///
/// Prefers the explicit `Idempotency-Key` header; falls back to a
/// body-embedded `idempotency_key` field. Returns `None` when neither is
/// present or the candidate is empty.
pub fn resolve_client_key(header: Option<&str>, body: &[u8]) -> Option<String> {
    if let Some(value) = header {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }

    let parsed: serde_json::Value = serde_json::from_slice(body).ok()?;
    parsed
        .get("idempotency_key")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Canonical key for a provider webhook delivery.
///
/// Combines the provider name with the provider's own event ID, mirroring
/// the `(provider, event_id)` unique index on recorded deliveries.
pub fn webhook_key(provider: &str, event_id: &str) -> String {
    format!("wh:{provider}:{event_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_takes_precedence_over_body() {
        let body = br#"{"idempotency_key": "from-body"}"#;
        let key = resolve_client_key(Some("from-header"), body);
        assert_eq!(key.as_deref(), Some("from-header"));
    }

    #[test]
    fn falls_back_to_body_field() {
        let body = br#"{"order_reference": "ord-42", "idempotency_key": "order-42-pay"}"#;
        let key = resolve_client_key(None, body);
        assert_eq!(key.as_deref(), Some("order-42-pay"));
    }

    #[test]
    fn blank_header_falls_through() {
        let body = br#"{"idempotency_key": "from-body"}"#;
        let key = resolve_client_key(Some("   "), body);
        assert_eq!(key.as_deref(), Some("from-body"));
    }

    #[test]
    fn absent_key_is_none() {
        assert_eq!(resolve_client_key(None, br#"{"order_reference": "ord-42"}"#), None);
        assert_eq!(resolve_client_key(None, b"not json"), None);
        assert_eq!(resolve_client_key(None, br#"{"idempotency_key": ""}"#), None);
        assert_eq!(resolve_client_key(None, br#"{"idempotency_key": 42}"#), None);
    }

    #[test]
    fn webhook_keys_separate_providers() {
        assert_eq!(webhook_key("mpesa", "ABC123"), "wh:mpesa:ABC123");
        assert_ne!(webhook_key("mpesa", "ABC123"), webhook_key("paystack", "ABC123"));
    }
}
