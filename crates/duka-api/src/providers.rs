//! Provider payload interpretation.
//!
//! Each provider shapes its webhook JSON differently; this module is the
//! single place that knows where to find the event ID, the event type, and
//! the merchant payment reference in each shape. Retries are deduplicated
//! on the extracted event ID, so extraction must be stable across
//! redeliveries of the same event.

use duka_core::PaymentProvider;
use serde_json::Value;

/// Event identity extracted from a provider payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEvent {
    /// The provider's own event identifier.
    pub event_id: String,
    /// Provider event type (e.g. `charge.success`).
    pub event_type: String,
}

/// Extracts the event identity from a provider payload.
///
/// Returns `None` when the payload does not carry the fields the provider
/// documents, which callers must treat as malformed.
pub fn parse_event(provider: PaymentProvider, payload: &Value) -> Option<ProviderEvent> {
    match provider {
        // {"event": "charge.success", "data": {"id": 302961, "reference": "..."}}
        PaymentProvider::Paystack => {
            let event_type = payload.get("event")?.as_str()?.to_string();
            let data = payload.get("data")?;
            let event_id = match data.get("id") {
                Some(Value::Number(n)) => n.to_string(),
                Some(Value::String(s)) if !s.is_empty() => s.clone(),
                _ => data.get("reference")?.as_str()?.to_string(),
            };
            Some(ProviderEvent { event_id, event_type })
        },

        // {"Body": {"stkCallback": {"CheckoutRequestID": "...", "ResultCode": 0, ...}}}
        PaymentProvider::Mpesa => {
            let callback = payload.get("Body")?.get("stkCallback")?;
            let event_id = callback.get("CheckoutRequestID")?.as_str()?.to_string();
            Some(ProviderEvent { event_id, event_type: "stk_callback".to_string() })
        },

        // {"id": "evt_...", "type": "payment_intent.succeeded", ...}
        PaymentProvider::Stripe => {
            let event_id = payload.get("id")?.as_str()?.to_string();
            let event_type = payload.get("type")?.as_str()?.to_string();
            Some(ProviderEvent { event_id, event_type })
        },

        // {"event": "charge.completed", "data": {"id": 285959875, "tx_ref": "..."}}
        PaymentProvider::Flutterwave => {
            let event_type = payload.get("event")?.as_str()?.to_string();
            let data = payload.get("data")?;
            let event_id = match data.get("id") {
                Some(Value::Number(n)) => n.to_string(),
                Some(Value::String(s)) if !s.is_empty() => s.clone(),
                _ => return None,
            };
            Some(ProviderEvent { event_id, event_type })
        },
    }
}

/// Whether the event reports a successful payment.
///
/// Only successful payments move orders to `paid`; every other event type
/// is recorded for audit and otherwise ignored.
pub fn is_payment_success(provider: PaymentProvider, event_type: &str, payload: &Value) -> bool {
    match provider {
        PaymentProvider::Paystack => event_type == "charge.success",
        PaymentProvider::Mpesa => {
            // ResultCode 0 is success; anything else is a failure or cancel.
            payload
                .pointer("/Body/stkCallback/ResultCode")
                .and_then(Value::as_i64)
                .map(|code| code == 0)
                .unwrap_or(false)
        },
        PaymentProvider::Stripe => event_type == "payment_intent.succeeded",
        PaymentProvider::Flutterwave => event_type == "charge.completed",
    }
}

/// Extracts the merchant order reference echoed back by the provider.
///
/// This is how a confirmation is matched to the order it pays for. Not
/// every event carries one (M-Pesa callbacks identify the checkout, not the
/// order, unless the integration embeds it in `AccountReference`).
pub fn payment_reference(provider: PaymentProvider, payload: &Value) -> Option<String> {
    let reference = match provider {
        PaymentProvider::Paystack => payload.pointer("/data/reference")?.as_str()?,
        PaymentProvider::Mpesa => payload.pointer("/Body/stkCallback/AccountReference")?.as_str()?,
        PaymentProvider::Stripe => payload.pointer("/data/object/metadata/order_reference")?.as_str()?,
        PaymentProvider::Flutterwave => payload.pointer("/data/tx_ref")?.as_str()?,
    };

    if reference.is_empty() {
        None
    } else {
        Some(reference.to_string())
    }
}

/// Header each provider uses to carry its signature.
pub const fn signature_header(provider: PaymentProvider) -> Option<&'static str> {
    match provider {
        PaymentProvider::Paystack => Some("x-paystack-signature"),
        PaymentProvider::Stripe => Some("stripe-signature"),
        PaymentProvider::Flutterwave => Some("verif-hash"),
        PaymentProvider::Mpesa => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn paystack_event_parsed() {
        let payload = json!({
            "event": "charge.success",
            "data": {"id": 302961, "reference": "ord-42", "amount": 150000}
        });

        let event = parse_event(PaymentProvider::Paystack, &payload).unwrap();
        assert_eq!(event.event_id, "302961");
        assert_eq!(event.event_type, "charge.success");
        assert!(is_payment_success(PaymentProvider::Paystack, &event.event_type, &payload));
        assert_eq!(
            payment_reference(PaymentProvider::Paystack, &payload).as_deref(),
            Some("ord-42")
        );
    }

    #[test]
    fn paystack_failed_charge_is_not_success() {
        let payload = json!({"event": "charge.failed", "data": {"id": 1, "reference": "ord-1"}});
        let event = parse_event(PaymentProvider::Paystack, &payload).unwrap();
        assert!(!is_payment_success(PaymentProvider::Paystack, &event.event_type, &payload));
    }

    #[test]
    fn mpesa_callback_parsed() {
        let payload = json!({
            "Body": {
                "stkCallback": {
                    "MerchantRequestID": "29115-34620561-1",
                    "CheckoutRequestID": "ABC123",
                    "ResultCode": 0,
                    "ResultDesc": "The service request is processed successfully.",
                    "AccountReference": "ord-42"
                }
            }
        });

        let event = parse_event(PaymentProvider::Mpesa, &payload).unwrap();
        assert_eq!(event.event_id, "ABC123");
        assert_eq!(event.event_type, "stk_callback");
        assert!(is_payment_success(PaymentProvider::Mpesa, &event.event_type, &payload));
        assert_eq!(payment_reference(PaymentProvider::Mpesa, &payload).as_deref(), Some("ord-42"));
    }

    #[test]
    fn mpesa_nonzero_result_code_is_failure() {
        let payload = json!({
            "Body": {"stkCallback": {"CheckoutRequestID": "ABC123", "ResultCode": 1032}}
        });
        let event = parse_event(PaymentProvider::Mpesa, &payload).unwrap();
        assert!(!is_payment_success(PaymentProvider::Mpesa, &event.event_type, &payload));
    }

    #[test]
    fn stripe_event_parsed() {
        let payload = json!({
            "id": "evt_1NG8Du2eZvKYlo2C",
            "type": "payment_intent.succeeded",
            "data": {"object": {"metadata": {"order_reference": "ord-42"}}}
        });

        let event = parse_event(PaymentProvider::Stripe, &payload).unwrap();
        assert_eq!(event.event_id, "evt_1NG8Du2eZvKYlo2C");
        assert!(is_payment_success(PaymentProvider::Stripe, &event.event_type, &payload));
        assert_eq!(
            payment_reference(PaymentProvider::Stripe, &payload).as_deref(),
            Some("ord-42")
        );
    }

    #[test]
    fn flutterwave_event_parsed() {
        let payload = json!({
            "event": "charge.completed",
            "data": {"id": 285959875, "tx_ref": "ord-42", "status": "successful"}
        });

        let event = parse_event(PaymentProvider::Flutterwave, &payload).unwrap();
        assert_eq!(event.event_id, "285959875");
        assert!(is_payment_success(PaymentProvider::Flutterwave, &event.event_type, &payload));
        assert_eq!(
            payment_reference(PaymentProvider::Flutterwave, &payload).as_deref(),
            Some("ord-42")
        );
    }

    #[test]
    fn missing_fields_are_malformed() {
        assert!(parse_event(PaymentProvider::Paystack, &json!({"data": {}})).is_none());
        assert!(parse_event(PaymentProvider::Mpesa, &json!({"Body": {}})).is_none());
        assert!(parse_event(PaymentProvider::Stripe, &json!({"id": "evt_1"})).is_none());
        assert!(parse_event(PaymentProvider::Flutterwave, &json!({"event": "x"})).is_none());
    }

    #[test]
    fn event_extraction_is_stable_across_redeliveries() {
        // Same payload delivered twice must yield the same key material.
        let payload = json!({"id": "evt_9", "type": "payment_intent.succeeded"});
        let first = parse_event(PaymentProvider::Stripe, &payload).unwrap();
        let second = parse_event(PaymentProvider::Stripe, &payload).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn signature_headers_per_provider() {
        assert_eq!(
            signature_header(PaymentProvider::Paystack),
            Some("x-paystack-signature")
        );
        assert_eq!(signature_header(PaymentProvider::Mpesa), None);
    }
}
