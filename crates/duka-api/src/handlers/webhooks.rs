//! Provider webhook ingress.
//!
//! `POST /webhooks/{provider}` accepts provider JSON, authenticates it by
//! signature, and runs the at-most-once pipeline: record the delivery under
//! the `(provider, event_id)` unique index, then hand it to the business
//! processor. The idempotency guard in front deduplicates retries and
//! serializes concurrent duplicates; the unique index beneath it is the
//! durability guarantee when the cache is cold.
//!
//! The response body is always `{"success": true|false}`. Processed and
//! deduplicated deliveries are 200; non-200 responses are reserved for
//! malformed or unauthenticated payloads, plus 409 while an identical
//! delivery is still in flight.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use duka_core::{
    storage::webhook_events::RecordOutcome, PaymentProvider, WebhookEvent,
};
use duka_idempotency::{
    webhook_key, ExecutionOutcome, FailurePolicy, GuardError, OperationFailure,
};
use tracing::{debug, info, instrument, warn};

use crate::{crypto, metrics, providers, server::AppState};

/// Acknowledgement body for provider webhooks.
fn ack(success: bool) -> serde_json::Value {
    serde_json::json!({"success": success})
}

/// Ingests a provider webhook with at-most-once processing.
///
/// # Errors
///
/// Returns appropriate HTTP status codes:
/// - 404: unknown provider segment
/// - 401: signature validation failed
/// - 400: payload missing the provider's documented fields
/// - 409: identical delivery still in flight
/// - 503: idempotency store unreachable (fail-closed)
#[instrument(
    name = "receive_webhook",
    skip(state, headers, body),
    fields(provider = %provider, payload_size = body.len())
)]
pub async fn receive_webhook(
    Path(provider): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let provider: PaymentProvider = match provider.parse() {
        Ok(provider) => provider,
        Err(_) => {
            warn!("webhook for unknown provider");
            return (StatusCode::NOT_FOUND, Json(ack(false))).into_response();
        },
    };

    metrics::webhook_received(provider);

    if let Err(response) = authenticate(&state, provider, &headers, &body) {
        return response;
    }

    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "webhook body is not valid JSON");
            metrics::webhook_rejected(provider, "malformed");
            return (StatusCode::BAD_REQUEST, Json(ack(false))).into_response();
        },
    };

    let event = match providers::parse_event(provider, &payload) {
        Some(event) => event,
        None => {
            warn!("webhook payload missing provider event fields");
            metrics::webhook_rejected(provider, "malformed");
            return (StatusCode::BAD_REQUEST, Json(ack(false))).into_response();
        },
    };

    debug!(event_id = %event.event_id, event_type = %event.event_type, "webhook authenticated");

    let key = webhook_key(provider.as_str(), &event.event_id);
    let raw_body = String::from_utf8_lossy(&body).into_owned();

    let guard = state.guard.clone();
    let storage = state.storage.clone();
    let processor = state.processor.clone();
    let event_id = event.event_id.clone();
    let event_type = event.event_type.clone();

    // Webhooks mutate payment state: the guard runs fail-closed, so a store
    // outage rejects the delivery and the provider retries later.
    let result = guard
        .execute_once(&key, FailurePolicy::FailClosed, move || async move {
            let record = WebhookEvent::new(provider, event_id.clone(), event_type, raw_body);

            match storage.webhook_events.record(&record).await {
                Ok(RecordOutcome::Recorded(_)) => {},
                Ok(RecordOutcome::AlreadyProcessed) => {
                    // The unique index caught a duplicate the cache missed.
                    info!(event_id = %event_id, "delivery already recorded; acknowledging");
                    metrics::webhook_duplicate(provider);
                    return Ok(ack(true));
                },
                Err(e) => {
                    return Err(OperationFailure::new(500, format!("failed to record: {e}")));
                },
            }

            if let Err(e) = processor.process(&record).await {
                return Err(OperationFailure::new(500, e.to_string()));
            }

            Ok(ack(true))
        })
        .await;

    match result {
        Ok(ExecutionOutcome::Executed { body }) => {
            info!("webhook processed");
            (StatusCode::OK, Json(body)).into_response()
        },
        Ok(ExecutionOutcome::Replayed { body }) => {
            info!("duplicate delivery; replaying acknowledgement");
            metrics::webhook_duplicate(provider);
            metrics::idempotency_replay();
            (StatusCode::OK, Json(body)).into_response()
        },
        Err(GuardError::Conflict) => {
            warn!("identical delivery still in flight");
            metrics::idempotency_conflict();
            (StatusCode::CONFLICT, Json(ack(false))).into_response()
        },
        Err(GuardError::StoreUnavailable(e)) => {
            warn!(error = %e, "idempotency store down; rejecting delivery");
            (StatusCode::SERVICE_UNAVAILABLE, Json(ack(false))).into_response()
        },
        Err(GuardError::Failed { status, detail, replayed }) => {
            warn!(status, detail = %detail, replayed, "webhook processing failed");
            let status =
                StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(ack(false))).into_response()
        },
    }
}

/// Verifies the provider's signature against the configured secret.
///
/// Providers without a configured secret are accepted with a warning so
/// sandbox environments work; production deployments configure every
/// integrated provider.
fn authenticate(
    state: &AppState,
    provider: PaymentProvider,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), Response> {
    let Some(secret) = state.config.provider_secret(provider) else {
        if providers::signature_header(provider).is_some() {
            warn!(provider = %provider, "no signing secret configured; accepting unverified");
        }
        return Ok(());
    };

    let Some(header_name) = providers::signature_header(provider) else {
        return Ok(());
    };

    let signature = headers.get(header_name).and_then(|v| v.to_str().ok()).unwrap_or("");

    let validation = match provider {
        PaymentProvider::Paystack => crypto::verify_paystack(body, signature, secret),
        PaymentProvider::Stripe => crypto::verify_stripe(body, signature, secret),
        PaymentProvider::Flutterwave => crypto::verify_flutterwave(signature, secret),
        PaymentProvider::Mpesa => crypto::ValidationResult::valid(),
    };

    if validation.is_valid {
        Ok(())
    } else {
        warn!(
            provider = %provider,
            error = validation.error_message.as_deref().unwrap_or("invalid"),
            "webhook signature rejected"
        );
        metrics::webhook_rejected(provider, "signature");
        Err((StatusCode::UNAUTHORIZED, Json(ack(false))).into_response())
    }
}
