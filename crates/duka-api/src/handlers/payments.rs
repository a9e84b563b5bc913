//! Idempotent payment initiation.
//!
//! `POST /payments/charge` is the client-facing financial mutation. The
//! caller supplies an idempotency key (header or body); the server never
//! invents one, so a keyless request is rejected before anything runs.
//! Retries with the same key replay the original response byte-for-byte,
//! even when the retried payload differs.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use bytes::Bytes;
use duka_idempotency::{
    resolve_client_key, ExecutionOutcome, FailurePolicy, GuardError, OperationFailure,
};
use serde::Deserialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{metrics, middleware::tenant::TenantContext, server::AppState};

/// Request body for payment initiation.
#[derive(Debug, Deserialize)]
pub struct ChargeRequest {
    /// Reference of the order being paid.
    pub order_reference: String,
    /// Optional body-embedded idempotency key.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

fn error_body(code: &str, message: &str) -> serde_json::Value {
    serde_json::json!({"error": {"code": code, "message": message}})
}

/// Initiates a charge for an order, at most once per idempotency key.
///
/// # Errors
///
/// Returns appropriate HTTP status codes:
/// - 400: missing idempotency key or unparseable body
/// - 404: order reference not visible to this tenant
/// - 409: same key still in flight
/// - 503: idempotency store unreachable (fail-closed)
#[instrument(name = "initiate_charge", skip(state, ctx, headers, body))]
pub async fn initiate_charge(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let header_key = headers.get("idempotency-key").and_then(|v| v.to_str().ok());

    let Some(key) = resolve_client_key(header_key, &body) else {
        warn!("charge rejected: no idempotency key");
        return (
            StatusCode::BAD_REQUEST,
            Json(error_body(
                duka_core::DukaError::MissingIdempotencyKey.code(),
                "Idempotency-Key header or idempotency_key field required",
            )),
        )
            .into_response();
    };

    let request: ChargeRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(error_body("E1002", &format!("malformed charge request: {e}"))),
            )
                .into_response();
        },
    };

    // Keys are namespaced per tenant so two merchants reusing the same
    // literal key can never collide.
    let tenant_id = ctx.tenant_id;
    let guarded_key = format!("charge:{tenant_id}:{key}");

    let storage = state.storage.clone();
    let order_reference = request.order_reference.clone();

    let result = state
        .guard
        .execute_once(&guarded_key, FailurePolicy::FailClosed, move || async move {
            let mut session = storage
                .tenant_session(tenant_id)
                .await
                .map_err(|e| OperationFailure::new(500, e.to_string()))?;

            // No tenant filter: the session's scope is the only visibility.
            let order = storage
                .orders
                .find_by_reference(session.connection(), &order_reference)
                .await
                .map_err(|e| OperationFailure::new(500, e.to_string()))?;

            let Some(order) = order else {
                return Err(OperationFailure::new(
                    404,
                    format!("order {order_reference} not found"),
                ));
            };

            storage
                .orders
                .update_status(
                    session.connection(),
                    order.id,
                    duka_core::OrderStatus::PaymentPending,
                )
                .await
                .map_err(|e| OperationFailure::new(500, e.to_string()))?;

            // The provider charge itself is issued by the payments worker;
            // this reference ties the eventual webhook back to the order.
            let payment_reference = format!("pay-{}", Uuid::new_v4());

            info!(order_id = %order.id, %payment_reference, "charge initiated");

            Ok(serde_json::json!({
                "payment_reference": payment_reference,
                "order_reference": order.reference,
                "amount": order.amount,
                "currency": order.currency,
                "status": "payment_pending",
            }))
        })
        .await;

    match result {
        Ok(ExecutionOutcome::Executed { body }) => (StatusCode::OK, Json(body)).into_response(),
        Ok(ExecutionOutcome::Replayed { body }) => {
            info!("replaying recorded charge response");
            metrics::idempotency_replay();
            (StatusCode::OK, Json(body)).into_response()
        },
        Err(GuardError::Conflict) => {
            metrics::idempotency_conflict();
            let err = duka_core::DukaError::ConcurrentConflict { key };
            (
                StatusCode::CONFLICT,
                Json(error_body(err.code(), "a request with this key is in flight; retry shortly")),
            )
                .into_response()
        },
        Err(GuardError::StoreUnavailable(e)) => {
            warn!(error = %e, "idempotency store down; rejecting charge");
            let err = duka_core::DukaError::StoreUnavailable { detail: e.to_string() };
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(error_body(err.code(), "idempotency store unavailable")),
            )
                .into_response()
        },
        Err(GuardError::Failed { status, detail, replayed }) => {
            if replayed {
                metrics::idempotency_replay();
            }
            let status =
                StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(error_body("E9999", &detail))).into_response()
        },
    }
}
