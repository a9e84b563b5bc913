//! Tenant-scoped order listing.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;

use crate::{middleware::tenant::TenantContext, server::AppState};

/// Order summary returned to storefront dashboards.
#[derive(Debug, Serialize)]
pub struct OrderSummary {
    /// Order identifier.
    pub id: String,
    /// Merchant order reference.
    pub reference: String,
    /// Lifecycle status.
    pub status: String,
    /// Total in minor currency units.
    pub amount: i64,
    /// ISO 4217 currency code.
    pub currency: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Lists the tenant's orders, newest first.
///
/// The query carries no tenant filter; the session's row-level-security
/// scope is the only thing confining it, which is exactly the property the
/// platform relies on everywhere else.
#[instrument(name = "list_orders", skip(state, ctx), fields(tenant_id = %ctx.tenant_id))]
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
) -> Response {
    let mut session = match state.storage.tenant_session(ctx.tenant_id).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(error = %e, "failed to open tenant session");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        },
    };

    match state.storage.orders.list(session.connection(), None).await {
        Ok(orders) => {
            let summaries: Vec<OrderSummary> = orders
                .into_iter()
                .map(|order| OrderSummary {
                    id: order.id.to_string(),
                    reference: order.reference,
                    status: order.status.to_string(),
                    amount: order.amount,
                    currency: order.currency,
                    created_at: order.created_at,
                })
                .collect();

            Json(summaries).into_response()
        },
        Err(e) => {
            tracing::error!(error = %e, "failed to list orders");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        },
    }
}
