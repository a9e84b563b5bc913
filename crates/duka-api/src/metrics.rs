//! Prometheus counters for the webhook and idempotency paths.

use duka_core::PaymentProvider;

/// Records a webhook delivery reaching the handler.
pub fn webhook_received(provider: PaymentProvider) {
    metrics::counter!("duka_webhooks_received_total", "provider" => provider.as_str())
        .increment(1);
}

/// Records a deduplicated webhook delivery.
pub fn webhook_duplicate(provider: PaymentProvider) {
    metrics::counter!("duka_webhooks_duplicate_total", "provider" => provider.as_str())
        .increment(1);
}

/// Records a webhook rejected before processing (signature or shape).
pub fn webhook_rejected(provider: PaymentProvider, reason: &'static str) {
    metrics::counter!(
        "duka_webhooks_rejected_total",
        "provider" => provider.as_str(),
        "reason" => reason
    )
    .increment(1);
}

/// Records a replayed idempotent response.
pub fn idempotency_replay() {
    metrics::counter!("duka_idempotency_replays_total").increment(1);
}

/// Records an in-flight duplicate surfaced as a conflict.
pub fn idempotency_conflict() {
    metrics::counter!("duka_idempotency_conflicts_total").increment(1);
}

/// Records a request rejected by tenant resolution.
pub fn tenant_rejected(reason: &'static str) {
    metrics::counter!("duka_tenant_rejected_total", "reason" => reason).increment(1);
}
