//! Core domain models and strongly-typed identifiers.
//!
//! Defines tenants, orders, recorded webhook events, and newtype ID wrappers
//! for compile-time type safety. Includes database serialization traits for
//! the PostgreSQL storage layer.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

type PgDb = sqlx::Postgres;
type PgValueRef<'r> = sqlx::postgres::PgValueRef<'r>;
type PgTypeInfo = sqlx::postgres::PgTypeInfo;
type PgArgumentBuffer = sqlx::postgres::PgArgumentBuffer;
type EncodeResult =
    Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>>;
type BoxDynError = sqlx::error::BoxDynError;

/// Strongly-typed tenant identifier.
///
/// Wraps a UUID to prevent mixing with other ID types. The tenant is the
/// unit of data isolation across the platform: every row in a tenant-scoped
/// table carries one of these, and row-level security keys off it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub Uuid);

impl TenantId {
    /// Creates a new random tenant ID.
    ///
    /// Used during tenant provisioning. Once assigned, a tenant ID is
    /// immutable.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TenantId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for TenantId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for TenantId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(uuid))
    }
}

impl sqlx::Encode<'_, PgDb> for TenantId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Strongly-typed identifier for a recorded webhook event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for EventId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for EventId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(uuid))
    }
}

impl sqlx::Encode<'_, PgDb> for EventId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Strongly-typed order identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub Uuid);

impl OrderId {
    /// Creates a new random order ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for OrderId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for OrderId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for OrderId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(uuid))
    }
}

impl sqlx::Encode<'_, PgDb> for OrderId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Payment providers whose webhooks we ingest.
///
/// The provider together with the provider's own event ID forms the
/// deduplication key for webhook deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentProvider {
    /// Paystack card and bank payments.
    Paystack,
    /// Safaricom M-Pesa (Daraja STK push callbacks).
    Mpesa,
    /// Stripe.
    Stripe,
    /// Flutterwave.
    Flutterwave,
}

impl PaymentProvider {
    /// All supported providers.
    pub const ALL: [Self; 4] = [Self::Paystack, Self::Mpesa, Self::Stripe, Self::Flutterwave];

    /// Canonical lowercase name used in URLs and database columns.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Paystack => "paystack",
            Self::Mpesa => "mpesa",
            Self::Stripe => "stripe",
            Self::Flutterwave => "flutterwave",
        }
    }
}

impl fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentProvider {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paystack" => Ok(Self::Paystack),
            "mpesa" => Ok(Self::Mpesa),
            "stripe" => Ok(Self::Stripe),
            "flutterwave" => Ok(Self::Flutterwave),
            _ => Err(CoreError::InvalidInput(format!("unknown payment provider: {s}"))),
        }
    }
}

impl sqlx::Type<PgDb> for PaymentProvider {
    fn type_info() -> PgTypeInfo {
        <str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for PaymentProvider {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        s.parse().map_err(|_| format!("invalid payment provider: {s}").into())
    }
}

impl sqlx::Encode<'_, PgDb> for PaymentProvider {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <&str as sqlx::Encode<PgDb>>::encode_by_ref(&self.as_str(), buf)
    }
}

/// Recorded webhook delivery.
///
/// One row per provider event, created before any business processing runs.
/// The `(provider, event_id)` unique index is the durability guarantee for
/// at-most-once processing: the idempotency cache in front of it is an
/// optimization, this row is the source of truth. Rows are never updated and
/// are retained for audit and idempotency lookback.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WebhookEvent {
    /// Unique identifier for this recorded delivery.
    pub id: EventId,

    /// Provider that delivered the event.
    pub provider: PaymentProvider,

    /// The provider's own event identifier.
    pub event_id: String,

    /// Provider event type (e.g. `charge.success`).
    pub event_type: String,

    /// Raw request body as received.
    pub payload: String,

    /// When the event was recorded.
    pub processed_at: DateTime<Utc>,
}

impl WebhookEvent {
    /// Creates a new webhook event record.
    pub fn new(
        provider: PaymentProvider,
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            id: EventId::new(),
            provider,
            event_id: event_id.into(),
            event_type: event_type.into(),
            payload: payload.into(),
            processed_at: Utc::now(),
        }
    }
}

/// Tenant represents an isolated merchant storefront.
///
/// The tenant registry itself is not row-level-security scoped: it is the
/// root that request resolution reads before any scoped session exists.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tenant {
    /// Unique identifier for this tenant.
    pub id: TenantId,

    /// Human-readable merchant name.
    pub name: String,

    /// Subdomain label, unique across the platform.
    ///
    /// Requests arriving at `{slug}.{base_domain}` resolve to this tenant.
    pub slug: String,

    /// Whether the tenant may serve traffic.
    ///
    /// Inactive tenants resolve but are rejected with a forbidden error.
    pub is_active: bool,

    /// When this tenant was created.
    pub created_at: DateTime<Utc>,

    /// When this tenant was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    /// Creates a new active tenant.
    pub fn new(name: impl Into<String>, slug: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: TenantId::new(),
            name: name.into(),
            slug: slug.into(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Order lifecycle status.
///
/// ```text
/// Pending -> PaymentPending -> Paid
///         \-> Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order created, no payment initiated.
    Pending,

    /// A charge has been initiated and awaits provider confirmation.
    PaymentPending,

    /// Payment confirmed by a provider webhook. Terminal success state.
    Paid,

    /// Order cancelled before payment. Terminal state.
    Cancelled,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::PaymentPending => write!(f, "payment_pending"),
            Self::Paid => write!(f, "paid"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl sqlx::Type<PgDb> for OrderStatus {
    fn type_info() -> PgTypeInfo {
        <str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for OrderStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        match s {
            "pending" => Ok(Self::Pending),
            "payment_pending" => Ok(Self::PaymentPending),
            "paid" => Ok(Self::Paid),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("invalid order status: {s}").into()),
        }
    }
}

impl sqlx::Encode<'_, PgDb> for OrderStatus {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.to_string(), buf)
    }
}

/// Order within a merchant storefront.
///
/// Tenant-scoped: visibility is enforced by the database through the
/// row-level-security policy on the `orders` table, so queries issued from a
/// tenant session need no explicit `WHERE tenant_id` clause.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    /// Unique identifier for this order.
    pub id: OrderId,

    /// Tenant that owns this order.
    pub tenant_id: TenantId,

    /// Merchant-facing order reference, unique per tenant.
    ///
    /// Payment providers echo this back in webhook payloads, which is how
    /// confirmations are matched to orders.
    pub reference: String,

    /// Current lifecycle status.
    pub status: OrderStatus,

    /// Order total in minor currency units.
    pub amount: i64,

    /// ISO 4217 currency code.
    pub currency: String,

    /// When this order was created.
    pub created_at: DateTime<Utc>,

    /// When this order was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a new pending order for a tenant.
    pub fn new(
        tenant_id: TenantId,
        reference: impl Into<String>,
        amount: i64,
        currency: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::new(),
            tenant_id,
            reference: reference.into(),
            status: OrderStatus::Pending,
            amount,
            currency: currency.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names_round_trip() {
        for provider in PaymentProvider::ALL {
            let parsed: PaymentProvider = provider.as_str().parse().unwrap();
            assert_eq!(parsed, provider);
        }
    }

    #[test]
    fn unknown_provider_rejected() {
        assert!("paypal".parse::<PaymentProvider>().is_err());
        assert!("".parse::<PaymentProvider>().is_err());
        assert!("Paystack".parse::<PaymentProvider>().is_err());
    }

    #[test]
    fn order_status_display_format() {
        assert_eq!(OrderStatus::Pending.to_string(), "pending");
        assert_eq!(OrderStatus::PaymentPending.to_string(), "payment_pending");
        assert_eq!(OrderStatus::Paid.to_string(), "paid");
        assert_eq!(OrderStatus::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn new_order_starts_pending() {
        let order = Order::new(TenantId::new(), "ord-42", 15_000, "KES");
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.reference, "ord-42");
        assert_eq!(order.amount, 15_000);
    }

    #[test]
    fn webhook_event_captures_raw_payload() {
        let event = WebhookEvent::new(
            PaymentProvider::Mpesa,
            "ABC123",
            "stk_callback",
            r#"{"Body":{}}"#,
        );
        assert_eq!(event.provider, PaymentProvider::Mpesa);
        assert_eq!(event.event_id, "ABC123");
        assert_eq!(event.payload, r#"{"Body":{}}"#);
    }
}
