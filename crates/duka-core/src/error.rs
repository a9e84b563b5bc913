//! Error types and result handling for the payments core.
//!
//! Defines a structured error taxonomy with stable codes for client
//! disambiguation and HTTP status mapping. Covers idempotency, tenant
//! resolution, and infrastructure failures.

use thiserror::Error;

use crate::models::PaymentProvider;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Storage-level error type for repository operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Entity not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Constraint violation.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CoreError {
    /// Returns whether this error is a unique-constraint violation.
    ///
    /// Duplicate webhook deliveries surface as unique violations on the
    /// `(provider, event_id)` index and must be treated as already-processed
    /// rather than failures.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation(msg) if msg.starts_with("unique"))
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("requested entity not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::ConstraintViolation(format!("unique constraint violation: {}", db_err))
            },
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                Self::ConstraintViolation(format!("foreign key constraint violation: {}", db_err))
            },
            sqlx::Error::Database(db_err) if db_err.is_check_violation() => {
                Self::ConstraintViolation(format!("check constraint violation: {}", db_err))
            },
            _ => Self::Database(err.to_string()),
        }
    }
}

/// Platform error types with stable codes.
#[derive(Debug, Error)]
pub enum DukaError {
    // Request errors (E1001-E1003)
    /// Provider signature validation failed (E1001).
    #[error("[E1001] Invalid signature: provider signature validation failed")]
    InvalidSignature,

    /// Payload could not be parsed or is missing required fields (E1002).
    #[error("[E1002] Malformed payload: {detail}")]
    MalformedPayload {
        /// What was wrong with the payload.
        detail: String,
    },

    /// Webhook path named a provider we do not integrate with (E1003).
    #[error("[E1003] Unknown provider: {name}")]
    UnknownProvider {
        /// The provider segment as received.
        name: String,
    },

    // Idempotency errors (E1101-E1103)
    /// Delivery already recorded for this provider event (E1101).
    ///
    /// Not an error to the caller: duplicate deliveries are acknowledged as
    /// successful no-ops.
    #[error("[E1101] Duplicate delivery: {provider} event {event_id} already processed")]
    DuplicateDelivery {
        /// Provider that delivered the event.
        provider: PaymentProvider,
        /// The provider's own event identifier.
        event_id: String,
    },

    /// Duplicate request arrived while the original is still in flight (E1102).
    #[error("[E1102] Concurrent conflict: key {key} is being processed")]
    ConcurrentConflict {
        /// The contended idempotency key.
        key: String,
    },

    /// Financial mutation submitted without an idempotency key (E1103).
    ///
    /// The server never invents a key for payment mutations.
    #[error("[E1103] Missing idempotency key on financial mutation")]
    MissingIdempotencyKey,

    // Tenant errors (E2001-E2002)
    /// No tenant could be determined for a non-public path (E2001).
    #[error("[E2001] Tenant unresolved: no tenant header or recognizable subdomain")]
    TenantUnresolved,

    /// Tenant resolved but inactive or unknown (E2002).
    #[error("[E2002] Tenant forbidden")]
    TenantForbidden,

    // Infrastructure errors (E3001-E3002)
    /// Idempotency store unreachable (E3001).
    ///
    /// Fatal for payment-mutating operations, which fail closed.
    #[error("[E3001] Idempotency store unavailable: {detail}")]
    StoreUnavailable {
        /// Underlying store failure.
        detail: String,
    },

    /// PostgreSQL connection failed (E3002).
    #[error("[E3002] Database unavailable")]
    DatabaseUnavailable,

    /// Generic database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Generic error for wrapping other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DukaError {
    /// Returns the stable error code (E1001-E3002).
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidSignature => "E1001",
            Self::MalformedPayload { .. } => "E1002",
            Self::UnknownProvider { .. } => "E1003",
            Self::DuplicateDelivery { .. } => "E1101",
            Self::ConcurrentConflict { .. } => "E1102",
            Self::MissingIdempotencyKey => "E1103",
            Self::TenantUnresolved => "E2001",
            Self::TenantForbidden => "E2002",
            Self::StoreUnavailable { .. } => "E3001",
            Self::DatabaseUnavailable => "E3002",
            Self::Database(_) | Self::Other(_) => "E9999",
        }
    }

    /// Returns whether a caller should retry after this error.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrentConflict { .. }
                | Self::StoreUnavailable { .. }
                | Self::DatabaseUnavailable
        )
    }
}

impl From<CoreError> for DukaError {
    fn from(err: CoreError) -> Self {
        Self::Other(anyhow::anyhow!(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(DukaError::InvalidSignature.code(), "E1001");
        assert_eq!(
            DukaError::MalformedPayload { detail: "empty body".into() }.code(),
            "E1002"
        );
        assert_eq!(
            DukaError::DuplicateDelivery {
                provider: PaymentProvider::Mpesa,
                event_id: "ABC123".into()
            }
            .code(),
            "E1101"
        );
        assert_eq!(DukaError::ConcurrentConflict { key: "k".into() }.code(), "E1102");
        assert_eq!(DukaError::MissingIdempotencyKey.code(), "E1103");
        assert_eq!(DukaError::TenantUnresolved.code(), "E2001");
        assert_eq!(DukaError::TenantForbidden.code(), "E2002");
        assert_eq!(
            DukaError::StoreUnavailable { detail: "connection refused".into() }.code(),
            "E3001"
        );
    }

    #[test]
    fn retryable_errors_identified() {
        assert!(DukaError::ConcurrentConflict { key: "k".into() }.is_retryable());
        assert!(DukaError::StoreUnavailable { detail: "down".into() }.is_retryable());
        assert!(DukaError::DatabaseUnavailable.is_retryable());
        assert!(!DukaError::InvalidSignature.is_retryable());
        assert!(!DukaError::TenantUnresolved.is_retryable());
        assert!(!DukaError::MissingIdempotencyKey.is_retryable());
    }

    #[test]
    fn unique_violations_classified() {
        let err = CoreError::ConstraintViolation("unique constraint violation: dup".into());
        assert!(err.is_unique_violation());

        let err = CoreError::ConstraintViolation("foreign key constraint violation: x".into());
        assert!(!err.is_unique_violation());

        let err = CoreError::Database("timeout".into());
        assert!(!err.is_unique_violation());
    }
}
