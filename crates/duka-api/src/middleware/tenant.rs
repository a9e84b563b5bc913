//! Tenant resolution middleware.
//!
//! Runs before route dispatch on every request. Resolution order is
//! canonical: the explicit `X-Tenant-ID` header wins; otherwise the Host
//! header is matched against `{slug}.{base_domain}`. Both inputs pass the
//! same strict format check before any database lookup, and a malformed
//! header does not fall back to the subdomain.
//!
//! Paths on the public allow-list (health probes, docs, global auth, and
//! provider webhook ingress, which authenticates by signature) proceed
//! without a tenant. Every other path without a resolved, active tenant
//! fails closed: 400 when no candidate could be determined, 403 when the
//! candidate does not resolve to an active tenant. Unknown and inactive
//! tenants are indistinguishable to the caller.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use duka_core::TenantId;
use uuid::Uuid;

use crate::{metrics, server::AppState};

/// Maximum accepted length of a tenant reference.
const MAX_TENANT_REF_LEN: usize = 64;

/// Paths that may proceed without a resolved tenant.
const PUBLIC_PATHS: &[&str] = &["/health", "/ready", "/live", "/docs", "/openapi.json"];

/// Path prefixes that may proceed without a resolved tenant.
const PUBLIC_PREFIXES: &[&str] = &["/webhooks/", "/auth/"];

/// Resolved tenant, attached to the request for downstream handlers.
#[derive(Debug, Clone, Copy)]
pub struct TenantContext {
    /// The tenant every data access in this request is scoped to.
    pub tenant_id: TenantId,
}

/// Returns whether a path is on the public allow-list.
pub fn is_public_endpoint(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path)
        || PUBLIC_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

/// Where the tenant candidate came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantCandidate {
    /// Explicit `X-Tenant-ID` header value.
    Header(String),
    /// Subdomain label from the Host header.
    Subdomain(String),
}

impl TenantCandidate {
    /// The raw candidate string.
    pub fn value(&self) -> &str {
        match self {
            Self::Header(v) | Self::Subdomain(v) => v,
        }
    }
}

/// Extracts the tenant candidate from request headers.
///
/// The explicit header wins even when a subdomain is also present.
pub fn extract_tenant(headers: &HeaderMap, base_domain: &str) -> Option<TenantCandidate> {
    if let Some(value) = headers.get("x-tenant-id").and_then(|v| v.to_str().ok()) {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return Some(TenantCandidate::Header(trimmed.to_string()));
        }
    }

    let host = headers.get("host").and_then(|v| v.to_str().ok())?;
    let host = host.split(':').next()?;
    let label = host.strip_suffix(base_domain)?.strip_suffix('.')?;

    // Only a first-level subdomain names a tenant.
    if label.is_empty() || label.contains('.') {
        return None;
    }

    Some(TenantCandidate::Subdomain(label.to_string()))
}

/// Cheap format check before any database lookup.
///
/// Accepts alphanumerics and hyphens up to 64 characters, which covers both
/// UUIDs and subdomain slugs. Anything else is rejected with a client error
/// without touching the database.
pub fn is_valid_tenant_ref(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate.len() <= MAX_TENANT_REF_LEN
        && candidate.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Errors surfaced by tenant resolution.
#[derive(Debug)]
pub enum TenantError {
    /// No tenant candidate on a non-public path (400).
    Unresolved,
    /// Candidate failed the format check (400).
    Malformed,
    /// Candidate does not resolve to an active tenant (403).
    Forbidden,
    /// Registry lookup failed (500).
    Database(String),
}

impl IntoResponse for TenantError {
    fn into_response(self) -> Response {
        use duka_core::DukaError;

        let (status, code, message) = match self {
            Self::Unresolved => (
                StatusCode::BAD_REQUEST,
                DukaError::TenantUnresolved.code(),
                "tenant required: send X-Tenant-ID or use your storefront subdomain",
            ),
            Self::Malformed => (
                StatusCode::BAD_REQUEST,
                DukaError::TenantUnresolved.code(),
                "tenant identifier is malformed",
            ),
            Self::Forbidden => {
                (StatusCode::FORBIDDEN, DukaError::TenantForbidden.code(), "tenant forbidden")
            },
            Self::Database(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "E9999", "internal error")
            },
        };

        let body = Json(serde_json::json!({
            "error": {"code": code, "message": message}
        }));

        (status, body).into_response()
    }
}

/// Axum middleware that resolves the tenant for every request.
pub async fn tenant_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, TenantError> {
    if is_public_endpoint(req.uri().path()) {
        return Ok(next.run(req).await);
    }

    let candidate = match extract_tenant(req.headers(), &state.config.base_domain) {
        Some(candidate) => candidate,
        None => {
            metrics::tenant_rejected("unresolved");
            return Err(TenantError::Unresolved);
        },
    };

    if !is_valid_tenant_ref(candidate.value()) {
        metrics::tenant_rejected("malformed");
        return Err(TenantError::Malformed);
    }

    let tenant = match Uuid::parse_str(candidate.value()) {
        Ok(id) => state.storage.tenants.find_by_id(TenantId(id)).await,
        Err(_) => state.storage.tenants.find_by_slug(candidate.value()).await,
    }
    .map_err(|e| TenantError::Database(e.to_string()))?;

    let tenant = match tenant {
        Some(tenant) if tenant.is_active => tenant,
        _ => {
            metrics::tenant_rejected("forbidden");
            return Err(TenantError::Forbidden);
        },
    };

    req.extensions_mut().insert(TenantContext { tenant_id: tenant.id });

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    const BASE: &str = "duka.local";

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn header_wins_over_subdomain() {
        let headers = headers(&[
            ("x-tenant-id", "mama-mboga"),
            ("host", "other-shop.duka.local"),
        ]);

        let candidate = extract_tenant(&headers, BASE).unwrap();
        assert_eq!(candidate, TenantCandidate::Header("mama-mboga".to_string()));
    }

    #[test]
    fn subdomain_used_when_header_absent() {
        let headers = headers(&[("host", "mama-mboga.duka.local")]);
        let candidate = extract_tenant(&headers, BASE).unwrap();
        assert_eq!(candidate, TenantCandidate::Subdomain("mama-mboga".to_string()));
    }

    #[test]
    fn host_port_is_ignored() {
        let headers = headers(&[("host", "mama-mboga.duka.local:8080")]);
        let candidate = extract_tenant(&headers, BASE).unwrap();
        assert_eq!(candidate.value(), "mama-mboga");
    }

    #[test]
    fn bare_base_domain_is_no_candidate() {
        let headers = headers(&[("host", "duka.local")]);
        assert!(extract_tenant(&headers, BASE).is_none());
    }

    #[test]
    fn nested_subdomains_are_no_candidate() {
        let headers = headers(&[("host", "a.b.duka.local")]);
        assert!(extract_tenant(&headers, BASE).is_none());
    }

    #[test]
    fn unrelated_host_is_no_candidate() {
        let headers = headers(&[("host", "shop.elsewhere.example")]);
        assert!(extract_tenant(&headers, BASE).is_none());
    }

    #[test]
    fn blank_header_falls_through_to_subdomain() {
        let headers = headers(&[("x-tenant-id", "  "), ("host", "mama-mboga.duka.local")]);
        let candidate = extract_tenant(&headers, BASE).unwrap();
        assert_eq!(candidate, TenantCandidate::Subdomain("mama-mboga".to_string()));
    }

    #[test]
    fn tenant_ref_format_rules() {
        assert!(is_valid_tenant_ref("mama-mboga"));
        assert!(is_valid_tenant_ref("3f2b8c9e-8a15-4c2e-9d5f-0a1b2c3d4e5f"));
        assert!(is_valid_tenant_ref("shop42"));

        assert!(!is_valid_tenant_ref(""));
        assert!(!is_valid_tenant_ref("shop_42"));
        assert!(!is_valid_tenant_ref("shop.42"));
        assert!(!is_valid_tenant_ref("shop 42"));
        assert!(!is_valid_tenant_ref("'; DROP TABLE tenants; --"));
        assert!(!is_valid_tenant_ref(&"a".repeat(MAX_TENANT_REF_LEN + 1)));
    }

    #[test]
    fn public_allow_list() {
        assert!(is_public_endpoint("/health"));
        assert!(is_public_endpoint("/ready"));
        assert!(is_public_endpoint("/live"));
        assert!(is_public_endpoint("/webhooks/mpesa"));
        assert!(is_public_endpoint("/auth/token"));

        assert!(!is_public_endpoint("/orders"));
        assert!(!is_public_endpoint("/payments/charge"));
        assert!(!is_public_endpoint("/"));
        // Allow-listing is exact or prefix-based, never substring-based.
        assert!(!is_public_endpoint("/orders/health"));
    }
}
