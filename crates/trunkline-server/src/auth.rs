// crates/trunkline-server/src/auth.rs
// ============================================================================
// Module: Webhook Authentication
// Description: Carrier header validation and tenant resolution.
// Purpose: Fail closed before any payload is interpreted.
// Dependencies: trunkline-core
// ============================================================================

//! ## Overview
//! Every webhook arrives on a `{domain}` path and must present the tenant's
//! shared secret in `X-CX-APIKey` plus a matching `X-CX-Domain` header. The
//! checks fail closed: missing context denies, an unknown domain denies, and
//! the key comparison runs in constant time so the comparison itself leaks
//! nothing about the stored secret.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use subtle::ConstantTimeEq;
use thiserror::Error;
use trunkline_core::Tenant;
use trunkline_core::TenantDirectory;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Shared-secret header name (compared lowercased).
pub const API_KEY_HEADER: &str = "x-cx-apikey";
/// Domain echo header name (compared lowercased).
pub const DOMAIN_HEADER: &str = "x-cx-domain";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Authentication failure.
///
/// # Invariants
/// - Messages never embed the presented or stored key material.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// A required header is missing.
    #[error("missing header {0}")]
    MissingHeader(&'static str),
    /// The path domain is not a known tenant.
    #[error("unknown domain {0}")]
    UnknownDomain(String),
    /// The domain header disagrees with the path.
    #[error("domain header does not match the request path")]
    DomainMismatch,
    /// The presented key does not match the tenant's secret.
    #[error("api key rejected")]
    InvalidKey,
    /// The tenant exists but is disabled.
    #[error("tenant is disabled")]
    TenantDisabled,
    /// The tenant directory failed.
    #[error("tenant directory unavailable: {0}")]
    DirectoryUnavailable(String),
}

// ============================================================================
// SECTION: Authentication
// ============================================================================

/// Resolves and authorizes the tenant for one webhook.
///
/// # Errors
///
/// Returns [`AuthError`] on any missing or mismatched context; callers
/// respond with a clean close, never a diagnostic.
pub fn authenticate(
    tenants: &dyn TenantDirectory,
    path_domain: &str,
    headers: &BTreeMap<String, String>,
) -> Result<Tenant, AuthError> {
    let api_key = headers
        .get(API_KEY_HEADER)
        .ok_or(AuthError::MissingHeader("X-CX-APIKey"))?;
    let header_domain = headers
        .get(DOMAIN_HEADER)
        .ok_or(AuthError::MissingHeader("X-CX-Domain"))?;
    if header_domain != path_domain {
        return Err(AuthError::DomainMismatch);
    }
    let tenant = tenants
        .tenant_by_domain(path_domain)
        .map_err(|err| AuthError::DirectoryUnavailable(err.to_string()))?
        .ok_or_else(|| AuthError::UnknownDomain(path_domain.to_string()))?;
    if !constant_time_eq(api_key.as_bytes(), tenant.api_key.as_bytes()) {
        return Err(AuthError::InvalidKey);
    }
    if !tenant.enabled {
        return Err(AuthError::TenantDisabled);
    }
    Ok(tenant)
}

/// Compares two byte slices in constant time.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
