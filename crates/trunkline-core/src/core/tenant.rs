// crates/trunkline-core/src/core/tenant.rs
// ============================================================================
// Module: Trunkline Tenant
// Description: Tenant entity, the isolation boundary for all other entities.
// Purpose: Carry tenant identity plus the webhook authentication material.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A tenant owns every other entity transitively. Webhook requests identify
//! the tenant by its carrier domain and must present the tenant's API key;
//! both live here so the auth layer has a single lookup.
//!
//! Security posture: `api_key` is a shared secret and must never appear in
//! logs or error messages.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::TenantId;

// ============================================================================
// SECTION: Tenant
// ============================================================================

/// An isolation boundary for routing configuration and call state.
///
/// # Invariants
/// - `domain` is unique across tenants; it is the `{domain}` webhook path segment.
/// - `api_key` is compared in fixed time at the auth boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    /// Tenant identifier.
    pub id: TenantId,
    /// Carrier domain identifying this tenant on webhook paths.
    pub domain: String,
    /// Shared secret expected in the `X-CX-APIKey` header.
    pub api_key: String,
    /// Whether the tenant accepts traffic.
    pub enabled: bool,
}
