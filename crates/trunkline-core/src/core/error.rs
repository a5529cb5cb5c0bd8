// crates/trunkline-core/src/core/error.rs
// ============================================================================
// Module: Trunkline Error Taxonomy
// Description: Engine-wide error kinds and the cross-layer classification trait.
// Purpose: Classify failures by recovery policy rather than by type name.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Every fallible surface in the engine maps its errors onto a small, stable
//! set of kinds. The kind, not the concrete type, decides the recovery
//! policy: validation and isolation failures are rejected and never retried,
//! invalid transitions are logged and dropped, store outages degrade, and
//! internal failures stay retryable through the idempotency ledger.
//!
//! Handlers never propagate a raw error to the carrier; the webhook layer
//! converts every kind into a well-formed response.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::identifiers::TenantId;

// ============================================================================
// SECTION: Error Kinds
// ============================================================================

/// Stable failure classification shared by every engine layer.
///
/// # Invariants
/// - Variants are stable for programmatic handling and telemetry labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or out-of-range input; rejected, never retried.
    Validation,
    /// Cross-tenant access attempt; rejected, never retried.
    TenantIsolation,
    /// Referenced entity does not exist; rejected, never retried.
    NotFound,
    /// Illegal state-machine transition; logged and dropped, never retried.
    InvalidTransition,
    /// Shared store unreachable; callers degrade and the event stays retryable.
    StoreUnavailable,
    /// Unclassified engine failure; retryable via idempotency-key deletion.
    Internal,
}

impl ErrorKind {
    /// Returns a stable label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::TenantIsolation => "tenant_isolation",
            Self::NotFound => "not_found",
            Self::InvalidTransition => "invalid_transition",
            Self::StoreUnavailable => "store_unavailable",
            Self::Internal => "internal",
        }
    }

    /// Returns true when a retry of the same event may succeed.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::StoreUnavailable | Self::Internal)
    }
}

/// Classifies an error into an [`ErrorKind`].
pub trait Classify {
    /// Returns the failure kind for recovery-policy decisions.
    fn kind(&self) -> ErrorKind;
}

// ============================================================================
// SECTION: Engine Error
// ============================================================================

/// Top-level engine error used at layer boundaries.
///
/// # Invariants
/// - Messages never embed credentials or raw webhook payloads.
#[derive(Debug, Error, Clone)]
pub enum EngineError {
    /// Input failed validation.
    #[error("validation failed: {0}")]
    Validation(String),
    /// An entity was accessed across tenant boundaries.
    #[error("tenant isolation violated: expected tenant {expected}, found {found}")]
    TenantIsolation {
        /// Tenant the caller is operating as.
        expected: TenantId,
        /// Tenant that owns the entity.
        found: TenantId,
    },
    /// A referenced entity does not exist within the tenant.
    #[error("not found: {0}")]
    NotFound(String),
    /// A state-machine transition was rejected.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    /// The shared coordination store is unavailable.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    /// Unclassified internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Classify for EngineError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::TenantIsolation { .. } => ErrorKind::TenantIsolation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidTransition(_) => ErrorKind::InvalidTransition,
            Self::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

// ============================================================================
// SECTION: Tenant Guard
// ============================================================================

/// Asserts that an entity belongs to the expected tenant.
///
/// # Errors
///
/// Returns [`EngineError::TenantIsolation`] when the tenants differ.
pub fn ensure_tenant(expected: TenantId, found: TenantId) -> Result<(), EngineError> {
    if expected == found {
        Ok(())
    } else {
        Err(EngineError::TenantIsolation {
            expected,
            found,
        })
    }
}
