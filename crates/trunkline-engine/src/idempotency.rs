// crates/trunkline-engine/src/idempotency.rs
// ============================================================================
// Module: Idempotency Ledger
// Description: Deduplication keys with TTL and in-progress sentinels.
// Purpose: Turn at-least-once webhook delivery into at-most-once effects.
// Dependencies: trunkline-core, trunkline-store
// ============================================================================

//! ## Overview
//! Every webhook event claims a ledger key before its side effects run. A
//! present key means the event was seen: the work is skipped. A successful
//! run marks the key `completed`; a failed (or cancelled) run deletes the
//! key so the carrier's retry gets a fresh attempt. The claim itself is a
//! set-if-absent, so two concurrent deliveries of one event admit exactly
//! one worker.
//!
//! When the store is down the ledger degrades to best effort: the event
//! runs undeduplicated and the outage is logged at error level, because a
//! dropped call is worse than a double-processed status.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use trunkline_core::EventId;
use trunkline_core::HashError;
use trunkline_core::SessionToken;
use trunkline_core::TenantId;
use trunkline_core::WebhookKind;
use trunkline_core::hash_canonical_json;
use trunkline_store::CoordinationStore;
use trunkline_store::StoreError;

use crate::keys;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Ledger entry TTL.
pub const LEDGER_TTL: Duration = Duration::from_secs(24 * 60 * 60);

// ============================================================================
// SECTION: Ledger States
// ============================================================================

/// Ledger entry value.
///
/// # Invariants
/// - Wire labels are stable; dashboards read them raw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerState {
    /// A worker claimed the event and is still running.
    InProgress,
    /// The event's side effects committed.
    Completed,
}

impl LedgerState {
    /// Returns the stored label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
        }
    }
}

/// Outcome of [`IdempotencyLedger::execute_once`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome<T> {
    /// The event ran; the inner value is the work's result.
    Executed(T),
    /// The event was already claimed or completed; nothing ran.
    Skipped,
}

// ============================================================================
// SECTION: Event Id Derivation
// ============================================================================

/// Derives an event id when the carrier supplies none.
///
/// The id is the SHA-256 of the canonical JSON of an event-kind-specific
/// field subset; identical payloads across retries derive identical ids.
///
/// # Errors
///
/// Returns [`HashError`] when the subset cannot be serialized.
pub fn derive_event_id<T: Serialize>(
    kind: WebhookKind,
    token: &SessionToken,
    subset: &T,
) -> Result<EventId, HashError> {
    #[derive(Serialize)]
    struct Fingerprint<'payload, T> {
        /// Event kind label.
        kind: &'static str,
        /// Session token.
        token: &'payload str,
        /// Kind-specific field subset.
        subset: &'payload T,
    }
    let digest = hash_canonical_json(&Fingerprint {
        kind: kind.as_str(),
        token: token.as_str(),
        subset,
    })?;
    Ok(EventId::new(digest))
}

// ============================================================================
// SECTION: Ledger
// ============================================================================

/// Webhook deduplication ledger over the coordination store.
#[derive(Clone)]
pub struct IdempotencyLedger {
    /// Shared coordination store.
    store: Arc<dyn CoordinationStore>,
    /// Entry TTL.
    ttl: Duration,
}

impl IdempotencyLedger {
    /// Creates a ledger with the default 24 h TTL.
    #[must_use]
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self {
            store,
            ttl: LEDGER_TTL,
        }
    }

    /// Creates a ledger with an explicit TTL (tests shorten it).
    #[must_use]
    pub fn with_ttl(store: Arc<dyn CoordinationStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
        }
    }

    /// Builds the ledger key for one event.
    #[must_use]
    pub fn key(
        &self,
        tenant_id: TenantId,
        kind: WebhookKind,
        token: &SessionToken,
        event_id: &EventId,
    ) -> String {
        keys::idempotency(tenant_id, kind, token, event_id)
    }

    /// Returns true when the event was already seen.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store fails.
    pub fn is_processed(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.store.get(key)?.is_some())
    }

    /// Writes a ledger state with the configured TTL.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store fails.
    pub fn mark(&self, key: &str, state: LedgerState) -> Result<(), StoreError> {
        self.store.set(key, state.as_str(), Some(self.ttl))
    }

    /// Runs `work` at most once for the event behind `key`.
    ///
    /// On success the key is marked `completed`. On failure the key is
    /// deleted so the event stays retryable — the same cleanup a cancelled
    /// request performs. A store outage degrades to running the work
    /// undeduplicated.
    ///
    /// # Errors
    ///
    /// Propagates the error `work` returned; ledger bookkeeping failures are
    /// logged, never surfaced.
    pub fn execute_once<T, E>(
        &self,
        key: &str,
        work: impl FnOnce() -> Result<T, E>,
    ) -> Result<ExecutionOutcome<T>, E> {
        let claimed =
            match self.store.set_if_absent(key, LedgerState::InProgress.as_str(), Some(self.ttl)) {
                Ok(claimed) => claimed,
                Err(error) => {
                    tracing::error!(key, %error, "idempotency store unavailable, degrading");
                    // Best effort: run undeduplicated rather than drop the call.
                    return work().map(ExecutionOutcome::Executed);
                }
            };
        if !claimed {
            tracing::debug!(key, "duplicate webhook event skipped");
            return Ok(ExecutionOutcome::Skipped);
        }
        match work() {
            Ok(value) => {
                if let Err(error) = self.mark(key, LedgerState::Completed) {
                    tracing::warn!(key, %error, "failed to mark event completed");
                }
                Ok(ExecutionOutcome::Executed(value))
            }
            Err(error) => {
                if let Err(store_error) = self.store.delete(key) {
                    tracing::warn!(key, %store_error, "failed to release failed event key");
                }
                Err(error)
            }
        }
    }
}
