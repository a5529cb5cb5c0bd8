// crates/trunkline-core/src/core/event.rs
// ============================================================================
// Module: Trunkline Call Events
// Description: Append-only audit of webhooks applied to a session.
// Purpose: Record every inbound lifecycle event and its processing outcome.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Call events are the append-only audit trail of the webhook pipeline: one
//! row per applied webhook, owned exclusively by the session it touched.
//! Rows are never updated or deleted by the engine.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::EventId;
use crate::core::identifiers::SessionToken;
use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Webhook Kind
// ============================================================================

/// The carrier webhook types the pipeline ingests.
///
/// # Invariants
/// - Wire labels are stable and appear inside idempotency keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookKind {
    /// Initial call setup request expecting a CCML response.
    ApplicationRequest,
    /// Mid-call lifecycle status update.
    SessionUpdate,
    /// Terminal CDR finalization callback.
    CdrCallback,
}

impl WebhookKind {
    /// Returns the stable label used in idempotency keys and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ApplicationRequest => "application_request",
            Self::SessionUpdate => "session_update",
            Self::CdrCallback => "cdr_callback",
        }
    }
}

// ============================================================================
// SECTION: Processing Outcome
// ============================================================================

/// How the pipeline disposed of a webhook.
///
/// # Invariants
/// - Variants are stable for audit queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingOutcome {
    /// The webhook was applied.
    Applied,
    /// The webhook was a duplicate and skipped.
    Duplicate,
    /// The webhook mapped to an illegal transition and was dropped.
    RejectedTransition,
    /// The webhook failed validation.
    RejectedValidation,
    /// Processing failed; the event stays retryable.
    Errored,
}

// ============================================================================
// SECTION: Call Event
// ============================================================================

/// One webhook applied to (or rejected for) a session.
///
/// # Invariants
/// - Owned exclusively by the session named by `token`.
/// - `payload` and `headers` are stored as received, after secret redaction
///   at the transport boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEvent {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Session the event belongs to.
    pub token: SessionToken,
    /// Event identifier (carrier-supplied or derived).
    pub event_id: EventId,
    /// Webhook kind.
    pub kind: WebhookKind,
    /// Inbound payload as received.
    pub payload: serde_json::Value,
    /// Relevant request headers, lowercased names.
    pub headers: BTreeMap<String, String>,
    /// When the webhook was observed.
    pub occurred_at: Timestamp,
    /// Processing outcome.
    pub outcome: ProcessingOutcome,
}
