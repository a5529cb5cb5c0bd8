// crates/trunkline-engine/src/cdr.rs
// ============================================================================
// Module: CDR Finalizer
// Description: Upsert of final call records from the terminal webhook.
// Purpose: Converge carrier CDR retries onto one stored record per call.
// Dependencies: trunkline-core
// ============================================================================

//! ## Overview
//! The CDR callback is the carrier's last word on a call. The finalizer maps
//! the reported disposition through the authoritative table, carries every
//! timing field it was given, stores the raw payload verbatim, and upserts
//! by (tenant, call id) so a retried callback overwrites rather than
//! duplicates.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use trunkline_core::CallRecord;
use trunkline_core::CallSid;
use trunkline_core::Disposition;
use trunkline_core::EngineError;
use trunkline_core::SessionRepository;
use trunkline_core::SessionToken;
use trunkline_core::TenantId;
use trunkline_core::Timestamp;
use trunkline_core::session::CallDirection;

// ============================================================================
// SECTION: Input
// ============================================================================

/// Parsed CDR fields handed over by the webhook pipeline.
///
/// # Invariants
/// - `raw_payload` is the carrier payload verbatim, untouched by parsing.
#[derive(Debug, Clone)]
pub struct CdrFinalization {
    /// Carrier call identifier (upsert key with tenant).
    pub call_sid: CallSid,
    /// Session token shared with the session row.
    pub token: SessionToken,
    /// Calling party number.
    pub from_number: String,
    /// Called party number.
    pub to_number: String,
    /// Carrier disposition label, unmapped.
    pub disposition: String,
    /// Carrier direction label, when present.
    pub direction: Option<String>,
    /// Billable seconds reported by the carrier.
    pub billed_seconds: u64,
    /// When the call started.
    pub started_at: Option<Timestamp>,
    /// When the call was answered.
    pub answered_at: Option<Timestamp>,
    /// When the call ended.
    pub ended_at: Option<Timestamp>,
    /// The carrier payload, verbatim.
    pub raw_payload: serde_json::Value,
}

// ============================================================================
// SECTION: Finalizer
// ============================================================================

/// Builds and upserts the final call record.
#[derive(Clone)]
pub struct CdrFinalizer {
    /// Durable persistence authority.
    repository: Arc<dyn SessionRepository>,
}

impl CdrFinalizer {
    /// Creates a finalizer over the repository.
    #[must_use]
    pub fn new(repository: Arc<dyn SessionRepository>) -> Self {
        Self {
            repository,
        }
    }

    /// Maps, builds, and upserts the record; returns the stored value.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when persistence fails.
    pub fn finalize(
        &self,
        tenant_id: TenantId,
        input: CdrFinalization,
    ) -> Result<CallRecord, EngineError> {
        let record = CallRecord {
            tenant_id,
            call_sid: input.call_sid,
            token: input.token,
            from_number: input.from_number,
            to_number: input.to_number,
            direction: input.direction.as_deref().and_then(CallDirection::parse),
            disposition: Disposition::from_carrier(&input.disposition),
            started_at: input.started_at,
            answered_at: input.answered_at,
            ended_at: input.ended_at,
            billed_seconds: input.billed_seconds,
            raw_payload: input.raw_payload,
        };
        self.repository.upsert_record(&record)?;
        tracing::debug!(
            tenant = %tenant_id,
            call = record.call_sid.as_str(),
            disposition = record.disposition.as_str(),
            "call record finalized"
        );
        Ok(record)
    }
}
