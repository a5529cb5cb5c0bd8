// crates/trunkline-core/src/core/record.rs
// ============================================================================
// Module: Trunkline Call Records
// Description: Finalized call detail records and the disposition mapping.
// Purpose: Capture the carrier's final classification of every call.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A call record is emitted once a session reaches a terminal state, keyed
//! by (tenant, call id) and upserted so carrier retries converge on one row.
//! The disposition mapping is case-insensitive and fails closed: anything
//! unrecognized is stored as `FAILED`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::CallSid;
use crate::core::identifiers::SessionToken;
use crate::core::identifiers::TenantId;
use crate::core::session::CallDirection;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Disposition
// ============================================================================

/// Stored disposition of a finished call.
///
/// # Invariants
/// - Wire labels are the uppercase strings the analytics layer expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Disposition {
    /// The call was answered.
    Answer,
    /// The target was busy.
    Busy,
    /// The caller cancelled before answer.
    Cancel,
    /// The carrier reported congestion.
    Congestion,
    /// The target never answered.
    Noanswer,
    /// The call failed.
    Failed,
}

impl Disposition {
    /// Maps a carrier disposition string, case-insensitively.
    ///
    /// `CONNECTED`, `ANSWERED`, and `ANSWER` converge on [`Self::Answer`];
    /// both `NOANSWER` and `NO ANSWER` converge on [`Self::Noanswer`];
    /// anything unrecognized maps to [`Self::Failed`].
    #[must_use]
    pub fn from_carrier(label: &str) -> Self {
        match label.to_ascii_uppercase().as_str() {
            "CONNECTED" | "ANSWERED" | "ANSWER" => Self::Answer,
            "BUSY" => Self::Busy,
            "CANCEL" => Self::Cancel,
            "CONGESTION" => Self::Congestion,
            "NOANSWER" | "NO ANSWER" => Self::Noanswer,
            _ => Self::Failed,
        }
    }

    /// Returns the stored uppercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Answer => "ANSWER",
            Self::Busy => "BUSY",
            Self::Cancel => "CANCEL",
            Self::Congestion => "CONGESTION",
            Self::Noanswer => "NOANSWER",
            Self::Failed => "FAILED",
        }
    }
}

// ============================================================================
// SECTION: Call Record
// ============================================================================

/// Finalized call detail record.
///
/// # Invariants
/// - Keyed by (tenant, call id); repeated CDR webhooks upsert the same row.
/// - `raw_payload` stores the carrier payload verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Carrier call identifier (upsert key with tenant).
    pub call_sid: CallSid,
    /// Session token shared with the session row.
    pub token: SessionToken,
    /// Calling party number.
    pub from_number: String,
    /// Called party number.
    pub to_number: String,
    /// Call direction, when the carrier reported one.
    pub direction: Option<CallDirection>,
    /// Stored disposition.
    pub disposition: Disposition,
    /// When the call started.
    pub started_at: Option<Timestamp>,
    /// When the call was answered.
    pub answered_at: Option<Timestamp>,
    /// When the call ended.
    pub ended_at: Option<Timestamp>,
    /// Billable seconds reported by the carrier.
    pub billed_seconds: u64,
    /// Carrier payload stored verbatim.
    pub raw_payload: serde_json::Value,
}
