// crates/trunkline-core/src/core/session.rs
// ============================================================================
// Module: Trunkline Call Sessions
// Description: Call session entity, call states, and the carrier status mapping.
// Purpose: Capture the authoritative lifecycle of every call.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A call session is the root entity of call lifecycle: created on the first
//! webhook for a token, mutated only through state-machine transitions, and
//! never deleted by the engine. The carrier status mapping in this module is
//! the single authority; test suites assert it row by row.
//!
//! One mapping row is deliberately surprising and must not be "fixed": the
//! carrier's `connected` maps to [`CallState::Connecting`] while `answer`
//! maps to [`CallState::Connected`]. Changing it would silently alter
//! recorded durations.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::AgentId;
use crate::core::identifiers::CallSid;
use crate::core::identifiers::GroupId;
use crate::core::identifiers::SessionToken;
use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Call State
// ============================================================================

/// Lifecycle state of a call session.
///
/// # Invariants
/// - Wire labels are stable snake_case strings.
/// - Terminal states admit no further transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    /// First webhook observed; session row exists.
    Received,
    /// Accepted for routing.
    Queued,
    /// Routing decision in progress.
    Routing,
    /// Carrier is bridging toward the target.
    Connecting,
    /// Media is flowing; the call was answered.
    Connected,
    /// Terminal: the call finished normally.
    Completed,
    /// Terminal: the target was busy.
    Busy,
    /// Terminal: the call failed.
    Failed,
    /// Terminal: the target never answered.
    NoAnswer,
}

impl CallState {
    /// Initial state for a freshly created session.
    pub const INITIAL: Self = Self::Received;

    /// Returns the stable wire label for the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Queued => "queued",
            Self::Routing => "routing",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Completed => "completed",
            Self::Busy => "busy",
            Self::Failed => "failed",
            Self::NoAnswer => "no_answer",
        }
    }

    /// Returns true for states that admit no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Busy | Self::Failed | Self::NoAnswer)
    }

    /// Returns true when `self -> to` is a legal transition.
    ///
    /// The table is closed; everything not listed is illegal, and terminal
    /// states admit nothing.
    #[must_use]
    pub const fn may_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Received, Self::Queued)
                | (Self::Queued, Self::Routing | Self::Failed)
                | (Self::Routing, Self::Connecting | Self::Failed | Self::NoAnswer)
                | (
                    Self::Connecting,
                    Self::Connected | Self::Busy | Self::Failed | Self::NoAnswer
                )
                | (Self::Connected, Self::Completed | Self::Failed)
        )
    }
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Carrier Status Mapping
// ============================================================================

/// Recognized carrier-reported lifecycle statuses.
///
/// # Invariants
/// - Parsing is case-insensitive; `answer` and `answered` are synonyms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CarrierStatus {
    /// Far end is ringing.
    Ringing,
    /// Carrier-side "connected" (maps to [`CallState::Connecting`], verbatim).
    Connected,
    /// Carrier is processing the call setup.
    Processing,
    /// The call was answered.
    Answer,
    /// The target never answered.
    NoAnswer,
    /// The target was busy.
    Busy,
    /// The account ran out of credit.
    NoCredit,
    /// The caller cancelled before answer.
    Cancel,
    /// The call was handed to an external leg.
    External,
    /// Carrier-side error.
    Error,
    /// The call finished normally.
    Completed,
    /// The call failed.
    Failed,
}

impl CarrierStatus {
    /// Parses a carrier status label, case-insensitively.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "ringing" => Some(Self::Ringing),
            "connected" => Some(Self::Connected),
            "processing" => Some(Self::Processing),
            "answer" | "answered" => Some(Self::Answer),
            "noanswer" => Some(Self::NoAnswer),
            "busy" => Some(Self::Busy),
            "nocredit" => Some(Self::NoCredit),
            "cancel" => Some(Self::Cancel),
            "external" => Some(Self::External),
            "error" => Some(Self::Error),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns the call state this status projects to.
    #[must_use]
    pub const fn target_state(self) -> CallState {
        match self {
            Self::Ringing | Self::Connected | Self::External => CallState::Connecting,
            Self::Processing => CallState::Routing,
            Self::Answer => CallState::Connected,
            Self::NoAnswer => CallState::NoAnswer,
            Self::Busy => CallState::Busy,
            Self::NoCredit | Self::Cancel | Self::Error | Self::Failed => CallState::Failed,
            Self::Completed => CallState::Completed,
        }
    }
}

/// Projects a free-form carrier status onto a call state.
///
/// Unrecognized statuses map to [`CallState::Connecting`], a non-terminal
/// safe default, so the session stays observable while engineers triage.
#[must_use]
pub fn map_carrier_status(label: &str) -> CallState {
    CarrierStatus::parse(label).map_or(CallState::Connecting, CarrierStatus::target_state)
}

// ============================================================================
// SECTION: Direction
// ============================================================================

/// Direction of a call as reported by the carrier.
///
/// # Invariants
/// - Wire labels mirror the carrier's `Direction` field values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallDirection {
    /// Call arriving from the PSTN or a subscriber toward the tenant.
    #[serde(rename = "inbound")]
    Inbound,
    /// Call originated through the carrier's API.
    #[serde(rename = "outbound-api")]
    OutboundApi,
    /// Call originated by a registered subscriber device.
    #[serde(rename = "subscriber")]
    Subscriber,
}

impl CallDirection {
    /// Parses a carrier direction label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "inbound" => Some(Self::Inbound),
            "outbound-api" => Some(Self::OutboundApi),
            "subscriber" => Some(Self::Subscriber),
            _ => None,
        }
    }

    /// Returns the stable wire label for the direction.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::OutboundApi => "outbound-api",
            Self::Subscriber => "subscriber",
        }
    }
}

// ============================================================================
// SECTION: History
// ============================================================================

/// One committed state transition.
///
/// # Invariants
/// - `(from, to)` was legal at commit time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// State before the transition.
    pub from: CallState,
    /// State after the transition.
    pub to: CallState,
    /// Commit time.
    pub at: Timestamp,
    /// Caller-supplied transition metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

// ============================================================================
// SECTION: Call Session
// ============================================================================

/// The root entity of call lifecycle.
///
/// # Invariants
/// - `state` equals the last history entry's `to` (or the initial state when
///   the history is empty).
/// - Mutation happens only through the state machine.
/// - Sessions are never deleted by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSession {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Carrier-issued session token; the idempotency key for updates.
    pub token: SessionToken,
    /// Carrier call identifier.
    pub call_sid: CallSid,
    /// Call direction.
    pub direction: CallDirection,
    /// Calling party number.
    pub caller_id: String,
    /// Called party number.
    pub destination: String,
    /// Current lifecycle state.
    pub state: CallState,
    /// When the first webhook was observed.
    pub received_at: Timestamp,
    /// When the call was answered, if it was.
    pub answered_at: Option<Timestamp>,
    /// When the call reached a terminal state, if it has.
    pub ended_at: Option<Timestamp>,
    /// Billable duration in whole seconds, when derivable.
    pub duration_secs: Option<u64>,
    /// Agent selected by the routing decision, if any.
    pub assigned_agent: Option<AgentId>,
    /// Group that produced the selected agent, if any.
    pub assigned_group: Option<GroupId>,
    /// Committed transition history, oldest first.
    pub history: Vec<HistoryEntry>,
    /// Free-form metadata accumulated from webhooks.
    pub metadata: serde_json::Value,
}

impl CallSession {
    /// Opens a fresh session in the initial state.
    #[must_use]
    pub fn open(
        tenant_id: TenantId,
        token: SessionToken,
        call_sid: CallSid,
        direction: CallDirection,
        caller_id: impl Into<String>,
        destination: impl Into<String>,
        received_at: Timestamp,
    ) -> Self {
        Self {
            tenant_id,
            token,
            call_sid,
            direction,
            caller_id: caller_id.into(),
            destination: destination.into(),
            state: CallState::INITIAL,
            received_at,
            answered_at: None,
            ended_at: None,
            duration_secs: None,
            assigned_agent: None,
            assigned_group: None,
            history: Vec::new(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Merges webhook metadata into the session, object keys last-writer-wins.
    pub fn merge_metadata(&mut self, incoming: serde_json::Value) {
        match (&mut self.metadata, incoming) {
            (serde_json::Value::Object(existing), serde_json::Value::Object(update)) => {
                for (key, value) in update {
                    existing.insert(key, value);
                }
            }
            (slot, incoming) => {
                if !incoming.is_null() {
                    *slot = incoming;
                }
            }
        }
    }
}
