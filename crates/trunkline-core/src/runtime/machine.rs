// crates/trunkline-core/src/runtime/machine.rs
// ============================================================================
// Module: Trunkline State Machine
// Description: Validated call-state transitions with persisted history.
// Purpose: Commit atomic (state, history-append) updates or fail unchanged.
// Dependencies: crate::core, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! The state machine is the only legal mutator of a session's lifecycle.
//! [`transition`] either commits the new state together with its history
//! entry, or fails with [`TransitionError`] leaving the session untouched.
//! [`verify_integrity`] checks the standing invariant that the current state
//! equals the last history entry's target.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::error::Classify;
use crate::core::error::EngineError;
use crate::core::error::ErrorKind;
use crate::core::session::CallSession;
use crate::core::session::CallState;
use crate::core::session::HistoryEntry;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// State-machine transition failure.
///
/// # Invariants
/// - The session is unchanged whenever an error is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The requested transition is not in the legal table.
    #[error("illegal transition {from} -> {to} for session {token}")]
    Illegal {
        /// State the session is in.
        from: CallState,
        /// State the caller requested.
        to: CallState,
        /// Session token for diagnostics.
        token: String,
    },
    /// The session's state disagrees with its history.
    #[error("session {token} state {state} does not match history tail {tail}")]
    IntegrityViolation {
        /// Session token for diagnostics.
        token: String,
        /// Current state label.
        state: &'static str,
        /// History tail label.
        tail: &'static str,
    },
}

impl Classify for TransitionError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Illegal { .. } => ErrorKind::InvalidTransition,
            Self::IntegrityViolation { .. } => ErrorKind::Internal,
        }
    }
}

impl From<TransitionError> for EngineError {
    fn from(error: TransitionError) -> Self {
        match error.kind() {
            ErrorKind::InvalidTransition => Self::InvalidTransition(error.to_string()),
            _ => Self::Internal(error.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Transitions
// ============================================================================

/// Commits a validated transition on the session.
///
/// On success the state, the history, and the per-state timestamps update
/// together. Entering [`CallState::Connected`] stamps `answered_at`;
/// entering a terminal state stamps `ended_at` and derives `duration_secs`
/// when an answer time exists.
///
/// # Errors
///
/// Returns [`TransitionError::Illegal`] when `(state, to)` is not in the
/// legal table; the session is left unchanged.
pub fn transition(
    session: &mut CallSession,
    to: CallState,
    metadata: Option<serde_json::Value>,
    now: Timestamp,
) -> Result<(), TransitionError> {
    let from = session.state;
    if !from.may_transition_to(to) {
        return Err(TransitionError::Illegal {
            from,
            to,
            token: session.token.as_str().to_string(),
        });
    }
    session.history.push(HistoryEntry {
        from,
        to,
        at: now,
        metadata,
    });
    session.state = to;
    if to == CallState::Connected && session.answered_at.is_none() {
        session.answered_at = Some(now);
    }
    if to.is_terminal() {
        session.ended_at = Some(now);
        if let Some(answered_at) = session.answered_at {
            session.duration_secs = Some(now.seconds_since(answered_at));
        }
    }
    tracing::debug!(
        token = session.token.as_str(),
        from = from.as_str(),
        to = to.as_str(),
        "call state transition committed"
    );
    Ok(())
}

/// Verifies the session's state matches its history tail.
///
/// # Errors
///
/// Returns [`TransitionError::IntegrityViolation`] when the current state is
/// not the last entry's target (or not the initial state for an empty
/// history).
pub fn verify_integrity(session: &CallSession) -> Result<(), TransitionError> {
    let expected = session.history.last().map_or(CallState::INITIAL, |entry| entry.to);
    if session.state == expected {
        Ok(())
    } else {
        Err(TransitionError::IntegrityViolation {
            token: session.token.as_str().to_string(),
            state: session.state.as_str(),
            tail: expected.as_str(),
        })
    }
}

/// Applies a carrier-status projection to the session.
///
/// This is [`transition`] plus the no-op guard the pipeline needs: a status
/// projecting onto the state the session is already in is ignored rather
/// than rejected, because carriers repeat statuses freely.
///
/// # Errors
///
/// Returns [`TransitionError::Illegal`] for genuinely illegal projections.
pub fn apply_projection(
    session: &mut CallSession,
    to: CallState,
    metadata: Option<serde_json::Value>,
    now: Timestamp,
) -> Result<ProjectionApplied, TransitionError> {
    if session.state == to {
        return Ok(ProjectionApplied::NoChange);
    }
    transition(session, to, metadata, now)?;
    Ok(ProjectionApplied::Advanced)
}

/// Result of [`apply_projection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionApplied {
    /// The session advanced to a new state.
    Advanced,
    /// The status projected onto the current state; nothing changed.
    NoChange,
}
