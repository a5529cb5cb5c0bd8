// crates/trunkline-engine/src/session_cache.rs
// ============================================================================
// Module: Session State Cache
// Description: Shared-store snapshot of each session's state and history.
// Purpose: Give dashboards and fast paths a 24 h view without a DB read.
// Dependencies: trunkline-core, trunkline-store
// ============================================================================

//! ## Overview
//! The cache holds a compact `{state, history}` snapshot per session under a
//! 24 h TTL. It is strictly a cache: reads consult it first, misses rebuild
//! from the relational row, and a snapshot is never trusted over the
//! relational copy — on disagreement the relational state wins and the
//! snapshot is rewritten.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use trunkline_core::CallSession;
use trunkline_core::CallState;
use trunkline_core::HistoryEntry;
use trunkline_core::SessionToken;
use trunkline_core::TenantId;
use trunkline_store::CoordinationStore;
use trunkline_store::StoreError;

use crate::keys;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Snapshot TTL.
pub const SNAPSHOT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

// ============================================================================
// SECTION: Snapshot
// ============================================================================

/// Compact cached view of one session's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Current state.
    pub state: CallState,
    /// Committed history, oldest first.
    pub history: Vec<HistoryEntry>,
}

impl From<&CallSession> for SessionSnapshot {
    fn from(session: &CallSession) -> Self {
        Self {
            state: session.state,
            history: session.history.clone(),
        }
    }
}

// ============================================================================
// SECTION: Cache
// ============================================================================

/// Shared-store session snapshot cache.
#[derive(Clone)]
pub struct SessionStateCache {
    /// Shared coordination store.
    store: Arc<dyn CoordinationStore>,
    /// Snapshot TTL.
    ttl: Duration,
}

impl SessionStateCache {
    /// Creates a cache with the default 24 h TTL.
    #[must_use]
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self {
            store,
            ttl: SNAPSHOT_TTL,
        }
    }

    /// Reads the cached snapshot, tolerating a corrupt entry as a miss.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store fails.
    pub fn load(
        &self,
        tenant_id: TenantId,
        token: &SessionToken,
    ) -> Result<Option<SessionSnapshot>, StoreError> {
        let key = keys::session_state(tenant_id, token);
        let Some(raw) = self.store.get(&key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(error) => {
                tracing::warn!(token = token.as_str(), %error, "corrupt session snapshot evicted");
                self.store.delete(&key)?;
                Ok(None)
            }
        }
    }

    /// Writes the session's snapshot, refreshing the TTL.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store fails.
    pub fn save(&self, session: &CallSession) -> Result<(), StoreError> {
        let snapshot = SessionSnapshot::from(session);
        let raw = serde_json::to_string(&snapshot)
            .map_err(|error| StoreError::Invalid(error.to_string()))?;
        let key = keys::session_state(session.tenant_id, &session.token);
        self.store.set(&key, &raw, Some(self.ttl))
    }

    /// Reconciles a cached snapshot against the relational session.
    ///
    /// The relational copy is the authority: on any disagreement the
    /// snapshot is rewritten from the session and the session returned
    /// unchanged.
    pub fn reconcile(&self, session: &CallSession, cached: Option<&SessionSnapshot>) {
        let authoritative = SessionSnapshot::from(session);
        if cached == Some(&authoritative) {
            return;
        }
        if cached.is_some() {
            tracing::warn!(
                token = session.token.as_str(),
                "session snapshot diverged from relational row, rebuilding"
            );
        }
        if let Err(error) = self.save(session) {
            tracing::warn!(token = session.token.as_str(), %error, "snapshot rebuild failed");
        }
    }
}
