// crates/trunkline-engine/src/strategy/round_robin.rs
// ============================================================================
// Module: Round-Robin Strategy
// Description: Monotonic rotation with optional capacity weighting.
// Purpose: Hand out calls in strict turn order under concurrent webhooks.
// Dependencies: trunkline-core, trunkline-store
// ============================================================================

//! ## Overview
//! Rotation state is two monotonic pointers in the store: a simple index
//! and, under `weighted_by_capacity`, a position inside the weighted cycle
//! (total = sum of capacities, a missing capacity counting as 1). Pointers
//! advance by atomic fetch-and-increment — a read-then-write pointer would
//! skip slots under concurrency, so none exists here. A change-detection key
//! holds the sorted agent-id csv; when the roster changes, one worker wins
//! the compare-and-swap and resets both pointers to zero.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use trunkline_core::GroupId;
use trunkline_core::GroupRoster;
use trunkline_core::RosterMember;
use trunkline_core::RoundRobinSettings;
use trunkline_core::TenantId;
use trunkline_core::VoiceAgent;
use trunkline_store::CoordinationStore;

use crate::keys;
use crate::strategy::DistributionStrategy;
use crate::strategy::StrategyError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Pointer and roster-key TTL; refreshed on every selection.
const POINTER_TTL: Duration = Duration::from_secs(24 * 60 * 60);

// ============================================================================
// SECTION: Strategy
// ============================================================================

/// Round-robin selection over the enabled members.
///
/// # Invariants
/// - Pointer updates are atomic; no slot is ever skipped or replayed.
/// - A roster change resets the rotation exactly once.
pub struct RoundRobinStrategy {
    /// Tenant scope for key construction.
    tenant_id: TenantId,
    /// Group scope for key construction.
    group_id: GroupId,
    /// Weighting settings.
    settings: RoundRobinSettings,
    /// Shared coordination store.
    store: Arc<dyn CoordinationStore>,
}

impl RoundRobinStrategy {
    /// Creates the strategy for one group.
    #[must_use]
    pub fn new(
        tenant_id: TenantId,
        group_id: GroupId,
        settings: RoundRobinSettings,
        store: Arc<dyn CoordinationStore>,
    ) -> Self {
        Self {
            tenant_id,
            group_id,
            settings,
            store,
        }
    }

    /// Resets rotation pointers when the enabled roster changed.
    ///
    /// The csv of sorted agent ids is the change fingerprint. The CAS from
    /// the stale fingerprint admits one winner, which deletes both pointers;
    /// losers observe the fresh fingerprint and leave the pointers alone.
    fn reset_on_roster_change(&self, enabled: &[&RosterMember]) -> Result<(), StrategyError> {
        let mut ids: Vec<u64> = enabled.iter().map(|member| member.agent.id.get()).collect();
        ids.sort_unstable();
        let fingerprint =
            ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(",");
        let key = keys::round_robin_agents(self.tenant_id, self.group_id);
        let stored = self.store.get(&key)?;
        if stored.as_deref() == Some(fingerprint.as_str()) {
            return Ok(());
        }
        let swapped = self.store.compare_and_swap(
            &key,
            stored.as_deref(),
            &fingerprint,
            Some(POINTER_TTL),
        )?;
        if swapped {
            self.store.delete(&keys::round_robin_pointer(self.tenant_id, self.group_id))?;
            self.store
                .delete(&keys::round_robin_weighted_pos(self.tenant_id, self.group_id))?;
            tracing::debug!(
                tenant = %self.tenant_id,
                group = %self.group_id,
                "round-robin roster changed, pointers reset"
            );
        }
        Ok(())
    }

    /// Picks by simple index rotation.
    fn select_simple(
        &self,
        enabled: &[&RosterMember],
    ) -> Result<Option<VoiceAgent>, StrategyError> {
        let key = keys::round_robin_pointer(self.tenant_id, self.group_id);
        let turn = self.store.fetch_increment(&key, Some(POINTER_TTL))?;
        let size = u64::try_from(enabled.len()).unwrap_or(u64::MAX);
        let index = usize::try_from(turn % size).unwrap_or(0);
        Ok(enabled.get(index).map(|member| member.agent.clone()))
    }

    /// Picks by position inside the weighted cycle.
    fn select_weighted(
        &self,
        enabled: &[&RosterMember],
    ) -> Result<Option<VoiceAgent>, StrategyError> {
        let total: u64 = enabled.iter().map(|member| u64::from(member.membership.weight())).sum();
        if total == 0 {
            return Ok(None);
        }
        let key = keys::round_robin_weighted_pos(self.tenant_id, self.group_id);
        let turn = self.store.fetch_increment(&key, Some(POINTER_TTL))?;
        let mut position = turn % total;
        for member in enabled {
            let weight = u64::from(member.membership.weight());
            if position < weight {
                return Ok(Some(member.agent.clone()));
            }
            position -= weight;
        }
        // Unreachable with total > 0; fail soft with the first member.
        Ok(enabled.first().map(|member| member.agent.clone()))
    }
}

impl DistributionStrategy for RoundRobinStrategy {
    fn identifier(&self) -> &'static str {
        "round_robin"
    }

    fn configuration(&self) -> serde_json::Value {
        serde_json::json!({
            "weighted_by_capacity": self.settings.weighted_by_capacity,
        })
    }

    fn select(&self, roster: &GroupRoster) -> Result<Option<VoiceAgent>, StrategyError> {
        let enabled = roster.enabled_members();
        if enabled.is_empty() {
            return Ok(None);
        }
        self.reset_on_roster_change(&enabled)?;
        if self.settings.weighted_by_capacity {
            self.select_weighted(&enabled)
        } else {
            self.select_simple(&enabled)
        }
    }

    fn record(&self, _roster: &GroupRoster, _agent: &VoiceAgent) -> Result<(), StrategyError> {
        // Rotation advanced at selection time; nothing to account here.
        Ok(())
    }
}
