// crates/trunkline-engine/src/strategy/load_balanced.rs
// ============================================================================
// Module: Load-Balanced Strategy
// Description: Fewest calls in a rolling window wins; ties break at random.
// Purpose: Spread calls evenly over a group's enabled agents.
// Dependencies: trunkline-core, trunkline-store, rand, uuid
// ============================================================================

//! ## Overview
//! Each (group, agent) pair keeps a rolling window of call timestamps as a
//! sorted set: score = unix seconds, member = a unique id. Selection counts
//! each enabled agent's window and returns the smallest, breaking ties
//! uniformly at random. An agent at or above `max_calls_per_agent` is
//! excluded as effectively unavailable. Recording appends now and prunes
//! everything older than the window; the key's TTL is the window plus one
//! hour so idle groups clean up after themselves.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use trunkline_core::GroupId;
use trunkline_core::GroupRoster;
use trunkline_core::LoadBalancedSettings;
use trunkline_core::TenantId;
use trunkline_core::Timestamp;
use trunkline_core::VoiceAgent;
use trunkline_store::CoordinationStore;
use uuid::Uuid;

use crate::keys;
use crate::strategy::DistributionStrategy;
use crate::strategy::StrategyError;

// ============================================================================
// SECTION: Strategy
// ============================================================================

/// Load-balanced selection over a rolling call window.
///
/// # Invariants
/// - Window membership is append-then-prune; counts may briefly include
///   entries past the window edge, never miss recorded calls.
pub struct LoadBalancedStrategy {
    /// Tenant scope for key construction.
    tenant_id: TenantId,
    /// Group scope for key construction.
    group_id: GroupId,
    /// Window and ceiling settings.
    settings: LoadBalancedSettings,
    /// Shared coordination store.
    store: Arc<dyn CoordinationStore>,
}

impl LoadBalancedStrategy {
    /// Creates the strategy for one group.
    #[must_use]
    pub fn new(
        tenant_id: TenantId,
        group_id: GroupId,
        settings: LoadBalancedSettings,
        store: Arc<dyn CoordinationStore>,
    ) -> Self {
        Self {
            tenant_id,
            group_id,
            settings,
            store,
        }
    }

    /// Window length in seconds (at least one hour).
    fn window_seconds(&self) -> i64 {
        i64::from(self.settings.window_hours.max(1)).saturating_mul(3_600)
    }

    /// Key TTL: the window plus one hour.
    fn key_ttl(&self) -> Duration {
        let seconds = u64::try_from(self.window_seconds()).unwrap_or(3_600).saturating_add(3_600);
        Duration::from_secs(seconds)
    }

    /// Counts an agent's calls inside the window.
    fn window_count(&self, agent: &VoiceAgent, cutoff: i64) -> Result<u64, StrategyError> {
        let key = keys::load_balanced_calls(self.tenant_id, self.group_id, agent.id);
        Ok(self.store.count_scores_at_least(&key, cutoff)?)
    }
}

impl DistributionStrategy for LoadBalancedStrategy {
    fn identifier(&self) -> &'static str {
        "load_balanced"
    }

    fn configuration(&self) -> serde_json::Value {
        serde_json::json!({
            "window_hours": self.settings.window_hours,
            "max_calls_per_agent": self.settings.max_calls_per_agent,
        })
    }

    fn select(&self, roster: &GroupRoster) -> Result<Option<VoiceAgent>, StrategyError> {
        let enabled = roster.enabled_members();
        if enabled.is_empty() {
            return Ok(None);
        }
        let cutoff = Timestamp::now().as_unix_seconds().saturating_sub(self.window_seconds());
        let mut loads = Vec::with_capacity(enabled.len());
        for member in enabled {
            let count = self.window_count(&member.agent, cutoff)?;
            if let Some(ceiling) = self.settings.max_calls_per_agent {
                if count >= u64::from(ceiling) {
                    continue;
                }
            }
            loads.push((count, member.agent.clone()));
        }
        let Some(minimum) = loads.iter().map(|(count, _)| *count).min() else {
            return Ok(None);
        };
        let tied: Vec<VoiceAgent> = loads
            .into_iter()
            .filter(|(count, _)| *count == minimum)
            .map(|(_, agent)| agent)
            .collect();
        let index = rand::thread_rng().gen_range(0 .. tied.len());
        Ok(tied.into_iter().nth(index))
    }

    fn record(&self, _roster: &GroupRoster, agent: &VoiceAgent) -> Result<(), StrategyError> {
        let now = Timestamp::now().as_unix_seconds();
        let key = keys::load_balanced_calls(self.tenant_id, self.group_id, agent.id);
        let member = Uuid::new_v4().to_string();
        self.store.sorted_insert(&key, now, &member, Some(self.key_ttl()))?;
        self.store.prune_scores_below(&key, now.saturating_sub(self.window_seconds()))?;
        Ok(())
    }
}
