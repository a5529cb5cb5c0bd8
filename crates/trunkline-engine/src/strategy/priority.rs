// crates/trunkline-engine/src/strategy/priority.rs
// ============================================================================
// Module: Priority Strategy
// Description: Highest enabled priority wins with implicit failover.
// Purpose: Prefer designated agents while keeping the group routable.
// Dependencies: trunkline-core, trunkline-store
// ============================================================================

//! ## Overview
//! Selection walks the enabled members and takes the highest priority
//! present, so a disabled top member fails over to the next priority with no
//! extra bookkeeping. Inside one priority band, `round_robin_same_priority`
//! rotates through the band via an atomic counter; otherwise insertion order
//! (lowest membership id) wins every time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use trunkline_core::GroupId;
use trunkline_core::GroupRoster;
use trunkline_core::PrioritySettings;
use trunkline_core::TenantId;
use trunkline_core::VoiceAgent;
use trunkline_store::CoordinationStore;

use crate::keys;
use crate::strategy::DistributionStrategy;
use crate::strategy::StrategyError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Rotation pointer TTL; refreshed on every selection.
const ROTATION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

// ============================================================================
// SECTION: Strategy
// ============================================================================

/// Priority selection with optional same-priority rotation.
pub struct PriorityStrategy {
    /// Tenant scope for key construction.
    tenant_id: TenantId,
    /// Group scope for key construction.
    group_id: GroupId,
    /// Rotation settings.
    settings: PrioritySettings,
    /// Shared coordination store.
    store: Arc<dyn CoordinationStore>,
}

impl PriorityStrategy {
    /// Creates the strategy for one group.
    #[must_use]
    pub fn new(
        tenant_id: TenantId,
        group_id: GroupId,
        settings: PrioritySettings,
        store: Arc<dyn CoordinationStore>,
    ) -> Self {
        Self {
            tenant_id,
            group_id,
            settings,
            store,
        }
    }
}

impl DistributionStrategy for PriorityStrategy {
    fn identifier(&self) -> &'static str {
        "priority"
    }

    fn configuration(&self) -> serde_json::Value {
        serde_json::json!({
            "round_robin_same_priority": self.settings.round_robin_same_priority,
        })
    }

    fn select(&self, roster: &GroupRoster) -> Result<Option<VoiceAgent>, StrategyError> {
        let enabled = roster.enabled_members();
        let Some(top_priority) =
            enabled.iter().map(|member| member.membership.priority).max()
        else {
            return Ok(None);
        };
        // Band members arrive in insertion order from the roster.
        let band: Vec<&VoiceAgent> = enabled
            .iter()
            .filter(|member| member.membership.priority == top_priority)
            .map(|member| &member.agent)
            .collect();
        if band.len() == 1 || !self.settings.round_robin_same_priority {
            return Ok(band.first().map(|agent| (*agent).clone()));
        }
        let key = keys::priority_rotation(self.tenant_id, self.group_id, top_priority);
        let turn = self.store.fetch_increment(&key, Some(ROTATION_TTL))?;
        let band_size = u64::try_from(band.len()).unwrap_or(u64::MAX);
        let index = usize::try_from(turn % band_size).unwrap_or(0);
        Ok(band.get(index).map(|agent| (*agent).clone()))
    }

    fn record(&self, _roster: &GroupRoster, _agent: &VoiceAgent) -> Result<(), StrategyError> {
        // Priority selection keeps no per-call state.
        Ok(())
    }
}
