// crates/trunkline-engine/src/strategy/mod.rs
// ============================================================================
// Module: Distribution Strategies
// Description: Strategy contract, factory, and degraded-mode selection.
// Purpose: Pick one agent from a group roster under concurrent webhooks.
// Dependencies: trunkline-core, trunkline-store, rand
// ============================================================================

//! ## Overview
//! Every strategy implements the same small contract: `select` returns the
//! chosen agent (or `None` iff the roster has no selectable member) and
//! `record` accounts a successfully synthesized call. Strategies are called
//! from many webhook workers at once and compose correctness purely from the
//! store's atomic primitives — never from a wrapping lock.
//!
//! A slightly stale load reading is acceptable under concurrency; a skipped
//! rotation slot or an exceeded capacity ceiling is not.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod load_balanced;
pub mod priority;
pub mod round_robin;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use rand::Rng;
use thiserror::Error;
use trunkline_core::GroupRoster;
use trunkline_core::StrategySettings;
use trunkline_core::VoiceAgent;
use trunkline_store::CoordinationStore;
use trunkline_store::StoreError;

pub use self::load_balanced::LoadBalancedStrategy;
pub use self::priority::PriorityStrategy;
pub use self::round_robin::RoundRobinStrategy;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Strategy failure.
///
/// # Invariants
/// - `Store` wraps the coordination-store outage the router degrades on.
#[derive(Debug, Clone, Error)]
pub enum StrategyError {
    /// The coordination store failed under the strategy.
    #[error("strategy store operation failed: {0}")]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Contract
// ============================================================================

/// The contract every distribution strategy implements.
pub trait DistributionStrategy: Send + Sync {
    /// Returns the stable strategy tag.
    fn identifier(&self) -> &'static str;

    /// Returns the strategy's effective configuration for diagnostics.
    fn configuration(&self) -> serde_json::Value;

    /// Selects one agent from the roster.
    ///
    /// Returns `None` iff the roster has no selectable enabled member.
    ///
    /// # Errors
    ///
    /// Returns [`StrategyError`] when the store fails; callers degrade to
    /// [`random_enabled`].
    fn select(&self, roster: &GroupRoster) -> Result<Option<VoiceAgent>, StrategyError>;

    /// Records a bridged call against the selected agent.
    ///
    /// # Errors
    ///
    /// Returns [`StrategyError`] when the store fails; recording is
    /// best-effort and callers only log the failure.
    fn record(&self, roster: &GroupRoster, agent: &VoiceAgent) -> Result<(), StrategyError>;
}

// ============================================================================
// SECTION: Factory
// ============================================================================

/// Builds the strategy variant keyed on the group's strategy tag.
#[must_use]
pub fn strategy_for(
    roster: &GroupRoster,
    store: Arc<dyn CoordinationStore>,
) -> Box<dyn DistributionStrategy> {
    let tenant_id = roster.group.tenant_id;
    let group_id = roster.group.id;
    match roster.group.strategy {
        StrategySettings::LoadBalanced(settings) => {
            Box::new(LoadBalancedStrategy::new(tenant_id, group_id, settings, store))
        }
        StrategySettings::Priority(settings) => {
            Box::new(PriorityStrategy::new(tenant_id, group_id, settings, store))
        }
        StrategySettings::RoundRobin(settings) => {
            Box::new(RoundRobinStrategy::new(tenant_id, group_id, settings, store))
        }
    }
}

// ============================================================================
// SECTION: Degraded Selection
// ============================================================================

/// Uniform random pick over the enabled members.
///
/// This is the degraded path when the store is unavailable: fairness
/// suffers, the call still routes.
#[must_use]
pub fn random_enabled(roster: &GroupRoster) -> Option<VoiceAgent> {
    let enabled = roster.enabled_members();
    if enabled.is_empty() {
        return None;
    }
    let index = rand::thread_rng().gen_range(0 .. enabled.len());
    enabled.get(index).map(|member| member.agent.clone())
}
