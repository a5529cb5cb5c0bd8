// crates/trunkline-core/src/core/group.rs
// ============================================================================
// Module: Trunkline Agent Groups
// Description: Agent groups, distribution settings, and memberships.
// Purpose: Model the pool an incoming call is distributed over.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! An agent group is a named collection of agents with one distribution
//! strategy. Membership is a relation with attributes (priority, capacity),
//! not ownership: deleting either side deletes the membership but never the
//! other side. A group may only route when it is enabled and at least one
//! enabled member exists.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::agent::VoiceAgent;
use crate::core::identifiers::AgentId;
use crate::core::identifiers::GroupId;
use crate::core::identifiers::MembershipId;
use crate::core::identifiers::TenantId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Inclusive membership priority range.
pub const PRIORITY_RANGE: (u16, u16) = (1, 100);
/// Inclusive membership capacity range (when a capacity is set).
pub const CAPACITY_RANGE: (u32, u32) = (1, 1_000);
/// Default rolling window for load-balanced selection, in hours.
pub const DEFAULT_WINDOW_HOURS: u32 = 1;

// ============================================================================
// SECTION: Strategy Settings
// ============================================================================

/// Settings for load-balanced distribution.
///
/// # Invariants
/// - `window_hours` is at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancedSettings {
    /// Rolling window over which per-agent call counts are compared.
    pub window_hours: u32,
    /// Optional per-agent ceiling; an agent at or above it is excluded.
    pub max_calls_per_agent: Option<u32>,
}

impl Default for LoadBalancedSettings {
    fn default() -> Self {
        Self {
            window_hours: DEFAULT_WINDOW_HOURS,
            max_calls_per_agent: None,
        }
    }
}

/// Settings for priority distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PrioritySettings {
    /// Rotate among members sharing the top priority instead of using
    /// insertion order.
    pub round_robin_same_priority: bool,
}

/// Settings for round-robin distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoundRobinSettings {
    /// Weight the cycle by member capacities (capacity `None` counts as 1).
    pub weighted_by_capacity: bool,
}

/// Distribution strategy selection with per-variant settings.
///
/// # Invariants
/// - The tag is stable on the wire (`load_balanced` / `priority` / `round_robin`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum StrategySettings {
    /// Fewest calls in a rolling window wins.
    LoadBalanced(LoadBalancedSettings),
    /// Highest priority wins with implicit failover.
    Priority(PrioritySettings),
    /// Monotonic rotation over the member cycle.
    RoundRobin(RoundRobinSettings),
}

impl StrategySettings {
    /// Returns the stable strategy tag.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::LoadBalanced(_) => "load_balanced",
            Self::Priority(_) => "priority",
            Self::RoundRobin(_) => "round_robin",
        }
    }
}

// ============================================================================
// SECTION: Group
// ============================================================================

/// A named collection of agents with a distribution strategy.
///
/// # Invariants
/// - `name` is unique within the tenant.
/// - Routes only when `enabled` and at least one enabled member exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentGroup {
    /// Group identifier.
    pub id: GroupId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Human-readable name, unique within the tenant.
    pub name: String,
    /// Distribution strategy and its settings.
    pub strategy: StrategySettings,
    /// Whether the group accepts calls.
    pub enabled: bool,
}

// ============================================================================
// SECTION: Membership
// ============================================================================

/// The relation associating an agent with a group.
///
/// # Invariants
/// - (group, agent) is unique.
/// - `priority` is within [`PRIORITY_RANGE`].
/// - `capacity` is `None` (unlimited) or within [`CAPACITY_RANGE`].
/// - Group and agent belong to the same tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    /// Membership identifier; ordering is insertion order.
    pub id: MembershipId,
    /// Group side of the relation.
    pub group_id: GroupId,
    /// Agent side of the relation.
    pub agent_id: AgentId,
    /// Selection priority (higher wins under the priority strategy).
    pub priority: u16,
    /// Concurrent-call capacity; `None` means unlimited.
    pub capacity: Option<u32>,
}

/// Membership validation failures.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MembershipError {
    /// Priority outside [`PRIORITY_RANGE`].
    #[error("membership priority {0} outside [{min}, {max}]", min = PRIORITY_RANGE.0, max = PRIORITY_RANGE.1)]
    PriorityOutOfRange(u16),
    /// Capacity outside [`CAPACITY_RANGE`].
    #[error("membership capacity {0} outside [{min}, {max}]", min = CAPACITY_RANGE.0, max = CAPACITY_RANGE.1)]
    CapacityOutOfRange(u32),
    /// Capacity of zero under capacity weighting.
    #[error("capacity 0 is forbidden when the group weights by capacity")]
    ZeroCapacityWeighted,
    /// (group, agent) pair already present.
    #[error("agent {agent} is already a member of group {group}")]
    Duplicate {
        /// Group side of the duplicate pair.
        group: GroupId,
        /// Agent side of the duplicate pair.
        agent: AgentId,
    },
    /// Group and agent belong to different tenants.
    #[error("membership crosses tenants: group tenant {group_tenant}, agent tenant {agent_tenant}")]
    CrossTenant {
        /// Tenant owning the group.
        group_tenant: TenantId,
        /// Tenant owning the agent.
        agent_tenant: TenantId,
    },
}

impl Membership {
    /// Validates the membership bounds against the group's strategy.
    ///
    /// Capacity 0 cannot be stored at all; the weighted check exists so a
    /// group switching to weighting re-validates its members.
    ///
    /// # Errors
    ///
    /// Returns [`MembershipError`] when a bound is violated.
    pub fn validate(&self, strategy: &StrategySettings) -> Result<(), MembershipError> {
        if self.priority < PRIORITY_RANGE.0 || self.priority > PRIORITY_RANGE.1 {
            return Err(MembershipError::PriorityOutOfRange(self.priority));
        }
        if let Some(capacity) = self.capacity {
            if capacity == 0 {
                return Err(
                    if matches!(
                        strategy,
                        StrategySettings::RoundRobin(RoundRobinSettings {
                            weighted_by_capacity: true,
                        })
                    ) {
                        MembershipError::ZeroCapacityWeighted
                    } else {
                        MembershipError::CapacityOutOfRange(capacity)
                    },
                );
            }
            if capacity > CAPACITY_RANGE.1 {
                return Err(MembershipError::CapacityOutOfRange(capacity));
            }
        }
        Ok(())
    }

    /// Returns the weight this member contributes to a weighted cycle.
    #[must_use]
    pub fn weight(&self) -> u32 {
        self.capacity.unwrap_or(1).max(1)
    }
}

// ============================================================================
// SECTION: Roster
// ============================================================================

/// One member of a resolved group roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterMember {
    /// Membership relation attributes.
    pub membership: Membership,
    /// The agent on the membership's agent side.
    pub agent: VoiceAgent,
}

/// A group resolved together with its members, in insertion order.
///
/// # Invariants
/// - `members` is sorted by membership id ascending.
/// - Every member's agent belongs to the group's tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRoster {
    /// The group definition.
    pub group: AgentGroup,
    /// Members with their agents, insertion order.
    pub members: Vec<RosterMember>,
}

impl GroupRoster {
    /// Returns true when the group may route: enabled with at least one
    /// enabled member.
    #[must_use]
    pub fn can_route(&self) -> bool {
        self.group.enabled && self.members.iter().any(|member| member.agent.enabled)
    }

    /// Returns the enabled members in insertion order.
    #[must_use]
    pub fn enabled_members(&self) -> Vec<&RosterMember> {
        self.members.iter().filter(|member| member.agent.enabled).collect()
    }
}
