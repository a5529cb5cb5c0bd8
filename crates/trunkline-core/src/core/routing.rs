// crates/trunkline-core/src/core/routing.rs
// ============================================================================
// Module: Trunkline Routing Rules
// Description: Inbound/outbound routing rules and outbound trunks.
// Purpose: Model the tenant-owned configuration the matcher evaluates.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Routing rules are owned by the tenant and referenced by sessions only
//! through recorded metadata, never by foreign key. Inbound rules bind a
//! destination pattern to an agent or a group; outbound rules bind a
//! (caller id, destination pattern) pair to a trunk plan.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::AgentId;
use crate::core::identifiers::GroupId;
use crate::core::identifiers::RuleId;
use crate::core::identifiers::TenantId;
use crate::core::identifiers::TrunkId;

// ============================================================================
// SECTION: Inbound Rules
// ============================================================================

/// The entity an inbound rule routes to.
///
/// # Invariants
/// - The target lives in the same tenant as the rule; enforced at decision time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RouteTarget {
    /// A single voice agent.
    Agent(AgentId),
    /// An agent group selected through its distribution strategy.
    Group(GroupId),
}

/// Destination-number rule for inbound calls.
///
/// # Invariants
/// - `pattern` passed [`crate::runtime::matcher::validate_pattern`] at write time.
/// - Evaluation order is priority descending, then id ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundRule {
    /// Rule identifier; ordering breaks priority ties.
    pub id: RuleId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Destination pattern: full E.164 (leading `+`) or a prefix.
    pub pattern: String,
    /// Routing target.
    pub target: RouteTarget,
    /// Evaluation priority (higher first).
    pub priority: i32,
    /// Whether the rule participates in matching.
    pub enabled: bool,
}

// ============================================================================
// SECTION: Outbound Rules
// ============================================================================

/// Trunk plan attached to an outbound rule.
///
/// # Invariants
/// - `trunk_ids` are tried in order; the first enabled trunk wins.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrunkPlan {
    /// Candidate trunks in preference order.
    pub trunk_ids: Vec<TrunkId>,
    /// Optional ring timeout in seconds.
    pub ring_timeout: Option<u32>,
    /// Optional maximum call duration in seconds.
    pub max_duration: Option<u32>,
    /// Optional plan priority.
    pub priority: Option<i32>,
}

/// Caller-id keyed rule for outbound calls.
///
/// # Invariants
/// - A call is classified outbound iff some enabled outbound rule's
///   `caller_id` matches the incoming caller id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundRule {
    /// Rule identifier; ordering breaks priority ties.
    pub id: RuleId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Caller-id pattern: full E.164 (leading `+`) or a prefix.
    pub caller_id: String,
    /// Destination pattern: full E.164 (leading `+`) or a prefix.
    pub destination_pattern: String,
    /// Trunk plan for matched calls.
    pub trunk_plan: TrunkPlan,
    /// Whether the rule participates in matching.
    pub enabled: bool,
}

// ============================================================================
// SECTION: Trunks
// ============================================================================

/// An outbound trunk owned by a tenant.
///
/// # Invariants
/// - At most one default per tenant is expected but not enforced; when
///   several exist, priority descending then id ascending wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trunk {
    /// Trunk identifier.
    pub id: TrunkId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Carrier-side trunk identifier emitted on the `trunks` attribute.
    pub carrier_trunk_id: String,
    /// Free-form trunk configuration.
    pub configuration: serde_json::Value,
    /// Selection priority among default trunks (higher first).
    pub priority: i32,
    /// Concurrent-call capacity.
    pub capacity: Option<u32>,
    /// Whether the trunk is usable.
    pub enabled: bool,
    /// Whether the trunk is the tenant's default fallback.
    pub is_default: bool,
}
