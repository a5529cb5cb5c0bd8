// crates/trunkline-engine/src/keys.rs
// ============================================================================
// Module: Shared-Store Key Schema
// Description: Tenant-scoped key builders for every coordination surface.
// Purpose: Keep the key grammar in one place so collisions are impossible.
// Dependencies: trunkline-core
// ============================================================================

//! ## Overview
//! Every shared-store key is tenant-scoped and built here. The grammar:
//!
//! ```text
//! tenant:{t}:group:{g}:load_balanced:calls:{a}   sorted set (rolling window)
//! tenant:{t}:group:{g}:round_robin:pointer       counter index
//! tenant:{t}:group:{g}:round_robin:weighted_pos  counter index
//! tenant:{t}:group:{g}:round_robin:agents        string csv (change detection)
//! tenant:{t}:group:{g}:priority:{p}:rotation     counter index
//! tenant:{t}:routing:lock:{session_token}        string owner (TTL 30 s)
//! tenant:{t}:webhook:idem:{kind}:{token}:{eid}   string state (TTL 24 h)
//! tenant:{t}:session:{token}:state               string json  (TTL 24 h)
//! ```
//!
//! Event-bus channel names (`tenant.{t}.calls` and friends) live here too so
//! publishers and dashboards agree on spelling.

// ============================================================================
// SECTION: Imports
// ============================================================================

use trunkline_core::AgentId;
use trunkline_core::EventId;
use trunkline_core::GroupId;
use trunkline_core::SessionToken;
use trunkline_core::TenantId;
use trunkline_core::WebhookKind;

// ============================================================================
// SECTION: Strategy Keys
// ============================================================================

/// Rolling call window for one (group, agent) pair.
#[must_use]
pub fn load_balanced_calls(tenant: TenantId, group: GroupId, agent: AgentId) -> String {
    format!("tenant:{tenant}:group:{group}:load_balanced:calls:{agent}")
}

/// Round-robin simple pointer for a group.
#[must_use]
pub fn round_robin_pointer(tenant: TenantId, group: GroupId) -> String {
    format!("tenant:{tenant}:group:{group}:round_robin:pointer")
}

/// Round-robin weighted-cycle position for a group.
#[must_use]
pub fn round_robin_weighted_pos(tenant: TenantId, group: GroupId) -> String {
    format!("tenant:{tenant}:group:{group}:round_robin:weighted_pos")
}

/// Round-robin roster change-detection key (sorted agent-id csv).
#[must_use]
pub fn round_robin_agents(tenant: TenantId, group: GroupId) -> String {
    format!("tenant:{tenant}:group:{group}:round_robin:agents")
}

/// Per-priority rotation pointer for the priority strategy.
#[must_use]
pub fn priority_rotation(tenant: TenantId, group: GroupId, priority: u16) -> String {
    format!("tenant:{tenant}:group:{group}:priority:{priority}:rotation")
}

// ============================================================================
// SECTION: Session Keys
// ============================================================================

/// Routing lock for one session, held by a uuid owner.
#[must_use]
pub fn routing_lock(tenant: TenantId, token: &SessionToken) -> String {
    format!("tenant:{tenant}:routing:lock:{token}")
}

/// Idempotency ledger entry for one webhook event.
#[must_use]
pub fn idempotency(
    tenant: TenantId,
    kind: WebhookKind,
    token: &SessionToken,
    event_id: &EventId,
) -> String {
    format!("tenant:{tenant}:webhook:idem:{kind}:{token}:{event_id}", kind = kind.as_str())
}

/// Cached session state snapshot.
#[must_use]
pub fn session_state(tenant: TenantId, token: &SessionToken) -> String {
    format!("tenant:{tenant}:session:{token}:state")
}

// ============================================================================
// SECTION: Event Channels
// ============================================================================

/// Live call events channel for dashboards.
#[must_use]
pub fn calls_channel(tenant: TenantId) -> String {
    format!("tenant.{tenant}.calls")
}

/// Agent status channel for dashboards.
#[must_use]
pub fn agents_channel(tenant: TenantId) -> String {
    format!("tenant.{tenant}.agents")
}

/// Analytics refresh channel for dashboards.
#[must_use]
pub fn analytics_channel(tenant: TenantId) -> String {
    format!("tenant.{tenant}.analytics")
}
