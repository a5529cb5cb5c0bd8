// crates/trunkline-engine/tests/common/mod.rs
// ============================================================================
// Module: Engine Test Fixtures
// Description: Shared builders for tenants, agents, groups, and rosters.
// Purpose: Keep the engine test files focused on behavior.
// ============================================================================

//! Shared fixtures for engine tests.

#![allow(
    dead_code,
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only helpers; not every test file uses every builder."
)]

use trunkline_core::AgentGroup;
use trunkline_core::AgentId;
use trunkline_core::AgentProvider;
use trunkline_core::GroupId;
use trunkline_core::GroupRoster;
use trunkline_core::Membership;
use trunkline_core::MembershipId;
use trunkline_core::RosterMember;
use trunkline_core::StrategySettings;
use trunkline_core::TenantId;
use trunkline_core::VoiceAgent;

/// The fixture tenant.
pub fn tenant() -> TenantId {
    TenantId::from_raw(1).expect("nonzero tenant id")
}

/// A second tenant for isolation tests.
pub fn other_tenant() -> TenantId {
    TenantId::from_raw(2).expect("nonzero tenant id")
}

/// Builds an enabled vapi agent.
pub fn agent(id: u64, name: &str) -> VoiceAgent {
    agent_with(id, name, AgentProvider::Vapi, true)
}

/// Builds an agent with explicit provider and enabled flag.
pub fn agent_with(id: u64, name: &str, provider: AgentProvider, enabled: bool) -> VoiceAgent {
    VoiceAgent {
        id: AgentId::from_raw(id).expect("nonzero agent id"),
        tenant_id: tenant(),
        name: name.to_string(),
        provider,
        service_value: format!("asst_{id}"),
        credentials: None,
        enabled,
        metadata: serde_json::Value::Null,
    }
}

/// Builds a membership with priority and capacity.
pub fn membership(id: u64, group: GroupId, agent: AgentId, priority: u16, capacity: Option<u32>) -> Membership {
    Membership {
        id: MembershipId::from_raw(id).expect("nonzero membership id"),
        group_id: group,
        agent_id: agent,
        priority,
        capacity,
    }
}

/// Builds a group with the given strategy.
pub fn group(id: u64, strategy: StrategySettings) -> AgentGroup {
    AgentGroup {
        id: GroupId::from_raw(id).expect("nonzero group id"),
        tenant_id: tenant(),
        name: format!("group-{id}"),
        strategy,
        enabled: true,
    }
}

/// Builds a roster of equal-priority members in insertion order.
pub fn roster(group: AgentGroup, agents: Vec<VoiceAgent>) -> GroupRoster {
    let members = agents
        .into_iter()
        .enumerate()
        .map(|(index, agent)| RosterMember {
            membership: membership(
                u64::try_from(index).expect("small index") + 1,
                group.id,
                agent.id,
                50,
                None,
            ),
            agent,
        })
        .collect();
    GroupRoster {
        group,
        members,
    }
}

/// Builds a roster from explicit (membership, agent) pairs.
pub fn roster_with(group: AgentGroup, members: Vec<(Membership, VoiceAgent)>) -> GroupRoster {
    let members = members
        .into_iter()
        .map(|(membership, agent)| RosterMember {
            membership,
            agent,
        })
        .collect();
    GroupRoster {
        group,
        members,
    }
}
