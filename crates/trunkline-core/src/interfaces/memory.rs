// crates/trunkline-core/src/interfaces/memory.rs
// ============================================================================
// Module: Trunkline In-Memory Backends
// Description: Reference implementations of the directory and repository traits.
// Purpose: Back tests and single-node runs without a relational store.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! The in-memory backends hold all state behind a single mutex and recover
//! from poisoning, so a panicking test thread cannot wedge the others. The
//! provisioning methods enforce the same write-time invariants the durable
//! backend enforces: unique names per tenant, unique (group, agent) pairs,
//! same-tenant memberships, validated rule patterns, and membership bounds.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::PoisonError;

use crate::core::agent::VoiceAgent;
use crate::core::event::CallEvent;
use crate::core::group::AgentGroup;
use crate::core::group::GroupRoster;
use crate::core::group::Membership;
use crate::core::group::MembershipError;
use crate::core::group::RosterMember;
use crate::core::identifiers::AgentId;
use crate::core::identifiers::CallSid;
use crate::core::identifiers::GroupId;
use crate::core::identifiers::MembershipId;
use crate::core::identifiers::RuleId;
use crate::core::identifiers::SessionToken;
use crate::core::identifiers::TenantId;
use crate::core::identifiers::TrunkId;
use crate::core::record::CallRecord;
use crate::core::routing::InboundRule;
use crate::core::routing::OutboundRule;
use crate::core::routing::Trunk;
use crate::core::session::CallSession;
use crate::core::tenant::Tenant;
use crate::interfaces::DirectoryError;
use crate::interfaces::RepositoryError;
use crate::interfaces::RoutingDirectory;
use crate::interfaces::SessionRepository;
use crate::interfaces::TenantDirectory;
use crate::runtime::matcher::validate_pattern;

// ============================================================================
// SECTION: Provisioning Errors
// ============================================================================

/// Write-time failure in the in-memory directory.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProvisionError {
    /// A uniqueness constraint was violated.
    #[error("duplicate entity: {0}")]
    Duplicate(String),
    /// A referenced entity does not exist within the tenant.
    #[error("missing entity: {0}")]
    Missing(String),
    /// A membership bound was violated.
    #[error(transparent)]
    Membership(#[from] MembershipError),
    /// A rule pattern failed validation.
    #[error("invalid pattern: {0}")]
    Pattern(String),
}

// ============================================================================
// SECTION: Directory State
// ============================================================================

/// Mutable directory state behind the mutex.
#[derive(Debug, Default)]
struct DirectoryState {
    /// Tenants by id.
    tenants: BTreeMap<TenantId, Tenant>,
    /// Agents by id.
    agents: BTreeMap<AgentId, VoiceAgent>,
    /// Groups by id.
    groups: BTreeMap<GroupId, AgentGroup>,
    /// Memberships by id, insertion order by key.
    memberships: BTreeMap<MembershipId, Membership>,
    /// Inbound rules by id.
    inbound_rules: BTreeMap<RuleId, InboundRule>,
    /// Outbound rules by id.
    outbound_rules: BTreeMap<RuleId, OutboundRule>,
    /// Trunks by id.
    trunks: BTreeMap<TrunkId, Trunk>,
}

/// In-memory tenant and routing directory.
///
/// # Invariants
/// - All reads and writes go through one mutex; poisoning is recovered.
/// - Provisioning enforces the durable backend's write-time invariants.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    /// Guarded directory state.
    state: Mutex<DirectoryState>,
}

impl InMemoryDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the state, recovering from poisoning.
    fn lock(&self) -> std::sync::MutexGuard<'_, DirectoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts a tenant.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Duplicate`] when the id or domain is taken.
    pub fn insert_tenant(&self, tenant: Tenant) -> Result<(), ProvisionError> {
        let mut state = self.lock();
        if state.tenants.contains_key(&tenant.id) {
            return Err(ProvisionError::Duplicate(format!("tenant {}", tenant.id)));
        }
        if state.tenants.values().any(|existing| existing.domain == tenant.domain) {
            return Err(ProvisionError::Duplicate(format!("tenant domain {}", tenant.domain)));
        }
        state.tenants.insert(tenant.id, tenant);
        Ok(())
    }

    /// Inserts a voice agent.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] when the id is taken, the tenant is
    /// missing, or the name is not unique within the tenant.
    pub fn insert_agent(&self, agent: VoiceAgent) -> Result<(), ProvisionError> {
        let mut state = self.lock();
        if !state.tenants.contains_key(&agent.tenant_id) {
            return Err(ProvisionError::Missing(format!("tenant {}", agent.tenant_id)));
        }
        if state.agents.contains_key(&agent.id) {
            return Err(ProvisionError::Duplicate(format!("agent {}", agent.id)));
        }
        let name_taken = state
            .agents
            .values()
            .any(|existing| existing.tenant_id == agent.tenant_id && existing.name == agent.name);
        if name_taken {
            return Err(ProvisionError::Duplicate(format!("agent name {:?}", agent.name)));
        }
        state.agents.insert(agent.id, agent);
        Ok(())
    }

    /// Inserts an agent group.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] when the id is taken, the tenant is
    /// missing, or the name is not unique within the tenant.
    pub fn insert_group(&self, group: AgentGroup) -> Result<(), ProvisionError> {
        let mut state = self.lock();
        if !state.tenants.contains_key(&group.tenant_id) {
            return Err(ProvisionError::Missing(format!("tenant {}", group.tenant_id)));
        }
        if state.groups.contains_key(&group.id) {
            return Err(ProvisionError::Duplicate(format!("group {}", group.id)));
        }
        let name_taken = state
            .groups
            .values()
            .any(|existing| existing.tenant_id == group.tenant_id && existing.name == group.name);
        if name_taken {
            return Err(ProvisionError::Duplicate(format!("group name {:?}", group.name)));
        }
        state.groups.insert(group.id, group);
        Ok(())
    }

    /// Inserts a membership after bound and tenancy checks.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] when either side is missing, the pair is a
    /// duplicate, the sides cross tenants, or a bound is violated.
    pub fn insert_membership(&self, membership: Membership) -> Result<(), ProvisionError> {
        let mut state = self.lock();
        let group = state
            .groups
            .get(&membership.group_id)
            .ok_or_else(|| ProvisionError::Missing(format!("group {}", membership.group_id)))?;
        let agent = state
            .agents
            .get(&membership.agent_id)
            .ok_or_else(|| ProvisionError::Missing(format!("agent {}", membership.agent_id)))?;
        if group.tenant_id != agent.tenant_id {
            return Err(ProvisionError::Membership(MembershipError::CrossTenant {
                group_tenant: group.tenant_id,
                agent_tenant: agent.tenant_id,
            }));
        }
        membership.validate(&group.strategy)?;
        let duplicate = state.memberships.values().any(|existing| {
            existing.group_id == membership.group_id && existing.agent_id == membership.agent_id
        });
        if duplicate {
            return Err(ProvisionError::Membership(MembershipError::Duplicate {
                group: membership.group_id,
                agent: membership.agent_id,
            }));
        }
        state.memberships.insert(membership.id, membership);
        Ok(())
    }

    /// Inserts an inbound rule after pattern validation.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] when the id is taken, the tenant is
    /// missing, or the pattern is invalid.
    pub fn insert_inbound_rule(&self, rule: InboundRule) -> Result<(), ProvisionError> {
        validate_pattern(&rule.pattern)
            .map_err(|err| ProvisionError::Pattern(err.to_string()))?;
        let mut state = self.lock();
        if !state.tenants.contains_key(&rule.tenant_id) {
            return Err(ProvisionError::Missing(format!("tenant {}", rule.tenant_id)));
        }
        if state.inbound_rules.contains_key(&rule.id) {
            return Err(ProvisionError::Duplicate(format!("inbound rule {}", rule.id)));
        }
        state.inbound_rules.insert(rule.id, rule);
        Ok(())
    }

    /// Inserts an outbound rule after pattern validation.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] when the id is taken, the tenant is
    /// missing, or either pattern is invalid.
    pub fn insert_outbound_rule(&self, rule: OutboundRule) -> Result<(), ProvisionError> {
        validate_pattern(&rule.caller_id)
            .map_err(|err| ProvisionError::Pattern(err.to_string()))?;
        validate_pattern(&rule.destination_pattern)
            .map_err(|err| ProvisionError::Pattern(err.to_string()))?;
        let mut state = self.lock();
        if !state.tenants.contains_key(&rule.tenant_id) {
            return Err(ProvisionError::Missing(format!("tenant {}", rule.tenant_id)));
        }
        if state.outbound_rules.contains_key(&rule.id) {
            return Err(ProvisionError::Duplicate(format!("outbound rule {}", rule.id)));
        }
        state.outbound_rules.insert(rule.id, rule);
        Ok(())
    }

    /// Inserts a trunk.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] when the id is taken or the tenant is
    /// missing.
    pub fn insert_trunk(&self, trunk: Trunk) -> Result<(), ProvisionError> {
        let mut state = self.lock();
        if !state.tenants.contains_key(&trunk.tenant_id) {
            return Err(ProvisionError::Missing(format!("tenant {}", trunk.tenant_id)));
        }
        if state.trunks.contains_key(&trunk.id) {
            return Err(ProvisionError::Duplicate(format!("trunk {}", trunk.id)));
        }
        state.trunks.insert(trunk.id, trunk);
        Ok(())
    }

    /// Replaces an agent's enabled flag, for failover tests.
    pub fn set_agent_enabled(&self, agent_id: AgentId, enabled: bool) {
        let mut state = self.lock();
        if let Some(agent) = state.agents.get_mut(&agent_id) {
            agent.enabled = enabled;
        }
    }
}

impl TenantDirectory for InMemoryDirectory {
    fn tenant_by_domain(&self, domain: &str) -> Result<Option<Tenant>, DirectoryError> {
        let state = self.lock();
        Ok(state.tenants.values().find(|tenant| tenant.domain == domain).cloned())
    }

    fn tenant_by_id(&self, tenant_id: TenantId) -> Result<Option<Tenant>, DirectoryError> {
        let state = self.lock();
        Ok(state.tenants.get(&tenant_id).cloned())
    }
}

impl RoutingDirectory for InMemoryDirectory {
    fn agent(
        &self,
        tenant_id: TenantId,
        agent_id: AgentId,
    ) -> Result<Option<VoiceAgent>, DirectoryError> {
        let state = self.lock();
        Ok(state
            .agents
            .get(&agent_id)
            .filter(|agent| agent.tenant_id == tenant_id)
            .cloned())
    }

    fn group_roster(
        &self,
        tenant_id: TenantId,
        group_id: GroupId,
    ) -> Result<Option<GroupRoster>, DirectoryError> {
        let state = self.lock();
        let Some(group) =
            state.groups.get(&group_id).filter(|group| group.tenant_id == tenant_id).cloned()
        else {
            return Ok(None);
        };
        let mut members = Vec::new();
        for membership in state.memberships.values() {
            if membership.group_id != group_id {
                continue;
            }
            let agent = state.agents.get(&membership.agent_id).ok_or_else(|| {
                DirectoryError::Invalid(format!(
                    "membership {} references missing agent {}",
                    membership.id, membership.agent_id
                ))
            })?;
            members.push(RosterMember {
                membership: *membership,
                agent: agent.clone(),
            });
        }
        members.sort_by_key(|member| member.membership.id);
        Ok(Some(GroupRoster {
            group,
            members,
        }))
    }

    fn inbound_rules(&self, tenant_id: TenantId) -> Result<Vec<InboundRule>, DirectoryError> {
        let state = self.lock();
        Ok(state
            .inbound_rules
            .values()
            .filter(|rule| rule.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    fn outbound_rules(&self, tenant_id: TenantId) -> Result<Vec<OutboundRule>, DirectoryError> {
        let state = self.lock();
        Ok(state
            .outbound_rules
            .values()
            .filter(|rule| rule.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    fn trunk(
        &self,
        tenant_id: TenantId,
        trunk_id: TrunkId,
    ) -> Result<Option<Trunk>, DirectoryError> {
        let state = self.lock();
        Ok(state
            .trunks
            .get(&trunk_id)
            .filter(|trunk| trunk.tenant_id == tenant_id)
            .cloned())
    }

    fn default_trunk(&self, tenant_id: TenantId) -> Result<Option<Trunk>, DirectoryError> {
        let state = self.lock();
        let mut candidates: Vec<&Trunk> = state
            .trunks
            .values()
            .filter(|trunk| trunk.tenant_id == tenant_id && trunk.is_default && trunk.enabled)
            .collect();
        candidates.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
        Ok(candidates.first().map(|trunk| (*trunk).clone()))
    }
}

// ============================================================================
// SECTION: Session Repository
// ============================================================================

/// Mutable repository state behind the mutex.
#[derive(Debug, Default)]
struct RepositoryState {
    /// Sessions keyed by (tenant, token).
    sessions: BTreeMap<(TenantId, SessionToken), CallSession>,
    /// Append-only event log.
    events: Vec<CallEvent>,
    /// Call records keyed by (tenant, call id).
    records: BTreeMap<(TenantId, CallSid), CallRecord>,
}

/// In-memory session repository.
///
/// # Invariants
/// - All reads and writes go through one mutex; poisoning is recovered.
/// - Events are append-only.
#[derive(Debug, Default)]
pub struct InMemorySessionRepository {
    /// Guarded repository state.
    state: Mutex<RepositoryState>,
}

impl InMemorySessionRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the state, recovering from poisoning.
    fn lock(&self) -> std::sync::MutexGuard<'_, RepositoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionRepository for InMemorySessionRepository {
    fn load_session(
        &self,
        tenant_id: TenantId,
        token: &SessionToken,
    ) -> Result<Option<CallSession>, RepositoryError> {
        let state = self.lock();
        Ok(state.sessions.get(&(tenant_id, token.clone())).cloned())
    }

    fn save_session(&self, session: &CallSession) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        state
            .sessions
            .insert((session.tenant_id, session.token.clone()), session.clone());
        Ok(())
    }

    fn append_event(&self, event: &CallEvent) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        state.events.push(event.clone());
        Ok(())
    }

    fn events_for(
        &self,
        tenant_id: TenantId,
        token: &SessionToken,
    ) -> Result<Vec<CallEvent>, RepositoryError> {
        let state = self.lock();
        Ok(state
            .events
            .iter()
            .filter(|event| event.tenant_id == tenant_id && &event.token == token)
            .cloned()
            .collect())
    }

    fn upsert_record(&self, record: &CallRecord) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        state
            .records
            .insert((record.tenant_id, record.call_sid.clone()), record.clone());
        Ok(())
    }

    fn load_record(
        &self,
        tenant_id: TenantId,
        call_sid: &CallSid,
    ) -> Result<Option<CallRecord>, RepositoryError> {
        let state = self.lock();
        Ok(state.records.get(&(tenant_id, call_sid.clone())).cloned())
    }
}
