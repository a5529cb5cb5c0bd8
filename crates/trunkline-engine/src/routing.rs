// crates/trunkline-engine/src/routing.rs
// ============================================================================
// Module: Routing Decision
// Description: Combines the matcher and strategies into one CCML answer.
// Purpose: Decide, under a session lock, how the carrier bridges a call.
// Dependencies: trunkline-core, trunkline-store, crate::{ccml, keys, secrets, strategy}
// ============================================================================

//! ## Overview
//! The routing decision is the one place the matcher, the directories, and
//! the distribution strategies meet. It is total: every input produces a
//! well-formed outcome, and every internal failure collapses to a hangup
//! with the error logged under the webhook's correlation id — the call must
//! never hang on an engine error.
//!
//! Decisions for one session serialize behind a 30-second TTL lock held by a
//! uuid owner; release checks ownership and otherwise leaves the lock to
//! expire.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use trunkline_core::AgentId;
use trunkline_core::CallDirection;
use trunkline_core::CorrelationId;
use trunkline_core::EngineError;
use trunkline_core::GroupId;
use trunkline_core::GroupRoster;
use trunkline_core::OutboundRule;
use trunkline_core::RouteTarget;
use trunkline_core::RoutingDirectory;
use trunkline_core::SessionToken;
use trunkline_core::TenantId;
use trunkline_core::Trunk;
use trunkline_core::TrunkId;
use trunkline_core::VoiceAgent;
use trunkline_core::ensure_tenant;
use trunkline_core::runtime::classify_direction;
use trunkline_core::runtime::match_inbound;
use trunkline_core::runtime::match_outbound;
use trunkline_store::CoordinationStore;
use uuid::Uuid;

use crate::ccml;
use crate::ccml::TrunkDial;
use crate::keys;
use crate::secrets::CredentialVault;
use crate::strategy::DistributionStrategy;
use crate::strategy::random_enabled;
use crate::strategy::strategy_for;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Routing lock TTL per session.
pub const ROUTING_LOCK_TTL: Duration = Duration::from_secs(30);

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// How the engine decided to bridge (or close) the call.
///
/// # Invariants
/// - Wire labels are stable for session metadata and analytics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingKind {
    /// A single agent matched an inbound rule.
    VoiceAgent,
    /// A group matched and its strategy selected a member.
    AgentGroup,
    /// An outbound rule supplied the trunk.
    OutboundRule,
    /// The tenant's default trunk was the fallback.
    DefaultTrunk,
    /// Nothing routable; the call closes cleanly.
    Hangup,
}

impl RoutingKind {
    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::VoiceAgent => "voice_agent",
            Self::AgentGroup => "agent_group",
            Self::OutboundRule => "outbound_rule",
            Self::DefaultTrunk => "default_trunk",
            Self::Hangup => "hangup",
        }
    }
}

/// The routing decision result.
///
/// # Invariants
/// - `ccml` always parses and validates against the CCML grammar.
/// - `success` is false iff `kind` is [`RoutingKind::Hangup`].
#[derive(Debug, Clone)]
pub struct RoutingOutcome {
    /// Whether a bridge was produced.
    pub success: bool,
    /// Rendered CCML response body.
    pub ccml: String,
    /// Decision classification.
    pub kind: RoutingKind,
    /// Matched target label (`agent:{id}`, `group:{id}`, `rule:{id}`).
    pub target: Option<String>,
    /// Agent the call bridges to, when one was selected.
    pub selected_agent: Option<AgentId>,
    /// Group that produced the selected agent.
    pub selected_group: Option<GroupId>,
    /// Trunk the call egresses through, for outbound decisions.
    pub selected_trunk: Option<TrunkId>,
    /// Human-readable reason for hangup outcomes.
    pub reason: Option<String>,
    /// Decision metadata recorded onto the session.
    pub metadata: serde_json::Value,
}

impl RoutingOutcome {
    /// Builds the clean-close outcome.
    #[must_use]
    pub fn hangup(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let metadata = serde_json::json!({ "reason": reason.clone() });
        Self {
            success: false,
            ccml: ccml::hangup().render(),
            kind: RoutingKind::Hangup,
            target: None,
            selected_agent: None,
            selected_group: None,
            selected_trunk: None,
            reason: Some(reason),
            metadata,
        }
    }
}

// ============================================================================
// SECTION: Request
// ============================================================================

/// One routing question, as extracted from the initial webhook.
#[derive(Debug, Clone, Copy)]
pub struct RoutingRequest<'call> {
    /// Tenant the call belongs to.
    pub tenant_id: TenantId,
    /// Session token (lock scope).
    pub token: &'call SessionToken,
    /// Calling party number.
    pub caller_id: &'call str,
    /// Called party number.
    pub destination: &'call str,
    /// Correlation id for error logs.
    pub correlation_id: &'call CorrelationId,
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// The routing decision engine.
#[derive(Clone)]
pub struct RoutingEngine {
    /// Tenant configuration directory.
    directory: Arc<dyn RoutingDirectory>,
    /// Shared coordination store (locks and strategy state).
    store: Arc<dyn CoordinationStore>,
    /// Credential decryption seam for authenticated providers.
    vault: Arc<dyn CredentialVault>,
    /// Session lock TTL.
    lock_ttl: Duration,
}

impl RoutingEngine {
    /// Creates an engine with the default 30 s lock TTL.
    #[must_use]
    pub fn new(
        directory: Arc<dyn RoutingDirectory>,
        store: Arc<dyn CoordinationStore>,
        vault: Arc<dyn CredentialVault>,
    ) -> Self {
        Self {
            directory,
            store,
            vault,
            lock_ttl: ROUTING_LOCK_TTL,
        }
    }

    /// Overrides the session lock TTL (deployments tune this via config).
    #[must_use]
    pub fn with_lock_ttl(mut self, lock_ttl: Duration) -> Self {
        self.lock_ttl = lock_ttl;
        self
    }

    /// Decides how to bridge the call; never fails.
    ///
    /// Classification runs first and is caller-id-only: a call whose caller
    /// id matches an enabled outbound rule is outbound and resolves through
    /// the trunk chain exclusively; everything else evaluates inbound rules.
    /// Any internal error logs under the correlation id and collapses to a
    /// hangup.
    #[must_use]
    pub fn decide(&self, request: &RoutingRequest<'_>) -> RoutingOutcome {
        let lock_key = keys::routing_lock(request.tenant_id, request.token);
        let owner = Uuid::new_v4().to_string();
        let locked = match self.store.acquire_lock(&lock_key, &owner, self.lock_ttl) {
            Ok(locked) => locked,
            Err(error) => {
                tracing::warn!(
                    correlation = request.correlation_id.as_str(),
                    %error,
                    "routing lock unavailable, deciding unlocked"
                );
                false
            }
        };
        if !locked {
            tracing::warn!(
                correlation = request.correlation_id.as_str(),
                token = request.token.as_str(),
                "concurrent routing decision for session"
            );
        }
        let outcome = self.decide_inner(request).unwrap_or_else(|error| {
            tracing::error!(
                correlation = request.correlation_id.as_str(),
                token = request.token.as_str(),
                %error,
                "routing decision failed, hanging up cleanly"
            );
            RoutingOutcome::hangup(format!("engine error: {}", error.kind_label()))
        });
        if locked {
            match self.store.release_lock(&lock_key, &owner) {
                Ok(released) => {
                    if !released {
                        tracing::warn!(
                            token = request.token.as_str(),
                            "routing lock expired before release"
                        );
                    }
                }
                Err(error) => {
                    tracing::warn!(%error, "routing lock release failed, left to expire");
                }
            }
        }
        outcome
    }

    /// Fallible decision body wrapped by [`Self::decide`].
    ///
    /// An outbound-classified call never falls through to inbound rules: a
    /// caller-id match alone commits the call to the trunk chain, even when
    /// no outbound rule also matches the destination.
    fn decide_inner(&self, request: &RoutingRequest<'_>) -> Result<RoutingOutcome, EngineError> {
        let outbound_rules = self.directory.outbound_rules(request.tenant_id)?;
        if classify_direction(&outbound_rules, request.caller_id) == CallDirection::OutboundApi {
            let matched =
                match_outbound(&outbound_rules, request.caller_id, request.destination);
            return self.decide_outbound(request, matched);
        }
        let inbound_rules = self.directory.inbound_rules(request.tenant_id)?;
        let Some(rule) = match_inbound(&inbound_rules, request.destination) else {
            return Ok(RoutingOutcome::hangup("no matching inbound rule"));
        };
        match rule.target {
            RouteTarget::Agent(agent_id) => {
                self.decide_agent(request, rule.id.get(), agent_id)
            }
            RouteTarget::Group(group_id) => {
                self.decide_group(request, rule.id.get(), group_id)
            }
        }
    }

    /// Routes to a single agent target.
    fn decide_agent(
        &self,
        request: &RoutingRequest<'_>,
        rule_id: u64,
        agent_id: AgentId,
    ) -> Result<RoutingOutcome, EngineError> {
        let Some(agent) = self.directory.agent(request.tenant_id, agent_id)? else {
            return Ok(RoutingOutcome::hangup(format!("agent {agent_id} not found")));
        };
        ensure_tenant(request.tenant_id, agent.tenant_id)?;
        if !agent.is_routable() {
            return Ok(RoutingOutcome::hangup(format!("agent {agent_id} disabled")));
        }
        let document = ccml::dial_voice_agent(&agent, Some(request.caller_id), &*self.vault)
            .map_err(|error| EngineError::Internal(error.to_string()))?;
        Ok(RoutingOutcome {
            success: true,
            ccml: document.render(),
            kind: RoutingKind::VoiceAgent,
            target: Some(format!("agent:{agent_id}")),
            selected_agent: Some(agent.id),
            selected_group: None,
            selected_trunk: None,
            reason: None,
            metadata: serde_json::json!({
                "rule_id": rule_id,
                "provider": agent.provider.as_str(),
            }),
        })
    }

    /// Routes to a group target through its distribution strategy.
    fn decide_group(
        &self,
        request: &RoutingRequest<'_>,
        rule_id: u64,
        group_id: GroupId,
    ) -> Result<RoutingOutcome, EngineError> {
        let Some(roster) = self.directory.group_roster(request.tenant_id, group_id)? else {
            return Ok(RoutingOutcome::hangup(format!("group {group_id} not found")));
        };
        ensure_tenant(request.tenant_id, roster.group.tenant_id)?;
        if !roster.can_route() {
            return Ok(RoutingOutcome::hangup(format!("group {group_id} cannot route")));
        }
        let strategy = strategy_for(&roster, Arc::clone(&self.store));
        let selected = self.select_with_fallback(request, &roster, strategy.as_ref());
        let Some(agent) = selected else {
            return Ok(RoutingOutcome::hangup(format!("group {group_id} has no selectable member")));
        };
        let document = ccml::dial_group(&agent, Some(request.caller_id), &*self.vault)
            .map_err(|error| EngineError::Internal(error.to_string()))?;
        // Only a synthesized bridge counts against the strategy's accounting.
        if let Err(error) = strategy.record(&roster, &agent) {
            tracing::warn!(
                correlation = request.correlation_id.as_str(),
                group = %group_id,
                %error,
                "strategy record failed, selection accounting degraded"
            );
        }
        Ok(RoutingOutcome {
            success: true,
            ccml: document.render(),
            kind: RoutingKind::AgentGroup,
            target: Some(format!("group:{group_id}")),
            selected_agent: Some(agent.id),
            selected_group: Some(group_id),
            selected_trunk: None,
            reason: None,
            metadata: serde_json::json!({
                "rule_id": rule_id,
                "strategy": strategy.identifier(),
                "provider": agent.provider.as_str(),
            }),
        })
    }

    /// Strategy selection with the degraded random fallback.
    fn select_with_fallback(
        &self,
        request: &RoutingRequest<'_>,
        roster: &GroupRoster,
        strategy: &dyn DistributionStrategy,
    ) -> Option<VoiceAgent> {
        match strategy.select(roster) {
            Ok(selected) => selected,
            Err(error) => {
                tracing::error!(
                    correlation = request.correlation_id.as_str(),
                    strategy = strategy.identifier(),
                    %error,
                    "strategy failed, degrading to random selection"
                );
                random_enabled(roster)
            }
        }
    }

    /// Routes an outbound-classified call to a trunk.
    ///
    /// `rule` is the outbound rule that also matched the destination, when
    /// one exists; its trunk plan is tried first. Whether or not a rule
    /// matched, the chain ends at the tenant's default trunk and then a
    /// hangup — inbound rules are never consulted here.
    fn decide_outbound(
        &self,
        request: &RoutingRequest<'_>,
        rule: Option<&OutboundRule>,
    ) -> Result<RoutingOutcome, EngineError> {
        let plan = rule.map(|rule| &rule.trunk_plan);
        let mut selected: Option<Trunk> = None;
        if let Some(plan) = plan {
            for trunk_id in &plan.trunk_ids {
                if let Some(trunk) = self.directory.trunk(request.tenant_id, *trunk_id)? {
                    ensure_tenant(request.tenant_id, trunk.tenant_id)?;
                    if trunk.enabled {
                        selected = Some(trunk);
                        break;
                    }
                }
            }
        }
        let (kind, trunk) = match selected {
            Some(trunk) => (RoutingKind::OutboundRule, trunk),
            None => match self.directory.default_trunk(request.tenant_id)? {
                Some(trunk) => (RoutingKind::DefaultTrunk, trunk),
                None => {
                    return Ok(RoutingOutcome::hangup("no usable trunk for outbound call"));
                }
            },
        };
        let dial = TrunkDial {
            trunk_ids: vec![trunk.carrier_trunk_id.clone()],
            ring_timeout: plan.and_then(|plan| plan.ring_timeout),
            max_duration: plan.and_then(|plan| plan.max_duration),
        };
        let document =
            ccml::dial_trunk(request.destination, Some(&dial), Some(request.caller_id));
        Ok(RoutingOutcome {
            success: true,
            ccml: document.render(),
            kind,
            target: rule.map(|rule| format!("rule:{}", rule.id)),
            selected_agent: None,
            selected_group: None,
            selected_trunk: Some(trunk.id),
            reason: None,
            metadata: serde_json::json!({
                "rule_id": rule.map(|rule| rule.id.get()),
                "carrier_trunk_id": trunk.carrier_trunk_id,
            }),
        })
    }
}

// ============================================================================
// SECTION: Error Labels
// ============================================================================

/// Label helper kept local so hangup reasons never leak error payloads.
trait KindLabel {
    /// Returns the error's stable kind label.
    fn kind_label(&self) -> &'static str;
}

impl KindLabel for EngineError {
    fn kind_label(&self) -> &'static str {
        use trunkline_core::Classify;
        self.kind().as_str()
    }
}
