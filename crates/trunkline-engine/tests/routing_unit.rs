// crates/trunkline-engine/tests/routing_unit.rs
// ============================================================================
// Module: Routing Decision Unit Tests
// Description: Agent targets, group strategies, trunks, and hangup paths.
// Purpose: Validate the decision engine end to end over in-memory backends.
// ============================================================================

//! ## Overview
//! Unit-level tests for the routing decision:
//! - A matched agent rule emits its `<Service>` dial with the caller id
//! - Group targets run their strategy (round-robin order, priority failover)
//! - No match, disabled targets, and empty groups produce clean hangups
//! - Outbound classification selects configured then default trunks
//! - Every emitted document validates against the CCML grammar

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;

use trunkline_core::AgentId;
use trunkline_core::CorrelationId;
use trunkline_core::GroupId;
use trunkline_core::InMemoryDirectory;
use trunkline_core::Membership;
use trunkline_core::MembershipId;
use trunkline_core::PrioritySettings;
use trunkline_core::RouteTarget;
use trunkline_core::RoundRobinSettings;
use trunkline_core::RuleId;
use trunkline_core::SessionToken;
use trunkline_core::StrategySettings;
use trunkline_core::Tenant;
use trunkline_core::TenantId;
use trunkline_core::Trunk;
use trunkline_core::TrunkId;
use trunkline_core::TrunkPlan;
use trunkline_engine::PassthroughVault;
use trunkline_engine::RoutingEngine;
use trunkline_engine::RoutingKind;
use trunkline_engine::RoutingRequest;
use trunkline_engine::validate;
use trunkline_store::InMemoryCoordinationStore;

// ============================================================================
// SECTION: Fixture
// ============================================================================

struct Fixture {
    directory: Arc<InMemoryDirectory>,
    engine: RoutingEngine,
}

fn tenant_id() -> TenantId {
    TenantId::from_raw(1).expect("nonzero tenant id")
}

fn fixture() -> Fixture {
    let directory = Arc::new(InMemoryDirectory::new());
    directory
        .insert_tenant(Tenant {
            id: tenant_id(),
            domain: "acme.example".to_string(),
            api_key: "k".to_string(),
            enabled: true,
        })
        .expect("tenant");
    let store = Arc::new(InMemoryCoordinationStore::new());
    let routing_directory: Arc<dyn trunkline_core::RoutingDirectory> =
        directory.clone() as Arc<dyn trunkline_core::RoutingDirectory>;
    let engine = RoutingEngine::new(routing_directory, store, Arc::new(PassthroughVault));
    Fixture {
        directory,
        engine,
    }
}

fn vapi_agent(id: u64, name: &str, enabled: bool) -> trunkline_core::VoiceAgent {
    trunkline_core::VoiceAgent {
        id: AgentId::from_raw(id).expect("nonzero agent id"),
        tenant_id: tenant_id(),
        name: name.to_string(),
        provider: trunkline_core::AgentProvider::Vapi,
        service_value: format!("asst_{id}"),
        credentials: None,
        enabled,
        metadata: serde_json::Value::Null,
    }
}

fn request<'call>(token: &'call SessionToken, correlation: &'call CorrelationId) -> RoutingRequest<'call> {
    RoutingRequest {
        tenant_id: tenant_id(),
        token,
        caller_id: "+1999",
        destination: "+1234567890",
        correlation_id: correlation,
    }
}

// ============================================================================
// SECTION: Agent Targets
// ============================================================================

#[test]
fn matched_agent_rule_emits_its_service() {
    let fixture = fixture();
    fixture.directory.insert_agent(vapi_agent(1, "front-desk", true)).expect("agent");
    fixture
        .directory
        .insert_inbound_rule(trunkline_core::InboundRule {
            id: RuleId::from_raw(1).expect("rule id"),
            tenant_id: tenant_id(),
            pattern: "+1234567890".to_string(),
            target: RouteTarget::Agent(AgentId::from_raw(1).expect("agent id")),
            priority: 1,
            enabled: true,
        })
        .expect("rule");
    let token = SessionToken::new("s1");
    let correlation = CorrelationId::new("corr-1");
    let outcome = fixture.engine.decide(&request(&token, &correlation));
    assert!(outcome.success);
    assert_eq!(outcome.kind, RoutingKind::VoiceAgent);
    assert!(outcome.ccml.contains("<Service provider=\"vapi\">asst_1</Service>"));
    assert!(outcome.ccml.contains("callerId=\"+1999\""));
    validate(&outcome.ccml).expect("emitted ccml validates");
}

#[test]
fn disabled_agent_hangs_up() {
    let fixture = fixture();
    fixture.directory.insert_agent(vapi_agent(1, "off-duty", false)).expect("agent");
    fixture
        .directory
        .insert_inbound_rule(trunkline_core::InboundRule {
            id: RuleId::from_raw(1).expect("rule id"),
            tenant_id: tenant_id(),
            pattern: "+1234567890".to_string(),
            target: RouteTarget::Agent(AgentId::from_raw(1).expect("agent id")),
            priority: 1,
            enabled: true,
        })
        .expect("rule");
    let token = SessionToken::new("s1");
    let correlation = CorrelationId::new("corr-1");
    let outcome = fixture.engine.decide(&request(&token, &correlation));
    assert!(!outcome.success);
    assert_eq!(outcome.kind, RoutingKind::Hangup);
    assert!(outcome.ccml.contains("<Hangup/>"));
}

// ============================================================================
// SECTION: Group Targets
// ============================================================================

fn seed_group(
    fixture: &Fixture,
    strategy: StrategySettings,
    members: &[(u64, u16, bool)],
) -> GroupId {
    let group_id = GroupId::from_raw(1).expect("group id");
    fixture
        .directory
        .insert_group(trunkline_core::AgentGroup {
            id: group_id,
            tenant_id: tenant_id(),
            name: "pool".to_string(),
            strategy,
            enabled: true,
        })
        .expect("group");
    for (index, (agent_id, priority, enabled)) in members.iter().enumerate() {
        fixture
            .directory
            .insert_agent(vapi_agent(*agent_id, &format!("member-{agent_id}"), *enabled))
            .expect("agent");
        fixture
            .directory
            .insert_membership(Membership {
                id: MembershipId::from_raw(u64::try_from(index).expect("index") + 1)
                    .expect("membership id"),
                group_id,
                agent_id: AgentId::from_raw(*agent_id).expect("agent id"),
                priority: *priority,
                capacity: None,
            })
            .expect("membership");
    }
    fixture
        .directory
        .insert_inbound_rule(trunkline_core::InboundRule {
            id: RuleId::from_raw(10).expect("rule id"),
            tenant_id: tenant_id(),
            pattern: "+1234567890".to_string(),
            target: RouteTarget::Group(group_id),
            priority: 1,
            enabled: true,
        })
        .expect("rule");
    group_id
}

#[test]
fn group_round_robin_walks_members_across_sessions() {
    let fixture = fixture();
    seed_group(
        &fixture,
        StrategySettings::RoundRobin(RoundRobinSettings::default()),
        &[(1, 50, true), (2, 50, true), (3, 50, true)],
    );
    let correlation = CorrelationId::new("corr-rr");
    let mut picks = Vec::new();
    for session in ["s1", "s2", "s3"] {
        let token = SessionToken::new(session);
        let outcome = fixture.engine.decide(&request(&token, &correlation));
        assert!(outcome.success);
        assert_eq!(outcome.kind, RoutingKind::AgentGroup);
        picks.push(outcome.selected_agent.expect("selected agent").get());
    }
    assert_eq!(picks, vec![1, 2, 3], "distinct sessions rotate in insertion order");
}

#[test]
fn group_priority_failover_selects_the_enabled_standby() {
    let fixture = fixture();
    seed_group(
        &fixture,
        StrategySettings::Priority(PrioritySettings::default()),
        &[(1, 100, false), (2, 50, true)],
    );
    let token = SessionToken::new("s1");
    let correlation = CorrelationId::new("corr-prio");
    let outcome = fixture.engine.decide(&request(&token, &correlation));
    assert!(outcome.success);
    assert_eq!(outcome.selected_agent.expect("selected agent").get(), 2);
    assert!(outcome.ccml.contains("asst_2"), "the standby's service value is emitted");
}

#[test]
fn group_with_no_enabled_member_hangs_up() {
    let fixture = fixture();
    seed_group(
        &fixture,
        StrategySettings::RoundRobin(RoundRobinSettings::default()),
        &[(1, 50, false)],
    );
    let token = SessionToken::new("s1");
    let correlation = CorrelationId::new("corr-empty");
    let outcome = fixture.engine.decide(&request(&token, &correlation));
    assert!(!outcome.success);
    assert_eq!(outcome.kind, RoutingKind::Hangup);
}

// ============================================================================
// SECTION: No Match
// ============================================================================

#[test]
fn no_matching_rule_emits_the_exact_hangup_body() {
    let fixture = fixture();
    let token = SessionToken::new("s1");
    let correlation = CorrelationId::new("corr-none");
    let outcome = fixture.engine.decide(&request(&token, &correlation));
    assert!(!outcome.success);
    assert_eq!(
        outcome.ccml,
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Hangup/></Response>"
    );
}

// ============================================================================
// SECTION: Outbound
// ============================================================================

fn seed_trunk(fixture: &Fixture, id: u64, carrier_id: &str, enabled: bool, is_default: bool) {
    fixture
        .directory
        .insert_trunk(Trunk {
            id: TrunkId::from_raw(id).expect("trunk id"),
            tenant_id: tenant_id(),
            carrier_trunk_id: carrier_id.to_string(),
            configuration: serde_json::Value::Null,
            priority: 0,
            capacity: None,
            enabled,
            is_default,
        })
        .expect("trunk");
}

#[test]
fn outbound_rule_uses_the_first_enabled_trunk() {
    let fixture = fixture();
    seed_trunk(&fixture, 1, "ct-down", false, false);
    seed_trunk(&fixture, 2, "ct-up", true, false);
    fixture
        .directory
        .insert_outbound_rule(trunkline_core::OutboundRule {
            id: RuleId::from_raw(1).expect("rule id"),
            tenant_id: tenant_id(),
            caller_id: "+1999".to_string(),
            destination_pattern: "1".to_string(),
            trunk_plan: TrunkPlan {
                trunk_ids: vec![
                    TrunkId::from_raw(1).expect("trunk id"),
                    TrunkId::from_raw(2).expect("trunk id"),
                ],
                ring_timeout: Some(20),
                max_duration: None,
                priority: None,
            },
            enabled: true,
        })
        .expect("rule");
    let token = SessionToken::new("s1");
    let correlation = CorrelationId::new("corr-out");
    let outcome = fixture.engine.decide(&request(&token, &correlation));
    assert!(outcome.success);
    assert_eq!(outcome.kind, RoutingKind::OutboundRule);
    assert_eq!(outcome.selected_trunk.expect("trunk").get(), 2);
    assert!(outcome.ccml.contains("trunks=\"ct-up\""));
    assert!(outcome.ccml.contains("timeout=\"20\""));
    assert!(outcome.ccml.contains("<Number>+1234567890</Number>"));
    validate(&outcome.ccml).expect("emitted ccml validates");
}

#[test]
fn outbound_falls_back_to_the_default_trunk() {
    let fixture = fixture();
    seed_trunk(&fixture, 1, "ct-down", false, false);
    seed_trunk(&fixture, 2, "ct-default", true, true);
    fixture
        .directory
        .insert_outbound_rule(trunkline_core::OutboundRule {
            id: RuleId::from_raw(1).expect("rule id"),
            tenant_id: tenant_id(),
            caller_id: "+1999".to_string(),
            destination_pattern: "1".to_string(),
            trunk_plan: TrunkPlan {
                trunk_ids: vec![TrunkId::from_raw(1).expect("trunk id")],
                ring_timeout: None,
                max_duration: None,
                priority: None,
            },
            enabled: true,
        })
        .expect("rule");
    let token = SessionToken::new("s1");
    let correlation = CorrelationId::new("corr-out");
    let outcome = fixture.engine.decide(&request(&token, &correlation));
    assert!(outcome.success);
    assert_eq!(outcome.kind, RoutingKind::DefaultTrunk);
    assert!(outcome.ccml.contains("trunks=\"ct-default\""));
}

#[test]
fn outbound_classification_never_falls_through_to_inbound_rules() {
    // Classification is caller-id-only: this rule matches the caller but not
    // the destination, so no outbound rule resolves fully — yet the call is
    // outbound and must take the trunk chain, not the inbound rule that does
    // match the destination.
    let fixture = fixture();
    fixture.directory.insert_agent(vapi_agent(1, "front-desk", true)).expect("agent");
    fixture
        .directory
        .insert_inbound_rule(trunkline_core::InboundRule {
            id: RuleId::from_raw(1).expect("rule id"),
            tenant_id: tenant_id(),
            pattern: "+1234567890".to_string(),
            target: RouteTarget::Agent(AgentId::from_raw(1).expect("agent id")),
            priority: 1,
            enabled: true,
        })
        .expect("rule");
    fixture
        .directory
        .insert_outbound_rule(trunkline_core::OutboundRule {
            id: RuleId::from_raw(2).expect("rule id"),
            tenant_id: tenant_id(),
            caller_id: "+1999".to_string(),
            destination_pattern: "44".to_string(),
            trunk_plan: TrunkPlan::default(),
            enabled: true,
        })
        .expect("rule");
    let token = SessionToken::new("s1");
    let correlation = CorrelationId::new("corr-classify");
    let outcome = fixture.engine.decide(&request(&token, &correlation));
    assert!(!outcome.success, "no trunk exists, so the chain ends in a hangup");
    assert_eq!(outcome.kind, RoutingKind::Hangup);
    assert!(
        outcome.selected_agent.is_none(),
        "the matching inbound rule must never be consulted for an outbound call"
    );
    assert!(!outcome.ccml.contains("<Service"), "body: {}", outcome.ccml);

    // With a default trunk present, the same call resolves through the
    // outbound fallback chain.
    seed_trunk(&fixture, 1, "ct-default", true, true);
    let token = SessionToken::new("s2");
    let outcome = fixture.engine.decide(&request(&token, &correlation));
    assert!(outcome.success);
    assert_eq!(outcome.kind, RoutingKind::DefaultTrunk);
    assert!(outcome.ccml.contains("trunks=\"ct-default\""));
    assert!(outcome.ccml.contains("<Number>+1234567890</Number>"));
    assert!(outcome.selected_agent.is_none());
    validate(&outcome.ccml).expect("emitted ccml validates");
}

#[test]
fn outbound_without_any_usable_trunk_hangs_up() {
    let fixture = fixture();
    fixture
        .directory
        .insert_outbound_rule(trunkline_core::OutboundRule {
            id: RuleId::from_raw(1).expect("rule id"),
            tenant_id: tenant_id(),
            caller_id: "+1999".to_string(),
            destination_pattern: "1".to_string(),
            trunk_plan: TrunkPlan::default(),
            enabled: true,
        })
        .expect("rule");
    let token = SessionToken::new("s1");
    let correlation = CorrelationId::new("corr-out");
    let outcome = fixture.engine.decide(&request(&token, &correlation));
    assert!(!outcome.success);
    assert_eq!(outcome.kind, RoutingKind::Hangup);
}
