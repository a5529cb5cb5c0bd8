// crates/trunkline-server/tests/webhook_pipeline.rs
// ============================================================================
// Module: Webhook Pipeline Integration Tests
// Description: End-to-end webhook scenarios over in-memory backends.
// Purpose: Validate the ingestion contract the carrier observes.
// ============================================================================

//! ## Overview
//! Integration tests for the webhook pipeline, driving the same handlers the
//! HTTP transport calls:
//! - Agent routing emits the expected `<Service>` body
//! - Sequential sessions round-robin across a group in insertion order
//! - Priority failover selects the enabled standby
//! - Identical session updates apply exactly once (state, event row, publish)
//! - An illegal transition leaves the session unchanged and publishes nothing
//! - An unmatched destination answers the exact hangup document
//! - CDR callbacks upsert one record per call id across retries

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeMap;
use std::sync::Arc;

use trunkline_core::AgentId;
use trunkline_core::CallState;
use trunkline_core::Disposition;
use trunkline_core::GroupId;
use trunkline_core::InMemoryDirectory;
use trunkline_core::InMemorySessionRepository;
use trunkline_core::Membership;
use trunkline_core::MembershipId;
use trunkline_core::PrioritySettings;
use trunkline_core::RouteTarget;
use trunkline_core::RoundRobinSettings;
use trunkline_core::RuleId;
use trunkline_core::SessionRepository;
use trunkline_core::SessionToken;
use trunkline_core::StrategySettings;
use trunkline_core::Tenant;
use trunkline_core::TenantId;
use trunkline_core::WebhookKind;
use trunkline_engine::PassthroughVault;
use trunkline_server::config::TrunklineConfig;
use trunkline_server::pipeline::WebhookPipeline;
use trunkline_server::webhook::ApplicationRequestPayload;
use trunkline_server::webhook::CdrCallbackPayload;
use trunkline_server::webhook::SessionUpdatePayload;
use trunkline_server::webhook::decode_body;

// ============================================================================
// SECTION: Fixture
// ============================================================================

struct Fixture {
    directory: Arc<InMemoryDirectory>,
    repository: Arc<InMemorySessionRepository>,
    pipeline: Arc<WebhookPipeline>,
    bus: Arc<trunkline_store::EventBus>,
    tenant: Tenant,
}

fn tenant_id() -> TenantId {
    TenantId::from_raw(1).expect("nonzero tenant id")
}

fn fixture() -> Fixture {
    let directory = Arc::new(InMemoryDirectory::new());
    let repository = Arc::new(InMemorySessionRepository::new());
    let tenant = Tenant {
        id: tenant_id(),
        domain: "acme.example".to_string(),
        api_key: "secret".to_string(),
        enabled: true,
    };
    directory.insert_tenant(tenant.clone()).expect("tenant");
    let config = TrunklineConfig::for_database("unused.db".into());
    let tenants: Arc<dyn trunkline_core::TenantDirectory> =
        directory.clone() as Arc<dyn trunkline_core::TenantDirectory>;
    let routing: Arc<dyn trunkline_core::RoutingDirectory> =
        directory.clone() as Arc<dyn trunkline_core::RoutingDirectory>;
    let sessions: Arc<dyn trunkline_core::SessionRepository> =
        repository.clone() as Arc<dyn trunkline_core::SessionRepository>;
    let assembled =
        trunkline_server::assemble(&config, tenants, routing, sessions, Arc::new(PassthroughVault));
    Fixture {
        directory,
        repository,
        pipeline: assembled.pipeline,
        bus: assembled.bus,
        tenant,
    }
}

fn headers() -> BTreeMap<String, String> {
    BTreeMap::from([("x-cx-domain".to_string(), "acme.example".to_string())])
}

fn vapi_agent(id: u64, name: &str, enabled: bool) -> trunkline_core::VoiceAgent {
    trunkline_core::VoiceAgent {
        id: AgentId::from_raw(id).expect("agent id"),
        tenant_id: tenant_id(),
        name: name.to_string(),
        provider: trunkline_core::AgentProvider::Vapi,
        service_value: format!("asst_{id}"),
        credentials: None,
        enabled,
        metadata: serde_json::Value::Null,
    }
}

fn seed_agent_rule(fixture: &Fixture) {
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
}

fn application_request(fixture: &Fixture, call_sid: &str, session: &str) -> String {
    let body = format!(
        "CallSid={call_sid}&From=%2B1999&To=%2B1234567890&Direction=inbound&Session={session}"
    );
    let raw = decode_body(Some("application/x-www-form-urlencoded"), body.as_bytes())
        .expect("decode form body");
    let payload = ApplicationRequestPayload::from_value(&raw).expect("payload");
    fixture
        .pipeline
        .handle_application_request(&fixture.tenant, &payload, &raw, &headers())
        .expect("application request")
}

fn session_update(fixture: &Fixture, id: &str, token: &str, status: &str) {
    let raw = serde_json::json!({
        "id": id,
        "token": token,
        "domain": "acme.example",
        "callerId": "+1999",
        "destination": "+1234567890",
        "status": status,
        "callStartTime": 1_700_000_000_000_i64,
        "modifiedAt": "2026-02-01T10:00:00Z",
        "answerTime": 1_700_000_010_000_i64,
    });
    let payload = SessionUpdatePayload::from_value(&raw).expect("payload");
    fixture
        .pipeline
        .handle_session_update(&fixture.tenant, &payload, &raw, &headers())
        .expect("session update");
}

// ============================================================================
// SECTION: Scenario — Agent Routing
// ============================================================================

#[test]
fn agent_routing_emits_the_service_dial() {
    let fixture = fixture();
    seed_agent_rule(&fixture);
    let body = application_request(&fixture, "c1", "s1");
    assert!(body.contains("<Service provider=\"vapi\">asst_1</Service>"), "body: {body}");
    assert!(body.contains("callerId=\"+1999\""));
    let session = fixture
        .repository
        .load_session(tenant_id(), &SessionToken::new("s1"))
        .expect("load")
        .expect("present");
    assert_eq!(session.state, CallState::Connecting);
    assert_eq!(session.assigned_agent.map(AgentId::get), Some(1));
    trunkline_core::verify_integrity(&session).expect("state matches history");
}

// ============================================================================
// SECTION: Scenario — Group Round-Robin
// ============================================================================

#[test]
fn sequential_sessions_round_robin_in_insertion_order() {
    let fixture = fixture();
    let group_id = GroupId::from_raw(1).expect("group id");
    fixture
        .directory
        .insert_group(trunkline_core::AgentGroup {
            id: group_id,
            tenant_id: tenant_id(),
            name: "pool".to_string(),
            strategy: StrategySettings::RoundRobin(RoundRobinSettings::default()),
            enabled: true,
        })
        .expect("group");
    for agent_id in 1_u64 ..= 3 {
        fixture
            .directory
            .insert_agent(vapi_agent(agent_id, &format!("member-{agent_id}"), true))
            .expect("agent");
        fixture
            .directory
            .insert_membership(Membership {
                id: MembershipId::from_raw(agent_id).expect("membership id"),
                group_id,
                agent_id: AgentId::from_raw(agent_id).expect("agent id"),
                priority: 50,
                capacity: None,
            })
            .expect("membership");
    }
    fixture
        .directory
        .insert_inbound_rule(trunkline_core::InboundRule {
            id: RuleId::from_raw(1).expect("rule id"),
            tenant_id: tenant_id(),
            pattern: "+1234567890".to_string(),
            target: RouteTarget::Group(group_id),
            priority: 1,
            enabled: true,
        })
        .expect("rule");
    let bodies: Vec<String> = (1 ..= 3)
        .map(|index| application_request(&fixture, &format!("c{index}"), &format!("s{index}")))
        .collect();
    assert!(bodies[0].contains("asst_1"), "first session takes the first member");
    assert!(bodies[1].contains("asst_2"), "second session takes the second member");
    assert!(bodies[2].contains("asst_3"), "third session takes the third member");
}

// ============================================================================
// SECTION: Scenario — Priority Failover
// ============================================================================

#[test]
fn priority_failover_routes_to_the_enabled_standby() {
    let fixture = fixture();
    let group_id = GroupId::from_raw(1).expect("group id");
    fixture
        .directory
        .insert_group(trunkline_core::AgentGroup {
            id: group_id,
            tenant_id: tenant_id(),
            name: "pool".to_string(),
            strategy: StrategySettings::Priority(PrioritySettings::default()),
            enabled: true,
        })
        .expect("group");
    for (membership_id, agent_id, priority, enabled) in
        [(1_u64, 1_u64, 100_u16, false), (2, 2, 50, true)]
    {
        fixture
            .directory
            .insert_agent(vapi_agent(agent_id, &format!("member-{agent_id}"), enabled))
            .expect("agent");
        fixture
            .directory
            .insert_membership(Membership {
                id: MembershipId::from_raw(membership_id).expect("membership id"),
                group_id,
                agent_id: AgentId::from_raw(agent_id).expect("agent id"),
                priority,
                capacity: None,
            })
            .expect("membership");
    }
    fixture
        .directory
        .insert_inbound_rule(trunkline_core::InboundRule {
            id: RuleId::from_raw(1).expect("rule id"),
            tenant_id: tenant_id(),
            pattern: "+1234567890".to_string(),
            target: RouteTarget::Group(group_id),
            priority: 1,
            enabled: true,
        })
        .expect("rule");
    let body = application_request(&fixture, "c1", "s1");
    assert!(body.contains("asst_2"), "the enabled standby's service value is emitted: {body}");
}

// ============================================================================
// SECTION: Scenario — Idempotent Update
// ============================================================================

#[tokio::test]
async fn identical_session_updates_apply_exactly_once() {
    let fixture = fixture();
    seed_agent_rule(&fixture);
    application_request(&fixture, "c1", "s1");
    let mut calls = fixture.bus.subscribe("tenant.1.calls");
    // Two byte-identical updates: same carrier event id.
    session_update(&fixture, "evt-1", "s1", "answer");
    session_update(&fixture, "evt-1", "s1", "answer");
    let session = fixture
        .repository
        .load_session(tenant_id(), &SessionToken::new("s1"))
        .expect("load")
        .expect("present");
    assert_eq!(session.state, CallState::Connected, "the session answered exactly once");
    let update_events: Vec<_> = fixture
        .repository
        .events_for(tenant_id(), &SessionToken::new("s1"))
        .expect("events")
        .into_iter()
        .filter(|event| event.kind == WebhookKind::SessionUpdate)
        .collect();
    assert_eq!(update_events.len(), 1, "one audit row for the pair");
    let first = calls.try_recv().expect("one update published");
    assert!(first.contains("\"call.updated\""), "message: {first}");
    assert!(calls.try_recv().is_err(), "the duplicate published nothing");
}

// ============================================================================
// SECTION: Scenario — Illegal Transition
// ============================================================================

#[tokio::test]
async fn illegal_transition_drops_with_a_warning() {
    let fixture = fixture();
    let mut calls = fixture.bus.subscribe("tenant.1.calls");
    // No prior application request: the session opens in `received`, and a
    // status mapping to `completed` has no legal path from there.
    session_update(&fixture, "evt-1", "s1", "completed");
    let session = fixture
        .repository
        .load_session(tenant_id(), &SessionToken::new("s1"))
        .expect("load");
    if let Some(session) = session {
        assert_eq!(session.state, CallState::Received, "the session did not move");
    }
    assert!(calls.try_recv().is_err(), "nothing was published");
}

// ============================================================================
// SECTION: Scenario — Hangup On No Match
// ============================================================================

#[test]
fn unmatched_destination_answers_the_exact_hangup_document() {
    let fixture = fixture();
    let body = application_request(&fixture, "c1", "s1");
    assert_eq!(
        body,
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Hangup/></Response>"
    );
    let session = fixture
        .repository
        .load_session(tenant_id(), &SessionToken::new("s1"))
        .expect("load")
        .expect("present");
    assert_eq!(session.state, CallState::Failed, "unroutable sessions settle terminally");
}

// ============================================================================
// SECTION: CDR Finalization
// ============================================================================

#[test]
fn cdr_retries_converge_on_one_record() {
    let fixture = fixture();
    let raw = serde_json::json!({
        "call_id": "c1",
        "from": "+1999",
        "to": "+1234567890",
        "domain": "acme.example",
        "disposition": "ANSWERED",
        "duration": 95,
        "billsec": 85,
        "session": {
            "token": "s1",
            "callStartTime": 1_700_000_000_000_i64,
            "answerTime": 1_700_000_010_000_i64,
            "endTime": 1_700_000_095_000_i64,
        },
    });
    let payload = CdrCallbackPayload::from_value(&raw).expect("payload");
    fixture.pipeline.handle_cdr(&fixture.tenant, &payload, &raw, &headers()).expect("first");
    fixture.pipeline.handle_cdr(&fixture.tenant, &payload, &raw, &headers()).expect("retry");
    let record = fixture
        .repository
        .load_record(tenant_id(), &trunkline_core::CallSid::new("c1"))
        .expect("load")
        .expect("present");
    assert_eq!(record.disposition, Disposition::Answer);
    assert_eq!(record.billed_seconds, 85);
    assert_eq!(record.raw_payload, raw, "the carrier payload is stored verbatim");
    let cdr_events: Vec<_> = fixture
        .repository
        .events_for(tenant_id(), &SessionToken::new("s1"))
        .expect("events")
        .into_iter()
        .filter(|event| event.kind == WebhookKind::CdrCallback)
        .collect();
    assert_eq!(cdr_events.len(), 1, "the retry was deduplicated");
}
