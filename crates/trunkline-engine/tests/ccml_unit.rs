// crates/trunkline-engine/tests/ccml_unit.rs
// ============================================================================
// Module: CCML Synthesizer Unit Tests
// Description: Rendering, escaping, credentials, and grammar validation.
// Purpose: Hold emitted documents to the carrier's contract.
// ============================================================================

//! ## Overview
//! Unit-level tests for the CCML synthesizer:
//! - Exact rendering of the four entry points
//! - Credential attributes appear iff the provider requires authentication
//! - Text and attribute escaping survives hostile values
//! - The validator accepts everything the synthesizer emits and rejects
//!   grammar violations

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use trunkline_core::AgentCredentials;
use trunkline_core::AgentProvider;
use trunkline_engine::CcmlError;
use trunkline_engine::PassthroughVault;
use trunkline_engine::TrunkDial;
use trunkline_engine::XML_DECLARATION;
use trunkline_engine::dial_trunk;
use trunkline_engine::dial_voice_agent;
use trunkline_engine::hangup;
use trunkline_engine::validate;

use common::agent_with;

// ============================================================================
// SECTION: Rendering
// ============================================================================

#[test]
fn hangup_renders_the_clean_close() {
    let rendered = hangup().render();
    assert_eq!(
        rendered,
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Hangup/></Response>"
    );
    validate(&rendered).expect("hangup validates");
}

#[test]
fn voice_agent_dial_renders_service() {
    let agent = agent_with(1, "front-desk", AgentProvider::Vapi, true);
    let rendered = dial_voice_agent(&agent, Some("+1999"), &PassthroughVault)
        .expect("synthesis")
        .render();
    assert_eq!(
        rendered,
        format!(
            "{XML_DECLARATION}<Response><Dial callerId=\"+1999\">\
             <Service provider=\"vapi\">asst_1</Service></Dial></Response>"
        )
    );
    validate(&rendered).expect("service dial validates");
}

#[test]
fn trunk_dial_renders_number_with_attributes() {
    let dial = TrunkDial {
        trunk_ids: vec!["ct-1".to_string(), "ct-2".to_string()],
        ring_timeout: Some(25),
        max_duration: Some(3_600),
    };
    let rendered = dial_trunk("+442075550123", Some(&dial), Some("+1999")).render();
    assert_eq!(
        rendered,
        format!(
            "{XML_DECLARATION}<Response><Dial callerId=\"+1999\" trunks=\"ct-1,ct-2\" \
             timeout=\"25\" maxDuration=\"3600\"><Number>+442075550123</Number></Dial></Response>"
        )
    );
    validate(&rendered).expect("trunk dial validates");
}

#[test]
fn trunk_dial_omits_empty_attributes() {
    let rendered = dial_trunk("+442075550123", None, None).render();
    assert_eq!(
        rendered,
        format!("{XML_DECLARATION}<Response><Dial><Number>+442075550123</Number></Dial></Response>")
    );
    validate(&rendered).expect("bare trunk dial validates");
}

// ============================================================================
// SECTION: Credentials
// ============================================================================

#[test]
fn authenticated_provider_emits_credentials() {
    let mut agent = agent_with(1, "gateway", AgentProvider::Cognigy, true);
    agent.credentials = Some(AgentCredentials {
        username: "user-cipher".to_string(),
        password: "pass-cipher".to_string(),
    });
    let rendered = dial_voice_agent(&agent, None, &PassthroughVault)
        .expect("synthesis")
        .render();
    assert!(rendered.contains("username=\"user-cipher\""));
    assert!(rendered.contains("password=\"pass-cipher\""));
    validate(&rendered).expect("authenticated dial validates");
}

#[test]
fn authenticated_provider_without_credentials_fails() {
    let agent = agent_with(1, "gateway", AgentProvider::Parloa, true);
    let error = dial_voice_agent(&agent, None, &PassthroughVault)
        .expect_err("credentials are required");
    assert_eq!(error, CcmlError::MissingCredentials("parloa"));
}

#[test]
fn open_provider_never_emits_credentials() {
    let mut agent = agent_with(1, "front-desk", AgentProvider::Retell, true);
    agent.credentials = Some(AgentCredentials {
        username: "stray-user".to_string(),
        password: "stray-pass".to_string(),
    });
    let rendered = dial_voice_agent(&agent, None, &PassthroughVault)
        .expect("synthesis")
        .render();
    assert!(!rendered.contains("username"), "non-auth providers carry no credentials");
    assert!(!rendered.contains("password"));
}

// ============================================================================
// SECTION: Escaping
// ============================================================================

#[test]
fn hostile_values_are_escaped() {
    let mut agent = agent_with(1, "escaper", AgentProvider::Vapi, true);
    agent.service_value = "a<b>&c".to_string();
    let rendered = dial_voice_agent(&agent, Some("\"+1<9>&'"), &PassthroughVault)
        .expect("synthesis")
        .render();
    assert!(rendered.contains("<Service provider=\"vapi\">a&lt;b&gt;&amp;c</Service>"));
    assert!(rendered.contains("callerId=\"&quot;+1&lt;9&gt;&amp;&apos;\""));
    validate(&rendered).expect("escaped document validates");
}

// ============================================================================
// SECTION: Validation
// ============================================================================

#[test]
fn validator_requires_response_root() {
    let error = validate("<Reply><Hangup/></Reply>").expect_err("wrong root");
    assert!(matches!(error, CcmlError::Grammar(_)));
}

#[test]
fn validator_requires_exactly_one_verb() {
    let both = format!("{XML_DECLARATION}<Response><Hangup/><Hangup/></Response>");
    assert!(matches!(validate(&both), Err(CcmlError::Grammar(_))));
    let none = format!("{XML_DECLARATION}<Response></Response>");
    assert!(matches!(validate(&none), Err(CcmlError::Grammar(_))));
}

#[test]
fn validator_requires_exactly_one_dial_leg() {
    let two_legs = format!(
        "{XML_DECLARATION}<Response><Dial><Number>+1</Number><Number>+2</Number></Dial></Response>"
    );
    assert!(matches!(validate(&two_legs), Err(CcmlError::Grammar(_))));
    let no_leg = format!("{XML_DECLARATION}<Response><Dial></Dial></Response>");
    assert!(matches!(validate(&no_leg), Err(CcmlError::Grammar(_))));
}

#[test]
fn validator_rejects_unknown_elements_and_attributes() {
    let stray_element = format!("{XML_DECLARATION}<Response><Play>x</Play></Response>");
    assert!(matches!(validate(&stray_element), Err(CcmlError::Grammar(_))));
    let stray_attribute = format!(
        "{XML_DECLARATION}<Response><Dial volume=\"11\"><Number>+1</Number></Dial></Response>"
    );
    assert!(matches!(validate(&stray_attribute), Err(CcmlError::Grammar(_))));
    let serviceless_provider = format!(
        "{XML_DECLARATION}<Response><Dial><Service>value</Service></Dial></Response>"
    );
    assert!(matches!(validate(&serviceless_provider), Err(CcmlError::Grammar(_))));
}

#[test]
fn validator_rejects_malformed_documents() {
    assert!(matches!(
        validate("<Response><Hangup/>"),
        Err(CcmlError::Malformed(_))
    ));
    assert!(matches!(
        validate("<Response><Dial><Number>+1 & 2</Number></Dial></Response>"),
        Err(CcmlError::Malformed(_))
    ));
}
