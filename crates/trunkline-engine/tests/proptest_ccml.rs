// crates/trunkline-engine/tests/proptest_ccml.rs
// ============================================================================
// Module: CCML Property-Based Tests
// Description: Property tests for escaping and synthesized-document validity.
// Purpose: Detect panics and invariants across wide input ranges.
// ============================================================================

//! Property-based tests for CCML invariants.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use proptest::prelude::*;
use trunkline_core::AgentCredentials;
use trunkline_core::AgentId;
use trunkline_core::AgentProvider;
use trunkline_core::TenantId;
use trunkline_core::VoiceAgent;
use trunkline_engine::PassthroughVault;
use trunkline_engine::TrunkDial;
use trunkline_engine::dial_trunk;
use trunkline_engine::dial_voice_agent;
use trunkline_engine::validate;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn provider_strategy() -> impl Strategy<Value = AgentProvider> {
    prop::sample::select(AgentProvider::ALL.to_vec())
}

fn agent_for(provider: AgentProvider, service_value: String) -> VoiceAgent {
    VoiceAgent {
        id: AgentId::from_raw(1).expect("nonzero id"),
        tenant_id: TenantId::from_raw(1).expect("nonzero id"),
        name: "prop-agent".to_string(),
        provider,
        service_value,
        credentials: Some(AgentCredentials {
            username: "cipher-user".to_string(),
            password: "cipher-pass".to_string(),
        }),
        enabled: true,
        metadata: serde_json::Value::Null,
    }
}

// ============================================================================
// SECTION: Properties
// ============================================================================

proptest! {
    /// Every synthesized agent dial validates, for every provider and any
    /// service value and caller id.
    #[test]
    fn synthesized_agent_dials_always_validate(
        provider in provider_strategy(),
        service_value in ".{0,48}",
        caller_id in prop::option::of("[+0-9<>&\"' ]{0,20}"),
    ) {
        let agent = agent_for(provider, service_value);
        let document = dial_voice_agent(&agent, caller_id.as_deref(), &PassthroughVault)
            .expect("credentials are always present in this fixture");
        let rendered = document.render();
        prop_assert!(validate(&rendered).is_ok(), "invalid ccml: {rendered}");
    }

    /// Every synthesized trunk dial validates, including hostile
    /// destinations and trunk ids.
    #[test]
    fn synthesized_trunk_dials_always_validate(
        destination in ".{0,32}",
        trunk_ids in prop::collection::vec("[a-zA-Z0-9<&\"-]{1,12}", 0 .. 4),
        ring_timeout in prop::option::of(0_u32 .. 7_200),
        max_duration in prop::option::of(0_u32 .. 86_400),
    ) {
        let dial = TrunkDial {
            trunk_ids,
            ring_timeout,
            max_duration,
        };
        let rendered = dial_trunk(&destination, Some(&dial), None).render();
        prop_assert!(validate(&rendered).is_ok(), "invalid ccml: {rendered}");
    }
}
