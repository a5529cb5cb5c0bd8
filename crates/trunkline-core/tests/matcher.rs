// crates/trunkline-core/tests/matcher.rs
// ============================================================================
// Module: Pattern Matcher Unit Tests
// Description: Pattern validation, exact/prefix semantics, and rule ordering.
// Purpose: Validate rule evaluation order and the outbound classification.
// ============================================================================

//! ## Overview
//! Unit-level tests for rule evaluation:
//! - Pattern validation bounds (empty, length, character class)
//! - Exact E.164 vs prefix matching, including the `+`-stripped prefix case
//! - Priority-descending, id-ascending evaluation order
//! - Disabled rules never match
//! - Outbound classification by caller-id rule existence

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use trunkline_core::AgentId;
use trunkline_core::CallDirection;
use trunkline_core::InboundRule;
use trunkline_core::OutboundRule;
use trunkline_core::RouteTarget;
use trunkline_core::RuleId;
use trunkline_core::TenantId;
use trunkline_core::TrunkPlan;
use trunkline_core::runtime::MAX_PATTERN_LENGTH;
use trunkline_core::runtime::PatternError;
use trunkline_core::runtime::classify_direction;
use trunkline_core::runtime::match_inbound;
use trunkline_core::runtime::match_outbound;
use trunkline_core::runtime::pattern_matches;
use trunkline_core::runtime::validate_pattern;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn tenant() -> TenantId {
    TenantId::from_raw(1).expect("nonzero tenant id")
}

fn inbound(id: u64, pattern: &str, priority: i32, enabled: bool) -> InboundRule {
    InboundRule {
        id: RuleId::from_raw(id).expect("nonzero rule id"),
        tenant_id: tenant(),
        pattern: pattern.to_string(),
        target: RouteTarget::Agent(AgentId::from_raw(id).expect("nonzero agent id")),
        priority,
        enabled,
    }
}

fn outbound(id: u64, caller: &str, destination: &str, enabled: bool) -> OutboundRule {
    OutboundRule {
        id: RuleId::from_raw(id).expect("nonzero rule id"),
        tenant_id: tenant(),
        caller_id: caller.to_string(),
        destination_pattern: destination.to_string(),
        trunk_plan: TrunkPlan::default(),
        enabled,
    }
}

// ============================================================================
// SECTION: Validation
// ============================================================================

#[test]
fn validation_rejects_empty() {
    assert_eq!(validate_pattern(""), Err(PatternError::Empty));
}

#[test]
fn validation_rejects_over_length() {
    let long = "9".repeat(MAX_PATTERN_LENGTH + 1);
    assert_eq!(validate_pattern(&long), Err(PatternError::TooLong(MAX_PATTERN_LENGTH + 1)));
    let max = "9".repeat(MAX_PATTERN_LENGTH);
    assert_eq!(validate_pattern(&max), Ok(()));
}

#[test]
fn validation_rejects_non_ascii_printable() {
    assert_eq!(validate_pattern("+123\u{7}"), Err(PatternError::NonAsciiPrintable));
    assert_eq!(validate_pattern("+49ü"), Err(PatternError::NonAsciiPrintable));
    assert_eq!(validate_pattern("+1 212"), Ok(()), "space is printable ascii");
}

// ============================================================================
// SECTION: Pattern Semantics
// ============================================================================

#[test]
fn full_e164_matches_by_equality_only() {
    assert!(pattern_matches("+12125550199", "+12125550199"));
    assert!(!pattern_matches("+12125550199", "+121255501"));
    assert!(!pattern_matches("+1212", "+12125550199"), "leading + is never a prefix");
}

#[test]
fn prefix_matches_with_and_without_plus() {
    assert!(pattern_matches("1212", "12125550199"));
    assert!(pattern_matches("1212", "+12125550199"));
    assert!(!pattern_matches("1213", "+12125550199"));
}

// ============================================================================
// SECTION: Rule Ordering
// ============================================================================

#[test]
fn higher_priority_wins() {
    let rules = vec![
        inbound(1, "1212", 1, true),
        inbound(2, "+12125550199", 10, true),
    ];
    let matched = match_inbound(&rules, "+12125550199").expect("a rule matches");
    assert_eq!(matched.id.get(), 2);
}

#[test]
fn priority_ties_break_by_insertion_order() {
    let rules = vec![
        inbound(5, "1212", 3, true),
        inbound(2, "12125", 3, true),
        inbound(9, "121", 3, true),
    ];
    let matched = match_inbound(&rules, "+12125550199").expect("a rule matches");
    assert_eq!(matched.id.get(), 2, "lowest id wins the tie");
}

#[test]
fn disabled_rules_never_match() {
    let rules = vec![inbound(1, "+12125550199", 100, false)];
    assert!(match_inbound(&rules, "+12125550199").is_none());
}

#[test]
fn no_match_returns_none() {
    let rules = vec![inbound(1, "44", 1, true)];
    assert!(match_inbound(&rules, "+12125550199").is_none());
}

// ============================================================================
// SECTION: Outbound Classification
// ============================================================================

#[test]
fn outbound_rule_matches_caller_and_destination() {
    let rules = vec![
        outbound(1, "+19995550100", "44", true),
        outbound(2, "1999", "1", true),
    ];
    let matched =
        match_outbound(&rules, "+19995550100", "+442075550123").expect("rule 1 matches");
    assert_eq!(matched.id.get(), 1);
}

#[test]
fn classification_requires_an_enabled_caller_rule() {
    let rules = vec![outbound(1, "+19995550100", "44", true)];
    assert_eq!(classify_direction(&rules, "+19995550100"), CallDirection::OutboundApi);
    assert_eq!(classify_direction(&rules, "+15555550100"), CallDirection::Inbound);
    let disabled = vec![outbound(1, "+19995550100", "44", false)];
    assert_eq!(classify_direction(&disabled, "+19995550100"), CallDirection::Inbound);
}
