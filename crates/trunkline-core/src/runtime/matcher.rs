// crates/trunkline-core/src/runtime/matcher.rs
// ============================================================================
// Module: Trunkline Pattern Matcher
// Description: Inbound/outbound rule evaluation by priority and pattern.
// Purpose: Pick the first matching rule under the documented ordering.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! A pattern is either a full E.164 number (leading `+`), which matches only
//! by equality, or a prefix, which matches when the number starts with the
//! pattern or with `+` followed by the pattern. Rules evaluate in priority
//! descending order with ties broken by id ascending (insertion order).
//! Matching is pure; callers load the rule set and pass it in.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::routing::InboundRule;
use crate::core::routing::OutboundRule;
use crate::core::session::CallDirection;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted pattern length.
pub const MAX_PATTERN_LENGTH: usize = 24;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Pattern validation failure.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    /// Empty pattern.
    #[error("pattern is empty")]
    Empty,
    /// Pattern longer than [`MAX_PATTERN_LENGTH`].
    #[error("pattern length {0} exceeds {MAX_PATTERN_LENGTH}")]
    TooLong(usize),
    /// Pattern contains a byte outside printable ASCII.
    #[error("pattern contains a non-printable or non-ascii character")]
    NonAsciiPrintable,
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates a rule pattern at configuration time.
///
/// # Errors
///
/// Returns [`PatternError`] for empty, over-long, or non-ASCII-printable
/// patterns.
pub fn validate_pattern(pattern: &str) -> Result<(), PatternError> {
    if pattern.is_empty() {
        return Err(PatternError::Empty);
    }
    if pattern.len() > MAX_PATTERN_LENGTH {
        return Err(PatternError::TooLong(pattern.len()));
    }
    if !pattern.bytes().all(|byte| (0x20 ..= 0x7e).contains(&byte)) {
        return Err(PatternError::NonAsciiPrintable);
    }
    Ok(())
}

// ============================================================================
// SECTION: Matching
// ============================================================================

/// Tests a single pattern against a number.
///
/// A leading `+` makes the pattern a full E.164 number compared by equality;
/// anything else is a prefix that also matches behind the number's `+`.
#[must_use]
pub fn pattern_matches(pattern: &str, number: &str) -> bool {
    if pattern.starts_with('+') {
        return pattern == number;
    }
    if number.starts_with(pattern) {
        return true;
    }
    number.strip_prefix('+').is_some_and(|bare| bare.starts_with(pattern))
}

/// Finds the first enabled inbound rule matching the destination.
///
/// Evaluation order is priority descending, then id ascending. Returns
/// `None` when nothing matches.
#[must_use]
pub fn match_inbound<'rules>(
    rules: &'rules [InboundRule],
    destination: &str,
) -> Option<&'rules InboundRule> {
    let mut ordered: Vec<&InboundRule> = rules.iter().filter(|rule| rule.enabled).collect();
    ordered.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
    ordered.into_iter().find(|rule| pattern_matches(&rule.pattern, destination))
}

/// Finds the first enabled outbound rule matching caller and destination.
///
/// Caller-id patterns use the same exact-or-prefix semantics as destination
/// patterns. Ordering follows the rules' plan priority descending, then id
/// ascending.
#[must_use]
pub fn match_outbound<'rules>(
    rules: &'rules [OutboundRule],
    caller_id: &str,
    destination: &str,
) -> Option<&'rules OutboundRule> {
    let mut ordered: Vec<&OutboundRule> = rules.iter().filter(|rule| rule.enabled).collect();
    ordered.sort_by(|a, b| {
        b.trunk_plan
            .priority
            .unwrap_or(0)
            .cmp(&a.trunk_plan.priority.unwrap_or(0))
            .then(a.id.cmp(&b.id))
    });
    ordered.into_iter().find(|rule| {
        pattern_matches(&rule.caller_id, caller_id)
            && pattern_matches(&rule.destination_pattern, destination)
    })
}

/// Classifies a call's direction from the outbound rule set.
///
/// A call is outbound iff some enabled outbound rule's caller-id pattern
/// matches the incoming caller id; otherwise it is inbound.
#[must_use]
pub fn classify_direction(rules: &[OutboundRule], caller_id: &str) -> CallDirection {
    let outbound = rules
        .iter()
        .filter(|rule| rule.enabled)
        .any(|rule| pattern_matches(&rule.caller_id, caller_id));
    if outbound {
        CallDirection::OutboundApi
    } else {
        CallDirection::Inbound
    }
}
