// crates/trunkline-core/tests/proptest_matcher.rs
// ============================================================================
// Module: Matcher Property-Based Tests
// Description: Property tests for pattern matching and validation stability.
// Purpose: Detect panics and invariants across wide input ranges.
// ============================================================================

//! Property-based tests for pattern semantics.

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
use trunkline_core::runtime::MAX_PATTERN_LENGTH;
use trunkline_core::runtime::pattern_matches;
use trunkline_core::runtime::validate_pattern;

proptest! {
    /// Validation never panics and accepts exactly printable-ASCII patterns
    /// within the length bound.
    #[test]
    fn validation_is_total(pattern in ".{0,40}") {
        let verdict = validate_pattern(&pattern);
        let expected_ok = !pattern.is_empty()
            && pattern.len() <= MAX_PATTERN_LENGTH
            && pattern.bytes().all(|byte| (0x20 ..= 0x7e).contains(&byte));
        prop_assert_eq!(verdict.is_ok(), expected_ok);
    }

    /// A prefix pattern matches every extension of itself, bare or with `+`.
    #[test]
    fn prefix_matches_own_extensions(
        prefix in "[0-9]{1,8}",
        suffix in "[0-9]{0,8}",
    ) {
        let bare = format!("{prefix}{suffix}");
        let plussed = format!("+{prefix}{suffix}");
        prop_assert!(pattern_matches(&prefix, &bare));
        prop_assert!(pattern_matches(&prefix, &plussed));
    }

    /// An exact E.164 pattern matches only its own number.
    #[test]
    fn exact_pattern_matches_only_itself(
        number in "[0-9]{4,12}",
        other in "[0-9]{4,12}",
    ) {
        let pattern = format!("+{number}");
        prop_assert!(pattern_matches(&pattern, &pattern));
        let candidate = format!("+{other}");
        prop_assert_eq!(pattern_matches(&pattern, &candidate), pattern == candidate);
    }

    /// Matching never panics on arbitrary inputs.
    #[test]
    fn matching_is_total(pattern in ".{0,32}", number in ".{0,32}") {
        let _ = pattern_matches(&pattern, &number);
    }
}
