// crates/trunkline-engine/tests/strategy_unit.rs
// ============================================================================
// Module: Distribution Strategy Unit Tests
// Description: Fairness, rotation exactness, failover, and concurrency tests.
// Purpose: Validate the selection properties the routing engine relies on.
// ============================================================================

//! ## Overview
//! Unit-level tests for the three strategies:
//! - Round-robin hands out exactly N turns per agent over k*N selections
//! - Weighted round-robin follows capacities; roster changes reset rotation
//! - Priority picks the highest enabled band, rotating inside it on demand
//! - Load-balanced picks the smallest window and honors per-agent ceilings
//! - Selection returns `None` iff no enabled member exists
//! - Concurrent selections neither skip nor replay rotation slots

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use trunkline_core::AgentId;
use trunkline_core::LoadBalancedSettings;
use trunkline_core::PrioritySettings;
use trunkline_core::RoundRobinSettings;
use trunkline_core::StrategySettings;
use trunkline_engine::strategy_for;
use trunkline_store::CoordinationStore;
use trunkline_store::InMemoryCoordinationStore;

use common::agent;
use common::agent_with;
use common::group;
use common::membership;
use common::roster;
use common::roster_with;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn store() -> Arc<dyn CoordinationStore> {
    Arc::new(InMemoryCoordinationStore::new())
}

fn round_robin(weighted: bool) -> StrategySettings {
    StrategySettings::RoundRobin(RoundRobinSettings {
        weighted_by_capacity: weighted,
    })
}

// ============================================================================
// SECTION: Round-Robin
// ============================================================================

#[test]
fn round_robin_is_exact_over_full_cycles() {
    let store = store();
    let fixture = roster(
        group(1, round_robin(false)),
        vec![agent(1, "a1"), agent(2, "a2"), agent(3, "a3")],
    );
    let strategy = strategy_for(&fixture, Arc::clone(&store));
    let mut counts: HashMap<u64, u32> = HashMap::new();
    for _ in 0 .. 12 {
        let selected = strategy.select(&fixture).expect("select").expect("member exists");
        *counts.entry(selected.id.get()).or_default() += 1;
    }
    assert_eq!(counts.len(), 3);
    for (agent_id, count) in counts {
        assert_eq!(count, 4, "agent {agent_id} must take exactly 4 of 12 turns");
    }
}

#[test]
fn round_robin_follows_insertion_order() {
    let store = store();
    let fixture = roster(
        group(1, round_robin(false)),
        vec![agent(1, "a1"), agent(2, "a2"), agent(3, "a3")],
    );
    let strategy = strategy_for(&fixture, store);
    let order: Vec<u64> = (0 .. 3)
        .map(|_| strategy.select(&fixture).expect("select").expect("member").id.get())
        .collect();
    assert_eq!(order, vec![1, 2, 3], "first cycle walks insertion order");
}

#[test]
fn weighted_round_robin_follows_capacities() {
    let store = store();
    let fixture_group = group(1, round_robin(true));
    let group_id = fixture_group.id;
    let fixture = roster_with(
        fixture_group,
        vec![
            (membership(1, group_id, AgentId::from_raw(1).expect("id"), 50, Some(1)), agent(1, "a1")),
            (membership(2, group_id, AgentId::from_raw(2).expect("id"), 50, Some(2)), agent(2, "a2")),
            (membership(3, group_id, AgentId::from_raw(3).expect("id"), 50, Some(3)), agent(3, "a3")),
        ],
    );
    let strategy = strategy_for(&fixture, store);
    let mut counts: HashMap<u64, u32> = HashMap::new();
    for _ in 0 .. 12 {
        let selected = strategy.select(&fixture).expect("select").expect("member");
        *counts.entry(selected.id.get()).or_default() += 1;
    }
    assert_eq!(counts.get(&1).copied().unwrap_or_default(), 2, "weight 1 of 6");
    assert_eq!(counts.get(&2).copied().unwrap_or_default(), 4, "weight 2 of 6");
    assert_eq!(counts.get(&3).copied().unwrap_or_default(), 6, "weight 3 of 6");
}

#[test]
fn roster_change_resets_rotation() {
    let store = store();
    let fixture = roster(
        group(1, round_robin(false)),
        vec![agent(1, "a1"), agent(2, "a2"), agent(3, "a3")],
    );
    let strategy = strategy_for(&fixture, Arc::clone(&store));
    for _ in 0 .. 2 {
        strategy.select(&fixture).expect("select");
    }
    // Same group, one member swapped out: the fingerprint changes.
    let changed = roster(
        group(1, round_robin(false)),
        vec![agent(1, "a1"), agent(2, "a2"), agent(4, "a4")],
    );
    let first_after_change =
        strategy.select(&changed).expect("select").expect("member");
    assert_eq!(
        first_after_change.id.get(),
        1,
        "rotation restarts at the first member after a roster change"
    );
}

#[test]
fn round_robin_skips_nothing_under_concurrency() {
    let store = store();
    let fixture = Arc::new(roster(
        group(1, round_robin(false)),
        vec![agent(1, "a1"), agent(2, "a2"), agent(3, "a3")],
    ));
    // Prime the roster fingerprint so workers race only on the pointer.
    let strategy = strategy_for(&fixture, Arc::clone(&store));
    strategy.select(&fixture).expect("prime");
    let workers = 6;
    let per_worker = 10;
    let handles: Vec<_> = (0 .. workers)
        .map(|_| {
            let store = Arc::clone(&store);
            let fixture = Arc::clone(&fixture);
            thread::spawn(move || {
                let strategy = strategy_for(&fixture, store);
                let mut picks = Vec::with_capacity(per_worker);
                for _ in 0 .. per_worker {
                    let selected =
                        strategy.select(&fixture).expect("select").expect("member");
                    picks.push(selected.id.get());
                }
                picks
            })
        })
        .collect();
    let mut counts: HashMap<u64, usize> = HashMap::new();
    for handle in handles {
        for pick in handle.join().expect("worker thread") {
            *counts.entry(pick).or_default() += 1;
        }
    }
    // 1 priming + 60 concurrent = 61 selections; with an atomic pointer the
    // per-agent spread over 61 turns is either 20 or 21, never wider.
    let total: usize = counts.values().sum();
    assert_eq!(total, workers * per_worker);
    for (agent_id, count) in counts {
        assert!(
            (20 ..= 21).contains(&count),
            "agent {agent_id} took {count} turns; rotation skipped or replayed a slot"
        );
    }
}

// ============================================================================
// SECTION: Priority
// ============================================================================

#[test]
fn priority_prefers_highest_enabled_band() {
    // Top member disabled: failover to the enabled lower priority.
    let store = store();
    let fixture_group = group(1, StrategySettings::Priority(PrioritySettings::default()));
    let group_id = fixture_group.id;
    let fixture = roster_with(
        fixture_group,
        vec![
            (
                membership(1, group_id, AgentId::from_raw(1).expect("id"), 100, None),
                agent_with(1, "primary", trunkline_core::AgentProvider::Vapi, false),
            ),
            (
                membership(2, group_id, AgentId::from_raw(2).expect("id"), 50, None),
                agent(2, "standby"),
            ),
        ],
    );
    let strategy = strategy_for(&fixture, store);
    let selected = strategy.select(&fixture).expect("select").expect("member");
    assert_eq!(selected.id.get(), 2, "disabled top priority fails over");
}

#[test]
fn priority_ties_use_insertion_order_without_rotation() {
    let store = store();
    let fixture = roster(
        group(1, StrategySettings::Priority(PrioritySettings::default())),
        vec![agent(1, "a1"), agent(2, "a2")],
    );
    let strategy = strategy_for(&fixture, store);
    for _ in 0 .. 4 {
        let selected = strategy.select(&fixture).expect("select").expect("member");
        assert_eq!(selected.id.get(), 1, "without rotation the first insertion wins");
    }
}

#[test]
fn priority_ties_rotate_when_enabled() {
    let store = store();
    let fixture = roster(
        group(
            1,
            StrategySettings::Priority(PrioritySettings {
                round_robin_same_priority: true,
            }),
        ),
        vec![agent(1, "a1"), agent(2, "a2")],
    );
    let strategy = strategy_for(&fixture, store);
    let picks: Vec<u64> = (0 .. 4)
        .map(|_| strategy.select(&fixture).expect("select").expect("member").id.get())
        .collect();
    assert_eq!(picks, vec![1, 2, 1, 2], "same-priority band rotates");
}

// ============================================================================
// SECTION: Load-Balanced
// ============================================================================

#[test]
fn load_balanced_prefers_the_quietest_agent() {
    let store = store();
    let fixture = roster(
        group(
            1,
            StrategySettings::LoadBalanced(LoadBalancedSettings::default()),
        ),
        vec![agent(1, "a1"), agent(2, "a2")],
    );
    let strategy = strategy_for(&fixture, Arc::clone(&store));
    let busy = fixture.members[0].agent.clone();
    for _ in 0 .. 3 {
        strategy.record(&fixture, &busy).expect("record");
    }
    let selected = strategy.select(&fixture).expect("select").expect("member");
    assert_eq!(selected.id.get(), 2, "the unrecorded agent has the smaller window");
}

#[test]
fn load_balanced_stays_fair_when_recording_each_pick() {
    let store = store();
    let fixture = roster(
        group(
            1,
            StrategySettings::LoadBalanced(LoadBalancedSettings::default()),
        ),
        vec![agent(1, "a1"), agent(2, "a2"), agent(3, "a3")],
    );
    let strategy = strategy_for(&fixture, store);
    let mut counts: HashMap<u64, i64> = HashMap::new();
    for _ in 0 .. 30 {
        let selected = strategy.select(&fixture).expect("select").expect("member");
        strategy.record(&fixture, &selected).expect("record");
        *counts.entry(selected.id.get()).or_default() += 1;
    }
    let max = counts.values().copied().max().unwrap_or_default();
    let min = counts.values().copied().min().unwrap_or_default();
    assert!(
        max - min <= 1,
        "recording every pick keeps windows within one call of each other: {counts:?}"
    );
}

#[test]
fn load_balanced_excludes_agents_at_the_ceiling() {
    let store = store();
    let fixture = roster(
        group(
            1,
            StrategySettings::LoadBalanced(LoadBalancedSettings {
                window_hours: 1,
                max_calls_per_agent: Some(2),
            }),
        ),
        vec![agent(1, "a1"), agent(2, "a2")],
    );
    let strategy = strategy_for(&fixture, Arc::clone(&store));
    let capped = fixture.members[0].agent.clone();
    for _ in 0 .. 2 {
        strategy.record(&fixture, &capped).expect("record");
    }
    for _ in 0 .. 5 {
        let selected = strategy.select(&fixture).expect("select").expect("member");
        assert_eq!(selected.id.get(), 2, "an agent at the ceiling is unavailable");
    }
}

#[test]
fn load_balanced_returns_none_when_everyone_is_capped() {
    let store = store();
    let fixture = roster(
        group(
            1,
            StrategySettings::LoadBalanced(LoadBalancedSettings {
                window_hours: 1,
                max_calls_per_agent: Some(1),
            }),
        ),
        vec![agent(1, "a1")],
    );
    let strategy = strategy_for(&fixture, store);
    let only = fixture.members[0].agent.clone();
    strategy.record(&fixture, &only).expect("record");
    assert!(strategy.select(&fixture).expect("select").is_none());
}

// ============================================================================
// SECTION: Empty Rosters
// ============================================================================

#[test]
fn selection_is_none_iff_no_enabled_member() {
    for settings in [
        StrategySettings::LoadBalanced(LoadBalancedSettings::default()),
        StrategySettings::Priority(PrioritySettings::default()),
        round_robin(false),
    ] {
        let store = store();
        let empty = roster(group(1, settings), vec![]);
        let strategy = strategy_for(&empty, Arc::clone(&store));
        assert!(strategy.select(&empty).expect("select").is_none());

        let all_disabled = roster(
            group(2, settings),
            vec![agent_with(1, "a1", trunkline_core::AgentProvider::Vapi, false)],
        );
        let strategy = strategy_for(&all_disabled, store);
        assert!(strategy.select(&all_disabled).expect("select").is_none());
    }
}
