// crates/trunkline-engine/tests/idempotency_unit.rs
// ============================================================================
// Module: Idempotency Ledger Unit Tests
// Description: Claim, skip, completion, and retry-after-failure semantics.
// Purpose: Validate at-most-once side effects per event across retries.
// ============================================================================

//! ## Overview
//! Unit-level tests for the idempotency ledger:
//! - First delivery executes, repeats skip
//! - Success leaves a `completed` marker under the TTL
//! - Failure deletes the key so the retry executes again
//! - Concurrent deliveries admit exactly one worker
//! - Derived event ids are stable across identical payloads

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::thread;

use trunkline_core::SessionToken;
use trunkline_core::TenantId;
use trunkline_core::WebhookKind;
use trunkline_engine::ExecutionOutcome;
use trunkline_engine::IdempotencyLedger;
use trunkline_engine::LedgerState;
use trunkline_engine::derive_event_id;
use trunkline_store::InMemoryCoordinationStore;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn ledger() -> (IdempotencyLedger, Arc<InMemoryCoordinationStore>) {
    let store = Arc::new(InMemoryCoordinationStore::new());
    let shared: Arc<dyn trunkline_store::CoordinationStore> =
        store.clone() as Arc<dyn trunkline_store::CoordinationStore>;
    (IdempotencyLedger::new(shared), store)
}

fn key(ledger: &IdempotencyLedger) -> String {
    ledger.key(
        TenantId::from_raw(1).expect("nonzero tenant id"),
        WebhookKind::SessionUpdate,
        &SessionToken::new("s1"),
        &"evt-1".into(),
    )
}

// ============================================================================
// SECTION: Execute-Once
// ============================================================================

#[test]
fn first_delivery_executes_then_repeats_skip() {
    let (ledger, _store) = ledger();
    let key = key(&ledger);
    let runs = AtomicU32::new(0);
    let work = || -> Result<u32, trunkline_core::EngineError> {
        Ok(runs.fetch_add(1, Ordering::SeqCst) + 1)
    };
    let first = ledger.execute_once(&key, work).expect("first run");
    assert_eq!(first, ExecutionOutcome::Executed(1));
    let second = ledger
        .execute_once(&key, || -> Result<u32, trunkline_core::EngineError> {
            Ok(runs.fetch_add(1, Ordering::SeqCst) + 1)
        })
        .expect("duplicate handled");
    assert_eq!(second, ExecutionOutcome::Skipped);
    assert_eq!(runs.load(Ordering::SeqCst), 1, "side effects ran exactly once");
}

#[test]
fn success_marks_completed() {
    let (ledger, _store) = ledger();
    let key = key(&ledger);
    ledger
        .execute_once(&key, || -> Result<(), trunkline_core::EngineError> { Ok(()) })
        .expect("run");
    assert!(ledger.is_processed(&key).expect("processed check"));
}

#[test]
fn failure_deletes_the_key_for_retry() {
    let (ledger, _store) = ledger();
    let key = key(&ledger);
    let failed = ledger.execute_once(&key, || -> Result<(), trunkline_core::EngineError> {
        Err(trunkline_core::EngineError::Internal("boom".to_string()))
    });
    assert!(failed.is_err());
    assert!(
        !ledger.is_processed(&key).expect("processed check"),
        "a failed event must stay retryable"
    );
    let retried = ledger
        .execute_once(&key, || -> Result<u32, trunkline_core::EngineError> { Ok(7) })
        .expect("retry");
    assert_eq!(retried, ExecutionOutcome::Executed(7));
}

#[test]
fn concurrent_deliveries_admit_one_worker() {
    let (ledger, _store) = ledger();
    let key = key(&ledger);
    let runs = Arc::new(AtomicU32::new(0));
    let handles: Vec<_> = (0 .. 8)
        .map(|_| {
            let ledger = ledger.clone();
            let key = key.clone();
            let runs = Arc::clone(&runs);
            thread::spawn(move || {
                ledger
                    .execute_once(&key, move || -> Result<(), trunkline_core::EngineError> {
                        runs.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .expect("run")
            })
        })
        .collect();
    let executed = handles
        .into_iter()
        .map(|handle| handle.join().expect("worker thread"))
        .filter(|outcome| matches!(outcome, ExecutionOutcome::Executed(())))
        .count();
    assert_eq!(executed, 1, "one claim wins");
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

// ============================================================================
// SECTION: Marks
// ============================================================================

#[test]
fn mark_and_is_processed_round_trip() {
    let (ledger, _store) = ledger();
    let key = key(&ledger);
    assert!(!ledger.is_processed(&key).expect("fresh key"));
    ledger.mark(&key, LedgerState::InProgress).expect("mark");
    assert!(ledger.is_processed(&key).expect("marked key"));
}

// ============================================================================
// SECTION: Derived Ids
// ============================================================================

#[test]
fn derived_ids_are_stable_and_kind_scoped() {
    let token = SessionToken::new("s1");
    let subset = serde_json::json!({
        "status": "answer",
        "modified_at": "2026-02-01T10:00:00Z",
    });
    let first = derive_event_id(WebhookKind::SessionUpdate, &token, &subset).expect("derive");
    let second = derive_event_id(WebhookKind::SessionUpdate, &token, &subset).expect("derive");
    assert_eq!(first, second, "identical payloads derive identical ids");
    let other_kind =
        derive_event_id(WebhookKind::CdrCallback, &token, &subset).expect("derive");
    assert_ne!(first, other_kind, "the kind participates in the fingerprint");
    let other_payload = derive_event_id(
        WebhookKind::SessionUpdate,
        &token,
        &serde_json::json!({ "status": "busy" }),
    )
    .expect("derive");
    assert_ne!(first, other_payload);
}

#[test]
fn key_shape_is_tenant_scoped() {
    let (ledger, _store) = ledger();
    let key = key(&ledger);
    assert_eq!(key, "tenant:1:webhook:idem:session_update:s1:evt-1");
}
