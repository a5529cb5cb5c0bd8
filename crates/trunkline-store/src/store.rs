// crates/trunkline-store/src/store.rs
// ============================================================================
// Module: Coordination Store Interface
// Description: Atomic key/value, counter, sorted-set, and lock primitives.
// Purpose: Define the contract every coordination backend must honor.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Every operation here is atomic from the caller's point of view: callers
//! compose correctness from increment-and-read, compare-and-swap, and
//! insert-then-prune, never from read-modify-write sequences of their own.
//! Selection under concurrent updates may observe slightly stale data; what
//! a backend must never allow is a lost counter increment or a lock released
//! by a non-owner.
//!
//! Keys are tenant-scoped strings; the key schema lives with the engine so
//! this crate stays policy-free.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Coordination store failure.
///
/// # Invariants
/// - `Unavailable` is the degradation signal: strategies fall back to random
///   selection and the idempotency ledger degrades to best-effort.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Backend unreachable or timed out.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// An operation hit a key holding a different value shape.
    #[error("wrong value shape at key {key}: expected {expected}, found {found}")]
    WrongShape {
        /// Offending key.
        key: String,
        /// Shape the operation required.
        expected: &'static str,
        /// Shape the key actually holds.
        found: &'static str,
    },
    /// Malformed input or stored data.
    #[error("store data invalid: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Store Contract
// ============================================================================

/// Atomic coordination primitives shared by all webhook workers.
///
/// Implementations must make each method atomic; callers never wrap these in
/// an external lock.
pub trait CoordinationStore: Send + Sync {
    /// Reads a text value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend fails or the key holds a
    /// non-text shape.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Writes a text value, replacing any previous shape.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend fails.
    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Writes a text value only when the key is absent; returns whether the
    /// write happened.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend fails.
    fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    /// Replaces the value only when the current value equals `expected`
    /// (`None` meaning absent); returns whether the swap happened.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend fails.
    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    /// Deletes a key of any shape; returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend fails.
    fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Atomically increments a counter and returns its previous value.
    ///
    /// A missing key counts from zero. The TTL refreshes on every call.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend fails or the key holds a
    /// non-counter shape.
    fn fetch_increment(&self, key: &str, ttl: Option<Duration>) -> Result<u64, StoreError>;

    /// Inserts a scored member into a sorted set, refreshing the key TTL.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend fails or the key holds a
    /// non-set shape.
    fn sorted_insert(
        &self,
        key: &str,
        score: i64,
        member: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError>;

    /// Removes set members with a score strictly below `min_score`; returns
    /// how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend fails or the key holds a
    /// non-set shape.
    fn prune_scores_below(&self, key: &str, min_score: i64) -> Result<u64, StoreError>;

    /// Counts set members with a score at or above `min_score`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend fails or the key holds a
    /// non-set shape.
    fn count_scores_at_least(&self, key: &str, min_score: i64) -> Result<u64, StoreError>;

    /// Refreshes the TTL of an existing key; a missing key is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend fails.
    fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Acquires an owned lock with a TTL; returns whether this owner holds
    /// the lock after the call.
    ///
    /// Re-acquisition by the current owner refreshes the TTL and succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend fails.
    fn acquire_lock(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Releases a lock only when `owner` still holds it; a non-owner release
    /// returns `false` and leaves the lock to expire.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend fails.
    fn release_lock(&self, key: &str, owner: &str) -> Result<bool, StoreError>;
}
