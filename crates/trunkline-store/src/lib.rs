// crates/trunkline-store/src/lib.rs
// ============================================================================
// Module: Trunkline Store Library
// Description: Shared coordination store interface and in-memory backend.
// Purpose: Expose the atomic primitives the routing strategies rely on.
// Dependencies: crate::{store, memory, pubsub}
// ============================================================================

//! ## Overview
//! The coordination store is the cross-process surface the distribution
//! strategies, the idempotency ledger, and the session-state cache share:
//! TTL'd keys, atomic counters, compare-and-swap, score-ordered sets, owned
//! locks, and broadcast channels. It is a cache and a coordination surface —
//! the relational store remains the authority, and every consumer must
//! tolerate the store being rebuilt empty.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod memory;
pub mod pubsub;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use self::memory::InMemoryCoordinationStore;
pub use self::pubsub::EventBus;
pub use self::pubsub::EventBusConfig;
pub use self::store::CoordinationStore;
pub use self::store::StoreError;
