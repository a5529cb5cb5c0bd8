// crates/trunkline-engine/src/lib.rs
// ============================================================================
// Module: Trunkline Engine Library
// Description: Routing decision, strategies, idempotency, CCML, events.
// Purpose: Expose the engine surfaces the webhook pipeline composes.
// Dependencies: trunkline-core, trunkline-store
// ============================================================================

//! ## Overview
//! The engine crate turns tenant configuration plus one webhook into a
//! carrier answer: the matcher finds a rule, a distribution strategy picks
//! an agent, the synthesizer renders CCML, and the idempotency ledger keeps
//! side effects at-most-once per event. Everything here is synchronous and
//! store-coordinated; HTTP lives in the server crate.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod ccml;
pub mod cdr;
pub mod idempotency;
pub mod keys;
pub mod publisher;
pub mod routing;
pub mod secrets;
pub mod session_cache;
pub mod strategy;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use self::ccml::CcmlDocument;
pub use self::ccml::CcmlError;
pub use self::ccml::TrunkDial;
pub use self::ccml::XML_DECLARATION;
pub use self::ccml::dial_group;
pub use self::ccml::dial_trunk;
pub use self::ccml::dial_voice_agent;
pub use self::ccml::hangup;
pub use self::ccml::validate;
pub use self::cdr::CdrFinalization;
pub use self::cdr::CdrFinalizer;
pub use self::idempotency::ExecutionOutcome;
pub use self::idempotency::IdempotencyLedger;
pub use self::idempotency::LEDGER_TTL;
pub use self::idempotency::LedgerState;
pub use self::idempotency::derive_event_id;
pub use self::publisher::EventName;
pub use self::publisher::EventPublisher;
pub use self::routing::ROUTING_LOCK_TTL;
pub use self::routing::RoutingEngine;
pub use self::routing::RoutingKind;
pub use self::routing::RoutingOutcome;
pub use self::routing::RoutingRequest;
pub use self::secrets::CredentialVault;
pub use self::secrets::PassthroughVault;
pub use self::secrets::SecretError;
pub use self::session_cache::SessionSnapshot;
pub use self::session_cache::SessionStateCache;
pub use self::strategy::DistributionStrategy;
pub use self::strategy::LoadBalancedStrategy;
pub use self::strategy::PriorityStrategy;
pub use self::strategy::RoundRobinStrategy;
pub use self::strategy::StrategyError;
pub use self::strategy::random_enabled;
pub use self::strategy::strategy_for;
