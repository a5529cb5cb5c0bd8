// crates/trunkline-core/src/core/mod.rs
// ============================================================================
// Module: Trunkline Core Types
// Description: Data model for tenants, agents, groups, rules, trunks, and calls.
// Purpose: Re-export the core entity types from one place.
// Dependencies: crate::core submodules
// ============================================================================

//! ## Overview
//! The core module holds the pure data model: identifiers, entities, the
//! call state taxonomy with its carrier mappings, and shared helpers for
//! time and hashing. Behavior (the state machine, the matcher) lives in
//! [`crate::runtime`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod agent;
pub mod error;
pub mod event;
pub mod group;
pub mod hashing;
pub mod identifiers;
pub mod record;
pub mod routing;
pub mod session;
pub mod tenant;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use self::agent::AgentCredentials;
pub use self::agent::AgentProvider;
pub use self::agent::VoiceAgent;
pub use self::error::Classify;
pub use self::error::EngineError;
pub use self::error::ErrorKind;
pub use self::error::ensure_tenant;
pub use self::event::CallEvent;
pub use self::event::ProcessingOutcome;
pub use self::event::WebhookKind;
pub use self::group::AgentGroup;
pub use self::group::GroupRoster;
pub use self::group::LoadBalancedSettings;
pub use self::group::Membership;
pub use self::group::MembershipError;
pub use self::group::PrioritySettings;
pub use self::group::RosterMember;
pub use self::group::RoundRobinSettings;
pub use self::group::StrategySettings;
pub use self::hashing::HashError;
pub use self::hashing::canonical_json_bytes;
pub use self::hashing::hash_canonical_json;
pub use self::hashing::sha256_hex;
pub use self::identifiers::AgentId;
pub use self::identifiers::CallSid;
pub use self::identifiers::CorrelationId;
pub use self::identifiers::EventId;
pub use self::identifiers::GroupId;
pub use self::identifiers::MembershipId;
pub use self::identifiers::RuleId;
pub use self::identifiers::SessionToken;
pub use self::identifiers::TenantId;
pub use self::identifiers::TrunkId;
pub use self::record::CallRecord;
pub use self::record::Disposition;
pub use self::routing::InboundRule;
pub use self::routing::OutboundRule;
pub use self::routing::RouteTarget;
pub use self::routing::Trunk;
pub use self::routing::TrunkPlan;
pub use self::session::CallDirection;
pub use self::session::CallSession;
pub use self::session::CallState;
pub use self::session::CarrierStatus;
pub use self::session::HistoryEntry;
pub use self::session::map_carrier_status;
pub use self::tenant::Tenant;
pub use self::time::TimeParseError;
pub use self::time::Timestamp;
