// crates/trunkline-core/src/interfaces/mod.rs
// ============================================================================
// Module: Trunkline Interfaces
// Description: Backend-agnostic interfaces for directories and persistence.
// Purpose: Define the contract surfaces the engine and pipeline depend on.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! Interfaces define how the routing engine reaches tenant configuration and
//! call persistence without embedding backend details. Every lookup is
//! parameterized by tenant, so cross-tenant joins are unrepresentable by
//! construction. Implementations must fail closed on missing or invalid
//! data.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod memory;

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::agent::VoiceAgent;
use crate::core::error::Classify;
use crate::core::error::EngineError;
use crate::core::error::ErrorKind;
use crate::core::event::CallEvent;
use crate::core::group::GroupRoster;
use crate::core::identifiers::AgentId;
use crate::core::identifiers::CallSid;
use crate::core::identifiers::GroupId;
use crate::core::identifiers::SessionToken;
use crate::core::identifiers::TenantId;
use crate::core::identifiers::TrunkId;
use crate::core::record::CallRecord;
use crate::core::routing::InboundRule;
use crate::core::routing::OutboundRule;
use crate::core::routing::Trunk;
use crate::core::session::CallSession;
use crate::core::tenant::Tenant;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Directory lookup failure.
///
/// # Invariants
/// - `Unavailable` signals a backend outage; callers may degrade.
#[derive(Debug, Clone, Error)]
pub enum DirectoryError {
    /// Backend unreachable or timed out.
    #[error("directory unavailable: {0}")]
    Unavailable(String),
    /// Stored data failed invariants on load.
    #[error("directory data invalid: {0}")]
    Invalid(String),
}

impl Classify for DirectoryError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Unavailable(_) => ErrorKind::StoreUnavailable,
            Self::Invalid(_) => ErrorKind::Internal,
        }
    }
}

impl From<DirectoryError> for EngineError {
    fn from(error: DirectoryError) -> Self {
        match error {
            DirectoryError::Unavailable(message) => Self::StoreUnavailable(message),
            DirectoryError::Invalid(message) => Self::Internal(message),
        }
    }
}

/// Persistence failure.
///
/// # Invariants
/// - `Unavailable` is retryable through the idempotency ledger.
#[derive(Debug, Clone, Error)]
pub enum RepositoryError {
    /// Backend unreachable or timed out.
    #[error("repository unavailable: {0}")]
    Unavailable(String),
    /// A write violated a storage invariant.
    #[error("repository conflict: {0}")]
    Conflict(String),
    /// Stored data failed invariants on load.
    #[error("repository data invalid: {0}")]
    Invalid(String),
}

impl Classify for RepositoryError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Unavailable(_) => ErrorKind::StoreUnavailable,
            Self::Conflict(_) => ErrorKind::Validation,
            Self::Invalid(_) => ErrorKind::Internal,
        }
    }
}

impl From<RepositoryError> for EngineError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Unavailable(message) => Self::StoreUnavailable(message),
            RepositoryError::Conflict(message) => Self::Validation(message),
            RepositoryError::Invalid(message) => Self::Internal(message),
        }
    }
}

// ============================================================================
// SECTION: Tenant Directory
// ============================================================================

/// Resolves tenants from webhook context.
pub trait TenantDirectory: Send + Sync {
    /// Looks up a tenant by its carrier domain.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the backend fails.
    fn tenant_by_domain(&self, domain: &str) -> Result<Option<Tenant>, DirectoryError>;

    /// Looks up a tenant by id.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the backend fails.
    fn tenant_by_id(&self, tenant_id: TenantId) -> Result<Option<Tenant>, DirectoryError>;
}

// ============================================================================
// SECTION: Routing Directory
// ============================================================================

/// Read access to a tenant's routing configuration.
///
/// Every method takes the tenant explicitly; implementations must never
/// return an entity owned by a different tenant.
pub trait RoutingDirectory: Send + Sync {
    /// Looks up an agent within the tenant.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the backend fails.
    fn agent(&self, tenant_id: TenantId, agent_id: AgentId)
    -> Result<Option<VoiceAgent>, DirectoryError>;

    /// Resolves a group together with its members, insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the backend fails.
    fn group_roster(
        &self,
        tenant_id: TenantId,
        group_id: GroupId,
    ) -> Result<Option<GroupRoster>, DirectoryError>;

    /// Returns the tenant's inbound rules (enabled and disabled).
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the backend fails.
    fn inbound_rules(&self, tenant_id: TenantId) -> Result<Vec<InboundRule>, DirectoryError>;

    /// Returns the tenant's outbound rules (enabled and disabled).
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the backend fails.
    fn outbound_rules(&self, tenant_id: TenantId) -> Result<Vec<OutboundRule>, DirectoryError>;

    /// Looks up a trunk within the tenant.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the backend fails.
    fn trunk(&self, tenant_id: TenantId, trunk_id: TrunkId)
    -> Result<Option<Trunk>, DirectoryError>;

    /// Returns the tenant's default trunk.
    ///
    /// When several trunks claim the default flag, priority descending then
    /// id ascending wins.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the backend fails.
    fn default_trunk(&self, tenant_id: TenantId) -> Result<Option<Trunk>, DirectoryError>;
}

// ============================================================================
// SECTION: Session Repository
// ============================================================================

/// Durable persistence for sessions, events, and call records.
///
/// The relational backend behind this trait is the authority; shared-store
/// copies are caches rebuilt from here on miss.
pub trait SessionRepository: Send + Sync {
    /// Loads a session by token within the tenant.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the backend fails.
    fn load_session(
        &self,
        tenant_id: TenantId,
        token: &SessionToken,
    ) -> Result<Option<CallSession>, RepositoryError>;

    /// Upserts a session keyed by (tenant, token).
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the backend fails.
    fn save_session(&self, session: &CallSession) -> Result<(), RepositoryError>;

    /// Appends one call event to the audit trail.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the backend fails.
    fn append_event(&self, event: &CallEvent) -> Result<(), RepositoryError>;

    /// Returns the events recorded for a session, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the backend fails.
    fn events_for(
        &self,
        tenant_id: TenantId,
        token: &SessionToken,
    ) -> Result<Vec<CallEvent>, RepositoryError>;

    /// Upserts a call record keyed by (tenant, call id).
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the backend fails.
    fn upsert_record(&self, record: &CallRecord) -> Result<(), RepositoryError>;

    /// Loads a call record by (tenant, call id).
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the backend fails.
    fn load_record(
        &self,
        tenant_id: TenantId,
        call_sid: &CallSid,
    ) -> Result<Option<CallRecord>, RepositoryError>;
}
