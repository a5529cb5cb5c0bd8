// crates/trunkline-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Call Store
// Description: Durable directory and repository backed by SQLite WAL.
// Purpose: Persist tenants, routing config, sessions, events, and records.
// Dependencies: trunkline-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! One database file holds the relational authority: provisioning tables for
//! tenants, agents, groups, memberships, rules, and trunks, plus the call
//! tables the webhook pipeline writes. Sessions and records are stored as
//! JSON snapshots keyed by their natural keys, matching the upsert semantics
//! the pipeline needs; call events are append-only rows.
//!
//! Writes enforce the same invariants the in-memory backend enforces:
//! unique names per tenant, unique (group, agent) pairs, same-tenant
//! memberships, validated patterns, and membership bounds. Loads fail closed
//! on data that no longer deserializes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use thiserror::Error;
use trunkline_core::AgentGroup;
use trunkline_core::AgentId;
use trunkline_core::CallEvent;
use trunkline_core::CallRecord;
use trunkline_core::CallSession;
use trunkline_core::CallSid;
use trunkline_core::DirectoryError;
use trunkline_core::GroupId;
use trunkline_core::GroupRoster;
use trunkline_core::InboundRule;
use trunkline_core::Membership;
use trunkline_core::MembershipError;
use trunkline_core::MembershipId;
use trunkline_core::OutboundRule;
use trunkline_core::RepositoryError;
use trunkline_core::RosterMember;
use trunkline_core::RouteTarget;
use trunkline_core::RoutingDirectory;
use trunkline_core::RuleId;
use trunkline_core::SessionRepository;
use trunkline_core::SessionToken;
use trunkline_core::Tenant;
use trunkline_core::TenantDirectory;
use trunkline_core::TenantId;
use trunkline_core::Trunk;
use trunkline_core::TrunkId;
use trunkline_core::TrunkPlan;
use trunkline_core::VoiceAgent;
use trunkline_core::runtime::validate_pattern;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` call store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding credentials or raw payloads.
#[derive(Debug, Error, Clone)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// A write violated a storage invariant.
    #[error("sqlite store constraint: {0}")]
    Constraint(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// A membership bound was violated.
    #[error(transparent)]
    Membership(#[from] MembershipError),
}

impl From<SqliteStoreError> for DirectoryError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) | SqliteStoreError::Db(message) => {
                Self::Unavailable(message)
            }
            other => Self::Invalid(other.to_string()),
        }
    }
}

impl From<SqliteStoreError> for RepositoryError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) | SqliteStoreError::Db(message) => {
                Self::Unavailable(message)
            }
            SqliteStoreError::Constraint(message) => Self::Conflict(message),
            other => Self::Invalid(other.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed call store.
///
/// # Invariants
/// - Connection access is serialized through a mutex; poisoning is recovered.
/// - Session and record rows deserialize back into the exact saved value.
#[derive(Clone)]
pub struct SqliteCallStore {
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteCallStore {
    /// Opens an `SQLite`-backed call store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        let connection = Connection::open(&config.path)
            .map_err(|err| SqliteStoreError::Io(err.to_string()))?;
        connection
            .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        connection
            .pragma_update(None, "journal_mode", config.journal_mode.pragma_value())
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        connection
            .pragma_update(None, "synchronous", config.sync_mode.pragma_value())
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        connection
            .pragma_update(None, "foreign_keys", "on")
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        initialize_schema(&connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Opens an in-memory database, for tests.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when initialization fails.
    pub fn open_in_memory() -> Result<Self, SqliteStoreError> {
        let connection =
            Connection::open_in_memory().map_err(|err| SqliteStoreError::Io(err.to_string()))?;
        initialize_schema(&connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Locks the connection, recovering from poisoning.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.connection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------
    // Provisioning
    // ------------------------------------------------------------------

    /// Inserts a tenant.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Constraint`] on duplicate id or domain.
    pub fn insert_tenant(&self, tenant: &Tenant) -> Result<(), SqliteStoreError> {
        let guard = self.lock();
        guard
            .execute(
                "INSERT INTO tenants (id, domain, api_key, enabled) VALUES (?1, ?2, ?3, ?4)",
                params![
                    to_db_id(tenant.id.get())?,
                    tenant.domain,
                    tenant.api_key,
                    tenant.enabled
                ],
            )
            .map_err(map_write_error)?;
        Ok(())
    }

    /// Inserts a voice agent.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on duplicates or a missing tenant.
    pub fn insert_agent(&self, agent: &VoiceAgent) -> Result<(), SqliteStoreError> {
        let (username, password) = agent
            .credentials
            .as_ref()
            .map_or((None, None), |creds| {
                (Some(creds.username.clone()), Some(creds.password.clone()))
            });
        let metadata = serde_json::to_string(&agent.metadata)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let guard = self.lock();
        guard
            .execute(
                "INSERT INTO voice_agents
                 (id, tenant_id, name, provider, service_value, cred_username, cred_password, \
                 enabled, metadata_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    to_db_id(agent.id.get())?,
                    to_db_id(agent.tenant_id.get())?,
                    agent.name,
                    agent.provider.as_str(),
                    agent.service_value,
                    username,
                    password,
                    agent.enabled,
                    metadata
                ],
            )
            .map_err(map_write_error)?;
        Ok(())
    }

    /// Inserts an agent group.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on duplicates or a missing tenant.
    pub fn insert_group(&self, group: &AgentGroup) -> Result<(), SqliteStoreError> {
        let strategy = serde_json::to_string(&group.strategy)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let guard = self.lock();
        guard
            .execute(
                "INSERT INTO agent_groups (id, tenant_id, name, strategy_json, enabled)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    to_db_id(group.id.get())?,
                    to_db_id(group.tenant_id.get())?,
                    group.name,
                    strategy,
                    group.enabled
                ],
            )
            .map_err(map_write_error)?;
        Ok(())
    }

    /// Inserts a membership after bound and tenancy checks.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when either side is missing, the pair is
    /// a duplicate, the sides cross tenants, or a bound is violated.
    pub fn insert_membership(&self, membership: &Membership) -> Result<(), SqliteStoreError> {
        let guard = self.lock();
        let group_tenant: Option<i64> = guard
            .query_row(
                "SELECT tenant_id FROM agent_groups WHERE id = ?1",
                params![to_db_id(membership.group_id.get())?],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let agent_tenant: Option<i64> = guard
            .query_row(
                "SELECT tenant_id FROM voice_agents WHERE id = ?1",
                params![to_db_id(membership.agent_id.get())?],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let (Some(group_tenant), Some(agent_tenant)) = (group_tenant, agent_tenant) else {
            return Err(SqliteStoreError::Constraint(
                "membership references a missing group or agent".to_string(),
            ));
        };
        if group_tenant != agent_tenant {
            let group_tenant = parse_tenant_id(group_tenant)?;
            let agent_tenant = parse_tenant_id(agent_tenant)?;
            return Err(SqliteStoreError::Membership(MembershipError::CrossTenant {
                group_tenant,
                agent_tenant,
            }));
        }
        let strategy = load_group_strategy(&guard, membership.group_id)?;
        membership.validate(&strategy)?;
        guard
            .execute(
                "INSERT INTO memberships (id, group_id, agent_id, priority, capacity)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    to_db_id(membership.id.get())?,
                    to_db_id(membership.group_id.get())?,
                    to_db_id(membership.agent_id.get())?,
                    membership.priority,
                    membership.capacity
                ],
            )
            .map_err(map_write_error)?;
        Ok(())
    }

    /// Inserts an inbound rule after pattern validation.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on an invalid pattern or duplicates.
    pub fn insert_inbound_rule(&self, rule: &InboundRule) -> Result<(), SqliteStoreError> {
        validate_pattern(&rule.pattern)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let (target_kind, target_id) = match rule.target {
            RouteTarget::Agent(agent_id) => ("agent", agent_id.get()),
            RouteTarget::Group(group_id) => ("group", group_id.get()),
        };
        let guard = self.lock();
        guard
            .execute(
                "INSERT INTO inbound_rules
                 (id, tenant_id, pattern, target_kind, target_id, priority, enabled)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    to_db_id(rule.id.get())?,
                    to_db_id(rule.tenant_id.get())?,
                    rule.pattern,
                    target_kind,
                    to_db_id(target_id)?,
                    rule.priority,
                    rule.enabled
                ],
            )
            .map_err(map_write_error)?;
        Ok(())
    }

    /// Inserts an outbound rule after pattern validation.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on an invalid pattern or duplicates.
    pub fn insert_outbound_rule(&self, rule: &OutboundRule) -> Result<(), SqliteStoreError> {
        validate_pattern(&rule.caller_id)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        validate_pattern(&rule.destination_pattern)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let plan = serde_json::to_string(&rule.trunk_plan)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let guard = self.lock();
        guard
            .execute(
                "INSERT INTO outbound_rules
                 (id, tenant_id, caller_id, destination_pattern, trunk_plan_json, enabled)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    to_db_id(rule.id.get())?,
                    to_db_id(rule.tenant_id.get())?,
                    rule.caller_id,
                    rule.destination_pattern,
                    plan,
                    rule.enabled
                ],
            )
            .map_err(map_write_error)?;
        Ok(())
    }

    /// Inserts a trunk.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on duplicates or a missing tenant.
    pub fn insert_trunk(&self, trunk: &Trunk) -> Result<(), SqliteStoreError> {
        let configuration = serde_json::to_string(&trunk.configuration)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let guard = self.lock();
        guard
            .execute(
                "INSERT INTO trunks
                 (id, tenant_id, carrier_trunk_id, configuration_json, priority, capacity, \
                 enabled, is_default)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    to_db_id(trunk.id.get())?,
                    to_db_id(trunk.tenant_id.get())?,
                    trunk.carrier_trunk_id,
                    configuration,
                    trunk.priority,
                    trunk.capacity,
                    trunk.enabled,
                    trunk.is_default
                ],
            )
            .map_err(map_write_error)?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Directory Implementations
// ============================================================================

impl TenantDirectory for SqliteCallStore {
    fn tenant_by_domain(&self, domain: &str) -> Result<Option<Tenant>, DirectoryError> {
        let guard = self.lock();
        let row = guard
            .query_row(
                "SELECT id, domain, api_key, enabled FROM tenants WHERE domain = ?1",
                params![domain],
                tenant_from_row,
            )
            .optional()
            .map_err(|err| DirectoryError::Unavailable(err.to_string()))?;
        row.transpose().map_err(DirectoryError::from)
    }

    fn tenant_by_id(&self, tenant_id: TenantId) -> Result<Option<Tenant>, DirectoryError> {
        let guard = self.lock();
        let row = guard
            .query_row(
                "SELECT id, domain, api_key, enabled FROM tenants WHERE id = ?1",
                params![to_db_id_directory(tenant_id.get())?],
                tenant_from_row,
            )
            .optional()
            .map_err(|err| DirectoryError::Unavailable(err.to_string()))?;
        row.transpose().map_err(DirectoryError::from)
    }
}

impl RoutingDirectory for SqliteCallStore {
    fn agent(
        &self,
        tenant_id: TenantId,
        agent_id: AgentId,
    ) -> Result<Option<VoiceAgent>, DirectoryError> {
        let guard = self.lock();
        let row = guard
            .query_row(
                "SELECT id, tenant_id, name, provider, service_value, cred_username, \
                 cred_password, enabled, metadata_json
                 FROM voice_agents WHERE tenant_id = ?1 AND id = ?2",
                params![
                    to_db_id_directory(tenant_id.get())?,
                    to_db_id_directory(agent_id.get())?
                ],
                agent_from_row,
            )
            .optional()
            .map_err(|err| DirectoryError::Unavailable(err.to_string()))?;
        row.transpose().map_err(DirectoryError::from)
    }

    fn group_roster(
        &self,
        tenant_id: TenantId,
        group_id: GroupId,
    ) -> Result<Option<GroupRoster>, DirectoryError> {
        let guard = self.lock();
        let group = guard
            .query_row(
                "SELECT id, tenant_id, name, strategy_json, enabled
                 FROM agent_groups WHERE tenant_id = ?1 AND id = ?2",
                params![
                    to_db_id_directory(tenant_id.get())?,
                    to_db_id_directory(group_id.get())?
                ],
                group_from_row,
            )
            .optional()
            .map_err(|err| DirectoryError::Unavailable(err.to_string()))?;
        let Some(group) = group.transpose().map_err(DirectoryError::from)? else {
            return Ok(None);
        };
        let mut statement = guard
            .prepare(
                "SELECT m.id, m.group_id, m.agent_id, m.priority, m.capacity,
                        a.id, a.tenant_id, a.name, a.provider, a.service_value, \
                        a.cred_username, a.cred_password, a.enabled, a.metadata_json
                 FROM memberships m JOIN voice_agents a ON a.id = m.agent_id
                 WHERE m.group_id = ?1 ORDER BY m.id ASC",
            )
            .map_err(|err| DirectoryError::Unavailable(err.to_string()))?;
        let rows = statement
            .query_map(params![to_db_id_directory(group_id.get())?], |row| {
                let membership = membership_from_row(row)?;
                let agent = agent_from_row_offset(row, 5)?;
                Ok((membership, agent))
            })
            .map_err(|err| DirectoryError::Unavailable(err.to_string()))?;
        let mut members = Vec::new();
        for row in rows {
            let (membership, agent) =
                row.map_err(|err| DirectoryError::Unavailable(err.to_string()))?;
            let membership = membership.map_err(DirectoryError::from)?;
            let agent = agent.map_err(DirectoryError::from)?;
            members.push(RosterMember {
                membership,
                agent,
            });
        }
        Ok(Some(GroupRoster {
            group,
            members,
        }))
    }

    fn inbound_rules(&self, tenant_id: TenantId) -> Result<Vec<InboundRule>, DirectoryError> {
        let guard = self.lock();
        let mut statement = guard
            .prepare(
                "SELECT id, tenant_id, pattern, target_kind, target_id, priority, enabled
                 FROM inbound_rules WHERE tenant_id = ?1 ORDER BY id ASC",
            )
            .map_err(|err| DirectoryError::Unavailable(err.to_string()))?;
        let rows = statement
            .query_map(params![to_db_id_directory(tenant_id.get())?], inbound_rule_from_row)
            .map_err(|err| DirectoryError::Unavailable(err.to_string()))?;
        let mut rules = Vec::new();
        for row in rows {
            let rule = row.map_err(|err| DirectoryError::Unavailable(err.to_string()))?;
            rules.push(rule.map_err(DirectoryError::from)?);
        }
        Ok(rules)
    }

    fn outbound_rules(&self, tenant_id: TenantId) -> Result<Vec<OutboundRule>, DirectoryError> {
        let guard = self.lock();
        let mut statement = guard
            .prepare(
                "SELECT id, tenant_id, caller_id, destination_pattern, trunk_plan_json, enabled
                 FROM outbound_rules WHERE tenant_id = ?1 ORDER BY id ASC",
            )
            .map_err(|err| DirectoryError::Unavailable(err.to_string()))?;
        let rows = statement
            .query_map(params![to_db_id_directory(tenant_id.get())?], outbound_rule_from_row)
            .map_err(|err| DirectoryError::Unavailable(err.to_string()))?;
        let mut rules = Vec::new();
        for row in rows {
            let rule = row.map_err(|err| DirectoryError::Unavailable(err.to_string()))?;
            rules.push(rule.map_err(DirectoryError::from)?);
        }
        Ok(rules)
    }

    fn trunk(
        &self,
        tenant_id: TenantId,
        trunk_id: TrunkId,
    ) -> Result<Option<Trunk>, DirectoryError> {
        let guard = self.lock();
        let row = guard
            .query_row(
                "SELECT id, tenant_id, carrier_trunk_id, configuration_json, priority, \
                 capacity, enabled, is_default
                 FROM trunks WHERE tenant_id = ?1 AND id = ?2",
                params![
                    to_db_id_directory(tenant_id.get())?,
                    to_db_id_directory(trunk_id.get())?
                ],
                trunk_from_row,
            )
            .optional()
            .map_err(|err| DirectoryError::Unavailable(err.to_string()))?;
        row.transpose().map_err(DirectoryError::from)
    }

    fn default_trunk(&self, tenant_id: TenantId) -> Result<Option<Trunk>, DirectoryError> {
        let guard = self.lock();
        let row = guard
            .query_row(
                "SELECT id, tenant_id, carrier_trunk_id, configuration_json, priority, \
                 capacity, enabled, is_default
                 FROM trunks WHERE tenant_id = ?1 AND is_default = 1 AND enabled = 1
                 ORDER BY priority DESC, id ASC LIMIT 1",
                params![to_db_id_directory(tenant_id.get())?],
                trunk_from_row,
            )
            .optional()
            .map_err(|err| DirectoryError::Unavailable(err.to_string()))?;
        row.transpose().map_err(DirectoryError::from)
    }
}

// ============================================================================
// SECTION: Session Repository Implementation
// ============================================================================

impl SessionRepository for SqliteCallStore {
    fn load_session(
        &self,
        tenant_id: TenantId,
        token: &SessionToken,
    ) -> Result<Option<CallSession>, RepositoryError> {
        let guard = self.lock();
        let raw: Option<String> = guard
            .query_row(
                "SELECT session_json FROM call_sessions WHERE tenant_id = ?1 AND token = ?2",
                params![to_db_id_repository(tenant_id.get())?, token.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| RepositoryError::Unavailable(err.to_string()))?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let session: CallSession = serde_json::from_str(&raw)
            .map_err(|err| RepositoryError::Invalid(err.to_string()))?;
        if session.tenant_id != tenant_id || &session.token != token {
            return Err(RepositoryError::Invalid(
                "tenant/token mismatch between key and payload".to_string(),
            ));
        }
        Ok(Some(session))
    }

    fn save_session(&self, session: &CallSession) -> Result<(), RepositoryError> {
        let raw = serde_json::to_string(session)
            .map_err(|err| RepositoryError::Invalid(err.to_string()))?;
        let guard = self.lock();
        guard
            .execute(
                "INSERT INTO call_sessions (tenant_id, token, session_json, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (tenant_id, token) DO UPDATE SET
                   session_json = excluded.session_json,
                   updated_at = excluded.updated_at",
                params![
                    to_db_id_repository(session.tenant_id.get())?,
                    session.token.as_str(),
                    raw,
                    session.received_at.as_unix_millis()
                ],
            )
            .map_err(|err| RepositoryError::Unavailable(err.to_string()))?;
        Ok(())
    }

    fn append_event(&self, event: &CallEvent) -> Result<(), RepositoryError> {
        let raw = serde_json::to_string(event)
            .map_err(|err| RepositoryError::Invalid(err.to_string()))?;
        let guard = self.lock();
        guard
            .execute(
                "INSERT INTO call_events (tenant_id, token, event_json, occurred_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    to_db_id_repository(event.tenant_id.get())?,
                    event.token.as_str(),
                    raw,
                    event.occurred_at.as_unix_millis()
                ],
            )
            .map_err(|err| RepositoryError::Unavailable(err.to_string()))?;
        Ok(())
    }

    fn events_for(
        &self,
        tenant_id: TenantId,
        token: &SessionToken,
    ) -> Result<Vec<CallEvent>, RepositoryError> {
        let guard = self.lock();
        let mut statement = guard
            .prepare(
                "SELECT event_json FROM call_events
                 WHERE tenant_id = ?1 AND token = ?2 ORDER BY seq ASC",
            )
            .map_err(|err| RepositoryError::Unavailable(err.to_string()))?;
        let rows = statement
            .query_map(
                params![to_db_id_repository(tenant_id.get())?, token.as_str()],
                |row| row.get::<_, String>(0),
            )
            .map_err(|err| RepositoryError::Unavailable(err.to_string()))?;
        let mut events = Vec::new();
        for row in rows {
            let raw = row.map_err(|err| RepositoryError::Unavailable(err.to_string()))?;
            let event: CallEvent = serde_json::from_str(&raw)
                .map_err(|err| RepositoryError::Invalid(err.to_string()))?;
            events.push(event);
        }
        Ok(events)
    }

    fn upsert_record(&self, record: &CallRecord) -> Result<(), RepositoryError> {
        let raw = serde_json::to_string(record)
            .map_err(|err| RepositoryError::Invalid(err.to_string()))?;
        let guard = self.lock();
        guard
            .execute(
                "INSERT INTO call_records (tenant_id, call_sid, record_json, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (tenant_id, call_sid) DO UPDATE SET
                   record_json = excluded.record_json,
                   updated_at = excluded.updated_at",
                params![
                    to_db_id_repository(record.tenant_id.get())?,
                    record.call_sid.as_str(),
                    raw,
                    record.ended_at.map_or(0, |ended| ended.as_unix_millis())
                ],
            )
            .map_err(|err| RepositoryError::Unavailable(err.to_string()))?;
        Ok(())
    }

    fn load_record(
        &self,
        tenant_id: TenantId,
        call_sid: &CallSid,
    ) -> Result<Option<CallRecord>, RepositoryError> {
        let guard = self.lock();
        let raw: Option<String> = guard
            .query_row(
                "SELECT record_json FROM call_records WHERE tenant_id = ?1 AND call_sid = ?2",
                params![to_db_id_repository(tenant_id.get())?, call_sid.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| RepositoryError::Unavailable(err.to_string()))?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let record: CallRecord = serde_json::from_str(&raw)
            .map_err(|err| RepositoryError::Invalid(err.to_string()))?;
        Ok(Some(record))
    }
}

// ============================================================================
// SECTION: Schema
// ============================================================================

/// Creates tables and checks the stored schema version.
fn initialize_schema(connection: &Connection) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_meta (
                 id INTEGER PRIMARY KEY CHECK (id = 1),
                 version INTEGER NOT NULL
             );
             CREATE TABLE IF NOT EXISTS tenants (
                 id INTEGER PRIMARY KEY,
                 domain TEXT NOT NULL UNIQUE,
                 api_key TEXT NOT NULL,
                 enabled INTEGER NOT NULL
             );
             CREATE TABLE IF NOT EXISTS voice_agents (
                 id INTEGER PRIMARY KEY,
                 tenant_id INTEGER NOT NULL REFERENCES tenants (id),
                 name TEXT NOT NULL,
                 provider TEXT NOT NULL,
                 service_value TEXT NOT NULL,
                 cred_username TEXT,
                 cred_password TEXT,
                 enabled INTEGER NOT NULL,
                 metadata_json TEXT NOT NULL,
                 UNIQUE (tenant_id, name)
             );
             CREATE TABLE IF NOT EXISTS agent_groups (
                 id INTEGER PRIMARY KEY,
                 tenant_id INTEGER NOT NULL REFERENCES tenants (id),
                 name TEXT NOT NULL,
                 strategy_json TEXT NOT NULL,
                 enabled INTEGER NOT NULL,
                 UNIQUE (tenant_id, name)
             );
             CREATE TABLE IF NOT EXISTS memberships (
                 id INTEGER PRIMARY KEY,
                 group_id INTEGER NOT NULL REFERENCES agent_groups (id),
                 agent_id INTEGER NOT NULL REFERENCES voice_agents (id),
                 priority INTEGER NOT NULL,
                 capacity INTEGER,
                 UNIQUE (group_id, agent_id)
             );
             CREATE TABLE IF NOT EXISTS inbound_rules (
                 id INTEGER PRIMARY KEY,
                 tenant_id INTEGER NOT NULL REFERENCES tenants (id),
                 pattern TEXT NOT NULL,
                 target_kind TEXT NOT NULL,
                 target_id INTEGER NOT NULL,
                 priority INTEGER NOT NULL,
                 enabled INTEGER NOT NULL
             );
             CREATE TABLE IF NOT EXISTS outbound_rules (
                 id INTEGER PRIMARY KEY,
                 tenant_id INTEGER NOT NULL REFERENCES tenants (id),
                 caller_id TEXT NOT NULL,
                 destination_pattern TEXT NOT NULL,
                 trunk_plan_json TEXT NOT NULL,
                 enabled INTEGER NOT NULL
             );
             CREATE TABLE IF NOT EXISTS trunks (
                 id INTEGER PRIMARY KEY,
                 tenant_id INTEGER NOT NULL REFERENCES tenants (id),
                 carrier_trunk_id TEXT NOT NULL,
                 configuration_json TEXT NOT NULL,
                 priority INTEGER NOT NULL,
                 capacity INTEGER,
                 enabled INTEGER NOT NULL,
                 is_default INTEGER NOT NULL
             );
             CREATE TABLE IF NOT EXISTS call_sessions (
                 tenant_id INTEGER NOT NULL REFERENCES tenants (id),
                 token TEXT NOT NULL,
                 session_json TEXT NOT NULL,
                 updated_at INTEGER NOT NULL,
                 PRIMARY KEY (tenant_id, token)
             );
             CREATE TABLE IF NOT EXISTS call_records (
                 tenant_id INTEGER NOT NULL REFERENCES tenants (id),
                 call_sid TEXT NOT NULL,
                 record_json TEXT NOT NULL,
                 updated_at INTEGER NOT NULL,
                 PRIMARY KEY (tenant_id, call_sid)
             );
             CREATE TABLE IF NOT EXISTS call_events (
                 seq INTEGER PRIMARY KEY AUTOINCREMENT,
                 tenant_id INTEGER NOT NULL REFERENCES tenants (id),
                 token TEXT NOT NULL,
                 event_json TEXT NOT NULL,
                 occurred_at INTEGER NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_call_events_session
                 ON call_events (tenant_id, token);",
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let stored: Option<i64> = connection
        .query_row("SELECT version FROM schema_meta WHERE id = 1", [], |row| row.get(0))
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    match stored {
        None => {
            connection
                .execute(
                    "INSERT INTO schema_meta (id, version) VALUES (1, ?1)",
                    params![SCHEMA_VERSION],
                )
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            Ok(())
        }
        Some(version) if version == SCHEMA_VERSION => Ok(()),
        Some(version) => Err(SqliteStoreError::VersionMismatch(format!(
            "stored {version}, supported {SCHEMA_VERSION}"
        ))),
    }
}

/// Rejects directory paths before opening.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path is empty".to_string()));
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(format!(
            "store path {} is a directory",
            path.display()
        )));
    }
    Ok(())
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Converts a u64 identifier to the i64 `SQLite` expects.
fn to_db_id(raw: u64) -> Result<i64, SqliteStoreError> {
    i64::try_from(raw)
        .map_err(|_| SqliteStoreError::Invalid(format!("identifier {raw} exceeds i64")))
}

/// [`to_db_id`] with a [`DirectoryError`] shape.
fn to_db_id_directory(raw: u64) -> Result<i64, DirectoryError> {
    to_db_id(raw).map_err(DirectoryError::from)
}

/// [`to_db_id`] with a [`RepositoryError`] shape.
fn to_db_id_repository(raw: u64) -> Result<i64, RepositoryError> {
    to_db_id(raw).map_err(RepositoryError::from)
}

/// Parses a stored tenant id.
fn parse_tenant_id(raw: i64) -> Result<TenantId, SqliteStoreError> {
    u64::try_from(raw)
        .ok()
        .and_then(TenantId::from_raw)
        .ok_or_else(|| SqliteStoreError::Invalid(format!("stored tenant id {raw} invalid")))
}

/// Maps a constraint violation onto [`SqliteStoreError::Constraint`].
fn map_write_error(error: rusqlite::Error) -> SqliteStoreError {
    match &error {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            SqliteStoreError::Constraint(error.to_string())
        }
        _ => SqliteStoreError::Db(error.to_string()),
    }
}

/// Loads a group's strategy settings for membership validation.
fn load_group_strategy(
    guard: &Connection,
    group_id: GroupId,
) -> Result<trunkline_core::StrategySettings, SqliteStoreError> {
    let raw: String = guard
        .query_row(
            "SELECT strategy_json FROM agent_groups WHERE id = ?1",
            params![to_db_id(group_id.get())?],
            |row| row.get(0),
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    serde_json::from_str(&raw).map_err(|err| SqliteStoreError::Invalid(err.to_string()))
}

/// Row mapper for tenants; inner result carries domain validation.
fn tenant_from_row(
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<Result<Tenant, SqliteStoreError>> {
    let id: i64 = row.get(0)?;
    let domain: String = row.get(1)?;
    let api_key: String = row.get(2)?;
    let enabled: bool = row.get(3)?;
    Ok(parse_tenant_id(id).map(|id| Tenant {
        id,
        domain,
        api_key,
        enabled,
    }))
}

/// Row mapper for agents starting at column 0.
fn agent_from_row(
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<Result<VoiceAgent, SqliteStoreError>> {
    agent_from_row_offset(row, 0)
}

/// Row mapper for agents starting at an arbitrary column offset.
fn agent_from_row_offset(
    row: &rusqlite::Row<'_>,
    offset: usize,
) -> rusqlite::Result<Result<VoiceAgent, SqliteStoreError>> {
    let id: i64 = row.get(offset)?;
    let tenant: i64 = row.get(offset + 1)?;
    let name: String = row.get(offset + 2)?;
    let provider: String = row.get(offset + 3)?;
    let service_value: String = row.get(offset + 4)?;
    let username: Option<String> = row.get(offset + 5)?;
    let password: Option<String> = row.get(offset + 6)?;
    let enabled: bool = row.get(offset + 7)?;
    let metadata: String = row.get(offset + 8)?;
    Ok(build_agent(id, tenant, name, provider, service_value, username, password, enabled, &metadata))
}

/// Builds an agent from raw column values.
#[allow(clippy::too_many_arguments, reason = "Direct column-to-field mapping.")]
fn build_agent(
    id: i64,
    tenant: i64,
    name: String,
    provider: String,
    service_value: String,
    username: Option<String>,
    password: Option<String>,
    enabled: bool,
    metadata: &str,
) -> Result<VoiceAgent, SqliteStoreError> {
    let id = u64::try_from(id)
        .ok()
        .and_then(AgentId::from_raw)
        .ok_or_else(|| SqliteStoreError::Invalid(format!("stored agent id {id} invalid")))?;
    let tenant_id = parse_tenant_id(tenant)?;
    let provider = trunkline_core::AgentProvider::parse(&provider)
        .ok_or_else(|| SqliteStoreError::Invalid(format!("unknown provider {provider:?}")))?;
    let credentials = match (username, password) {
        (Some(username), Some(password)) => Some(trunkline_core::AgentCredentials {
            username,
            password,
        }),
        (None, None) => None,
        _ => {
            return Err(SqliteStoreError::Invalid(
                "credential pair is half-present".to_string(),
            ));
        }
    };
    let metadata = serde_json::from_str(metadata)
        .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    Ok(VoiceAgent {
        id,
        tenant_id,
        name,
        provider,
        service_value,
        credentials,
        enabled,
        metadata,
    })
}

/// Row mapper for groups.
fn group_from_row(
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<Result<AgentGroup, SqliteStoreError>> {
    let id: i64 = row.get(0)?;
    let tenant: i64 = row.get(1)?;
    let name: String = row.get(2)?;
    let strategy: String = row.get(3)?;
    let enabled: bool = row.get(4)?;
    Ok((|| {
        let id = u64::try_from(id)
            .ok()
            .and_then(GroupId::from_raw)
            .ok_or_else(|| SqliteStoreError::Invalid(format!("stored group id {id} invalid")))?;
        let tenant_id = parse_tenant_id(tenant)?;
        let strategy = serde_json::from_str(&strategy)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        Ok(AgentGroup {
            id,
            tenant_id,
            name,
            strategy,
            enabled,
        })
    })())
}

/// Row mapper for memberships.
fn membership_from_row(
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<Result<Membership, SqliteStoreError>> {
    let id: i64 = row.get(0)?;
    let group: i64 = row.get(1)?;
    let agent: i64 = row.get(2)?;
    let priority: u16 = row.get(3)?;
    let capacity: Option<u32> = row.get(4)?;
    Ok((|| {
        let id = u64::try_from(id)
            .ok()
            .and_then(MembershipId::from_raw)
            .ok_or_else(|| {
                SqliteStoreError::Invalid(format!("stored membership id {id} invalid"))
            })?;
        let group_id = u64::try_from(group)
            .ok()
            .and_then(GroupId::from_raw)
            .ok_or_else(|| SqliteStoreError::Invalid(format!("stored group id {group} invalid")))?;
        let agent_id = u64::try_from(agent)
            .ok()
            .and_then(AgentId::from_raw)
            .ok_or_else(|| SqliteStoreError::Invalid(format!("stored agent id {agent} invalid")))?;
        Ok(Membership {
            id,
            group_id,
            agent_id,
            priority,
            capacity,
        })
    })())
}

/// Row mapper for inbound rules.
fn inbound_rule_from_row(
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<Result<InboundRule, SqliteStoreError>> {
    let id: i64 = row.get(0)?;
    let tenant: i64 = row.get(1)?;
    let pattern: String = row.get(2)?;
    let target_kind: String = row.get(3)?;
    let target_id: i64 = row.get(4)?;
    let priority: i32 = row.get(5)?;
    let enabled: bool = row.get(6)?;
    Ok((|| {
        let id = u64::try_from(id)
            .ok()
            .and_then(RuleId::from_raw)
            .ok_or_else(|| SqliteStoreError::Invalid(format!("stored rule id {id} invalid")))?;
        let tenant_id = parse_tenant_id(tenant)?;
        let raw_target = u64::try_from(target_id).ok();
        let target = match target_kind.as_str() {
            "agent" => raw_target.and_then(AgentId::from_raw).map(RouteTarget::Agent),
            "group" => raw_target.and_then(GroupId::from_raw).map(RouteTarget::Group),
            _ => None,
        }
        .ok_or_else(|| {
            SqliteStoreError::Invalid(format!("stored rule target {target_kind}:{target_id} invalid"))
        })?;
        Ok(InboundRule {
            id,
            tenant_id,
            pattern,
            target,
            priority,
            enabled,
        })
    })())
}

/// Row mapper for outbound rules.
fn outbound_rule_from_row(
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<Result<OutboundRule, SqliteStoreError>> {
    let id: i64 = row.get(0)?;
    let tenant: i64 = row.get(1)?;
    let caller_id: String = row.get(2)?;
    let destination_pattern: String = row.get(3)?;
    let plan: String = row.get(4)?;
    let enabled: bool = row.get(5)?;
    Ok((|| {
        let id = u64::try_from(id)
            .ok()
            .and_then(RuleId::from_raw)
            .ok_or_else(|| SqliteStoreError::Invalid(format!("stored rule id {id} invalid")))?;
        let tenant_id = parse_tenant_id(tenant)?;
        let trunk_plan: TrunkPlan = serde_json::from_str(&plan)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        Ok(OutboundRule {
            id,
            tenant_id,
            caller_id,
            destination_pattern,
            trunk_plan,
            enabled,
        })
    })())
}

/// Row mapper for trunks.
fn trunk_from_row(
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<Result<Trunk, SqliteStoreError>> {
    let id: i64 = row.get(0)?;
    let tenant: i64 = row.get(1)?;
    let carrier_trunk_id: String = row.get(2)?;
    let configuration: String = row.get(3)?;
    let priority: i32 = row.get(4)?;
    let capacity: Option<u32> = row.get(5)?;
    let enabled: bool = row.get(6)?;
    let is_default: bool = row.get(7)?;
    Ok((|| {
        let id = u64::try_from(id)
            .ok()
            .and_then(TrunkId::from_raw)
            .ok_or_else(|| SqliteStoreError::Invalid(format!("stored trunk id {id} invalid")))?;
        let tenant_id = parse_tenant_id(tenant)?;
        let configuration = serde_json::from_str(&configuration)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        Ok(Trunk {
            id,
            tenant_id,
            carrier_trunk_id,
            configuration,
            priority,
            capacity,
            enabled,
            is_default,
        })
    })())
}
