// crates/trunkline-server/src/config.rs
// ============================================================================
// Module: Server Configuration
// Description: TOML configuration for the webhook server and its stores.
// Purpose: Load, default, and validate deployment settings in one place.
// Dependencies: serde, toml, trunkline-store-sqlite
// ============================================================================

//! ## Overview
//! Configuration is a TOML file with three tables: `[server]` for the HTTP
//! transport, `[store]` for the relational backend and event bus, and
//! `[engine]` for coordination TTLs. Every field has a deployment-safe
//! default; validation rejects values that would make the webhook contract
//! unobservable (a zero body cap, an unparsable bind address).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;
use trunkline_store_sqlite::SqliteStoreConfig;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation failure.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("config read failed: {0}")]
    Read(String),
    /// The TOML could not be parsed.
    #[error("config parse failed: {0}")]
    Parse(String),
    /// A value failed validation.
    #[error("config invalid: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Tables
// ============================================================================

/// HTTP transport settings.
///
/// # Invariants
/// - `bind` parses as a socket address.
/// - `max_body_bytes` and `request_timeout_ms` are greater than zero.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the webhook listener.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum accepted webhook body size.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Total per-request deadline for inbound webhooks, in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Storage settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Relational backend configuration.
    pub sqlite: SqliteStoreConfig,
    /// Buffered messages per event-bus channel.
    #[serde(default = "default_channel_capacity")]
    pub event_channel_capacity: usize,
}

/// Engine coordination settings.
///
/// # Invariants
/// - TTLs are greater than zero.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Per-session routing lock TTL in seconds.
    #[serde(default = "default_lock_ttl_secs")]
    pub routing_lock_ttl_secs: u64,
    /// Idempotency ledger TTL in hours.
    #[serde(default = "default_ledger_ttl_hours")]
    pub idempotency_ttl_hours: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            routing_lock_ttl_secs: default_lock_ttl_secs(),
            idempotency_ttl_hours: default_ledger_ttl_hours(),
        }
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, Deserialize)]
pub struct TrunklineConfig {
    /// HTTP transport settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage settings.
    pub store: StoreConfig,
    /// Engine coordination settings.
    #[serde(default)]
    pub engine: EngineConfig,
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Returns the default bind address (loopback only).
fn default_bind() -> String {
    "127.0.0.1:8085".to_string()
}

/// Returns the default webhook body cap.
const fn default_max_body_bytes() -> usize {
    64 * 1024
}

/// Returns the default inbound webhook deadline (10 s).
const fn default_request_timeout_ms() -> u64 {
    10_000
}

/// Returns the default event-bus channel capacity.
const fn default_channel_capacity() -> usize {
    256
}

/// Returns the default routing lock TTL (30 s).
const fn default_lock_ttl_secs() -> u64 {
    30
}

/// Returns the default idempotency TTL (24 h).
const fn default_ledger_ttl_hours() -> u64 {
    24
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl TrunklineConfig {
    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file is unreadable, unparsable, or
    /// invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw =
            std::fs::read_to_string(path).map_err(|err| ConfigError::Read(err.to_string()))?;
        let config: Self =
            toml::from_str(&raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Builds a configuration around a database path, for embedding.
    #[must_use]
    pub fn for_database(path: PathBuf) -> Self {
        Self {
            server: ServerConfig::default(),
            store: StoreConfig {
                sqlite: SqliteStoreConfig {
                    path,
                    busy_timeout_ms: 5_000,
                    journal_mode: trunkline_store_sqlite::SqliteStoreMode::Wal,
                    sync_mode: trunkline_store_sqlite::SqliteSyncMode::Full,
                },
                event_channel_capacity: default_channel_capacity(),
            },
            engine: EngineConfig::default(),
        }
    }

    /// Validates field-level invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] on the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server
            .bind
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::Invalid(format!("bind address {:?}", self.server.bind)))?;
        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_body_bytes must be greater than zero".to_string(),
            ));
        }
        if self.server.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.store.event_channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_channel_capacity must be greater than zero".to_string(),
            ));
        }
        if self.engine.routing_lock_ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "routing_lock_ttl_secs must be greater than zero".to_string(),
            ));
        }
        if self.engine.idempotency_ttl_hours == 0 {
            return Err(ConfigError::Invalid(
                "idempotency_ttl_hours must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
