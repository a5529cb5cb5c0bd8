// crates/trunkline-server/src/lib.rs
// ============================================================================
// Module: Trunkline Server Library
// Description: Webhook ingestion pipeline and HTTP transport.
// Purpose: Expose the pipeline, auth, config, and server assembly.
// Dependencies: trunkline-core, trunkline-engine, trunkline-store, axum
// ============================================================================

//! ## Overview
//! The server crate is the carrier-facing edge: it authenticates webhook
//! posts, parses their bodies, drives the engine through the idempotency
//! ledger, and always answers with a body the carrier can act on. The
//! [`bootstrap`] helper wires a full pipeline around the durable store so
//! the CLI and tests assemble identically.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod auth;
pub mod config;
pub mod pipeline;
pub mod server;
pub mod telemetry;
pub mod webhook;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use trunkline_core::RoutingDirectory;
use trunkline_core::SessionRepository;
use trunkline_core::TenantDirectory;
use trunkline_engine::CdrFinalizer;
use trunkline_engine::CredentialVault;
use trunkline_engine::EventPublisher;
use trunkline_engine::IdempotencyLedger;
use trunkline_engine::PassthroughVault;
use trunkline_engine::RoutingEngine;
use trunkline_engine::SessionStateCache;
use trunkline_store::CoordinationStore;
use trunkline_store::EventBus;
use trunkline_store::EventBusConfig;
use trunkline_store::InMemoryCoordinationStore;

use crate::config::TrunklineConfig;
use crate::pipeline::WebhookPipeline;
use crate::telemetry::NoopMetrics;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use self::config::ConfigError;
pub use self::server::ServerState;
pub use self::server::router;
pub use self::server::serve;

// ============================================================================
// SECTION: Assembly
// ============================================================================

/// Everything [`bootstrap`] wires together, for callers that need the parts.
pub struct Assembled {
    /// The webhook pipeline.
    pub pipeline: Arc<WebhookPipeline>,
    /// Tenant resolution for the auth layer.
    pub tenants: Arc<dyn TenantDirectory>,
    /// The shared event bus (dashboards subscribe here).
    pub bus: Arc<EventBus>,
    /// The shared coordination store.
    pub store: Arc<dyn CoordinationStore>,
}

/// Wires a pipeline around explicit backends.
///
/// The CLI passes the `SQLite` store for all three directory seams; tests
/// pass in-memory backends.
#[must_use]
pub fn assemble(
    config: &TrunklineConfig,
    tenants: Arc<dyn TenantDirectory>,
    directory: Arc<dyn RoutingDirectory>,
    repository: Arc<dyn SessionRepository>,
    vault: Arc<dyn CredentialVault>,
) -> Assembled {
    let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
    let bus = Arc::new(EventBus::new(EventBusConfig {
        channel_capacity: config.store.event_channel_capacity,
    }));
    let ledger = IdempotencyLedger::with_ttl(
        Arc::clone(&store),
        Duration::from_secs(config.engine.idempotency_ttl_hours.saturating_mul(3_600)),
    );
    let engine =
        RoutingEngine::new(Arc::clone(&directory), Arc::clone(&store), Arc::clone(&vault))
            .with_lock_ttl(Duration::from_secs(config.engine.routing_lock_ttl_secs));
    let publisher = EventPublisher::new(Arc::clone(&bus));
    let finalizer = CdrFinalizer::new(Arc::clone(&repository));
    let cache = SessionStateCache::new(Arc::clone(&store));
    let pipeline = Arc::new(WebhookPipeline::new(
        repository,
        directory,
        engine,
        ledger,
        publisher,
        finalizer,
        cache,
        vault,
        Arc::new(NoopMetrics),
    ));
    Assembled {
        pipeline,
        tenants,
        bus,
        store,
    }
}

/// Wires the full pipeline around the durable `SQLite` store.
///
/// # Errors
///
/// Returns an error string when the store cannot be opened.
pub fn bootstrap(config: &TrunklineConfig) -> Result<Assembled, String> {
    let store = trunkline_store_sqlite::SqliteCallStore::open(&config.store.sqlite)
        .map_err(|err| format!("sqlite store open failed: {err}"))?;
    let store = Arc::new(store);
    let tenants: Arc<dyn TenantDirectory> = store.clone() as Arc<dyn TenantDirectory>;
    let directory: Arc<dyn RoutingDirectory> = store.clone() as Arc<dyn RoutingDirectory>;
    let repository: Arc<dyn SessionRepository> = store.clone() as Arc<dyn SessionRepository>;
    Ok(assemble(config, tenants, directory, repository, Arc::new(PassthroughVault)))
}
