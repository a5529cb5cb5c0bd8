// crates/trunkline-store-sqlite/src/lib.rs
// ============================================================================
// Module: Trunkline SQLite Store Library
// Description: Public API surface for the durable relational backend.
// Purpose: Expose the SQLite-backed directory and repository.
// Dependencies: crate::store
// ============================================================================

//! ## Overview
//! The `SQLite` store is the authority behind every engine interface: tenant
//! resolution, routing configuration, and call persistence. The shared
//! coordination store only ever caches what lives here.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use self::store::SqliteCallStore;
pub use self::store::SqliteStoreConfig;
pub use self::store::SqliteStoreError;
pub use self::store::SqliteStoreMode;
pub use self::store::SqliteSyncMode;
