// crates/warden-store-sqlite/src/lib.rs
// ============================================================================
// Module: Warden SQLite Store Crate Root
// Description: Durable control-plane store backed by SQLite WAL.
// Purpose: Provide transactional primitives to every kernel component.
// Dependencies: rusqlite, serde, serde_json, thiserror, tracing, warden-core
// ============================================================================

//! ## Overview
//! `warden-store-sqlite` persists every aggregate of the control plane in a
//! single SQLite database. Mutations are serialized through one writer
//! connection; reads run concurrently under WAL. A strict `schema_vNN.sql`
//! migration ladder brings any database forward, and triggers enforce the
//! immutability of append-only tables and the trust transition cycle at the
//! storage layer.

// ============================================================================
// SECTION: Modules
// ============================================================================

/// Migration ladder driver.
pub mod migrations;
/// Per-aggregate repositories.
pub mod repo;
/// Connection management and the single-writer discipline.
pub mod store;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use crate::migrations::CURRENT_SCHEMA_VERSION;
pub use crate::repo::capabilities::InvocationOutcome;
pub use crate::repo::checkpoints::IdempotencyClaim;
pub use crate::repo::governance::QuotaCharge;
pub use crate::store::ControlStore;
pub use crate::store::SqliteJournalMode;
pub use crate::store::SqliteStoreConfig;
pub use crate::store::SqliteStoreError;
pub use crate::store::SqliteSyncMode;
