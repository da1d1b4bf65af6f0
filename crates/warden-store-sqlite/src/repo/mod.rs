// crates/warden-store-sqlite/src/repo/mod.rs
// ============================================================================
// Module: Repository Helpers
// Description: Per-aggregate repositories over the control store.
// Purpose: Group typed query surfaces and shared row-mapping helpers.
// Dependencies: rusqlite, serde, serde_json
// ============================================================================

//! ## Overview
//! Each submodule extends [`crate::ControlStore`] with the typed operations
//! for one aggregate. Mutations accept explicit timestamps so the store
//! stays deterministic under test clocks; no repository reads wall-clock
//! time.

/// Capability definitions, profiles, grants, escalations, invocation audit.
pub mod capabilities;
/// Checkpoints and idempotency records.
pub mod checkpoints;
/// Decision plans, evaluations, selections, rationales.
pub mod decisions;
/// Event stream with seq allocation and span queries.
pub mod events;
/// Action execution log, side effects, rollback history.
pub mod executions;
/// Policies, quotas, emergency overrides.
pub mod governance;
/// Risk assessments, timeline, trust states and transitions.
pub mod risk;
/// Tasks, lineage, audits.
pub mod tasks;
/// Guardian verdicts.
pub mod verdicts;
/// Work items and leases.
pub mod work_items;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::store::SqliteStoreError;

/// Serializes a value to a JSON column string.
pub(crate) fn to_json_string<T: Serialize>(value: &T) -> Result<String, SqliteStoreError> {
    serde_json::to_string(value).map_err(|err| SqliteStoreError::Invalid(err.to_string()))
}

/// Deserializes a JSON column string into a typed value.
pub(crate) fn from_json_str<T: DeserializeOwned>(raw: &str) -> Result<T, SqliteStoreError> {
    serde_json::from_str(raw).map_err(|err| SqliteStoreError::Corrupt(err.to_string()))
}
