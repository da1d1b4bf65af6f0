// crates/warden-kernel/src/context.rs
// ============================================================================
// Module: Kernel Context
// Description: Shared store handle, clock seam, and error adapters.
// Purpose: Give every kernel component one bootstrap context passed by value.
// Dependencies: warden-core, warden-store-sqlite
// ============================================================================

//! ## Overview
//! The kernel keeps no process-wide mutable state. Every component receives a
//! [`KernelContext`] carrying the store handle and the clock; anything else a
//! component needs is private to it. Store failures surface through a single
//! adapter so audit rows always quote a stable code.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;
use warden_core::AuditSeverity;
use warden_core::Clock;
use warden_core::KernelError;
use warden_core::KernelErrorCode;
use warden_core::TaskAudit;
use warden_core::TaskId;
use warden_core::Timestamp;
use warden_store_sqlite::ControlStore;
use warden_store_sqlite::SqliteStoreError;

// ============================================================================
// SECTION: Context
// ============================================================================

/// Bootstrap context shared by every kernel component.
///
/// # Invariants
/// - Cloning is cheap; the store and clock are reference-counted.
#[derive(Clone)]
pub struct KernelContext {
    /// Control-plane store.
    pub store: ControlStore,
    /// Clock seam for all timestamps.
    pub clock: Arc<dyn Clock>,
}

impl KernelContext {
    /// Creates a context from a store and clock.
    #[must_use]
    pub fn new(store: ControlStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
        }
    }

    /// Returns the current timestamp from the clock seam.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Writes an audit row, ignoring audit-write failures.
    ///
    /// Audit emission must never mask the original failure path, so a failed
    /// audit write is traced and dropped.
    pub fn audit(
        &self,
        task_id: Option<&TaskId>,
        severity: AuditSeverity,
        code: &str,
        message: &str,
        context: Value,
    ) {
        let entry = TaskAudit {
            task_id: task_id.cloned(),
            severity,
            code: code.to_string(),
            message: message.to_string(),
            context,
            recorded_at: self.now(),
        };
        if let Err(err) = self.store.record_audit(&entry) {
            tracing::warn!(code, error = %err, "audit row write failed");
        }
    }
}

// ============================================================================
// SECTION: Error Adapters
// ============================================================================

/// Maps a store failure into a structured kernel error.
#[must_use]
pub fn store_failure(error: SqliteStoreError) -> KernelError {
    KernelError::new(KernelErrorCode::ErrorStoreFailure, error.to_string())
}
