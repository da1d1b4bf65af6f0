// crates/warden-kernel/src/telemetry.rs
// ============================================================================
// Module: Kernel Telemetry
// Description: Lightweight counters for kernel operations.
// Purpose: Provide metric snapshots without hard exporter dependencies.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! This module exposes a thin counter surface for kernel operations. It is
//! intentionally dependency-light so downstream deployments can plug in
//! Prometheus or OpenTelemetry without redesign; the server serializes the
//! snapshot directly.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Counters
// ============================================================================

/// Shared kernel operation counters.
///
/// # Invariants
/// - Counters only increase; snapshots are point-in-time reads.
#[derive(Debug, Default)]
pub struct KernelMetrics {
    /// Events emitted.
    events_emitted: AtomicU64,
    /// Actions executed (terminal outcomes).
    actions_executed: AtomicU64,
    /// Authorization denials.
    auth_denials: AtomicU64,
    /// Policy denials.
    policy_denials: AtomicU64,
    /// Recovery sweeps run.
    sweeps_run: AtomicU64,
    /// Tasks reaching a terminal status.
    tasks_finished: AtomicU64,
}

/// Serializable snapshot of [`KernelMetrics`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Events emitted.
    pub events_emitted: u64,
    /// Actions executed.
    pub actions_executed: u64,
    /// Authorization denials.
    pub auth_denials: u64,
    /// Policy denials.
    pub policy_denials: u64,
    /// Recovery sweeps run.
    pub sweeps_run: u64,
    /// Tasks reaching a terminal status.
    pub tasks_finished: u64,
}

impl KernelMetrics {
    /// Creates a shared metrics handle.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Increments the emitted-event counter.
    pub fn incr_events(&self) {
        self.events_emitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the executed-action counter.
    pub fn incr_actions(&self) {
        self.actions_executed.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the authorization-denial counter.
    pub fn incr_auth_denials(&self) {
        self.auth_denials.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the policy-denial counter.
    pub fn incr_policy_denials(&self) {
        self.policy_denials.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the sweep counter.
    pub fn incr_sweeps(&self) {
        self.sweeps_run.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the finished-task counter.
    pub fn incr_tasks_finished(&self) {
        self.tasks_finished.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time snapshot.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
            actions_executed: self.actions_executed.load(Ordering::Relaxed),
            auth_denials: self.auth_denials.load(Ordering::Relaxed),
            policy_denials: self.policy_denials.load(Ordering::Relaxed),
            sweeps_run: self.sweeps_run.load(Ordering::Relaxed),
            tasks_finished: self.tasks_finished.load(Ordering::Relaxed),
        }
    }
}
