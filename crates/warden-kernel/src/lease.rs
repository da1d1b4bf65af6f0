// crates/warden-kernel/src/lease.rs
// ============================================================================
// Module: Lease Manager
// Description: Acquire, heartbeat, release, and sweep work-item leases.
// Purpose: Enforce single-writer-per-item with bounded retry acquisition.
// Dependencies: warden-core, warden-store-sqlite
// ============================================================================

//! ## Overview
//! All lease state lives in the work item row; operations here are thin,
//! atomic conditional updates. A caller that loses its lease must abandon
//! pending work: `heartbeat` returning `Err(ERROR_LEASE_LOST)` is the signal
//! to unwind. The sweep frees expired items for the recovery loop.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use warden_core::KernelError;
use warden_core::KernelErrorCode;
use warden_core::OwnerId;
use warden_core::Timestamp;
use warden_core::WorkItemId;

use crate::context::KernelContext;
use crate::context::store_failure;

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default lease TTL in milliseconds (five minutes).
pub const DEFAULT_LEASE_TTL_MS: i64 = 300_000;
/// Bounded acquisition retries before giving up.
const ACQUIRE_MAX_ATTEMPTS: u32 = 5;
/// Base backoff between acquisition attempts.
const ACQUIRE_BACKOFF_BASE_MS: u64 = 25;

// ============================================================================
// SECTION: Lease Manager
// ============================================================================

/// Lease operations over work items.
///
/// # Invariants
/// - At most one non-expired owner exists per work item at any instant; the
///   conditional updates in the store guarantee this.
#[derive(Clone)]
pub struct LeaseManager {
    /// Shared kernel context.
    ctx: KernelContext,
    /// Lease TTL in milliseconds.
    ttl_ms: i64,
}

impl LeaseManager {
    /// Creates a lease manager with the given TTL.
    #[must_use]
    pub const fn new(ctx: KernelContext, ttl_ms: i64) -> Self {
        Self {
            ctx,
            ttl_ms,
        }
    }

    /// Returns the configured TTL in milliseconds.
    #[must_use]
    pub const fn ttl_ms(&self) -> i64 {
        self.ttl_ms
    }

    /// Attempts a single lease acquisition.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] when the store write fails; a lost race is the
    /// `Ok(false)` outcome.
    pub fn try_acquire(&self, item: &WorkItemId, owner: &OwnerId) -> Result<bool, KernelError> {
        self.ctx
            .store
            .try_acquire_lease(item, owner, self.ttl_ms, self.ctx.now())
            .map_err(store_failure)
    }

    /// Acquires a lease with bounded exponential backoff.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] with [`KernelErrorCode::ErrorLeaseLost`] when
    /// every attempt loses the race.
    pub async fn acquire(&self, item: &WorkItemId, owner: &OwnerId) -> Result<(), KernelError> {
        for attempt in 0 .. ACQUIRE_MAX_ATTEMPTS {
            if self.try_acquire(item, owner)? {
                return Ok(());
            }
            let backoff = ACQUIRE_BACKOFF_BASE_MS << attempt;
            tokio::time::sleep(Duration::from_millis(backoff)).await;
        }
        Err(KernelError::new(
            KernelErrorCode::ErrorLeaseLost,
            format!("could not acquire lease on work item {item}"),
        ))
    }

    /// Renews the caller's lease.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] with [`KernelErrorCode::ErrorLeaseLost`] when
    /// the lease is no longer held by this owner.
    pub fn heartbeat(&self, item: &WorkItemId, owner: &OwnerId) -> Result<(), KernelError> {
        let renewed = self
            .ctx
            .store
            .heartbeat_lease(item, owner, self.ttl_ms, self.ctx.now())
            .map_err(store_failure)?;
        if renewed {
            Ok(())
        } else {
            Err(KernelError::new(
                KernelErrorCode::ErrorLeaseLost,
                format!("lease on work item {item} lost by {owner}"),
            ))
        }
    }

    /// Releases the caller's lease without completing the item.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] when the store write fails. Releasing a lease
    /// that is already gone is not an error; the caller is unwinding anyway.
    pub fn release(&self, item: &WorkItemId, owner: &OwnerId) -> Result<(), KernelError> {
        self.ctx.store.release_lease(item, owner, self.ctx.now()).map_err(store_failure)?;
        Ok(())
    }

    /// Marks expired in-progress items as `expired` and returns them.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] when the sweep fails.
    pub fn sweep(&self) -> Result<Vec<WorkItemId>, KernelError> {
        self.ctx.store.sweep_expired_leases(self.ctx.now()).map_err(store_failure)
    }

    /// Returns the expiry a fresh lease would get right now.
    #[must_use]
    pub fn projected_expiry(&self) -> Timestamp {
        self.ctx.now().plus_millis(self.ttl_ms)
    }
}
