// crates/warden-core/src/core/work.rs
// ============================================================================
// Module: Warden Work Items
// Description: Resumable units of work and their leases.
// Purpose: Model single-writer ownership and crash-recoverable progress.
// Dependencies: crate::core::{identifiers, time}, serde, serde_json
// ============================================================================

//! ## Overview
//! A [`WorkItem`] is a resumable unit inside a task. Exclusive ownership is
//! expressed through a [`Lease`]: at most one non-expired owner exists per
//! item at any instant. Once a work item reaches `completed` or `failed` the
//! row is terminal; expired items are re-materialized by recovery as fresh
//! pending rows.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::OwnerId;
use crate::core::identifiers::TaskId;
use crate::core::identifiers::WorkItemId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Work Item Status
// ============================================================================

/// Work item lifecycle status.
///
/// # Invariants
/// - Variants are stable for serialization and storage.
/// - `Completed` and `Failed` are terminal; `Expired` items are replaced by
///   recovery rather than resumed in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    /// Awaiting adoption by a runner.
    Pending,
    /// Leased and actively being worked.
    InProgress,
    /// Finished successfully.
    Completed,
    /// Finished unsuccessfully.
    Failed,
    /// Lease expired without completion; superseded by a recovery item.
    Expired,
}

impl WorkItemStatus {
    /// Returns the stable storage label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }

    /// Parses a status from its storage label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    /// Returns true when the status is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

// ============================================================================
// SECTION: Lease
// ============================================================================

/// Time-bounded exclusive claim on a work unit.
///
/// # Invariants
/// - `expires_at` > `acquired_at`.
/// - `heartbeat_at` only moves forward while the same owner holds the lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// Owner currently holding the lease.
    pub owner_id: OwnerId,
    /// Timestamp when the lease was acquired.
    pub acquired_at: Timestamp,
    /// Timestamp when the lease expires without a heartbeat.
    pub expires_at: Timestamp,
    /// Timestamp of the most recent heartbeat.
    pub heartbeat_at: Timestamp,
}

impl Lease {
    /// Returns true when the lease is expired at the given instant.
    #[must_use]
    pub const fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.as_unix_millis() < now.as_unix_millis()
    }
}

// ============================================================================
// SECTION: Work Item
// ============================================================================

/// A resumable unit of work inside a task.
///
/// # Invariants
/// - `lease` is `Some` only while `status` is `in_progress`.
/// - `output` is set at most once, when the item reaches a terminal status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Work item identifier.
    pub work_item_id: WorkItemId,
    /// Owning task.
    pub task_id: TaskId,
    /// Work type label dispatched to a handler.
    pub work_type: String,
    /// Lifecycle status.
    pub status: WorkItemStatus,
    /// Current lease, when held.
    pub lease: Option<Lease>,
    /// Number of times the item has been retried.
    pub retry_count: u32,
    /// Input payload for the handler.
    pub input: Value,
    /// Output payload recorded at terminal status.
    pub output: Option<Value>,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Last update timestamp.
    pub updated_at: Timestamp,
}
