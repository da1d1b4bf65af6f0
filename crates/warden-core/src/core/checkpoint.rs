// crates/warden-core/src/core/checkpoint.rs
// ============================================================================
// Module: Warden Checkpoints
// Description: Append-only evidence checkpoints and idempotency records.
// Purpose: Anchor crash recovery and deduplicate side-effecting calls.
// Dependencies: crate::core::{hashing, identifiers, time}, serde, serde_json
// ============================================================================

//! ## Overview
//! Checkpoints are dense per task: `sequence_number` increments within a
//! `task_id` with no gaps. Recovery restarts from the latest checkpoint whose
//! kind is restartable. Idempotency records cache the response of an
//! outbound side-effecting call keyed by `(key, request_hash)`; replaying the
//! same key with a different hash is a caller bug and must fail.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::hashing::HashDigest;
use crate::core::identifiers::TaskId;
use crate::core::identifiers::WorkItemId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Checkpoint Kind
// ============================================================================

/// Kind of evidence a checkpoint captures.
///
/// # Invariants
/// - Variants are stable for serialization and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointKind {
    /// Start of a runner iteration.
    IterationStart,
    /// End of a runner iteration.
    IterationEnd,
    /// A tool finished executing.
    ToolExecuted,
    /// An LLM response was received.
    LlmResponse,
    /// Execution paused at an approval point.
    ApprovalPoint,
    /// Task status transitioned.
    StateTransition,
    /// Operator-requested checkpoint.
    ManualCheckpoint,
    /// Error boundary snapshot.
    ErrorBoundary,
}

impl CheckpointKind {
    /// Returns the stable storage label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IterationStart => "iteration_start",
            Self::IterationEnd => "iteration_end",
            Self::ToolExecuted => "tool_executed",
            Self::LlmResponse => "llm_response",
            Self::ApprovalPoint => "approval_point",
            Self::StateTransition => "state_transition",
            Self::ManualCheckpoint => "manual_checkpoint",
            Self::ErrorBoundary => "error_boundary",
        }
    }

    /// Parses a kind from its storage label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "iteration_start" => Some(Self::IterationStart),
            "iteration_end" => Some(Self::IterationEnd),
            "tool_executed" => Some(Self::ToolExecuted),
            "llm_response" => Some(Self::LlmResponse),
            "approval_point" => Some(Self::ApprovalPoint),
            "state_transition" => Some(Self::StateTransition),
            "manual_checkpoint" => Some(Self::ManualCheckpoint),
            "error_boundary" => Some(Self::ErrorBoundary),
            _ => None,
        }
    }

    /// Returns true when recovery may restart from this checkpoint kind.
    #[must_use]
    pub const fn is_restartable(self) -> bool {
        matches!(self, Self::IterationStart | Self::IterationEnd | Self::StateTransition)
    }
}

// ============================================================================
// SECTION: Checkpoint
// ============================================================================

/// Append-only evidence checkpoint.
///
/// # Invariants
/// - `(task_id, sequence_number)` is unique and dense per task.
/// - Rows are immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Owning task.
    pub task_id: TaskId,
    /// Dense per-task sequence number.
    pub sequence_number: u64,
    /// Work item the checkpoint relates to, when applicable.
    pub work_item_id: Option<WorkItemId>,
    /// Kind of evidence captured.
    pub kind: CheckpointKind,
    /// Snapshot payload.
    pub snapshot: Value,
    /// Timestamp when the checkpoint was recorded.
    pub created_at: Timestamp,
}

// ============================================================================
// SECTION: Idempotency
// ============================================================================

/// Status of an idempotency record.
///
/// # Invariants
/// - Variants are stable for serialization and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyStatus {
    /// Call is in flight; no cached response yet.
    Pending,
    /// Call completed; response is cached.
    Completed,
    /// Call failed; retry is permitted with the same key and hash.
    Failed,
}

impl IdempotencyStatus {
    /// Returns the stable storage label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from its storage label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Cached record for an outbound side-effecting call.
///
/// # Invariants
/// - `(key, request_hash)` identifies one logical request.
/// - A reuse of `key` with a different `request_hash` must be rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    /// Caller-chosen idempotency key.
    pub key: String,
    /// Canonical hash of the request payload.
    pub request_hash: HashDigest,
    /// Cached response, present once `status` is `completed`.
    pub response: Option<Value>,
    /// Record status.
    pub status: IdempotencyStatus,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Optional expiry; expired records may be purged.
    pub expires_at: Option<Timestamp>,
}
