// crates/warden-core/src/core/task.rs
// ============================================================================
// Module: Warden Task Aggregate
// Description: Task lifecycle state, exit reasons, and lineage records.
// Purpose: Capture the root aggregate driven by the task runner.
// Dependencies: crate::core::{identifiers, time}, serde, serde_json
// ============================================================================

//! ## Overview
//! A [`Task`] is the root aggregate of the control plane. It is created by an
//! external caller, mutated only by the runner holding its lease, and becomes
//! terminal on `succeeded`, `failed`, or `canceled`. [`TaskLineage`] rows map
//! a task to every derivative identifier so any decision can be traced back
//! from artifacts to the task that produced them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::SessionId;
use crate::core::identifiers::TaskId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Task Status
// ============================================================================

/// Task lifecycle status.
///
/// # Invariants
/// - Variants are stable for serialization and storage.
/// - `Succeeded`, `Failed`, and `Canceled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task row exists; no runner has adopted it yet.
    Created,
    /// Runner is producing or reviewing a decision plan.
    Planning,
    /// Runner is executing frozen plan steps.
    Executing,
    /// Guardian review is in progress.
    Verifying,
    /// Task completed with a PASS verdict.
    Succeeded,
    /// Task terminated unsuccessfully.
    Failed,
    /// Task is paused on a pending approval (autonomous modes).
    Blocked,
    /// Task was canceled by the user.
    Canceled,
}

impl TaskStatus {
    /// Returns the stable storage label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Planning => "planning",
            Self::Executing => "executing",
            Self::Verifying => "verifying",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
            Self::Canceled => "canceled",
        }
    }

    /// Parses a status from its storage label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "created" => Some(Self::Created),
            "planning" => Some(Self::Planning),
            "executing" => Some(Self::Executing),
            "verifying" => Some(Self::Verifying),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            "blocked" => Some(Self::Blocked),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }

    /// Returns true when the status is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

// ============================================================================
// SECTION: Exit Reason
// ============================================================================

/// Reason recorded when a runner exits a task.
///
/// # Invariants
/// - Variants are stable for serialization and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// Task ran to completion.
    Done,
    /// Iteration cap was reached.
    MaxIterations,
    /// Task paused on a pending approval.
    Blocked,
    /// Unrecoverable error terminated the task.
    FatalError,
    /// User canceled the task.
    UserCancelled,
    /// Runner exited without a classified reason.
    Unknown,
}

impl ExitReason {
    /// Returns the stable storage label for the exit reason.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::MaxIterations => "max_iterations",
            Self::Blocked => "blocked",
            Self::FatalError => "fatal_error",
            Self::UserCancelled => "user_cancelled",
            Self::Unknown => "unknown",
        }
    }

    /// Parses an exit reason from its storage label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "done" => Some(Self::Done),
            "max_iterations" => Some(Self::MaxIterations),
            "blocked" => Some(Self::Blocked),
            "fatal_error" => Some(Self::FatalError),
            "user_cancelled" => Some(Self::UserCancelled),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Task
// ============================================================================

/// Root task aggregate.
///
/// # Invariants
/// - Mutated only by the runner holding the task's lease.
/// - `exit_reason` is set exactly when a runner exits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Task identifier.
    pub task_id: TaskId,
    /// Optional back-reference to the originating session.
    pub session_id: Option<SessionId>,
    /// Human-readable task title.
    pub title: String,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Exit reason recorded by the last runner to exit.
    pub exit_reason: Option<ExitReason>,
    /// Optional project scope.
    pub project_id: Option<String>,
    /// Optional repository scope.
    pub repo_id: Option<String>,
    /// Opaque caller-supplied metadata.
    pub metadata: BTreeMap<String, Value>,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Last update timestamp.
    pub updated_at: Timestamp,
}

// ============================================================================
// SECTION: Lineage
// ============================================================================

/// Kinds of derivative identifiers recorded in the lineage.
///
/// # Invariants
/// - Variants are stable for serialization and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineageKind {
    /// A decision plan derived from the task.
    Plan,
    /// A runner execution pass.
    Run,
    /// A version-control commit produced by the task.
    Commit,
    /// A build or output artifact.
    Artifact,
    /// A recorded session tape for replay.
    Tape,
}

impl LineageKind {
    /// Returns the stable storage label for the lineage kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Run => "run",
            Self::Commit => "commit",
            Self::Artifact => "artifact",
            Self::Tape => "tape",
        }
    }

    /// Parses a lineage kind from its storage label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "plan" => Some(Self::Plan),
            "run" => Some(Self::Run),
            "commit" => Some(Self::Commit),
            "artifact" => Some(Self::Artifact),
            "tape" => Some(Self::Tape),
            _ => None,
        }
    }
}

/// Append-only mapping from a task to a derivative identifier.
///
/// # Invariants
/// - Unique per `(task_id, kind, ref_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLineage {
    /// Task identifier.
    pub task_id: TaskId,
    /// Kind of the derivative identifier.
    pub kind: LineageKind,
    /// Derivative identifier value.
    pub ref_id: String,
    /// Timestamp when the lineage row was recorded.
    pub recorded_at: Timestamp,
}
