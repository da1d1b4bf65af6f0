// crates/warden-core/src/core/action.rs
// ============================================================================
// Module: Warden Action Execution Records
// Description: Execution log entries, side-effect ledger, rollback, replay.
// Purpose: Bind every externally visible action to a frozen decision.
// Dependencies: crate::core::{identifiers, time}, serde, serde_json
// ============================================================================

//! ## Overview
//! Every action execution carries a mandatory `decision_id` referring to a
//! frozen plan. Declared and observed side effects are recorded separately;
//! an effect observed but not declared is a security signal. Reversible
//! actions may be rolled back; irreversible ones answer `not_applicable`
//! permanently.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::ActionId;
use crate::core::identifiers::AgentId;
use crate::core::identifiers::EvidenceId;
use crate::core::identifiers::ExecutionId;
use crate::core::identifiers::PlanId;
use crate::core::identifiers::TaskId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Execution Status
// ============================================================================

/// Action execution lifecycle status.
///
/// # Invariants
/// - Variants are stable for serialization and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Row inserted; handler not yet dispatched.
    Pending,
    /// Handler is running.
    Running,
    /// Handler completed successfully.
    Success,
    /// Handler failed.
    Failure,
    /// Execution was cancelled before completion.
    Cancelled,
    /// Execution was rolled back after completion.
    RolledBack,
}

impl ExecutionStatus {
    /// Returns the stable storage label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Cancelled => "cancelled",
            Self::RolledBack => "rolled_back",
        }
    }

    /// Parses a status from its storage label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            "cancelled" => Some(Self::Cancelled),
            "rolled_back" => Some(Self::RolledBack),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Side Effects
// ============================================================================

/// One observed side effect of an action execution.
///
/// # Invariants
/// - `was_declared` is true iff `effect_type` appears in the declared set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedEffect {
    /// Effect type label (e.g. `file_write`, `network_call`).
    pub effect_type: String,
    /// Effect target description.
    pub target: String,
    /// Whether the effect was declared before execution.
    pub was_declared: bool,
    /// Timestamp when the effect was observed.
    pub observed_at: Timestamp,
}

/// Side-effect bookkeeping for one execution.
///
/// # Invariants
/// - `unexpected` contains exactly the observed effects with
///   `was_declared == false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SideEffectLedger {
    /// Effect types declared before execution.
    pub declared: Vec<String>,
    /// Effects observed while the action ran.
    pub observed: Vec<ObservedEffect>,
    /// Observed effects missing from the declared set.
    pub unexpected: Vec<ObservedEffect>,
}

// ============================================================================
// SECTION: Execution Record
// ============================================================================

/// One row of the action execution log.
///
/// # Invariants
/// - `decision_id` always refers to a frozen plan.
/// - `completed_at` and `duration_ms` are set together at terminal status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Execution identifier.
    pub execution_id: ExecutionId,
    /// Action that was executed.
    pub action_id: ActionId,
    /// Task context of the execution.
    pub task_id: TaskId,
    /// Frozen plan that authorized the execution.
    pub decision_id: PlanId,
    /// Agent on whose behalf the action ran.
    pub agent_id: AgentId,
    /// Execution status.
    pub status: ExecutionStatus,
    /// Parameters passed to the handler.
    pub params: Value,
    /// Result payload on success.
    pub result: Option<Value>,
    /// Error message on failure.
    pub error_message: Option<String>,
    /// Side-effect ledger.
    pub side_effects: SideEffectLedger,
    /// Evidence record written on success.
    pub evidence_id: Option<EvidenceId>,
    /// Start timestamp.
    pub started_at: Timestamp,
    /// Completion timestamp.
    pub completed_at: Option<Timestamp>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: Option<u64>,
}

// ============================================================================
// SECTION: Rollback
// ============================================================================

/// Rollback outcome status.
///
/// # Invariants
/// - `NotApplicable` is the permanent answer for irreversible actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackStatus {
    /// Rollback requested but not yet executed.
    Pending,
    /// Inverse plan completed.
    Success,
    /// Inverse plan failed entirely.
    Failure,
    /// Inverse plan partially applied.
    Partial,
    /// Action is irreversible.
    NotApplicable,
}

impl RollbackStatus {
    /// Returns the stable storage label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Partial => "partial",
            Self::NotApplicable => "not_applicable",
        }
    }

    /// Parses a status from its storage label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "pending" => Some(Self::Pending),
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            "partial" => Some(Self::Partial),
            "not_applicable" => Some(Self::NotApplicable),
            _ => None,
        }
    }
}

/// History record linking an execution to its rollback.
///
/// # Invariants
/// - `rollback_execution_id` is set once the inverse plan has run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackRecord {
    /// Execution being rolled back.
    pub execution_id: ExecutionId,
    /// Execution log row of the inverse plan, once run.
    pub rollback_execution_id: Option<ExecutionId>,
    /// Rollback status.
    pub status: RollbackStatus,
    /// Reason the rollback was initiated.
    pub reason: String,
    /// Timestamp when the rollback was recorded.
    pub recorded_at: Timestamp,
}

// ============================================================================
// SECTION: Replay
// ============================================================================

/// Replay mode for a past execution.
///
/// # Invariants
/// - Variants are stable for serialization and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayMode {
    /// Re-run without side effects.
    DryRun,
    /// Re-run with real side effects.
    Actual,
    /// Re-run and diff against the original result.
    Compare,
}

impl ReplayMode {
    /// Returns the stable storage label for the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DryRun => "dry_run",
            Self::Actual => "actual",
            Self::Compare => "compare",
        }
    }

    /// Parses a mode from its storage label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "dry_run" => Some(Self::DryRun),
            "actual" => Some(Self::Actual),
            "compare" => Some(Self::Compare),
            _ => None,
        }
    }
}

/// Outcome of a replay request.
///
/// # Invariants
/// - `differences` is `Some` only in `compare` mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayOutcome {
    /// Original execution that was replayed.
    pub original_execution_id: ExecutionId,
    /// Replay mode used.
    pub mode: ReplayMode,
    /// Execution record of the replay run (absent in dry-run mode).
    pub replay_execution_id: Option<ExecutionId>,
    /// Replay result payload.
    pub result: Option<Value>,
    /// Structured diff against the original result (compare mode).
    pub differences: Option<Value>,
}
