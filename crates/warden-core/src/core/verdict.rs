// crates/warden-core/src/core/verdict.rs
// ============================================================================
// Module: Warden Guardian Verdicts and Audits
// Description: Immutable verification verdicts and audit trail rows.
// Purpose: Gate terminal success on review and record every governance event.
// Dependencies: crate::core::{identifiers, time}, serde, serde_json
// ============================================================================

//! ## Overview
//! A guardian review produces an immutable verdict linked to a task; only a
//! PASS verdict permits the terminal `succeeded` status. Audit rows capture
//! every error, denial, and security signal with enough context to replay
//! the decision later.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::TaskId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Guardian Verdict
// ============================================================================

/// Outcome of a guardian review.
///
/// # Invariants
/// - Variants are stable for serialization and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictOutcome {
    /// Work verified; terminal success is permitted.
    Pass,
    /// Work rejected.
    Fail,
    /// Human review is required before a final answer.
    NeedsReview,
}

impl VerdictOutcome {
    /// Returns the stable storage label for the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::NeedsReview => "NEEDS_REVIEW",
        }
    }

    /// Parses an outcome from its storage label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "PASS" => Some(Self::Pass),
            "FAIL" => Some(Self::Fail),
            "NEEDS_REVIEW" => Some(Self::NeedsReview),
            _ => None,
        }
    }
}

/// Immutable guardian verdict linked to a task.
///
/// # Invariants
/// - Rows are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardianVerdict {
    /// Task under review.
    pub task_id: TaskId,
    /// Review outcome.
    pub outcome: VerdictOutcome,
    /// Reviewer identity (automatic verifier or human).
    pub reviewer: String,
    /// Review notes.
    pub notes: Option<String>,
    /// Verdict timestamp.
    pub issued_at: Timestamp,
}

// ============================================================================
// SECTION: Audit Trail
// ============================================================================

/// Severity of an audit entry.
///
/// # Invariants
/// - Variants are stable for serialization and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    /// Informational entry.
    Info,
    /// Recoverable anomaly.
    Warning,
    /// Security-relevant signal (undeclared effect, path violation).
    High,
    /// Unrecoverable failure.
    Critical,
}

impl AuditSeverity {
    /// Returns the stable storage label for the severity.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Parses a severity from its storage label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "info" => Some(Self::Info),
            "warning" => Some(Self::Warning),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// One append-only audit entry.
///
/// # Invariants
/// - Rows are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAudit {
    /// Task the entry relates to, when known.
    pub task_id: Option<TaskId>,
    /// Entry severity.
    pub severity: AuditSeverity,
    /// Stable machine-readable code (e.g. `ERROR_AUTH_DENIED`).
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Structured context payload.
    pub context: Value,
    /// Entry timestamp.
    pub recorded_at: Timestamp,
}
