// crates/warden-core/src/core/decision.rs
// ============================================================================
// Module: Warden Decision Records
// Description: Decision plans, evaluations, selections, and rationales.
// Purpose: Capture the four-stage decision pipeline with freezable plans.
// Dependencies: crate::core::{hashing, identifiers, time}, serde, serde_json
// ============================================================================

//! ## Overview
//! Decisions move through Options → Evaluation → Selection → Rationale. A
//! plan's steps and alternatives are content-hashed at freeze time; once
//! frozen the content is immutable and every execution must quote the hash.
//! A stored hash that no longer matches recomputation aborts execution.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::hashing::HashAlgorithm;
use crate::core::hashing::HashDigest;
use crate::core::hashing::HashError;
use crate::core::hashing::hash_canonical_json;
use crate::core::identifiers::ActionId;
use crate::core::identifiers::CapabilityId;
use crate::core::identifiers::EvaluationId;
use crate::core::identifiers::EvidenceId;
use crate::core::identifiers::OptionId;
use crate::core::identifiers::PlanId;
use crate::core::identifiers::TaskId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Plan Status
// ============================================================================

/// Decision plan lifecycle status.
///
/// # Invariants
/// - `frozen` requires `frozen_at` and `plan_hash`; `draft` forbids both.
/// - Content is immutable once frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// Mutable draft.
    Draft,
    /// Content-hashed and immutable.
    Frozen,
    /// Retired after completion.
    Archived,
    /// Rolled back after a failed execution.
    RolledBack,
}

impl PlanStatus {
    /// Returns the stable storage label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Frozen => "frozen",
            Self::Archived => "archived",
            Self::RolledBack => "rolled_back",
        }
    }

    /// Parses a status from its storage label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "draft" => Some(Self::Draft),
            "frozen" => Some(Self::Frozen),
            "archived" => Some(Self::Archived),
            "rolled_back" => Some(Self::RolledBack),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Plan Content
// ============================================================================

/// One ordered step of a decision plan.
///
/// # Invariants
/// - `position` is dense and 0-based within a plan.
/// - `parallel_group`, when set, marks steps the runner may execute
///   concurrently; ungrouped steps are strictly serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Position within the plan.
    pub position: u32,
    /// Action the step invokes.
    pub action_id: ActionId,
    /// Capability the action requires.
    pub capability_id: CapabilityId,
    /// Parameters passed to the action handler.
    pub params: Value,
    /// Optional parallel group label.
    #[serde(default)]
    pub parallel_group: Option<String>,
}

/// One alternative option recorded alongside the plan.
///
/// # Invariants
/// - `option_id` is unique within the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanAlternative {
    /// Option identifier.
    pub option_id: OptionId,
    /// Human-readable description of the option.
    pub description: String,
    /// Estimated cost in abstract milli-units (integral for stable hashing).
    pub cost: u64,
    /// Estimated time in milliseconds.
    pub time_ms: u64,
    /// Risks of choosing this option.
    pub risks: Vec<String>,
    /// Benefits of choosing this option.
    pub benefits: Vec<String>,
}

/// Canonical hash input for a plan: exactly the steps and alternatives.
#[derive(Debug, Clone, Serialize)]
struct PlanHashContent<'a> {
    /// Ordered plan steps.
    steps: &'a [PlanStep],
    /// Recorded alternatives.
    alternatives: &'a [PlanAlternative],
}

/// Computes the canonical content hash of a plan's steps and alternatives.
///
/// # Errors
///
/// Returns [`HashError`] when canonical serialization fails.
pub fn plan_content_hash(
    algorithm: HashAlgorithm,
    steps: &[PlanStep],
    alternatives: &[PlanAlternative],
) -> Result<HashDigest, HashError> {
    hash_canonical_json(algorithm, &PlanHashContent {
        steps,
        alternatives,
    })
}

// ============================================================================
// SECTION: Decision Plan
// ============================================================================

/// A set of ordered steps with alternatives.
///
/// # Invariants
/// - `plan_hash` and `frozen_at` are both `Some` iff `status` is not `draft`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionPlan {
    /// Plan identifier.
    pub plan_id: PlanId,
    /// Task the plan belongs to.
    pub task_id: TaskId,
    /// Plan lifecycle status.
    pub status: PlanStatus,
    /// Ordered steps.
    pub steps: Vec<PlanStep>,
    /// Alternatives considered.
    pub alternatives: Vec<PlanAlternative>,
    /// Content hash, set at freeze time.
    pub plan_hash: Option<HashDigest>,
    /// Freeze timestamp.
    pub frozen_at: Option<Timestamp>,
    /// Creation timestamp.
    pub created_at: Timestamp,
}

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Ranked evaluation of a plan's alternatives.
///
/// # Invariants
/// - `confidence` is in `0..=100`.
/// - Two evaluations on the same plan with different `evaluated_by` support
///   shadow classifier comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Evaluation identifier.
    pub evaluation_id: EvaluationId,
    /// Plan being evaluated.
    pub plan_id: PlanId,
    /// Option identifiers ranked best-first.
    pub ranking: Vec<OptionId>,
    /// Recommended option.
    pub recommendation: OptionId,
    /// Confidence in the recommendation (0..=100).
    pub confidence: u8,
    /// Evaluator identity.
    pub evaluated_by: String,
    /// Evaluation timestamp.
    pub evaluated_at: Timestamp,
}

// ============================================================================
// SECTION: Selection
// ============================================================================

/// Confidence band attached to a selection.
///
/// # Invariants
/// - `VeryLow` and `Low` selections force a governance escalation attempt
///   when they justify a write action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    /// Very low confidence.
    VeryLow,
    /// Low confidence.
    Low,
    /// Medium confidence.
    Medium,
    /// High confidence.
    High,
    /// Very high confidence.
    VeryHigh,
}

impl ConfidenceBand {
    /// Returns the stable storage label for the band.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::VeryLow => "very_low",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::VeryHigh => "very_high",
        }
    }

    /// Parses a band from its storage label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "very_low" => Some(Self::VeryLow),
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "very_high" => Some(Self::VeryHigh),
            _ => None,
        }
    }

    /// Returns true when the band is low enough to force escalation on writes.
    #[must_use]
    pub const fn forces_escalation(self) -> bool {
        matches!(self, Self::VeryLow | Self::Low)
    }
}

/// A rejected option with its reason.
///
/// # Invariants
/// - `option_id` refers to an alternative of the evaluated plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedOption {
    /// Rejected option identifier.
    pub option_id: OptionId,
    /// Reason the option was rejected.
    pub reason: String,
}

/// Binding of an evaluation to exactly one selected option.
///
/// # Invariants
/// - `rationale` is mandatory and non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    /// Evaluation the selection is based on.
    pub evaluation_id: EvaluationId,
    /// Winning option.
    pub selected_option: OptionId,
    /// Mandatory free-text rationale.
    pub rationale: String,
    /// Options rejected with reasons.
    pub rejected: Vec<RejectedOption>,
    /// Confidence band for the selection.
    pub confidence: ConfidenceBand,
    /// Optional supporting evidence reference.
    pub evidence_id: Option<EvidenceId>,
    /// Selection timestamp.
    pub selected_at: Timestamp,
}

// ============================================================================
// SECTION: Rationale Extension
// ============================================================================

/// Appended rationale record; never replaces the original.
///
/// # Invariants
/// - Rows are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RationaleExtension {
    /// Evaluation the rationale extends.
    pub evaluation_id: EvaluationId,
    /// Additional rationale text.
    pub text: String,
    /// Evidence references supporting the rationale.
    pub evidence_refs: Vec<EvidenceId>,
    /// Timestamp when appended.
    pub appended_at: Timestamp,
}
