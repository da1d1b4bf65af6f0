// crates/warden-core/src/core/risk.rs
// ============================================================================
// Module: Warden Risk and Trust Records
// Description: Risk assessments, risk timeline, trust states and transitions.
// Purpose: Model the append-only risk history and the trust trajectory cycle.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! Risk assessments are immutable per `(capability, agent, timestamp)` with a
//! five-dimension breakdown and a composite score mapped to fixed level bins.
//! Trust states follow the fixed cycle EARNING → STABLE → DEGRADING →
//! EARNING; any other transition is rejected at the storage layer. Recovery
//! from DEGRADING never returns directly to STABLE.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ActionId;
use crate::core::identifiers::AgentId;
use crate::core::identifiers::CapabilityId;
use crate::core::identifiers::ExtensionId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Risk Level
// ============================================================================

/// Risk level derived from the composite score.
///
/// # Invariants
/// - Bins are fixed: LOW < 30 <= MEDIUM < 70 <= HIGH < 90 <= CRITICAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    /// Composite score below 30.
    Low,
    /// Composite score in `30..70`.
    Medium,
    /// Composite score in `70..90`.
    High,
    /// Composite score 90 or above.
    Critical,
}

impl RiskLevel {
    /// Returns the stable storage label for the level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }

    /// Parses a level from its storage label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "LOW" => Some(Self::Low),
            "MEDIUM" => Some(Self::Medium),
            "HIGH" => Some(Self::High),
            "CRITICAL" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Maps a composite score in `[0, 100]` onto the fixed bins.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            Self::Critical
        } else if score >= 70.0 {
            Self::High
        } else if score >= 30.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

// ============================================================================
// SECTION: Risk Dimensions
// ============================================================================

/// Per-dimension risk factors, each in `[0, 1]`.
///
/// # Invariants
/// - Callers clamp inputs to `[0, 1]` before recording.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct RiskDimensions {
    /// Fraction of recent operations that were writes.
    pub write_ratio: f64,
    /// Degree of external-call exposure.
    pub external_call: f64,
    /// Recent failure rate.
    pub failure_rate: f64,
    /// Normalized count of recent grant revocations.
    pub revoke_count: f64,
    /// Deviation of execution duration from baseline.
    pub duration_anomaly: f64,
}

// ============================================================================
// SECTION: Risk Assessment
// ============================================================================

/// Immutable risk assessment record.
///
/// # Invariants
/// - Rows are append-only; no update or delete succeeds.
/// - `score` is in `[0, 100]` and `level` matches its bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Capability the assessment covers.
    pub capability_id: CapabilityId,
    /// Agent the assessment covers.
    pub agent_id: AgentId,
    /// Composite score in `[0, 100]`.
    pub score: f64,
    /// Level derived from the score.
    pub level: RiskLevel,
    /// Dimension breakdown.
    pub dimensions: RiskDimensions,
    /// Assessment timestamp.
    pub assessed_at: Timestamp,
}

// ============================================================================
// SECTION: Trust States
// ============================================================================

/// Trust trajectory state.
///
/// # Invariants
/// - Transitions are restricted to the cycle EARNING → STABLE → DEGRADING →
///   EARNING; all other transitions are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrustState {
    /// Building a success record.
    Earning,
    /// Proven reliable.
    Stable,
    /// Under suspicion after a violation.
    Degrading,
}

impl TrustState {
    /// Returns the stable storage label for the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Earning => "EARNING",
            Self::Stable => "STABLE",
            Self::Degrading => "DEGRADING",
        }
    }

    /// Parses a state from its storage label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "EARNING" => Some(Self::Earning),
            "STABLE" => Some(Self::Stable),
            "DEGRADING" => Some(Self::Degrading),
            _ => None,
        }
    }

    /// Returns the only state legally reachable from this one.
    #[must_use]
    pub const fn next_in_cycle(self) -> Self {
        match self {
            Self::Earning => Self::Stable,
            Self::Stable => Self::Degrading,
            Self::Degrading => Self::Earning,
        }
    }
}

/// Current trust record for one `(extension, action)` pair.
///
/// # Invariants
/// - `consecutive_successes` resets to zero on any failure or rejection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustRecord {
    /// Extension the record covers.
    pub extension_id: ExtensionId,
    /// Action the record covers.
    pub action_id: ActionId,
    /// Current trust state.
    pub state: TrustState,
    /// Consecutive successful executions since the last reset.
    pub consecutive_successes: u32,
    /// Policy rejections observed in the current state.
    pub policy_rejections: u32,
    /// Trust score in `[0, 100]` (inheritance and decay input).
    pub score: f64,
    /// Last update timestamp.
    pub updated_at: Timestamp,
}

// ============================================================================
// SECTION: Trust Transitions
// ============================================================================

/// Append-only trust transition record.
///
/// # Invariants
/// - `(old_state, new_state)` is one of the three legal cycle edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustTransition {
    /// Extension the transition covers.
    pub extension_id: ExtensionId,
    /// Action the transition covers.
    pub action_id: ActionId,
    /// State before the transition.
    pub old_state: TrustState,
    /// State after the transition.
    pub new_state: TrustState,
    /// Event that triggered the transition.
    pub trigger_event: String,
    /// Human-readable explanation.
    pub explain: String,
    /// Snapshot of the risk context at transition time.
    pub risk_context: serde_json::Value,
    /// Snapshot of the policy context at transition time.
    pub policy_context: serde_json::Value,
    /// Transition timestamp.
    pub transitioned_at: Timestamp,
}

// ============================================================================
// SECTION: Trust Inheritance
// ============================================================================

/// Inputs to the marketplace trust-inheritance formula, each in `[0, 100]`.
///
/// # Invariants
/// - Callers clamp inputs before computing inherited trust.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InheritanceInputs {
    /// Publisher reputation score.
    pub publisher_trust: f64,
    /// Similarity to already-trusted capability categories.
    pub category_similarity: f64,
    /// Sandbox safety analysis score.
    pub sandbox_safety: f64,
}
