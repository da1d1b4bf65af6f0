// crates/warden-core/src/core/policy.rs
// ============================================================================
// Module: Warden Governance Policies
// Description: Policy rules, quotas, and emergency overrides.
// Purpose: Model the governance gates evaluated before every action.
// Dependencies: crate::core::{identifiers, time}, serde, serde_json
// ============================================================================

//! ## Overview
//! Policies are versioned rule lists evaluated first-match by ascending
//! priority number. Quotas track consumable resources with lazy interval
//! rollover. Emergency overrides are single-use tokens minted by an admin
//! against one specific blocked operation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::AgentId;
use crate::core::identifiers::CapabilityId;
use crate::core::identifiers::OverrideId;
use crate::core::identifiers::PolicyId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Policy Verdict
// ============================================================================

/// Verdict returned by policy evaluation.
///
/// # Invariants
/// - Variants are stable for serialization and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyVerdict {
    /// Permit the action.
    Allow,
    /// Refuse the action.
    Deny,
    /// Pause for human review.
    Escalate,
    /// Permit but flag the action.
    Warn,
}

impl PolicyVerdict {
    /// Returns the stable storage label for the verdict.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "ALLOW",
            Self::Deny => "DENY",
            Self::Escalate => "ESCALATE",
            Self::Warn => "WARN",
        }
    }

    /// Parses a verdict from its storage label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "ALLOW" => Some(Self::Allow),
            "DENY" => Some(Self::Deny),
            "ESCALATE" => Some(Self::Escalate),
            "WARN" => Some(Self::Warn),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Rule Conditions
// ============================================================================

/// Comparison operator for threshold conditions.
///
/// # Invariants
/// - Variants are stable for serialization and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdOp {
    /// Strictly greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Strictly less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
}

impl ThresholdOp {
    /// Applies the operator to `(left, right)`.
    #[must_use]
    pub fn apply(self, left: f64, right: f64) -> bool {
        match self {
            Self::Gt => left > right,
            Self::Gte => left >= right,
            Self::Lt => left < right,
            Self::Lte => left <= right,
            Self::Eq => (left - right).abs() < f64::EPSILON,
            Self::Ne => (left - right).abs() >= f64::EPSILON,
        }
    }
}

/// Condition attached to a policy rule.
///
/// # Invariants
/// - `Threshold` fields reference numeric context values; unknown fields
///   evaluate to no-match (fail closed toward later rules).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleCondition {
    /// Numeric threshold over a context field.
    Threshold {
        /// Context field name.
        field: String,
        /// Comparison operator.
        op: ThresholdOp,
        /// Threshold value.
        value: serde_json::Number,
    },
    /// Boolean combination of sub-conditions.
    All {
        /// Sub-conditions that must all match.
        conditions: Vec<RuleCondition>,
    },
    /// Boolean union of sub-conditions.
    Any {
        /// Sub-conditions of which at least one must match.
        conditions: Vec<RuleCondition>,
    },
    /// Negation of a sub-condition.
    Not {
        /// Sub-condition that must not match.
        condition: Box<RuleCondition>,
    },
    /// Exact match on a string context field.
    FieldEquals {
        /// Context field name.
        field: String,
        /// Expected value.
        value: String,
    },
    /// Glob match on the capability identifier under evaluation.
    CapabilityMatches {
        /// Glob pattern over capability identifiers.
        pattern: String,
    },
    /// Always matches; used for catch-all terminal rules.
    Always,
}

// ============================================================================
// SECTION: Policy
// ============================================================================

/// One rule of a policy.
///
/// # Invariants
/// - `priority` orders evaluation ascending; the first matching rule wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Rule identifier unique within the policy version.
    pub rule_id: String,
    /// Evaluation priority (lower evaluates first).
    pub priority: u32,
    /// Match condition.
    pub condition: RuleCondition,
    /// Verdict returned when the condition matches.
    pub action: PolicyVerdict,
    /// Human-readable description.
    pub description: String,
}

/// Versioned governance policy.
///
/// # Invariants
/// - At most one active version exists per `policy_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Policy identifier.
    pub policy_id: PolicyId,
    /// Policy version.
    pub version: u32,
    /// Rules evaluated by ascending priority.
    pub rules: Vec<PolicyRule>,
    /// Whether this version is active.
    pub active: bool,
    /// Creation timestamp.
    pub created_at: Timestamp,
}

// ============================================================================
// SECTION: Quotas
// ============================================================================

/// Consumable resource types tracked by quotas.
///
/// # Invariants
/// - Variants are stable for serialization and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// LLM tokens.
    Tokens,
    /// Outbound API calls.
    ApiCalls,
    /// Storage bytes.
    Storage,
    /// Spend in USD cents.
    CostUsd,
    /// Compute milliseconds.
    ComputeTime,
}

impl ResourceType {
    /// Returns the stable storage label for the resource type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tokens => "tokens",
            Self::ApiCalls => "api_calls",
            Self::Storage => "storage",
            Self::CostUsd => "cost_usd",
            Self::ComputeTime => "compute_time",
        }
    }

    /// Parses a resource type from its storage label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "tokens" => Some(Self::Tokens),
            "api_calls" => Some(Self::ApiCalls),
            "storage" => Some(Self::Storage),
            "cost_usd" => Some(Self::CostUsd),
            "compute_time" => Some(Self::ComputeTime),
            _ => None,
        }
    }
}

/// Quota for one `(agent, resource)` pair.
///
/// # Invariants
/// - `current_usage <= limit` after every successful charge.
/// - Rollover applies lazily when `now - last_reset >= reset_interval`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    /// Agent the quota applies to.
    pub agent_id: AgentId,
    /// Resource type being limited.
    pub resource: ResourceType,
    /// Maximum units per interval.
    pub limit: u64,
    /// Units consumed in the current interval.
    pub current_usage: u64,
    /// Optional reset interval in milliseconds.
    pub reset_interval_ms: Option<u64>,
    /// Timestamp of the last rollover.
    pub last_reset: Timestamp,
}

impl Quota {
    /// Returns the remaining units in the current interval.
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.current_usage)
    }
}

// ============================================================================
// SECTION: Emergency Override
// ============================================================================

/// Minimum justification length for an override token.
pub const MIN_OVERRIDE_JUSTIFICATION_CHARS: usize = 100;

/// Single-use override token tied to one blocked operation.
///
/// # Invariants
/// - `used` transitions 0 → 1 at most once; consumption is atomic.
/// - `justification` is at least [`MIN_OVERRIDE_JUSTIFICATION_CHARS`] chars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyOverride {
    /// Override token identifier.
    pub override_id: OverrideId,
    /// Agent the override is minted for.
    pub agent_id: AgentId,
    /// Capability of the blocked operation.
    pub capability_id: CapabilityId,
    /// Admin justification (>= 100 chars).
    pub justification: String,
    /// Whether the token has been consumed.
    pub used: bool,
    /// Mint timestamp.
    pub minted_at: Timestamp,
    /// Expiry timestamp.
    pub expires_at: Timestamp,
    /// Consumption timestamp.
    pub consumed_at: Option<Timestamp>,
}
