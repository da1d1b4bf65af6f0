// crates/warden-kernel/src/governance.rs
// ============================================================================
// Module: Policy / Risk / Quota Engine
// Description: Rule evaluation, risk scoring, quota charges, overrides.
// Purpose: Gate every action request behind the governance verdict.
// Dependencies: globset, warden-core, warden-store-sqlite
// ============================================================================

//! ## Overview
//! Every action request passes through [`GovernanceEngine::gate`]. Active
//! policies evaluate first-match by ascending rule priority; risk scores
//! combine five weighted dimensions into the fixed LOW/MEDIUM/HIGH/CRITICAL
//! bins; quota charges apply lazy rollover and refuse when the interval
//! budget would be exceeded. A single-use emergency override can unblock one
//! specific denied operation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use globset::Glob;
use serde_json::json;
use warden_core::AgentId;
use warden_core::AuditSeverity;
use warden_core::CapabilityId;
use warden_core::ConfidenceBand;
use warden_core::EmergencyOverride;
use warden_core::KernelError;
use warden_core::KernelErrorCode;
use warden_core::MIN_OVERRIDE_JUSTIFICATION_CHARS;
use warden_core::OverrideId;
use warden_core::PolicyVerdict;
use warden_core::ResourceType;
use warden_core::RiskAssessment;
use warden_core::RiskDimensions;
use warden_core::RiskLevel;
use warden_core::RuleCondition;
use warden_core::TaskId;
use warden_core::Timestamp;
use warden_store_sqlite::QuotaCharge;

use crate::context::KernelContext;
use crate::context::store_failure;

// ============================================================================
// SECTION: Risk Weights
// ============================================================================

/// Weight of the write-ratio dimension.
const WEIGHT_WRITE_RATIO: f64 = 0.25;
/// Weight of the external-call dimension.
const WEIGHT_EXTERNAL_CALL: f64 = 0.20;
/// Weight of the failure-rate dimension.
const WEIGHT_FAILURE_RATE: f64 = 0.25;
/// Weight of the revoke-count dimension.
const WEIGHT_REVOKE_COUNT: f64 = 0.15;
/// Weight of the duration-anomaly dimension.
const WEIGHT_DURATION_ANOMALY: f64 = 0.15;

/// Clamps a dimension into `[0, 1]`.
fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Computes the composite risk score in `[0, 100]`.
#[must_use]
pub fn composite_risk_score(dimensions: &RiskDimensions) -> f64 {
    let weighted = WEIGHT_WRITE_RATIO * clamp_unit(dimensions.write_ratio)
        + WEIGHT_EXTERNAL_CALL * clamp_unit(dimensions.external_call)
        + WEIGHT_FAILURE_RATE * clamp_unit(dimensions.failure_rate)
        + WEIGHT_REVOKE_COUNT * clamp_unit(dimensions.revoke_count)
        + WEIGHT_DURATION_ANOMALY * clamp_unit(dimensions.duration_anomaly);
    (weighted * 100.0).clamp(0.0, 100.0)
}

// ============================================================================
// SECTION: Gate Request / Result
// ============================================================================

/// Context presented with an action request.
///
/// # Invariants
/// - `numeric_context` holds the threshold-rule inputs; unknown fields make
///   threshold conditions evaluate to no-match.
#[derive(Debug, Clone)]
pub struct GateRequest {
    /// Capability the action requires.
    pub capability_id: CapabilityId,
    /// Agent requesting the action.
    pub agent_id: AgentId,
    /// Task context, when known.
    pub task_id: Option<TaskId>,
    /// Estimated resource consumption to charge.
    pub estimated_cost: BTreeMap<ResourceType, u64>,
    /// Risk factor snapshot for this call.
    pub risk_factors: RiskDimensions,
    /// Numeric fields exposed to threshold rules.
    pub numeric_context: BTreeMap<String, f64>,
    /// String fields exposed to equality rules.
    pub string_context: BTreeMap<String, String>,
    /// Confidence band of the selection justifying the action, when any.
    pub selection_confidence: Option<ConfidenceBand>,
    /// Emergency override token presented with the request, when any.
    pub override_token: Option<OverrideId>,
}

/// Quota outcome carried in the gate result.
///
/// # Invariants
/// - `Exceeded` names the refusing resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaStatus {
    /// All estimated costs were charged.
    Charged,
    /// A quota refused the charge.
    Exceeded {
        /// Resource that refused.
        resource: ResourceType,
        /// Units remaining in the current interval.
        remaining: u64,
    },
}

/// Structured gate result consumed by the action executor.
///
/// # Invariants
/// - `decision` is the final verdict after overrides were applied.
#[derive(Debug, Clone)]
pub struct GateResult {
    /// Final verdict.
    pub decision: PolicyVerdict,
    /// Rules that matched during evaluation, in order.
    pub triggered_rules: Vec<String>,
    /// Risk level computed for the request.
    pub risk_level: RiskLevel,
    /// Composite risk score in `[0, 100]`.
    pub risk_score: f64,
    /// Quota charge outcome.
    pub quota_status: QuotaStatus,
    /// Human-readable reason for deny/escalate outcomes.
    pub reason: Option<String>,
}

impl GateResult {
    /// Returns true when the executor may proceed.
    #[must_use]
    pub const fn approved(&self) -> bool {
        matches!(self.decision, PolicyVerdict::Allow | PolicyVerdict::Warn)
    }
}

// ============================================================================
// SECTION: Condition Evaluation
// ============================================================================

/// Evaluates one rule condition against the request context.
fn condition_matches(condition: &RuleCondition, request: &GateRequest) -> bool {
    match condition {
        RuleCondition::Threshold {
            field,
            op,
            value,
        } => match (request.numeric_context.get(field), value.as_f64()) {
            (Some(actual), Some(threshold)) => op.apply(*actual, threshold),
            _ => false,
        },
        RuleCondition::All {
            conditions,
        } => conditions.iter().all(|inner| condition_matches(inner, request)),
        RuleCondition::Any {
            conditions,
        } => conditions.iter().any(|inner| condition_matches(inner, request)),
        RuleCondition::Not {
            condition,
        } => !condition_matches(condition, request),
        RuleCondition::FieldEquals {
            field,
            value,
        } => request.string_context.get(field).is_some_and(|actual| actual == value),
        RuleCondition::CapabilityMatches {
            pattern,
        } => Glob::new(pattern)
            .map(|glob| glob.compile_matcher().is_match(request.capability_id.as_str()))
            .unwrap_or(false),
        RuleCondition::Always => true,
    }
}

// ============================================================================
// SECTION: Governance Engine
// ============================================================================

/// The policy / risk / quota gate.
///
/// # Invariants
/// - Every gate call records a policy evaluation row and a risk assessment.
#[derive(Clone)]
pub struct GovernanceEngine {
    /// Shared kernel context.
    ctx: KernelContext,
}

impl GovernanceEngine {
    /// Creates a governance engine.
    #[must_use]
    pub const fn new(ctx: KernelContext) -> Self {
        Self {
            ctx,
        }
    }

    /// Gates one action request.
    ///
    /// Evaluation order: policy rules (first match by priority), low-
    /// confidence escalation, emergency override, risk scoring, then quota
    /// charges (only when the verdict still permits execution).
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] when persistence fails; deny and escalate are
    /// values in the [`GateResult`], not errors.
    pub fn gate(&self, request: &GateRequest) -> Result<GateResult, KernelError> {
        let now = self.ctx.now();
        let (mut decision, mut triggered, mut reason) = self.evaluate_policies(request)?;
        // A low-confidence selection escalates instead of silently writing.
        if decision == PolicyVerdict::Allow
            && request.selection_confidence.is_some_and(ConfidenceBand::forces_escalation)
        {
            decision = PolicyVerdict::Escalate;
            triggered.push("low_confidence_selection".to_string());
            reason = Some("selection confidence too low for a write action".to_string());
        }
        // A valid single-use override turns a refusal into an allow.
        if !matches!(decision, PolicyVerdict::Allow | PolicyVerdict::Warn)
            && let Some(token) = &request.override_token
        {
            let consumed = self
                .ctx
                .store
                .consume_override(token, &request.agent_id, &request.capability_id, now)
                .map_err(store_failure)?;
            if consumed {
                decision = PolicyVerdict::Allow;
                triggered.push("emergency_override".to_string());
                reason = None;
                self.ctx.audit(
                    request.task_id.as_ref(),
                    AuditSeverity::Warning,
                    "EMERGENCY_OVERRIDE_CONSUMED",
                    &format!("override {token} consumed"),
                    json!({
                        "agent_id": request.agent_id.as_str(),
                        "capability_id": request.capability_id.as_str(),
                    }),
                );
            }
        }
        let (risk_score, risk_level) = self.assess_risk(request, decision, now)?;
        let quota_status = if matches!(decision, PolicyVerdict::Allow | PolicyVerdict::Warn) {
            self.charge_quotas(request, now)?
        } else {
            QuotaStatus::Charged
        };
        if let QuotaStatus::Exceeded {
            resource,
            remaining,
        } = &quota_status
        {
            decision = PolicyVerdict::Deny;
            triggered.push("quota_exceeded".to_string());
            reason = Some(format!(
                "quota_exceeded: {} has {} units remaining",
                resource.as_str(),
                remaining
            ));
        }
        self.ctx
            .store
            .record_policy_evaluation(
                &request.agent_id,
                &request.capability_id,
                request.task_id.as_ref(),
                decision,
                &triggered,
                reason.as_deref(),
                now,
            )
            .map_err(store_failure)?;
        Ok(GateResult {
            decision,
            triggered_rules: triggered,
            risk_level,
            risk_score,
            quota_status,
            reason,
        })
    }

    /// Evaluates active policies first-match by ascending priority.
    fn evaluate_policies(
        &self,
        request: &GateRequest,
    ) -> Result<(PolicyVerdict, Vec<String>, Option<String>), KernelError> {
        let policies = self.ctx.store.list_active_policies().map_err(store_failure)?;
        let mut triggered = Vec::new();
        let mut verdict = PolicyVerdict::Allow;
        let mut reason = None;
        'policies: for policy in policies {
            let mut rules = policy.rules.clone();
            rules.sort_by_key(|rule| rule.priority);
            for rule in rules {
                if condition_matches(&rule.condition, request) {
                    triggered.push(format!("{}:{}", policy.policy_id, rule.rule_id));
                    if rule.action != PolicyVerdict::Allow {
                        verdict = rule.action;
                        reason = Some(rule.description);
                        break 'policies;
                    }
                    // First match decides this policy; move to the next one.
                    continue 'policies;
                }
            }
        }
        Ok((verdict, triggered, reason))
    }

    /// Scores the request and writes the immutable assessment + timeline.
    fn assess_risk(
        &self,
        request: &GateRequest,
        decision: PolicyVerdict,
        now: Timestamp,
    ) -> Result<(f64, RiskLevel), KernelError> {
        let score = composite_risk_score(&request.risk_factors);
        let level = RiskLevel::from_score(score);
        let assessment = RiskAssessment {
            capability_id: request.capability_id.clone(),
            agent_id: request.agent_id.clone(),
            score,
            level,
            dimensions: request.risk_factors,
            assessed_at: now,
        };
        let note = format!("gate decision {}", decision.as_str());
        self.ctx
            .store
            .record_risk_assessment(&assessment, Some(&note))
            .map_err(store_failure)?;
        Ok((score, level))
    }

    /// Charges every estimated resource; the first refusal wins.
    fn charge_quotas(
        &self,
        request: &GateRequest,
        now: Timestamp,
    ) -> Result<QuotaStatus, KernelError> {
        for (resource, delta) in &request.estimated_cost {
            match self
                .ctx
                .store
                .charge_quota(&request.agent_id, *resource, *delta, now)
                .map_err(store_failure)?
            {
                QuotaCharge::Charged => {}
                QuotaCharge::Exceeded {
                    remaining,
                } => {
                    return Ok(QuotaStatus::Exceeded {
                        resource: *resource,
                        remaining,
                    });
                }
            }
        }
        Ok(QuotaStatus::Charged)
    }

    /// Mints an emergency override token for a blocked operation.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] when the justification is shorter than 100
    /// characters or persistence fails.
    pub fn mint_override(
        &self,
        agent_id: &AgentId,
        capability_id: &CapabilityId,
        justification: &str,
        ttl_ms: i64,
    ) -> Result<EmergencyOverride, KernelError> {
        if justification.chars().count() < MIN_OVERRIDE_JUSTIFICATION_CHARS {
            return Err(KernelError::new(
                KernelErrorCode::ErrorPolicyDenied,
                format!(
                    "override justification must be at least \
                     {MIN_OVERRIDE_JUSTIFICATION_CHARS} characters"
                ),
            ));
        }
        let now = self.ctx.now();
        let token = EmergencyOverride {
            override_id: OverrideId::generate(),
            agent_id: agent_id.clone(),
            capability_id: capability_id.clone(),
            justification: justification.to_string(),
            used: false,
            minted_at: now,
            expires_at: now.plus_millis(ttl_ms),
            consumed_at: None,
        };
        self.ctx.store.mint_override(&token).map_err(store_failure)?;
        Ok(token)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions use unwraps for clarity."
    )]

    use warden_core::ThresholdOp;

    use super::*;

    fn request_with_context(numeric: &[(&str, f64)]) -> GateRequest {
        GateRequest {
            capability_id: CapabilityId::new("action.shell.exec"),
            agent_id: AgentId::new("agent-1"),
            task_id: None,
            estimated_cost: BTreeMap::new(),
            risk_factors: RiskDimensions::default(),
            numeric_context: numeric.iter().map(|(k, v)| ((*k).to_string(), *v)).collect(),
            string_context: BTreeMap::new(),
            selection_confidence: None,
            override_token: None,
        }
    }

    #[test]
    fn composite_score_weights_sum_to_one() {
        let all_high = RiskDimensions {
            write_ratio: 1.0,
            external_call: 1.0,
            failure_rate: 1.0,
            revoke_count: 1.0,
            duration_anomaly: 1.0,
        };
        let score = composite_risk_score(&all_high);
        assert!((score - 100.0).abs() < 1e-9);
        assert_eq!(RiskLevel::from_score(score), RiskLevel::Critical);
    }

    #[test]
    fn threshold_condition_fails_closed_on_unknown_field() {
        let condition = RuleCondition::Threshold {
            field: "missing".to_string(),
            op: ThresholdOp::Gt,
            value: serde_json::Number::from(10),
        };
        assert!(!condition_matches(&condition, &request_with_context(&[])));
    }

    #[test]
    fn threshold_condition_compares_numeric_context() {
        let condition = RuleCondition::Threshold {
            field: "estimated_cost".to_string(),
            op: ThresholdOp::Gte,
            value: serde_json::Number::from(50),
        };
        assert!(condition_matches(&condition, &request_with_context(&[("estimated_cost", 50.0)])));
        assert!(!condition_matches(
            &condition,
            &request_with_context(&[("estimated_cost", 49.0)])
        ));
    }

    #[test]
    fn boolean_conditions_compose() {
        let condition = RuleCondition::All {
            conditions: vec![
                RuleCondition::Always,
                RuleCondition::Not {
                    condition: Box::new(RuleCondition::FieldEquals {
                        field: "mode".to_string(),
                        value: "dry_run".to_string(),
                    }),
                },
            ],
        };
        assert!(condition_matches(&condition, &request_with_context(&[])));
    }

    #[test]
    fn capability_glob_matches_domain_prefix() {
        let condition = RuleCondition::CapabilityMatches {
            pattern: "action.*".to_string(),
        };
        assert!(condition_matches(&condition, &request_with_context(&[])));
    }
}
