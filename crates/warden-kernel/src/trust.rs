// crates/warden-kernel/src/trust.rs
// ============================================================================
// Module: Trust Trajectory
// Description: Per-extension trust state machine and inheritance formula.
// Purpose: Track earned trust per (extension, action) with a fixed cycle.
// Dependencies: warden-core, warden-store-sqlite
// ============================================================================

//! ## Overview
//! Trust moves only along EARNING → STABLE → DEGRADING → EARNING. Promotion
//! to STABLE needs ten consecutive successes with zero policy rejections;
//! recovery from DEGRADING needs five, and never jumps back to STABLE
//! directly. Every transition appends an explained record with risk and
//! policy context snapshots. Marketplace capabilities inherit a capped
//! starting score and always begin EARNING.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;
use serde_json::json;
use warden_core::ActionId;
use warden_core::ExtensionId;
use warden_core::InheritanceInputs;
use warden_core::KernelError;
use warden_core::RiskLevel;
use warden_core::TrustRecord;
use warden_core::TrustState;
use warden_core::TrustTransition;

use crate::context::KernelContext;
use crate::context::store_failure;

// ============================================================================
// SECTION: Thresholds
// ============================================================================

/// Successes required for EARNING → STABLE.
pub const PROMOTE_SUCCESS_THRESHOLD: u32 = 10;
/// Successes required for DEGRADING → EARNING.
pub const RECOVER_SUCCESS_THRESHOLD: u32 = 5;

// Inheritance weights and cap are v0 calibration placeholders.
/// Publisher-trust weight in the inheritance formula.
pub const INHERIT_WEIGHT_PUBLISHER: f64 = 0.3;
/// Category-similarity weight in the inheritance formula.
pub const INHERIT_WEIGHT_CATEGORY: f64 = 0.2;
/// Sandbox-safety weight in the inheritance formula.
pub const INHERIT_WEIGHT_SANDBOX: f64 = 0.5;
/// Upper bound on inherited trust (the HIGH threshold).
pub const INHERIT_SCORE_CAP: f64 = 70.0;
/// Inherited tier boundary: below this score the tier is LOW.
const INHERIT_MEDIUM_TIER_FLOOR: f64 = 40.0;

// ============================================================================
// SECTION: Violation Kinds
// ============================================================================

/// Violation kinds that degrade a STABLE capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustViolation {
    /// A high-risk execution failed.
    HighRiskFailure,
    /// The policy engine rejected an execution.
    PolicyRejection,
    /// An undeclared side effect was observed.
    UnexpectedEffect,
}

impl TrustViolation {
    /// Returns the stable trigger-event label for the violation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HighRiskFailure => "high_risk_failure",
            Self::PolicyRejection => "policy_rejection",
            Self::UnexpectedEffect => "unexpected_effect",
        }
    }
}

// ============================================================================
// SECTION: Trust Trajectory
// ============================================================================

/// The trust state machine over `(extension, action)` pairs.
///
/// # Invariants
/// - Illegal transitions cannot commit; the storage trigger is the backstop.
#[derive(Clone)]
pub struct TrustTrajectory {
    /// Shared kernel context.
    ctx: KernelContext,
}

impl TrustTrajectory {
    /// Creates a trust trajectory service.
    #[must_use]
    pub const fn new(ctx: KernelContext) -> Self {
        Self {
            ctx,
        }
    }

    /// Ensures a trust record exists, creating it in EARNING when absent.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] when persistence fails.
    pub fn ensure_record(
        &self,
        extension_id: &ExtensionId,
        action_id: &ActionId,
    ) -> Result<TrustRecord, KernelError> {
        if let Some(record) = self
            .ctx
            .store
            .fetch_trust_record(extension_id, action_id)
            .map_err(store_failure)?
        {
            return Ok(record);
        }
        let record = TrustRecord {
            extension_id: extension_id.clone(),
            action_id: action_id.clone(),
            state: TrustState::Earning,
            consecutive_successes: 0,
            policy_rejections: 0,
            score: 0.0,
            updated_at: self.ctx.now(),
        };
        self.ctx.store.insert_trust_record(&record, false, None).map_err(store_failure)?;
        Ok(record)
    }

    /// Records a successful execution and applies promotion transitions.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] when persistence fails.
    pub fn record_success(
        &self,
        extension_id: &ExtensionId,
        action_id: &ActionId,
        risk_context: Value,
    ) -> Result<TrustRecord, KernelError> {
        let mut record = self.ensure_record(extension_id, action_id)?;
        record.consecutive_successes = record.consecutive_successes.saturating_add(1);
        let now = self.ctx.now();
        match record.state {
            TrustState::Earning
                if record.consecutive_successes >= PROMOTE_SUCCESS_THRESHOLD
                    && record.policy_rejections == 0 =>
            {
                self.transition(
                    &record,
                    TrustState::Stable,
                    "consecutive_successes",
                    format!(
                        "{} consecutive successes with no policy rejections",
                        record.consecutive_successes
                    ),
                    risk_context,
                )?;
            }
            TrustState::Degrading
                if record.consecutive_successes >= RECOVER_SUCCESS_THRESHOLD
                    && record.policy_rejections == 0 =>
            {
                self.transition(
                    &record,
                    TrustState::Earning,
                    "recovery_successes",
                    format!(
                        "{} consecutive successes after degradation; trust must be re-earned",
                        record.consecutive_successes
                    ),
                    risk_context,
                )?;
            }
            _ => {
                self.ctx
                    .store
                    .update_trust_counters(
                        extension_id,
                        action_id,
                        record.consecutive_successes,
                        record.policy_rejections,
                        record.score,
                        now,
                    )
                    .map_err(store_failure)?;
            }
        }
        self.ensure_record(extension_id, action_id)
    }

    /// Records a non-degrading failure: the success streak resets but no
    /// transition applies (only high-risk failures, policy rejections, and
    /// unexpected effects degrade a STABLE capability).
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] when persistence fails.
    pub fn record_failure(
        &self,
        extension_id: &ExtensionId,
        action_id: &ActionId,
    ) -> Result<TrustRecord, KernelError> {
        let record = self.ensure_record(extension_id, action_id)?;
        self.ctx
            .store
            .update_trust_counters(
                extension_id,
                action_id,
                0,
                record.policy_rejections,
                record.score,
                self.ctx.now(),
            )
            .map_err(store_failure)?;
        self.ensure_record(extension_id, action_id)
    }

    /// Records a violation and applies the degradation transition.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] when persistence fails.
    pub fn record_violation(
        &self,
        extension_id: &ExtensionId,
        action_id: &ActionId,
        violation: TrustViolation,
        risk_level: RiskLevel,
        policy_context: Value,
    ) -> Result<TrustRecord, KernelError> {
        let mut record = self.ensure_record(extension_id, action_id)?;
        record.consecutive_successes = 0;
        if violation == TrustViolation::PolicyRejection {
            record.policy_rejections = record.policy_rejections.saturating_add(1);
        }
        if record.state == TrustState::Stable {
            self.transition_with_policy(
                &record,
                TrustState::Degrading,
                violation.as_str(),
                format!("{} observed while STABLE", violation.as_str()),
                json!({ "risk_level": risk_level.as_str() }),
                policy_context,
            )?;
        } else {
            self.ctx
                .store
                .update_trust_counters(
                    extension_id,
                    action_id,
                    record.consecutive_successes,
                    record.policy_rejections,
                    record.score,
                    self.ctx.now(),
                )
                .map_err(store_failure)?;
        }
        self.ensure_record(extension_id, action_id)
    }

    /// Applies one transition with a risk snapshot only.
    fn transition(
        &self,
        record: &TrustRecord,
        new_state: TrustState,
        trigger: &str,
        explain: String,
        risk_context: Value,
    ) -> Result<(), KernelError> {
        self.transition_with_policy(
            record,
            new_state,
            trigger,
            explain,
            risk_context,
            Value::Null,
        )
    }

    /// Applies one transition with full context snapshots.
    fn transition_with_policy(
        &self,
        record: &TrustRecord,
        new_state: TrustState,
        trigger: &str,
        explain: String,
        risk_context: Value,
        policy_context: Value,
    ) -> Result<(), KernelError> {
        let transition = TrustTransition {
            extension_id: record.extension_id.clone(),
            action_id: record.action_id.clone(),
            old_state: record.state,
            new_state,
            trigger_event: trigger.to_string(),
            explain,
            risk_context,
            policy_context,
            transitioned_at: self.ctx.now(),
        };
        self.ctx.store.apply_trust_transition(&transition, 0, 0).map_err(store_failure)
    }

    /// Computes inherited trust for a marketplace capability and inserts its
    /// EARNING record.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] when persistence fails.
    pub fn inherit(
        &self,
        extension_id: &ExtensionId,
        action_id: &ActionId,
        inputs: &InheritanceInputs,
    ) -> Result<TrustRecord, KernelError> {
        let raw = INHERIT_WEIGHT_PUBLISHER * inputs.publisher_trust.clamp(0.0, 100.0)
            + INHERIT_WEIGHT_CATEGORY * inputs.category_similarity.clamp(0.0, 100.0)
            + INHERIT_WEIGHT_SANDBOX * inputs.sandbox_safety.clamp(0.0, 100.0);
        let score = raw.min(INHERIT_SCORE_CAP);
        let tier = if score < INHERIT_MEDIUM_TIER_FLOOR { "LOW" } else { "MEDIUM" };
        let record = TrustRecord {
            extension_id: extension_id.clone(),
            action_id: action_id.clone(),
            state: TrustState::Earning,
            consecutive_successes: 0,
            policy_rejections: 0,
            score,
            updated_at: self.ctx.now(),
        };
        self.ctx
            .store
            .insert_trust_record(&record, true, Some(tier))
            .map_err(store_failure)?;
        Ok(record)
    }

    /// Lists the transition history for an `(extension, action)` pair.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] when the read fails.
    pub fn history(
        &self,
        extension_id: &ExtensionId,
        action_id: &ActionId,
    ) -> Result<Vec<TrustTransition>, KernelError> {
        self.ctx
            .store
            .list_trust_transitions(extension_id, action_id)
            .map_err(store_failure)
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

    use super::*;

    #[test]
    fn inheritance_formula_caps_at_high_threshold() {
        let raw = INHERIT_WEIGHT_PUBLISHER.mul_add(
            100.0,
            INHERIT_WEIGHT_CATEGORY.mul_add(100.0, INHERIT_WEIGHT_SANDBOX * 100.0),
        );
        assert!((raw - 100.0).abs() < 1e-9);
        assert!(raw.min(INHERIT_SCORE_CAP) <= INHERIT_SCORE_CAP);
    }

    #[test]
    fn cycle_only_ever_moves_forward() {
        assert_eq!(TrustState::Earning.next_in_cycle(), TrustState::Stable);
        assert_eq!(TrustState::Stable.next_in_cycle(), TrustState::Degrading);
        assert_eq!(TrustState::Degrading.next_in_cycle(), TrustState::Earning);
    }
}
