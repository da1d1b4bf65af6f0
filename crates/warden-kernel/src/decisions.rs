// crates/warden-kernel/src/decisions.rs
// ============================================================================
// Module: Decision Recorder
// Description: Options, evaluation, selection, and rationale pipeline.
// Purpose: Produce freezable, content-addressed decision plans.
// Dependencies: warden-core, warden-store-sqlite
// ============================================================================

//! ## Overview
//! The decision pipeline runs Options → Evaluation → Selection → Rationale.
//! Freezing computes the canonical content hash and is the point of no
//! return: every later execution quotes the hash, and a mismatch between
//! storage and recomputation aborts the task as a security signal.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::json;
use warden_core::AuditSeverity;
use warden_core::DecisionPlan;
use warden_core::EventActor;
use warden_core::EventDraft;
use warden_core::EventPhase;
use warden_core::Evaluation;
use warden_core::HashDigest;
use warden_core::KernelError;
use warden_core::KernelErrorCode;
use warden_core::PlanAlternative;
use warden_core::PlanId;
use warden_core::PlanStatus;
use warden_core::PlanStep;
use warden_core::RationaleExtension;
use warden_core::Selection;
use warden_core::SpanId;
use warden_core::TaskId;
use warden_store_sqlite::SqliteStoreError;

use crate::context::KernelContext;
use crate::context::store_failure;
use crate::events::EventLog;

// ============================================================================
// SECTION: Decision Recorder
// ============================================================================

/// Records plans, evaluations, selections, and rationales.
///
/// # Invariants
/// - Frozen plan content never changes; the store trigger backs this up.
#[derive(Clone)]
pub struct DecisionRecorder {
    /// Shared kernel context.
    ctx: KernelContext,
    /// Event log for plan lifecycle events.
    events: EventLog,
}

impl DecisionRecorder {
    /// Creates a decision recorder.
    #[must_use]
    pub const fn new(ctx: KernelContext, events: EventLog) -> Self {
        Self {
            ctx,
            events,
        }
    }

    /// Inserts a draft plan for a task and emits `plan_drafted`.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] when persistence fails.
    pub fn draft_plan(
        &self,
        plan_id: PlanId,
        task_id: &TaskId,
        steps: Vec<PlanStep>,
        alternatives: Vec<PlanAlternative>,
        span_id: &SpanId,
    ) -> Result<DecisionPlan, KernelError> {
        let plan = DecisionPlan {
            plan_id,
            task_id: task_id.clone(),
            status: PlanStatus::Draft,
            steps,
            alternatives,
            plan_hash: None,
            frozen_at: None,
            created_at: self.ctx.now(),
        };
        self.ctx.store.insert_plan(&plan).map_err(store_failure)?;
        self.events.emit(
            task_id,
            EventDraft::new("plan_drafted", EventActor::Runner, span_id.clone())
                .with_phase(EventPhase::Planning)
                .with_payload("plan_id", json!(plan.plan_id.as_str()))
                .with_payload("step_count", json!(plan.steps.len())),
        )?;
        Ok(plan)
    }

    /// Freezes a draft plan and emits `plan_frozen` with the content hash.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] with [`KernelErrorCode::ErrorPlanNotFrozen`]
    /// when the plan is missing or not a draft.
    pub fn freeze(&self, plan_id: &PlanId, span_id: &SpanId) -> Result<HashDigest, KernelError> {
        let digest = match self.ctx.store.freeze_plan(plan_id, self.ctx.now()) {
            Ok(digest) => digest,
            Err(SqliteStoreError::NotFound(message)) => {
                return Err(KernelError::new(KernelErrorCode::ErrorPlanNotFrozen, message));
            }
            Err(err) => return Err(store_failure(err)),
        };
        let plan = self.ctx.store.fetch_plan(plan_id).map_err(store_failure)?;
        self.events.emit(
            &plan.task_id,
            EventDraft::new("plan_frozen", EventActor::Runner, span_id.clone())
                .with_phase(EventPhase::Planning)
                .with_payload("plan_id", json!(plan_id.as_str()))
                .with_payload("plan_hash", json!(digest.to_string())),
        )?;
        Ok(digest)
    }

    /// Verifies a plan is frozen with an intact hash.
    ///
    /// # Errors
    ///
    /// Returns [`KernelErrorCode::ErrorPlanNotFrozen`] for drafts and
    /// [`KernelErrorCode::ErrorPlanHashMismatch`] when the stored hash no
    /// longer matches recomputation; the mismatch also writes a HIGH audit.
    pub fn verify_frozen(&self, plan_id: &PlanId) -> Result<HashDigest, KernelError> {
        match self.ctx.store.verify_frozen_plan(plan_id) {
            Ok(digest) => Ok(digest),
            Err(SqliteStoreError::Invalid(message) | SqliteStoreError::NotFound(message)) => {
                Err(KernelError::new(KernelErrorCode::ErrorPlanNotFrozen, message))
            }
            Err(SqliteStoreError::Corrupt(message)) => {
                let plan = self.ctx.store.fetch_plan(plan_id).ok();
                self.ctx.audit(
                    plan.as_ref().map(|p| &p.task_id),
                    AuditSeverity::High,
                    KernelErrorCode::ErrorPlanHashMismatch.as_str(),
                    &message,
                    json!({ "plan_id": plan_id.as_str() }),
                );
                Err(KernelError::new(KernelErrorCode::ErrorPlanHashMismatch, message))
            }
            Err(err) => Err(store_failure(err)),
        }
    }

    /// Records an evaluation over a plan's alternatives.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] when persistence fails or confidence exceeds
    /// 100.
    pub fn record_evaluation(&self, evaluation: &Evaluation) -> Result<(), KernelError> {
        if evaluation.confidence > 100 {
            return Err(KernelError::new(
                KernelErrorCode::ErrorStoreFailure,
                "evaluation confidence must be within 0..=100",
            ));
        }
        self.ctx.store.insert_evaluation(evaluation).map_err(store_failure)
    }

    /// Records the selection for an evaluation.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] when the rationale is empty or persistence
    /// fails.
    pub fn record_selection(&self, selection: &Selection) -> Result<(), KernelError> {
        self.ctx.store.insert_selection(selection).map_err(store_failure)
    }

    /// Appends a rationale extension.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] when persistence fails.
    pub fn append_rationale(&self, extension: &RationaleExtension) -> Result<(), KernelError> {
        self.ctx.store.append_rationale(extension).map_err(store_failure)
    }

    /// Fetches a plan.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] when the plan is missing.
    pub fn fetch_plan(&self, plan_id: &PlanId) -> Result<DecisionPlan, KernelError> {
        self.ctx.store.fetch_plan(plan_id).map_err(store_failure)
    }

    /// Retires a frozen plan to `archived` or `rolled_back`.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] when the transition is illegal.
    pub fn retire_plan(&self, plan_id: &PlanId, target: PlanStatus) -> Result<(), KernelError> {
        self.ctx.store.retire_plan(plan_id, target).map_err(store_failure)
    }
}
