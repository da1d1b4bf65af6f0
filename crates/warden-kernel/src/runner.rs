// crates/warden-kernel/src/runner.rs
// ============================================================================
// Module: Task Runner
// Description: The top-level loop composing every kernel component.
// Purpose: Drive a task through planning, execution, verification, exit.
// Dependencies: warden-core, warden-store-sqlite
// ============================================================================

//! ## Overview
//! The runner owns one task at a time: it opens the task, drafts and freezes
//! the plan per the autonomous mode, executes frozen steps behind the
//! authorizer and governance gates with one leased work item per step, asks
//! the guardian for a verdict, and records the terminal status with a final
//! `runner_exit` event. Cancellation is observed at every suspension point.
//! In autonomous modes a step that escalates blocks the task (`blocked`,
//! never `awaiting_approval`); interactive mode leaves the task paused in
//! place with the escalation pending.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use serde_json::json;
use warden_core::AgentId;
use warden_core::AuditSeverity;
use warden_core::CheckpointKind;
use warden_core::ConfidenceBand;
use warden_core::EventActor;
use warden_core::EventDraft;
use warden_core::EventPhase;
use warden_core::ExitReason;
use warden_core::ExtensionId;
use warden_core::Guardian;
use warden_core::GuardianVerdict;
use warden_core::KernelError;
use warden_core::KernelErrorCode;
use warden_core::OwnerId;
use warden_core::PlanAlternative;
use warden_core::PlanId;
use warden_core::PlanStep;
use warden_core::ResourceType;
use warden_core::RiskDimensions;
use warden_core::SessionId;
use warden_core::SpanId;
use warden_core::Task;
use warden_core::TaskId;
use warden_core::TaskStatus;
use warden_core::VerdictOutcome;
use warden_core::WorkItem;
use warden_core::WorkItemId;
use warden_core::WorkItemStatus;

use crate::authorizer::AuthzDecision;
use crate::authorizer::AuthzRequest;
use crate::authorizer::Authorizer;
use crate::authorizer::CallFrame;
use crate::authorizer::CallPath;
use crate::context::KernelContext;
use crate::context::store_failure;
use crate::decisions::DecisionRecorder;
use crate::events::EventLog;
use crate::executor::ActionExecutor;
use crate::executor::ExecuteRequest;
use crate::governance::GateRequest;
use crate::governance::GovernanceEngine;
use crate::lease::LeaseManager;
use crate::recovery::RecoveryService;
use crate::trust::TrustTrajectory;
use crate::trust::TrustViolation;

// ============================================================================
// SECTION: Runner Config
// ============================================================================

/// Plan-freeze auto-approval mode.
///
/// # Invariants
/// - Variants are stable for configuration parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutonomousMode {
    /// Interactive: plans wait for review before freezing.
    #[default]
    Off,
    /// Autonomous with approval checkpoints honored.
    Assisted,
    /// Fully autonomous: plans freeze immediately.
    Full,
}

impl AutonomousMode {
    /// Parses a mode from its configuration label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "off" => Some(Self::Off),
            "assisted" => Some(Self::Assisted),
            "full" => Some(Self::Full),
            _ => None,
        }
    }

    /// Returns the configuration label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Assisted => "assisted",
            Self::Full => "full",
        }
    }

    /// Returns true when the runner freezes plans without review.
    #[must_use]
    pub const fn freezes_automatically(self) -> bool {
        matches!(self, Self::Assisted | Self::Full)
    }
}

/// Runner configuration knobs.
///
/// # Invariants
/// - `heartbeat_interval_ms <= lease_ttl_ms / 2`.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Lease TTL in milliseconds.
    pub lease_ttl_ms: i64,
    /// Heartbeat interval in milliseconds.
    pub heartbeat_interval_ms: i64,
    /// Iteration cap per task.
    pub max_iterations: u32,
    /// Plan-freeze auto-approval mode.
    pub autonomous_mode: AutonomousMode,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            lease_ttl_ms: crate::lease::DEFAULT_LEASE_TTL_MS,
            heartbeat_interval_ms: crate::lease::DEFAULT_LEASE_TTL_MS / 2,
            max_iterations: 50,
            autonomous_mode: AutonomousMode::default(),
        }
    }
}

// ============================================================================
// SECTION: Task Request
// ============================================================================

/// Intake request for a new task.
///
/// # Invariants
/// - `steps` may be empty; such tasks complete after verification only.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    /// Human-readable title.
    pub title: String,
    /// Optional session back-reference.
    pub session_id: Option<SessionId>,
    /// Agent that will execute the plan.
    pub agent_id: AgentId,
    /// Ordered plan steps.
    pub steps: Vec<PlanStep>,
    /// Alternatives considered.
    pub alternatives: Vec<PlanAlternative>,
    /// Caller metadata.
    pub metadata: BTreeMap<String, Value>,
}

/// Outcome of a runner pass over a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Task reached a terminal status.
    Terminal(TaskStatus),
    /// Interactive mode: the plan awaits review; the task stays open.
    AwaitingPlanReview,
    /// Interactive mode: a step escalation is pending review.
    PausedOnEscalation,
}

// ============================================================================
// SECTION: Task Runner
// ============================================================================

/// The top-level composition loop.
#[derive(Clone)]
pub struct TaskRunner {
    /// Shared kernel context.
    ctx: KernelContext,
    /// Event log.
    events: EventLog,
    /// Lease manager.
    leases: LeaseManager,
    /// Capability authorizer.
    authorizer: Authorizer,
    /// Decision recorder.
    decisions: DecisionRecorder,
    /// Policy / risk / quota engine.
    governance: GovernanceEngine,
    /// Action executor.
    executor: ActionExecutor,
    /// Recovery service (checkpoints).
    recovery: RecoveryService,
    /// Trust trajectory.
    trust: TrustTrajectory,
    /// Guardian used in the verification phase.
    guardian: Arc<dyn Guardian>,
    /// Runner configuration.
    config: RunnerConfig,
}

impl TaskRunner {
    /// Creates a runner from its components.
    #[must_use]
    #[allow(clippy::too_many_arguments, reason = "The runner composes every kernel component.")]
    pub fn new(
        ctx: KernelContext,
        events: EventLog,
        leases: LeaseManager,
        authorizer: Authorizer,
        decisions: DecisionRecorder,
        governance: GovernanceEngine,
        executor: ActionExecutor,
        recovery: RecoveryService,
        trust: TrustTrajectory,
        guardian: Arc<dyn Guardian>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            ctx,
            events,
            leases,
            authorizer,
            decisions,
            governance,
            executor,
            recovery,
            trust,
            guardian,
            config,
        }
    }

    /// Returns the runner configuration.
    #[must_use]
    pub const fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Intake: inserts the task row, its draft plan, and `runner_spawn`.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] when persistence fails.
    pub fn create_task(&self, request: &TaskRequest) -> Result<Task, KernelError> {
        let now = self.ctx.now();
        let task = Task {
            task_id: TaskId::generate(),
            session_id: request.session_id.clone(),
            title: request.title.clone(),
            status: TaskStatus::Created,
            exit_reason: None,
            project_id: None,
            repo_id: None,
            metadata: request.metadata.clone(),
            created_at: now,
            updated_at: now,
        };
        self.ctx.store.insert_task(&task).map_err(store_failure)?;
        let root_span = SpanId::generate();
        self.events.emit(
            &task.task_id,
            EventDraft::new("runner_spawn", EventActor::Runner, root_span.clone())
                .with_payload("title", json!(task.title))
                .with_payload("agent_id", json!(request.agent_id.as_str())),
        )?;
        self.decisions.draft_plan(
            Self::plan_id_for(&task.task_id),
            &task.task_id,
            request.steps.clone(),
            request.alternatives.clone(),
            &root_span,
        )?;
        Ok(task)
    }

    /// Returns the canonical plan identifier for a task.
    #[must_use]
    pub fn plan_id_for(task_id: &TaskId) -> PlanId {
        PlanId::new(format!("{task_id}_plan"))
    }

    /// Runs one pass over a task: plan, execute, verify, finish.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] only for infrastructure failures; domain
    /// outcomes (blocked, failed, canceled) are encoded in [`RunOutcome`].
    pub async fn run(&self, task_id: &TaskId, agent_id: &AgentId) -> Result<RunOutcome, KernelError> {
        let root_span = SpanId::generate();
        // Planning phase: freeze per autonomous mode or wait for review.
        self.set_status(task_id, TaskStatus::Planning, None)?;
        let plan_id = Self::plan_id_for(task_id);
        let plan = self.decisions.fetch_plan(&plan_id)?;
        if plan.status == warden_core::PlanStatus::Draft {
            if !self.config.autonomous_mode.freezes_automatically() {
                return Ok(RunOutcome::AwaitingPlanReview);
            }
            self.decisions.freeze(&plan_id, &root_span)?;
        }
        if self.check_cancelled(task_id, &root_span)? {
            return Ok(RunOutcome::Terminal(TaskStatus::Canceled));
        }
        // Execution phase.
        self.set_status(task_id, TaskStatus::Executing, None)?;
        let plan = self.decisions.fetch_plan(&plan_id)?;
        let outcome = self.execute_steps(task_id, agent_id, &plan_id, &plan.steps, &root_span).await?;
        if let Some(outcome) = outcome {
            return Ok(outcome);
        }
        // Verification phase.
        self.verify_and_finish(task_id, &root_span)
    }

    /// Executes every plan step serially; returns an early outcome when the
    /// run cannot proceed to verification.
    async fn execute_steps(
        &self,
        task_id: &TaskId,
        agent_id: &AgentId,
        plan_id: &PlanId,
        steps: &[PlanStep],
        root_span: &SpanId,
    ) -> Result<Option<RunOutcome>, KernelError> {
        let mut iterations: u32 = 0;
        for step in steps {
            iterations = iterations.saturating_add(1);
            if iterations > self.config.max_iterations {
                self.finish(
                    task_id,
                    TaskStatus::Failed,
                    ExitReason::MaxIterations,
                    root_span,
                )?;
                return Ok(Some(RunOutcome::Terminal(TaskStatus::Failed)));
            }
            if self.check_cancelled(task_id, root_span)? {
                return Ok(Some(RunOutcome::Terminal(TaskStatus::Canceled)));
            }
            match self.execute_step(task_id, agent_id, plan_id, step, root_span).await? {
                StepOutcome::Completed => {}
                StepOutcome::Escalated => {
                    if self.config.autonomous_mode.freezes_automatically() {
                        self.finish(task_id, TaskStatus::Blocked, ExitReason::Blocked, root_span)?;
                        return Ok(Some(RunOutcome::Terminal(TaskStatus::Blocked)));
                    }
                    return Ok(Some(RunOutcome::PausedOnEscalation));
                }
                StepOutcome::Fatal(reason) => {
                    self.finish(task_id, TaskStatus::Failed, reason, root_span)?;
                    return Ok(Some(RunOutcome::Terminal(TaskStatus::Failed)));
                }
            }
        }
        Ok(None)
    }

    /// Executes one plan step inside a leased work item.
    async fn execute_step(
        &self,
        task_id: &TaskId,
        agent_id: &AgentId,
        plan_id: &PlanId,
        step: &PlanStep,
        root_span: &SpanId,
    ) -> Result<StepOutcome, KernelError> {
        let now = self.ctx.now();
        let span = SpanId::generate();
        let owner = OwnerId::generate();
        let item = WorkItem {
            work_item_id: WorkItemId::generate(),
            task_id: task_id.clone(),
            work_type: step.action_id.as_str().to_string(),
            status: WorkItemStatus::Pending,
            lease: None,
            retry_count: 0,
            input: step.params.clone(),
            output: None,
            created_at: now,
            updated_at: now,
        };
        self.ctx.store.insert_work_item(&item).map_err(store_failure)?;
        self.leases.acquire(&item.work_item_id, &owner).await?;
        self.events.emit(
            task_id,
            EventDraft::new("work_item_start", EventActor::Worker, span.clone())
                .with_phase(EventPhase::Executing)
                .with_parent(root_span.clone())
                .with_payload("work_item_id", json!(item.work_item_id.as_str()))
                .with_payload("action_id", json!(step.action_id.as_str())),
        )?;
        self.recovery.checkpoint(
            task_id,
            Some(&item.work_item_id),
            CheckpointKind::IterationStart,
            &json!({ "action_id": step.action_id.as_str(), "position": step.position }),
        )?;
        // Authorization gate.
        let authz = self.authorizer.authorize(&AuthzRequest {
            agent_id: agent_id.clone(),
            capability_id: step.capability_id.clone(),
            task_id: Some(task_id.clone()),
            call_path: CallPath::new(
                SessionId::new(task_id.as_str()),
                vec![CallFrame::Decision, CallFrame::Governance, CallFrame::Action],
            ),
        });
        let authz = match authz {
            Ok(decision) => decision,
            Err(err) => {
                self.abandon_item(&item.work_item_id, &owner, &err)?;
                return Ok(StepOutcome::Fatal(ExitReason::FatalError));
            }
        };
        match authz {
            AuthzDecision::Allowed { .. } => {}
            AuthzDecision::Denied {
                rationale,
            } => {
                self.ctx.audit(
                    Some(task_id),
                    AuditSeverity::Warning,
                    KernelErrorCode::ErrorAuthDenied.as_str(),
                    &rationale,
                    json!({ "capability_id": step.capability_id.as_str() }),
                );
                let err =
                    KernelError::new(KernelErrorCode::ErrorAuthDenied, rationale.clone());
                self.abandon_item(&item.work_item_id, &owner, &err)?;
                return Ok(StepOutcome::Fatal(ExitReason::FatalError));
            }
            AuthzDecision::Escalated {
                escalation_id,
            } => {
                self.events.emit(
                    task_id,
                    EventDraft::new("step_escalated", EventActor::Worker, span.clone())
                        .with_phase(EventPhase::Executing)
                        .with_payload("escalation_id", json!(escalation_id.as_str())),
                )?;
                self.recovery.checkpoint(
                    task_id,
                    Some(&item.work_item_id),
                    CheckpointKind::ApprovalPoint,
                    &json!({ "escalation_id": escalation_id.as_str() }),
                )?;
                self.leases.release(&item.work_item_id, &owner)?;
                return Ok(StepOutcome::Escalated);
            }
        }
        // Governance gate.
        let gate = self.governance.gate(&GateRequest {
            capability_id: step.capability_id.clone(),
            agent_id: agent_id.clone(),
            task_id: Some(task_id.clone()),
            estimated_cost: BTreeMap::from([(ResourceType::ApiCalls, 1)]),
            risk_factors: RiskDimensions::default(),
            numeric_context: BTreeMap::from([("position".to_string(), f64::from(step.position))]),
            string_context: BTreeMap::from([(
                "action_id".to_string(),
                step.action_id.as_str().to_string(),
            )]),
            selection_confidence: self.selection_confidence(plan_id)?,
            override_token: None,
        })?;
        if !gate.approved() {
            let extension = ExtensionId::new(agent_id.as_str());
            self.trust.record_violation(
                &extension,
                &step.action_id,
                TrustViolation::PolicyRejection,
                gate.risk_level,
                json!({ "triggered_rules": gate.triggered_rules }),
            )?;
            let reason = gate.reason.clone().unwrap_or_else(|| "governance refused".to_string());
            self.ctx.audit(
                Some(task_id),
                AuditSeverity::Warning,
                KernelErrorCode::ErrorPolicyDenied.as_str(),
                &reason,
                json!({ "triggered_rules": gate.triggered_rules }),
            );
            let err = KernelError::new(KernelErrorCode::ErrorPolicyDenied, reason);
            self.abandon_item(&item.work_item_id, &owner, &err)?;
            return Ok(StepOutcome::Fatal(ExitReason::FatalError));
        }
        // Keep the lease alive across the (possibly long) handler call.
        self.leases.heartbeat(&item.work_item_id, &owner)?;
        let executed = self.executor.execute(&ExecuteRequest {
            action_id: step.action_id.clone(),
            task_id: task_id.clone(),
            agent_id: agent_id.clone(),
            decision_id: plan_id.clone(),
            params: step.params.clone(),
            gate: gate.clone(),
            idempotency_key: Some(format!(
                "{}:{}:{}",
                task_id, step.position, step.action_id
            )),
        });
        let extension = ExtensionId::new(agent_id.as_str());
        match executed {
            Ok(record) => {
                self.recovery.checkpoint(
                    task_id,
                    Some(&item.work_item_id),
                    CheckpointKind::ToolExecuted,
                    &json!({
                        "execution_id": record.execution_id.as_str(),
                        "action_id": step.action_id.as_str(),
                    }),
                )?;
                self.events.emit(
                    task_id,
                    EventDraft::new("checkpoint_commit", EventActor::Worker, span.clone())
                        .with_phase(EventPhase::Executing)
                        .with_payload("execution_id", json!(record.execution_id.as_str())),
                )?;
                if record.side_effects.unexpected.is_empty() {
                    self.trust.record_success(
                        &extension,
                        &step.action_id,
                        json!({ "risk_level": gate.risk_level.as_str() }),
                    )?;
                } else {
                    self.trust.record_violation(
                        &extension,
                        &step.action_id,
                        TrustViolation::UnexpectedEffect,
                        gate.risk_level,
                        json!({ "unexpected": record.side_effects.unexpected.len() }),
                    )?;
                }
                let finished = self
                    .ctx
                    .store
                    .finish_work_item(
                        &item.work_item_id,
                        &owner,
                        WorkItemStatus::Completed,
                        &record.result.clone().unwrap_or(Value::Null),
                        self.ctx.now(),
                    )
                    .map_err(store_failure)?;
                if !finished {
                    return Err(KernelError::new(
                        KernelErrorCode::ErrorLeaseLost,
                        format!("lease on {} lost before completion", item.work_item_id),
                    ));
                }
                self.events.emit(
                    task_id,
                    EventDraft::new("work_item_complete", EventActor::Worker, span)
                        .with_phase(EventPhase::Executing)
                        .with_payload("work_item_id", json!(item.work_item_id.as_str()))
                        .with_payload("status", json!("completed")),
                )?;
                self.recovery.checkpoint(
                    task_id,
                    Some(&item.work_item_id),
                    CheckpointKind::IterationEnd,
                    &json!({ "position": step.position }),
                )?;
                Ok(StepOutcome::Completed)
            }
            Err(err) => {
                if gate.risk_level >= warden_core::RiskLevel::High {
                    self.trust.record_violation(
                        &extension,
                        &step.action_id,
                        TrustViolation::HighRiskFailure,
                        gate.risk_level,
                        json!({ "error": err.code.as_str() }),
                    )?;
                } else {
                    self.trust.record_failure(&extension, &step.action_id)?;
                }
                self.recovery.checkpoint(
                    task_id,
                    Some(&item.work_item_id),
                    CheckpointKind::ErrorBoundary,
                    &json!({ "error": err.code.as_str(), "message": err.message }),
                )?;
                self.abandon_item(&item.work_item_id, &owner, &err)?;
                Ok(StepOutcome::Fatal(ExitReason::FatalError))
            }
        }
    }

    /// Fails a work item with the causing error as its output.
    fn abandon_item(
        &self,
        item_id: &WorkItemId,
        owner: &OwnerId,
        err: &KernelError,
    ) -> Result<(), KernelError> {
        self.ctx
            .store
            .finish_work_item(
                item_id,
                owner,
                WorkItemStatus::Failed,
                &json!({ "error": err.code.as_str(), "message": err.message }),
                self.ctx.now(),
            )
            .map_err(store_failure)?;
        Ok(())
    }

    /// Returns the selection confidence attached to the task's plan, if any.
    fn selection_confidence(
        &self,
        plan_id: &PlanId,
    ) -> Result<Option<ConfidenceBand>, KernelError> {
        let evaluations = self.ctx.store.list_evaluations(plan_id).map_err(store_failure)?;
        for evaluation in evaluations {
            if let Some(selection) = self
                .ctx
                .store
                .fetch_selection(&evaluation.evaluation_id)
                .map_err(store_failure)?
            {
                return Ok(Some(selection.confidence));
            }
        }
        Ok(None)
    }

    /// Runs the guardian and finishes the task.
    fn verify_and_finish(
        &self,
        task_id: &TaskId,
        root_span: &SpanId,
    ) -> Result<RunOutcome, KernelError> {
        self.set_status(task_id, TaskStatus::Verifying, None)?;
        self.events.emit(
            task_id,
            EventDraft::new("verification_start", EventActor::Supervisor, root_span.clone())
                .with_phase(EventPhase::Verifying),
        )?;
        let task = self.ctx.store.fetch_task(task_id).map_err(store_failure)?;
        let executions = self.ctx.store.list_executions(task_id).map_err(store_failure)?;
        // A failure only counts while no later success superseded it for the
        // same action; this mirrors the completion check, which accepts a
        // retried step once any attempt succeeded.
        let failed = executions
            .iter()
            .filter(|execution| execution.status == warden_core::ExecutionStatus::Failure)
            .filter(|failure| {
                !executions.iter().any(|other| {
                    other.action_id == failure.action_id
                        && other.status == warden_core::ExecutionStatus::Success
                        && other.started_at >= failure.started_at
                })
            })
            .count();
        let summary = json!({
            "executions": executions.len(),
            "failed_executions": failed,
        });
        let outcome = self
            .guardian
            .review(&task, &summary)
            .map_err(|err| KernelError::new(KernelErrorCode::ErrorHandlerFailure, err.to_string()))?;
        let verdict = GuardianVerdict {
            task_id: task_id.clone(),
            outcome,
            reviewer: "guardian".to_string(),
            notes: None,
            issued_at: self.ctx.now(),
        };
        self.ctx.store.record_verdict(&verdict).map_err(store_failure)?;
        self.events.emit(
            task_id,
            EventDraft::new("guardian_verdict", EventActor::Supervisor, root_span.clone())
                .with_phase(EventPhase::Verifying)
                .with_payload("outcome", json!(outcome.as_str())),
        )?;
        match outcome {
            VerdictOutcome::Pass => {
                self.finish(task_id, TaskStatus::Succeeded, ExitReason::Done, root_span)?;
                Ok(RunOutcome::Terminal(TaskStatus::Succeeded))
            }
            VerdictOutcome::Fail => {
                // Only succeeded tasks exit with `done`; a rejected run is a
                // fatal outcome for the task.
                self.finish(task_id, TaskStatus::Failed, ExitReason::FatalError, root_span)?;
                Ok(RunOutcome::Terminal(TaskStatus::Failed))
            }
            VerdictOutcome::NeedsReview => {
                self.finish(task_id, TaskStatus::Blocked, ExitReason::Blocked, root_span)?;
                Ok(RunOutcome::Terminal(TaskStatus::Blocked))
            }
        }
    }

    /// Writes a terminal (or blocked) status plus the `runner_exit` event.
    fn finish(
        &self,
        task_id: &TaskId,
        status: TaskStatus,
        exit_reason: ExitReason,
        root_span: &SpanId,
    ) -> Result<(), KernelError> {
        self.set_status(task_id, status, Some(exit_reason))?;
        self.recovery.checkpoint(
            task_id,
            None,
            CheckpointKind::StateTransition,
            &json!({ "status": status.as_str(), "exit_reason": exit_reason.as_str() }),
        )?;
        self.events.emit(
            task_id,
            EventDraft::new("runner_exit", EventActor::Runner, root_span.clone())
                .with_payload("exit_reason", json!(exit_reason.as_str()))
                .with_payload("status", json!(status.as_str())),
        )?;
        Ok(())
    }

    /// Updates the task status.
    fn set_status(
        &self,
        task_id: &TaskId,
        status: TaskStatus,
        exit_reason: Option<ExitReason>,
    ) -> Result<(), KernelError> {
        self.ctx
            .store
            .update_task_status(task_id, status, exit_reason, self.ctx.now())
            .map_err(store_failure)
    }

    /// Observes a cancellation flag; emits `runner_exit` when canceled.
    fn check_cancelled(&self, task_id: &TaskId, root_span: &SpanId) -> Result<bool, KernelError> {
        let task = self.ctx.store.fetch_task(task_id).map_err(store_failure)?;
        if task.status == TaskStatus::Canceled {
            self.events.emit(
                task_id,
                EventDraft::new("runner_exit", EventActor::Runner, root_span.clone())
                    .with_payload("exit_reason", json!(ExitReason::UserCancelled.as_str())),
            )?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Cancels a task; the runner unwinds at its next suspension point.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] when the task is already terminal.
    pub fn cancel_task(&self, task_id: &TaskId) -> Result<(), KernelError> {
        self.set_status(task_id, TaskStatus::Canceled, Some(ExitReason::UserCancelled))
    }

    /// Finalizes a task whose steps were driven externally over the API.
    ///
    /// When every step of the frozen plan has a successful execution the
    /// verification phase runs and the task reaches a terminal status.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] when persistence fails.
    pub fn finalize_if_complete(&self, task_id: &TaskId) -> Result<Option<RunOutcome>, KernelError> {
        let plan = self.decisions.fetch_plan(&Self::plan_id_for(task_id))?;
        if plan.status != warden_core::PlanStatus::Frozen {
            return Ok(None);
        }
        let executions = self.ctx.store.list_executions(task_id).map_err(store_failure)?;
        let all_done = plan.steps.iter().all(|step| {
            executions.iter().any(|execution| {
                execution.action_id == step.action_id
                    && execution.status == warden_core::ExecutionStatus::Success
            })
        });
        if !all_done {
            return Ok(None);
        }
        let root_span = SpanId::generate();
        self.verify_and_finish(task_id, &root_span).map(Some)
    }
}

// ============================================================================
// SECTION: Step Outcome
// ============================================================================

/// Internal outcome of one step execution.
enum StepOutcome {
    /// Step completed; continue with the next one.
    Completed,
    /// Step escalated; the task pauses or blocks per mode.
    Escalated,
    /// Step failed fatally with the given exit reason.
    Fatal(ExitReason),
}
