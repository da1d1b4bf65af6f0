// crates/warden-kernel/src/executor.rs
// ============================================================================
// Module: Action Executor
// Description: Executes actions against frozen decisions with full audit.
// Purpose: Track declared vs actual side effects, rollback, and replay.
// Dependencies: warden-core, warden-store-sqlite
// ============================================================================

//! ## Overview
//! The executor refuses any call that is not backed by a frozen plan with an
//! intact hash and an approving governance verdict. Handlers declare their
//! side effects up front; observed effects are checked against the
//! declaration and any undeclared effect raises a HIGH-severity audit.
//! Reversible handlers support rollback through a linked inverse execution;
//! replay supports dry-run, actual, and compare modes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use serde_json::Value;
use serde_json::json;
use warden_core::ActionHandler;
use warden_core::ActionId;
use warden_core::AgentId;
use warden_core::AuditSeverity;
use warden_core::DEFAULT_HASH_ALGORITHM;
use warden_core::EvidenceId;
use warden_core::ExecutionId;
use warden_core::ExecutionRecord;
use warden_core::ExecutionStatus;
use warden_core::HandlerRequest;
use warden_core::HandlerResponse;
use warden_core::IdempotencyStatus;
use warden_core::KernelError;
use warden_core::KernelErrorCode;
use warden_core::ObservedEffect;
use warden_core::PlanId;
use warden_core::ReplayMode;
use warden_core::ReplayOutcome;
use warden_core::RollbackRecord;
use warden_core::RollbackStatus;
use warden_core::SideEffectLedger;
use warden_core::TaskId;
use warden_core::hash_canonical_json;
use warden_store_sqlite::IdempotencyClaim;

use crate::context::KernelContext;
use crate::context::store_failure;
use crate::governance::GateResult;

// ============================================================================
// SECTION: Execute Request
// ============================================================================

/// One action execution request.
///
/// # Invariants
/// - `gate` is the governance result for exactly this call.
#[derive(Clone)]
pub struct ExecuteRequest {
    /// Action to execute.
    pub action_id: ActionId,
    /// Task context.
    pub task_id: TaskId,
    /// Agent on whose behalf the action runs.
    pub agent_id: AgentId,
    /// Frozen plan authorizing the action.
    pub decision_id: PlanId,
    /// Handler parameters.
    pub params: Value,
    /// Governance verdict for this call.
    pub gate: GateResult,
    /// Optional idempotency key for outbound side effects.
    pub idempotency_key: Option<String>,
}

// ============================================================================
// SECTION: Action Executor
// ============================================================================

/// Executes actions only against frozen decisions.
///
/// # Invariants
/// - Handlers are registered once at startup; the table is read-mostly.
#[derive(Clone)]
pub struct ActionExecutor {
    /// Shared kernel context.
    ctx: KernelContext,
    /// Static handler table keyed by action identifier.
    handlers: Arc<RwLock<HashMap<String, Arc<dyn ActionHandler>>>>,
}

impl ActionExecutor {
    /// Creates an executor with an empty handler table.
    #[must_use]
    pub fn new(ctx: KernelContext) -> Self {
        Self {
            ctx,
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registers a handler for an action identifier.
    pub fn register_handler(&self, action_id: &ActionId, handler: Arc<dyn ActionHandler>) {
        let mut guard = self.handlers.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.insert(action_id.as_str().to_string(), handler);
    }

    /// Looks up the handler for an action.
    fn handler_for(&self, action_id: &ActionId) -> Result<Arc<dyn ActionHandler>, KernelError> {
        let guard = self.handlers.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.get(action_id.as_str()).cloned().ok_or_else(|| {
            KernelError::new(
                KernelErrorCode::ErrorHandlerFailure,
                format!("no handler registered for action {action_id}"),
            )
        })
    }

    /// Executes one action request.
    ///
    /// # Errors
    ///
    /// Returns [`KernelErrorCode::ErrorPlanNotFrozen`] /
    /// [`KernelErrorCode::ErrorPlanHashMismatch`] on precondition failures,
    /// [`KernelErrorCode::ErrorPolicyDenied`] when governance refused,
    /// [`KernelErrorCode::ErrorIdempotencyMismatch`] on key reuse with a
    /// different hash, and [`KernelErrorCode::ErrorHandlerFailure`] when the
    /// handler fails.
    pub fn execute(&self, request: &ExecuteRequest) -> Result<ExecutionRecord, KernelError> {
        self.check_preconditions(request)?;
        let handler = self.handler_for(&request.action_id)?;
        let declared = handler.declared_effects();
        // Idempotent replays return the cached response without a new row.
        if let Some(key) = &request.idempotency_key {
            match self.claim_idempotency(key, request)? {
                IdempotencyClaim::Fresh => {}
                IdempotencyClaim::Cached(response) => {
                    return self.cached_record(request, response);
                }
                IdempotencyClaim::InFlight => {
                    return Err(KernelError::new(
                        KernelErrorCode::ErrorHandlerFailure,
                        format!("idempotency key {key} is in flight"),
                    ));
                }
                IdempotencyClaim::HashMismatch => {
                    return Err(KernelError::new(
                        KernelErrorCode::ErrorIdempotencyMismatch,
                        format!("idempotency key {key} reused with a different request hash"),
                    ));
                }
            }
        }
        let started = self.ctx.now();
        let record = ExecutionRecord {
            execution_id: ExecutionId::generate(),
            action_id: request.action_id.clone(),
            task_id: request.task_id.clone(),
            decision_id: request.decision_id.clone(),
            agent_id: request.agent_id.clone(),
            status: ExecutionStatus::Pending,
            params: request.params.clone(),
            result: None,
            error_message: None,
            side_effects: SideEffectLedger::default(),
            evidence_id: None,
            started_at: started,
            completed_at: None,
            duration_ms: None,
        };
        self.ctx.store.insert_execution(&record, &declared).map_err(store_failure)?;
        self.ctx
            .store
            .mark_execution_running(&record.execution_id)
            .map_err(store_failure)?;
        let handler_request = HandlerRequest {
            action_id: request.action_id.clone(),
            task_id: request.task_id.clone(),
            agent_id: request.agent_id.clone(),
            params: request.params.clone(),
            dry_run: false,
            invoked_at: started,
        };
        let outcome = handler.execute(&handler_request);
        self.settle(request, &record.execution_id, &declared, started, outcome)
    }

    /// Validates the frozen-plan and governance preconditions.
    fn check_preconditions(&self, request: &ExecuteRequest) -> Result<(), KernelError> {
        match self.ctx.store.verify_frozen_plan(&request.decision_id) {
            Ok(_) => {}
            Err(warden_store_sqlite::SqliteStoreError::Invalid(message)
            | warden_store_sqlite::SqliteStoreError::NotFound(message)) => {
                return Err(KernelError::new(KernelErrorCode::ErrorPlanNotFrozen, message));
            }
            Err(warden_store_sqlite::SqliteStoreError::Corrupt(message)) => {
                self.ctx.audit(
                    Some(&request.task_id),
                    AuditSeverity::High,
                    KernelErrorCode::ErrorPlanHashMismatch.as_str(),
                    &message,
                    json!({ "decision_id": request.decision_id.as_str() }),
                );
                return Err(KernelError::new(
                    KernelErrorCode::ErrorPlanHashMismatch,
                    message,
                ));
            }
            Err(err) => return Err(store_failure(err)),
        }
        if !request.gate.approved() {
            let reason = request
                .gate
                .reason
                .clone()
                .unwrap_or_else(|| "governance refused the action".to_string());
            let code = if request.gate.triggered_rules.iter().any(|rule| rule == "quota_exceeded")
            {
                KernelErrorCode::ErrorQuotaExceeded
            } else {
                KernelErrorCode::ErrorPolicyDenied
            };
            return Err(KernelError::new(code, reason).with_context(json!({
                "triggered_rules": request.gate.triggered_rules,
            })));
        }
        Ok(())
    }

    /// Claims the idempotency key for this request.
    fn claim_idempotency(
        &self,
        key: &str,
        request: &ExecuteRequest,
    ) -> Result<IdempotencyClaim, KernelError> {
        let request_hash = hash_canonical_json(
            DEFAULT_HASH_ALGORITHM,
            &json!({
                "action_id": request.action_id.as_str(),
                "params": request.params,
            }),
        )
        .map_err(|err| {
            KernelError::new(KernelErrorCode::ErrorStoreFailure, err.to_string())
        })?;
        self.ctx
            .store
            .claim_idempotency_key(key, &request_hash, self.ctx.now(), None)
            .map_err(store_failure)
    }

    /// Builds a synthetic record for a cached idempotent response.
    fn cached_record(
        &self,
        request: &ExecuteRequest,
        response: Option<Value>,
    ) -> Result<ExecutionRecord, KernelError> {
        let now = self.ctx.now();
        Ok(ExecutionRecord {
            execution_id: ExecutionId::generate(),
            action_id: request.action_id.clone(),
            task_id: request.task_id.clone(),
            decision_id: request.decision_id.clone(),
            agent_id: request.agent_id.clone(),
            status: ExecutionStatus::Success,
            params: request.params.clone(),
            result: response,
            error_message: None,
            side_effects: SideEffectLedger::default(),
            evidence_id: None,
            started_at: now,
            completed_at: Some(now),
            duration_ms: Some(0),
        })
    }

    /// Settles a handler outcome into the execution log.
    fn settle(
        &self,
        request: &ExecuteRequest,
        execution_id: &ExecutionId,
        declared: &[String],
        started: warden_core::Timestamp,
        outcome: Result<HandlerResponse, warden_core::HandlerError>,
    ) -> Result<ExecutionRecord, KernelError> {
        let now = self.ctx.now();
        let duration = u64::try_from(
            now.as_unix_millis().saturating_sub(started.as_unix_millis()),
        )
        .unwrap_or(0);
        match outcome {
            Ok(response) => {
                self.record_effects(request, execution_id, declared, &response)?;
                let evidence_id = EvidenceId::generate();
                self.ctx
                    .store
                    .complete_execution(
                        execution_id,
                        ExecutionStatus::Success,
                        Some(&response.result),
                        None,
                        Some(&evidence_id),
                        now,
                        duration,
                    )
                    .map_err(store_failure)?;
                if let Some(key) = &request.idempotency_key {
                    self.ctx
                        .store
                        .resolve_idempotency_key(
                            key,
                            IdempotencyStatus::Completed,
                            Some(&response.result),
                        )
                        .map_err(store_failure)?;
                }
                self.ctx.store.fetch_execution(execution_id).map_err(store_failure)
            }
            Err(err) => {
                self.ctx
                    .store
                    .complete_execution(
                        execution_id,
                        ExecutionStatus::Failure,
                        None,
                        Some(&err.to_string()),
                        None,
                        now,
                        duration,
                    )
                    .map_err(store_failure)?;
                if let Some(key) = &request.idempotency_key {
                    self.ctx
                        .store
                        .resolve_idempotency_key(key, IdempotencyStatus::Failed, None)
                        .map_err(store_failure)?;
                }
                self.ctx.audit(
                    Some(&request.task_id),
                    AuditSeverity::Warning,
                    KernelErrorCode::ErrorHandlerFailure.as_str(),
                    &err.to_string(),
                    json!({
                        "execution_id": execution_id.as_str(),
                        "action_id": request.action_id.as_str(),
                    }),
                );
                Err(KernelError::new(KernelErrorCode::ErrorHandlerFailure, err.to_string())
                    .with_context(json!({ "execution_id": execution_id.as_str() })))
            }
        }
    }

    /// Records observed side effects; undeclared effects raise a HIGH audit.
    fn record_effects(
        &self,
        request: &ExecuteRequest,
        execution_id: &ExecutionId,
        declared: &[String],
        response: &HandlerResponse,
    ) -> Result<(), KernelError> {
        let now = self.ctx.now();
        for reported in &response.effects {
            let was_declared = declared.iter().any(|effect| effect == &reported.effect_type);
            let observed = ObservedEffect {
                effect_type: reported.effect_type.clone(),
                target: reported.target.clone(),
                was_declared,
                observed_at: now,
            };
            self.ctx
                .store
                .record_observed_effect(execution_id, &observed)
                .map_err(store_failure)?;
            if !was_declared {
                self.ctx.audit(
                    Some(&request.task_id),
                    AuditSeverity::High,
                    "UNDECLARED_SIDE_EFFECT",
                    &format!(
                        "action {} produced undeclared effect {}",
                        request.action_id, reported.effect_type
                    ),
                    json!({
                        "execution_id": execution_id.as_str(),
                        "effect_type": reported.effect_type,
                        "target": reported.target,
                    }),
                );
            }
        }
        Ok(())
    }

    /// Rolls back a completed execution through its handler's inverse plan.
    ///
    /// Irreversible handlers settle permanently to `not_applicable`.
    ///
    /// # Errors
    ///
    /// Returns [`KernelErrorCode::ErrorRollbackFailed`] when the inverse
    /// plan fails (the history row records `partial`).
    pub fn rollback(
        &self,
        execution_id: &ExecutionId,
        reason: &str,
    ) -> Result<RollbackRecord, KernelError> {
        let original = self.ctx.store.fetch_execution(execution_id).map_err(store_failure)?;
        let handler = self.handler_for(&original.action_id)?;
        let now = self.ctx.now();
        if !handler.is_reversible() {
            let record = RollbackRecord {
                execution_id: execution_id.clone(),
                rollback_execution_id: None,
                status: RollbackStatus::NotApplicable,
                reason: reason.to_string(),
                recorded_at: now,
            };
            self.ctx.store.insert_rollback(&record).map_err(store_failure)?;
            return Ok(record);
        }
        let inverse_id = ExecutionId::generate();
        let inverse = ExecutionRecord {
            execution_id: inverse_id.clone(),
            action_id: original.action_id.clone(),
            task_id: original.task_id.clone(),
            decision_id: original.decision_id.clone(),
            agent_id: original.agent_id.clone(),
            status: ExecutionStatus::Pending,
            params: original.params.clone(),
            result: None,
            error_message: None,
            side_effects: SideEffectLedger::default(),
            evidence_id: None,
            started_at: now,
            completed_at: None,
            duration_ms: None,
        };
        self.ctx
            .store
            .insert_execution(&inverse, &handler.declared_effects())
            .map_err(store_failure)?;
        self.ctx.store.mark_execution_running(&inverse_id).map_err(store_failure)?;
        let handler_request = HandlerRequest {
            action_id: original.action_id.clone(),
            task_id: original.task_id.clone(),
            agent_id: original.agent_id.clone(),
            params: original.params.clone(),
            dry_run: false,
            invoked_at: now,
        };
        let outcome = handler.rollback(&handler_request);
        let settled = self.ctx.now();
        let duration =
            u64::try_from(settled.as_unix_millis().saturating_sub(now.as_unix_millis()))
                .unwrap_or(0);
        match outcome {
            Ok(response) => {
                self.ctx
                    .store
                    .complete_execution(
                        &inverse_id,
                        ExecutionStatus::Success,
                        Some(&response.result),
                        None,
                        None,
                        settled,
                        duration,
                    )
                    .map_err(store_failure)?;
                self.ctx
                    .store
                    .mark_execution_rolled_back(execution_id)
                    .map_err(store_failure)?;
                let record = RollbackRecord {
                    execution_id: execution_id.clone(),
                    rollback_execution_id: Some(inverse_id),
                    status: RollbackStatus::Success,
                    reason: reason.to_string(),
                    recorded_at: settled,
                };
                self.ctx.store.insert_rollback(&record).map_err(store_failure)?;
                Ok(record)
            }
            Err(err) => {
                self.ctx
                    .store
                    .complete_execution(
                        &inverse_id,
                        ExecutionStatus::Failure,
                        None,
                        Some(&err.to_string()),
                        None,
                        settled,
                        duration,
                    )
                    .map_err(store_failure)?;
                let record = RollbackRecord {
                    execution_id: execution_id.clone(),
                    rollback_execution_id: Some(inverse_id),
                    status: RollbackStatus::Partial,
                    reason: format!("{reason}; inverse plan failed: {err}"),
                    recorded_at: settled,
                };
                self.ctx.store.insert_rollback(&record).map_err(store_failure)?;
                Err(KernelError::new(
                    KernelErrorCode::ErrorRollbackFailed,
                    format!("rollback of {execution_id} failed: {err}"),
                ))
            }
        }
    }

    /// Replays a past execution in the requested mode.
    ///
    /// `dry_run` invokes the handler without side effects and records
    /// nothing; `actual` re-executes for real; `compare` dry-runs and diffs
    /// the result against the original.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] when the original is missing or the handler
    /// fails.
    pub fn replay(
        &self,
        execution_id: &ExecutionId,
        mode: ReplayMode,
        gate: &GateResult,
    ) -> Result<ReplayOutcome, KernelError> {
        let original = self.ctx.store.fetch_execution(execution_id).map_err(store_failure)?;
        let handler = self.handler_for(&original.action_id)?;
        match mode {
            ReplayMode::DryRun => {
                let response = self.dry_run(&handler, &original)?;
                Ok(ReplayOutcome {
                    original_execution_id: execution_id.clone(),
                    mode,
                    replay_execution_id: None,
                    result: Some(response.result),
                    differences: None,
                })
            }
            ReplayMode::Actual => {
                let request = ExecuteRequest {
                    action_id: original.action_id.clone(),
                    task_id: original.task_id.clone(),
                    agent_id: original.agent_id.clone(),
                    decision_id: original.decision_id.clone(),
                    params: original.params.clone(),
                    gate: gate.clone(),
                    idempotency_key: None,
                };
                let record = self.execute(&request)?;
                Ok(ReplayOutcome {
                    original_execution_id: execution_id.clone(),
                    mode,
                    replay_execution_id: Some(record.execution_id),
                    result: record.result,
                    differences: None,
                })
            }
            ReplayMode::Compare => {
                let response = self.dry_run(&handler, &original)?;
                let differences = diff_results(original.result.as_ref(), &response.result);
                Ok(ReplayOutcome {
                    original_execution_id: execution_id.clone(),
                    mode,
                    replay_execution_id: None,
                    result: Some(response.result),
                    differences: Some(differences),
                })
            }
        }
    }

    /// Invokes a handler with side effects suppressed.
    fn dry_run(
        &self,
        handler: &Arc<dyn ActionHandler>,
        original: &ExecutionRecord,
    ) -> Result<HandlerResponse, KernelError> {
        let request = HandlerRequest {
            action_id: original.action_id.clone(),
            task_id: original.task_id.clone(),
            agent_id: original.agent_id.clone(),
            params: original.params.clone(),
            dry_run: true,
            invoked_at: self.ctx.now(),
        };
        handler.execute(&request).map_err(|err| {
            KernelError::new(KernelErrorCode::ErrorHandlerFailure, err.to_string())
        })
    }
}

// ============================================================================
// SECTION: Result Diffing
// ============================================================================

/// Produces a structured diff between the original and replayed results.
#[must_use]
pub fn diff_results(original: Option<&Value>, replayed: &Value) -> Value {
    let original = original.cloned().unwrap_or(Value::Null);
    if &original == replayed {
        return json!({ "equal": true, "changes": {} });
    }
    let mut changes = BTreeMap::new();
    match (&original, replayed) {
        (Value::Object(old), Value::Object(new)) => {
            for (key, old_value) in old {
                match new.get(key) {
                    Some(new_value) if new_value == old_value => {}
                    Some(new_value) => {
                        changes.insert(
                            key.clone(),
                            json!({ "original": old_value, "replayed": new_value }),
                        );
                    }
                    None => {
                        changes.insert(
                            key.clone(),
                            json!({ "original": old_value, "replayed": null }),
                        );
                    }
                }
            }
            for (key, new_value) in new {
                if !old.contains_key(key) {
                    changes.insert(
                        key.clone(),
                        json!({ "original": null, "replayed": new_value }),
                    );
                }
            }
        }
        _ => {
            changes.insert(
                "value".to_string(),
                json!({ "original": original, "replayed": replayed }),
            );
        }
    }
    json!({ "equal": false, "changes": changes })
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
    fn diff_reports_equality() {
        let diff = diff_results(Some(&json!({"a": 1})), &json!({"a": 1}));
        assert_eq!(diff["equal"], json!(true));
    }

    #[test]
    fn diff_reports_changed_and_missing_keys() {
        let diff = diff_results(Some(&json!({"a": 1, "b": 2})), &json!({"a": 3, "c": 4}));
        assert_eq!(diff["equal"], json!(false));
        assert_eq!(diff["changes"]["a"]["replayed"], json!(3));
        assert_eq!(diff["changes"]["b"]["replayed"], json!(null));
        assert_eq!(diff["changes"]["c"]["original"], json!(null));
    }
}
