// crates/warden-kernel/src/recovery.rs
// ============================================================================
// Module: Checkpoint & Recovery
// Description: Expiry sweep, checkpoint selection, work-item re-creation.
// Purpose: Resume crashed work from the latest restartable checkpoint.
// Dependencies: warden-core, warden-store-sqlite
// ============================================================================

//! ## Overview
//! On startup and periodically, the recovery loop sweeps in-progress work
//! items whose leases expired, locates the latest restartable checkpoint of
//! each affected task, and re-materializes the work as a fresh pending item
//! carrying the same input. A runner adopts the new item by acquiring its
//! lease. A task with no restartable checkpoint fails with `fatal_error`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::json;
use warden_core::AuditSeverity;
use warden_core::CheckpointKind;
use warden_core::EventActor;
use warden_core::EventDraft;
use warden_core::EventPhase;
use warden_core::ExitReason;
use warden_core::KernelError;
use warden_core::KernelErrorCode;
use warden_core::SpanId;
use warden_core::TaskStatus;
use warden_core::WorkItem;
use warden_core::WorkItemId;
use warden_core::WorkItemStatus;

use crate::context::KernelContext;
use crate::context::store_failure;
use crate::events::EventLog;
use crate::lease::LeaseManager;

// ============================================================================
// SECTION: Recovery Service
// ============================================================================

/// Outcome of one recovery sweep.
///
/// # Invariants
/// - `recovered` lists the fresh work items created this pass.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Work items marked expired this pass.
    pub expired: Vec<WorkItemId>,
    /// Fresh work items created for recovery.
    pub recovered: Vec<WorkItemId>,
    /// Tasks failed because no restartable checkpoint existed.
    pub failed_tasks: usize,
}

/// The crash-recovery loop.
///
/// # Invariants
/// - Recovery never resumes an expired item in place; it always creates a
///   fresh pending item.
#[derive(Clone)]
pub struct RecoveryService {
    /// Shared kernel context.
    ctx: KernelContext,
    /// Event log for recovery events.
    events: EventLog,
    /// Lease manager whose sweep feeds this service.
    leases: LeaseManager,
}

impl RecoveryService {
    /// Creates a recovery service.
    #[must_use]
    pub const fn new(ctx: KernelContext, events: EventLog, leases: LeaseManager) -> Self {
        Self {
            ctx,
            events,
            leases,
        }
    }

    /// Runs one recovery sweep.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] when the sweep itself fails; per-item
    /// recovery failures are audited and counted, not propagated.
    pub fn run_sweep(&self) -> Result<SweepReport, KernelError> {
        let expired = self.leases.sweep()?;
        let mut report = SweepReport {
            expired: expired.clone(),
            recovered: Vec::new(),
            failed_tasks: 0,
        };
        for item_id in expired {
            match self.recover_item(&item_id) {
                Ok(Some(new_item)) => report.recovered.push(new_item),
                Ok(None) => report.failed_tasks += 1,
                Err(err) => {
                    self.ctx.audit(
                        None,
                        AuditSeverity::Critical,
                        err.code.as_str(),
                        &format!("recovery of work item {item_id} failed: {err}"),
                        json!({ "work_item_id": item_id.as_str() }),
                    );
                    report.failed_tasks += 1;
                }
            }
        }
        Ok(report)
    }

    /// Recovers one expired work item.
    ///
    /// Returns the fresh item, or `None` when the task had to be failed for
    /// lack of a restartable checkpoint.
    fn recover_item(&self, item_id: &WorkItemId) -> Result<Option<WorkItemId>, KernelError> {
        let item = self.ctx.store.fetch_work_item(item_id).map_err(store_failure)?;
        let span = SpanId::generate();
        self.events.emit(
            &item.task_id,
            EventDraft::new("lease_expired", EventActor::Lease, span.clone())
                .with_phase(EventPhase::Recovery)
                .with_payload("work_item_id", json!(item_id.as_str())),
        )?;
        let checkpoint = self
            .ctx
            .store
            .latest_restartable_checkpoint(&item.task_id)
            .map_err(store_failure)?;
        let Some(checkpoint) = checkpoint else {
            self.ctx.audit(
                Some(&item.task_id),
                AuditSeverity::Critical,
                KernelErrorCode::ErrorCheckpointInvalid.as_str(),
                "no restartable checkpoint; task cannot be recovered",
                json!({ "work_item_id": item_id.as_str() }),
            );
            self.ctx
                .store
                .update_task_status(
                    &item.task_id,
                    TaskStatus::Failed,
                    Some(ExitReason::FatalError),
                    self.ctx.now(),
                )
                .map_err(store_failure)?;
            self.events.emit(
                &item.task_id,
                EventDraft::new("runner_exit", EventActor::Recovery, span)
                    .with_phase(EventPhase::Recovery)
                    .with_payload("exit_reason", json!(ExitReason::FatalError.as_str())),
            )?;
            return Ok(None);
        };
        debug_assert!(checkpoint.kind.is_restartable());
        let now = self.ctx.now();
        let fresh = WorkItem {
            work_item_id: WorkItemId::generate(),
            task_id: item.task_id.clone(),
            work_type: item.work_type.clone(),
            status: WorkItemStatus::Pending,
            lease: None,
            retry_count: item.retry_count.saturating_add(1),
            input: item.input.clone(),
            output: None,
            created_at: now,
            updated_at: now,
        };
        self.ctx.store.insert_work_item(&fresh).map_err(store_failure)?;
        self.events.emit(
            &item.task_id,
            EventDraft::new("recovery_initiated", EventActor::Recovery, span)
                .with_phase(EventPhase::Recovery)
                .with_payload("expired_work_item_id", json!(item_id.as_str()))
                .with_payload("new_work_item_id", json!(fresh.work_item_id.as_str()))
                .with_payload("checkpoint_seq", json!(checkpoint.sequence_number))
                .with_payload("checkpoint_kind", json!(checkpoint.kind.as_str())),
        )?;
        Ok(Some(fresh.work_item_id))
    }

    /// Appends a checkpoint for a task.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] when the write fails.
    pub fn checkpoint(
        &self,
        task_id: &warden_core::TaskId,
        work_item_id: Option<&WorkItemId>,
        kind: CheckpointKind,
        snapshot: &serde_json::Value,
    ) -> Result<warden_core::Checkpoint, KernelError> {
        self.ctx
            .store
            .append_checkpoint(task_id, work_item_id, kind, snapshot, self.ctx.now())
            .map_err(store_failure)
    }
}
