// crates/warden-store-sqlite/src/repo/executions.rs
// ============================================================================
// Module: Execution Repository
// Description: Action execution log, side-effect ledger, rollback history.
// Purpose: Persist the audited record of every externally visible action.
// Dependencies: rusqlite, serde_json, warden-core
// ============================================================================

//! ## Overview
//! Execution rows are inserted `pending`, transitioned through `running` to a
//! terminal status, and never deleted. Observed side effects land in the
//! per-effect table with their declaration flag; undeclared effects are also
//! copied into the execution's `unexpected_effects_json` summary.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::Row;
use rusqlite::params;
use warden_core::ActionId;
use warden_core::AgentId;
use warden_core::EvidenceId;
use warden_core::ExecutionId;
use warden_core::ExecutionRecord;
use warden_core::ExecutionStatus;
use warden_core::ObservedEffect;
use warden_core::PlanId;
use warden_core::RollbackRecord;
use warden_core::RollbackStatus;
use warden_core::SideEffectLedger;
use warden_core::TaskId;
use warden_core::Timestamp;

use crate::repo::from_json_str;
use crate::repo::tasks::bad_column;
use crate::repo::to_json_string;
use crate::store::ControlStore;
use crate::store::SqliteStoreError;
use crate::store::classify_db_error;

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Column list shared by execution queries.
const EXECUTION_COLUMNS: &str = "execution_id, action_id, task_id, decision_id, agent_id, \
     status, params_json, result_json, error_message, evidence_id, started_at, completed_at, \
     duration_ms";

/// Maps one `action_execution_log` row (without effects) into a record.
fn map_execution_row(row: &Row<'_>) -> Result<ExecutionRecord, rusqlite::Error> {
    let execution_id: String = row.get(0)?;
    let action_id: String = row.get(1)?;
    let task_id: String = row.get(2)?;
    let decision_id: String = row.get(3)?;
    let agent_id: String = row.get(4)?;
    let status: String = row.get(5)?;
    let params_json: String = row.get(6)?;
    let result_json: Option<String> = row.get(7)?;
    let error_message: Option<String> = row.get(8)?;
    let evidence_id: Option<String> = row.get(9)?;
    let started_at: i64 = row.get(10)?;
    let completed_at: Option<i64> = row.get(11)?;
    let duration_ms: Option<i64> = row.get(12)?;
    let status = ExecutionStatus::parse(&status)
        .ok_or_else(|| bad_column(5, format!("unknown execution status {status}")))?;
    let params = serde_json::from_str(&params_json)
        .map_err(|err| bad_column(6, format!("execution params: {err}")))?;
    let result = result_json
        .map(|raw| {
            serde_json::from_str(&raw)
                .map_err(|err| bad_column(7, format!("execution result: {err}")))
        })
        .transpose()?;
    let duration_ms = duration_ms
        .map(|value| {
            u64::try_from(value).map_err(|_| bad_column(12, format!("bad duration {value}")))
        })
        .transpose()?;
    Ok(ExecutionRecord {
        execution_id: ExecutionId::new(execution_id),
        action_id: ActionId::new(action_id),
        task_id: TaskId::new(task_id),
        decision_id: PlanId::new(decision_id),
        agent_id: AgentId::new(agent_id),
        status,
        params,
        result,
        error_message,
        side_effects: SideEffectLedger::default(),
        evidence_id: evidence_id.map(EvidenceId::new),
        started_at: Timestamp::from_unix_millis(started_at),
        completed_at: completed_at.map(Timestamp::from_unix_millis),
        duration_ms,
    })
}

// ============================================================================
// SECTION: Execution Operations
// ============================================================================

impl ControlStore {
    /// Inserts an execution row in `pending` together with its declared
    /// side-effect set.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the write fails.
    pub fn insert_execution(
        &self,
        record: &ExecutionRecord,
        declared_effects: &[String],
    ) -> Result<(), SqliteStoreError> {
        let params_json = to_json_string(&record.params)?;
        let declared = to_json_string(&declared_effects)?;
        self.with_write(|tx| {
            tx.execute(
                "INSERT INTO action_execution_log (execution_id, action_id, task_id, \
                 decision_id, agent_id, status, params_json, started_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.execution_id.as_str(),
                    record.action_id.as_str(),
                    record.task_id.as_str(),
                    record.decision_id.as_str(),
                    record.agent_id.as_str(),
                    record.status.as_str(),
                    params_json,
                    record.started_at.as_unix_millis()
                ],
            )
            .map_err(|err| classify_db_error(&err))?;
            tx.execute(
                "INSERT INTO action_side_effects (execution_id, declared_effects_json, \
                 unexpected_effects_json) VALUES (?1, ?2, '[]')",
                params![record.execution_id.as_str(), declared],
            )
            .map_err(|err| classify_db_error(&err))?;
            Ok(())
        })
    }

    /// Transitions an execution to `running`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::NotFound`] when the row is not pending.
    pub fn mark_execution_running(
        &self,
        execution_id: &ExecutionId,
    ) -> Result<(), SqliteStoreError> {
        self.with_write(|tx| {
            let updated = tx
                .execute(
                    "UPDATE action_execution_log SET status = 'running' \
                     WHERE execution_id = ?1 AND status = 'pending'",
                    params![execution_id.as_str()],
                )
                .map_err(|err| classify_db_error(&err))?;
            if updated == 0 {
                return Err(SqliteStoreError::NotFound(format!(
                    "pending execution {execution_id}"
                )));
            }
            Ok(())
        })
    }

    /// Completes an execution with a terminal status.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] for non-terminal targets and
    /// [`SqliteStoreError::NotFound`] when the row is not running.
    #[allow(clippy::too_many_arguments, reason = "Terminal write carries the full outcome.")]
    pub fn complete_execution(
        &self,
        execution_id: &ExecutionId,
        status: ExecutionStatus,
        result: Option<&serde_json::Value>,
        error_message: Option<&str>,
        evidence_id: Option<&EvidenceId>,
        now: Timestamp,
        duration_ms: u64,
    ) -> Result<(), SqliteStoreError> {
        if matches!(status, ExecutionStatus::Pending | ExecutionStatus::Running) {
            return Err(SqliteStoreError::Invalid(
                "completion status must be terminal".to_string(),
            ));
        }
        let result = result.map(to_json_string).transpose()?;
        let duration = i64::try_from(duration_ms)
            .map_err(|_| SqliteStoreError::Invalid("duration overflow".to_string()))?;
        self.with_write(|tx| {
            let updated = tx
                .execute(
                    "UPDATE action_execution_log SET status = ?1, result_json = ?2, \
                     error_message = ?3, evidence_id = ?4, completed_at = ?5, duration_ms = ?6 \
                     WHERE execution_id = ?7 AND status IN ('pending', 'running')",
                    params![
                        status.as_str(),
                        result,
                        error_message,
                        evidence_id.map(EvidenceId::as_str),
                        now.as_unix_millis(),
                        duration,
                        execution_id.as_str()
                    ],
                )
                .map_err(|err| classify_db_error(&err))?;
            if updated == 0 {
                return Err(SqliteStoreError::NotFound(format!(
                    "open execution {execution_id}"
                )));
            }
            Ok(())
        })
    }

    /// Marks a successful execution as rolled back.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::NotFound`] when the row is not `success`.
    pub fn mark_execution_rolled_back(
        &self,
        execution_id: &ExecutionId,
    ) -> Result<(), SqliteStoreError> {
        self.with_write(|tx| {
            let updated = tx
                .execute(
                    "UPDATE action_execution_log SET status = 'rolled_back' \
                     WHERE execution_id = ?1 AND status = 'success'",
                    params![execution_id.as_str()],
                )
                .map_err(|err| classify_db_error(&err))?;
            if updated == 0 {
                return Err(SqliteStoreError::NotFound(format!(
                    "successful execution {execution_id}"
                )));
            }
            Ok(())
        })
    }

    /// Fetches an execution record with its side-effect ledger attached.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::NotFound`] when the row does not exist.
    pub fn fetch_execution(
        &self,
        execution_id: &ExecutionId,
    ) -> Result<ExecutionRecord, SqliteStoreError> {
        let mut record = self.with_read(|connection| {
            connection
                .query_row(
                    &format!(
                        "SELECT {EXECUTION_COLUMNS} FROM action_execution_log \
                         WHERE execution_id = ?1"
                    ),
                    params![execution_id.as_str()],
                    map_execution_row,
                )
                .map_err(|err| match err {
                    rusqlite::Error::QueryReturnedNoRows => {
                        SqliteStoreError::NotFound(format!("execution {execution_id}"))
                    }
                    other => classify_db_error(&other),
                })
        })?;
        record.side_effects = self.fetch_side_effects(execution_id)?;
        Ok(record)
    }

    /// Lists executions for a task ordered by start time.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn list_executions(
        &self,
        task_id: &TaskId,
    ) -> Result<Vec<ExecutionRecord>, SqliteStoreError> {
        self.with_read(|connection| {
            let mut stmt = connection
                .prepare(&format!(
                    "SELECT {EXECUTION_COLUMNS} FROM action_execution_log \
                     WHERE task_id = ?1 ORDER BY started_at ASC, execution_id ASC"
                ))
                .map_err(|err| classify_db_error(&err))?;
            let rows = stmt
                .query_map(params![task_id.as_str()], map_execution_row)
                .map_err(|err| classify_db_error(&err))?;
            let mut results = Vec::new();
            for row in rows {
                results.push(row.map_err(|err| classify_db_error(&err))?);
            }
            Ok(results)
        })
    }
}

// ============================================================================
// SECTION: Side Effect Operations
// ============================================================================

impl ControlStore {
    /// Records one observed side effect; undeclared effects also extend the
    /// execution's unexpected summary in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the write fails.
    pub fn record_observed_effect(
        &self,
        execution_id: &ExecutionId,
        effect: &ObservedEffect,
    ) -> Result<(), SqliteStoreError> {
        self.with_write(|tx| {
            tx.execute(
                "INSERT INTO action_side_effects_individual (execution_id, effect_type, \
                 target, was_declared, observed_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    execution_id.as_str(),
                    effect.effect_type,
                    effect.target,
                    i64::from(effect.was_declared),
                    effect.observed_at.as_unix_millis()
                ],
            )
            .map_err(|err| classify_db_error(&err))?;
            if !effect.was_declared {
                tx.execute(
                    "UPDATE action_side_effects SET unexpected_effects_json = \
                     json_insert(unexpected_effects_json, '$[#]', json(?1)) \
                     WHERE execution_id = ?2",
                    params![
                        serde_json::json!({
                            "effect_type": effect.effect_type,
                            "target": effect.target,
                        })
                        .to_string(),
                        execution_id.as_str()
                    ],
                )
                .map_err(|err| classify_db_error(&err))?;
            }
            Ok(())
        })
    }

    /// Fetches the side-effect ledger for an execution.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn fetch_side_effects(
        &self,
        execution_id: &ExecutionId,
    ) -> Result<SideEffectLedger, SqliteStoreError> {
        self.with_read(|connection| {
            let declared: String = connection
                .query_row(
                    "SELECT declared_effects_json FROM action_side_effects \
                     WHERE execution_id = ?1",
                    params![execution_id.as_str()],
                    |row| row.get(0),
                )
                .or_else(|err| {
                    if matches!(err, rusqlite::Error::QueryReturnedNoRows) {
                        Ok("[]".to_string())
                    } else {
                        Err(classify_db_error(&err))
                    }
                })?;
            let mut ledger = SideEffectLedger {
                declared: from_json_str(&declared)?,
                observed: Vec::new(),
                unexpected: Vec::new(),
            };
            let mut stmt = connection
                .prepare(
                    "SELECT effect_type, target, was_declared, observed_at \
                     FROM action_side_effects_individual WHERE execution_id = ?1 \
                     ORDER BY effect_rowid ASC",
                )
                .map_err(|err| classify_db_error(&err))?;
            let rows = stmt
                .query_map(params![execution_id.as_str()], |row| {
                    let effect_type: String = row.get(0)?;
                    let target: String = row.get(1)?;
                    let was_declared: i64 = row.get(2)?;
                    let observed_at: i64 = row.get(3)?;
                    Ok(ObservedEffect {
                        effect_type,
                        target,
                        was_declared: was_declared != 0,
                        observed_at: Timestamp::from_unix_millis(observed_at),
                    })
                })
                .map_err(|err| classify_db_error(&err))?;
            for row in rows {
                let effect = row.map_err(|err| classify_db_error(&err))?;
                if !effect.was_declared {
                    ledger.unexpected.push(effect.clone());
                }
                ledger.observed.push(effect);
            }
            Ok(ledger)
        })
    }
}

// ============================================================================
// SECTION: Rollback Operations
// ============================================================================

impl ControlStore {
    /// Inserts a rollback history record.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the write fails.
    pub fn insert_rollback(&self, record: &RollbackRecord) -> Result<(), SqliteStoreError> {
        self.with_write(|tx| {
            tx.execute(
                "INSERT INTO rollback_history (execution_id, rollback_execution_id, status, \
                 reason, recorded_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.execution_id.as_str(),
                    record.rollback_execution_id.as_ref().map(ExecutionId::as_str),
                    record.status.as_str(),
                    record.reason,
                    record.recorded_at.as_unix_millis()
                ],
            )
            .map_err(|err| classify_db_error(&err))?;
            Ok(())
        })
    }

    /// Lists rollback history for an execution, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn list_rollbacks(
        &self,
        execution_id: &ExecutionId,
    ) -> Result<Vec<RollbackRecord>, SqliteStoreError> {
        self.with_read(|connection| {
            let mut stmt = connection
                .prepare(
                    "SELECT execution_id, rollback_execution_id, status, reason, recorded_at \
                     FROM rollback_history WHERE execution_id = ?1 ORDER BY rollback_rowid ASC",
                )
                .map_err(|err| classify_db_error(&err))?;
            let rows = stmt
                .query_map(params![execution_id.as_str()], |row| {
                    let execution_id: String = row.get(0)?;
                    let rollback_execution_id: Option<String> = row.get(1)?;
                    let status: String = row.get(2)?;
                    let reason: String = row.get(3)?;
                    let recorded_at: i64 = row.get(4)?;
                    let status = RollbackStatus::parse(&status)
                        .ok_or_else(|| bad_column(2, format!("unknown rollback status {status}")))?;
                    Ok(RollbackRecord {
                        execution_id: ExecutionId::new(execution_id),
                        rollback_execution_id: rollback_execution_id.map(ExecutionId::new),
                        status,
                        reason,
                        recorded_at: Timestamp::from_unix_millis(recorded_at),
                    })
                })
                .map_err(|err| classify_db_error(&err))?;
            let mut results = Vec::new();
            for row in rows {
                results.push(row.map_err(|err| classify_db_error(&err))?);
            }
            Ok(results)
        })
    }
}
