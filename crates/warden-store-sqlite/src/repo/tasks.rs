// crates/warden-store-sqlite/src/repo/tasks.rs
// ============================================================================
// Module: Task Repository
// Description: Task rows, lineage mappings, and the audit trail.
// Purpose: Persist the root aggregate and its derivative identifiers.
// Dependencies: rusqlite, serde_json, warden-core
// ============================================================================

//! ## Overview
//! Task rows are mutable only through the runner holding the task's lease;
//! lineage and audit rows are append-only and trigger-protected. Status
//! parsing fails closed: an unknown label in storage surfaces as corruption
//! rather than a default.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::Row;
use rusqlite::params;
use warden_core::AuditSeverity;
use warden_core::ExitReason;
use warden_core::LineageKind;
use warden_core::SessionId;
use warden_core::Task;
use warden_core::TaskAudit;
use warden_core::TaskId;
use warden_core::TaskLineage;
use warden_core::TaskStatus;
use warden_core::Timestamp;

use crate::repo::from_json_str;
use crate::repo::to_json_string;
use crate::store::ControlStore;
use crate::store::SqliteStoreError;
use crate::store::classify_db_error;

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Builds a row-conversion failure for an unparseable stored label.
pub(crate) fn bad_column(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::other(message)),
    )
}

/// Maps one `tasks` row into a [`Task`].
fn map_task_row(row: &Row<'_>) -> Result<Task, rusqlite::Error> {
    let task_id: String = row.get(0)?;
    let session_id: Option<String> = row.get(1)?;
    let title: String = row.get(2)?;
    let status: String = row.get(3)?;
    let exit_reason: Option<String> = row.get(4)?;
    let project_id: Option<String> = row.get(5)?;
    let repo_id: Option<String> = row.get(6)?;
    let metadata_json: String = row.get(7)?;
    let created_at: i64 = row.get(8)?;
    let updated_at: i64 = row.get(9)?;
    let status = TaskStatus::parse(&status)
        .ok_or_else(|| bad_column(3, format!("unknown task status {status}")))?;
    let exit_reason = match exit_reason {
        Some(label) => Some(
            ExitReason::parse(&label)
                .ok_or_else(|| bad_column(4, format!("unknown exit reason {label}")))?,
        ),
        None => None,
    };
    let metadata = serde_json::from_str(&metadata_json)
        .map_err(|err| bad_column(7, format!("task metadata: {err}")))?;
    Ok(Task {
        task_id: TaskId::new(task_id),
        session_id: session_id.map(SessionId::new),
        title,
        status,
        exit_reason,
        project_id,
        repo_id,
        metadata,
        created_at: Timestamp::from_unix_millis(created_at),
        updated_at: Timestamp::from_unix_millis(updated_at),
    })
}

// ============================================================================
// SECTION: Task Operations
// ============================================================================

impl ControlStore {
    /// Inserts a new task row.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the insert fails.
    pub fn insert_task(&self, task: &Task) -> Result<(), SqliteStoreError> {
        let metadata = to_json_string(&task.metadata)?;
        self.with_write(|tx| {
            tx.execute(
                "INSERT INTO tasks (task_id, session_id, title, status, exit_reason, \
                 project_id, repo_id, metadata_json, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    task.task_id.as_str(),
                    task.session_id.as_ref().map(SessionId::as_str),
                    task.title,
                    task.status.as_str(),
                    task.exit_reason.map(ExitReason::as_str),
                    task.project_id,
                    task.repo_id,
                    metadata,
                    task.created_at.as_unix_millis(),
                    task.updated_at.as_unix_millis()
                ],
            )
            .map_err(|err| classify_db_error(&err))?;
            Ok(())
        })
    }

    /// Fetches a task by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::NotFound`] when the task does not exist.
    pub fn fetch_task(&self, task_id: &TaskId) -> Result<Task, SqliteStoreError> {
        self.with_read(|connection| {
            connection
                .query_row(
                    "SELECT task_id, session_id, title, status, exit_reason, project_id, \
                     repo_id, metadata_json, created_at, updated_at FROM tasks WHERE task_id = ?1",
                    params![task_id.as_str()],
                    map_task_row,
                )
                .map_err(|err| match err {
                    rusqlite::Error::QueryReturnedNoRows => {
                        SqliteStoreError::NotFound(format!("task {task_id}"))
                    }
                    other => classify_db_error(&other),
                })
        })
    }

    /// Updates a task's status (and optional exit reason).
    ///
    /// Terminal rows are never modified again: the update is conditioned on
    /// the current status being non-terminal.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::NotFound`] when the task does not exist or
    /// is already terminal.
    pub fn update_task_status(
        &self,
        task_id: &TaskId,
        status: TaskStatus,
        exit_reason: Option<ExitReason>,
        now: Timestamp,
    ) -> Result<(), SqliteStoreError> {
        self.with_write(|tx| {
            let updated = tx
                .execute(
                    "UPDATE tasks SET status = ?1, exit_reason = ?2, updated_at = ?3 \
                     WHERE task_id = ?4 AND status NOT IN ('succeeded', 'failed', 'canceled')",
                    params![
                        status.as_str(),
                        exit_reason.map(ExitReason::as_str),
                        now.as_unix_millis(),
                        task_id.as_str()
                    ],
                )
                .map_err(|err| classify_db_error(&err))?;
            if updated == 0 {
                return Err(SqliteStoreError::NotFound(format!(
                    "task {task_id} missing or terminal"
                )));
            }
            Ok(())
        })
    }

    /// Lists tasks by status, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn list_tasks(
        &self,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> Result<Vec<Task>, SqliteStoreError> {
        let limit = i64::try_from(limit)
            .map_err(|_| SqliteStoreError::Invalid("limit too large".to_string()))?;
        self.with_read(|connection| {
            let mut results = Vec::new();
            match status {
                Some(status) => {
                    let mut stmt = connection
                        .prepare(
                            "SELECT task_id, session_id, title, status, exit_reason, project_id, \
                             repo_id, metadata_json, created_at, updated_at FROM tasks \
                             WHERE status = ?1 ORDER BY task_id DESC LIMIT ?2",
                        )
                        .map_err(|err| classify_db_error(&err))?;
                    let rows = stmt
                        .query_map(params![status.as_str(), limit], map_task_row)
                        .map_err(|err| classify_db_error(&err))?;
                    for row in rows {
                        results.push(row.map_err(|err| classify_db_error(&err))?);
                    }
                }
                None => {
                    let mut stmt = connection
                        .prepare(
                            "SELECT task_id, session_id, title, status, exit_reason, project_id, \
                             repo_id, metadata_json, created_at, updated_at FROM tasks \
                             ORDER BY task_id DESC LIMIT ?1",
                        )
                        .map_err(|err| classify_db_error(&err))?;
                    let rows = stmt
                        .query_map(params![limit], map_task_row)
                        .map_err(|err| classify_db_error(&err))?;
                    for row in rows {
                        results.push(row.map_err(|err| classify_db_error(&err))?);
                    }
                }
            }
            Ok(results)
        })
    }
}

// ============================================================================
// SECTION: Lineage Operations
// ============================================================================

impl ControlStore {
    /// Records one lineage mapping; duplicate mappings are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Constraint`] on duplicates.
    pub fn record_lineage(&self, lineage: &TaskLineage) -> Result<(), SqliteStoreError> {
        self.with_write(|tx| {
            tx.execute(
                "INSERT INTO task_lineage (task_id, kind, ref_id, recorded_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    lineage.task_id.as_str(),
                    lineage.kind.as_str(),
                    lineage.ref_id,
                    lineage.recorded_at.as_unix_millis()
                ],
            )
            .map_err(|err| classify_db_error(&err))?;
            Ok(())
        })
    }

    /// Lists lineage rows for a task, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn list_lineage(&self, task_id: &TaskId) -> Result<Vec<TaskLineage>, SqliteStoreError> {
        self.with_read(|connection| {
            let mut stmt = connection
                .prepare(
                    "SELECT task_id, kind, ref_id, recorded_at FROM task_lineage \
                     WHERE task_id = ?1 ORDER BY recorded_at ASC, kind ASC, ref_id ASC",
                )
                .map_err(|err| classify_db_error(&err))?;
            let rows = stmt
                .query_map(params![task_id.as_str()], |row| {
                    let task_id: String = row.get(0)?;
                    let kind: String = row.get(1)?;
                    let ref_id: String = row.get(2)?;
                    let recorded_at: i64 = row.get(3)?;
                    Ok((task_id, kind, ref_id, recorded_at))
                })
                .map_err(|err| classify_db_error(&err))?;
            let mut results = Vec::new();
            for row in rows {
                let (task_id, kind, ref_id, recorded_at) =
                    row.map_err(|err| classify_db_error(&err))?;
                let kind = LineageKind::parse(&kind).ok_or_else(|| {
                    SqliteStoreError::Corrupt(format!("unknown lineage kind {kind}"))
                })?;
                results.push(TaskLineage {
                    task_id: TaskId::new(task_id),
                    kind,
                    ref_id,
                    recorded_at: Timestamp::from_unix_millis(recorded_at),
                });
            }
            Ok(results)
        })
    }
}

// ============================================================================
// SECTION: Audit Operations
// ============================================================================

impl ControlStore {
    /// Appends one audit row.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the insert fails.
    pub fn record_audit(&self, audit: &TaskAudit) -> Result<(), SqliteStoreError> {
        let context = to_json_string(&audit.context)?;
        self.with_write(|tx| {
            tx.execute(
                "INSERT INTO task_audits (task_id, severity, code, message, context_json, \
                 recorded_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    audit.task_id.as_ref().map(TaskId::as_str),
                    audit.severity.as_str(),
                    audit.code,
                    audit.message,
                    context,
                    audit.recorded_at.as_unix_millis()
                ],
            )
            .map_err(|err| classify_db_error(&err))?;
            Ok(())
        })
    }

    /// Lists audit rows for a task, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn list_audits(&self, task_id: &TaskId) -> Result<Vec<TaskAudit>, SqliteStoreError> {
        self.with_read(|connection| {
            let mut stmt = connection
                .prepare(
                    "SELECT task_id, severity, code, message, context_json, recorded_at \
                     FROM task_audits WHERE task_id = ?1 ORDER BY audit_id ASC",
                )
                .map_err(|err| classify_db_error(&err))?;
            let rows = stmt
                .query_map(params![task_id.as_str()], |row| {
                    let task_id: Option<String> = row.get(0)?;
                    let severity: String = row.get(1)?;
                    let code: String = row.get(2)?;
                    let message: String = row.get(3)?;
                    let context_json: String = row.get(4)?;
                    let recorded_at: i64 = row.get(5)?;
                    Ok((task_id, severity, code, message, context_json, recorded_at))
                })
                .map_err(|err| classify_db_error(&err))?;
            let mut results = Vec::new();
            for row in rows {
                let (task_id, severity, code, message, context_json, recorded_at) =
                    row.map_err(|err| classify_db_error(&err))?;
                let severity = AuditSeverity::parse(&severity).ok_or_else(|| {
                    SqliteStoreError::Corrupt(format!("unknown audit severity {severity}"))
                })?;
                results.push(TaskAudit {
                    task_id: task_id.map(TaskId::new),
                    severity,
                    code,
                    message,
                    context: from_json_str(&context_json)?,
                    recorded_at: Timestamp::from_unix_millis(recorded_at),
                });
            }
            Ok(results)
        })
    }
}
