// crates/warden-store-sqlite/src/repo/verdicts.rs
// ============================================================================
// Module: Verdict Repository
// Description: Immutable guardian verdict rows.
// Purpose: Persist the review outcomes that gate terminal task success.
// Dependencies: rusqlite, warden-core
// ============================================================================

//! ## Overview
//! Verdicts are append-only and trigger-protected. The latest verdict for a
//! task decides whether the runner may mark it `succeeded`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::params;
use warden_core::GuardianVerdict;
use warden_core::TaskId;
use warden_core::Timestamp;
use warden_core::VerdictOutcome;

use crate::store::ControlStore;
use crate::store::SqliteStoreError;
use crate::store::classify_db_error;

// ============================================================================
// SECTION: Verdict Operations
// ============================================================================

impl ControlStore {
    /// Appends one guardian verdict.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the write fails.
    pub fn record_verdict(&self, verdict: &GuardianVerdict) -> Result<(), SqliteStoreError> {
        self.with_write(|tx| {
            tx.execute(
                "INSERT INTO guardian_verdicts (task_id, outcome, reviewer, notes, issued_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    verdict.task_id.as_str(),
                    verdict.outcome.as_str(),
                    verdict.reviewer,
                    verdict.notes,
                    verdict.issued_at.as_unix_millis()
                ],
            )
            .map_err(|err| classify_db_error(&err))?;
            Ok(())
        })
    }

    /// Returns the latest verdict for a task, when any.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn latest_verdict(
        &self,
        task_id: &TaskId,
    ) -> Result<Option<GuardianVerdict>, SqliteStoreError> {
        self.with_read(|connection| {
            connection
                .query_row(
                    "SELECT task_id, outcome, reviewer, notes, issued_at FROM guardian_verdicts \
                     WHERE task_id = ?1 ORDER BY verdict_rowid DESC LIMIT 1",
                    params![task_id.as_str()],
                    |row| {
                        let task_id: String = row.get(0)?;
                        let outcome: String = row.get(1)?;
                        let reviewer: String = row.get(2)?;
                        let notes: Option<String> = row.get(3)?;
                        let issued_at: i64 = row.get(4)?;
                        Ok((task_id, outcome, reviewer, notes, issued_at))
                    },
                )
                .map(Some)
                .or_else(|err| {
                    if matches!(err, rusqlite::Error::QueryReturnedNoRows) {
                        Ok(None)
                    } else {
                        Err(classify_db_error(&err))
                    }
                })?
                .map(|(task_id, outcome, reviewer, notes, issued_at)| {
                    let outcome = VerdictOutcome::parse(&outcome).ok_or_else(|| {
                        SqliteStoreError::Corrupt(format!("unknown verdict outcome {outcome}"))
                    })?;
                    Ok(GuardianVerdict {
                        task_id: TaskId::new(task_id),
                        outcome,
                        reviewer,
                        notes,
                        issued_at: Timestamp::from_unix_millis(issued_at),
                    })
                })
                .transpose()
        })
    }
}
