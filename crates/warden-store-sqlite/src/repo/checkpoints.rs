// crates/warden-store-sqlite/src/repo/checkpoints.rs
// ============================================================================
// Module: Checkpoint Repository
// Description: Append-only checkpoints and the idempotency cache.
// Purpose: Persist recovery anchors and deduplicate side-effecting calls.
// Dependencies: rusqlite, serde_json, warden-core
// ============================================================================

//! ## Overview
//! Checkpoint sequence numbers are allocated inside the writer transaction
//! with `MAX + 1`, which the single-writer discipline makes race-free. The
//! idempotency surface enforces the `(key, request_hash)` contract: a key
//! reused with a different hash is rejected as a caller bug.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::Row;
use rusqlite::params;
use warden_core::Checkpoint;
use warden_core::CheckpointKind;
use warden_core::HashDigest;
use warden_core::IdempotencyRecord;
use warden_core::IdempotencyStatus;
use warden_core::TaskId;
use warden_core::Timestamp;
use warden_core::WorkItemId;

use crate::repo::tasks::bad_column;
use crate::repo::to_json_string;
use crate::store::ControlStore;
use crate::store::SqliteStoreError;
use crate::store::classify_db_error;

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Maps one `checkpoints` row into a [`Checkpoint`].
fn map_checkpoint_row(row: &Row<'_>) -> Result<Checkpoint, rusqlite::Error> {
    let task_id: String = row.get(0)?;
    let sequence_number: i64 = row.get(1)?;
    let work_item_id: Option<String> = row.get(2)?;
    let kind: String = row.get(3)?;
    let snapshot_json: String = row.get(4)?;
    let created_at: i64 = row.get(5)?;
    let sequence_number = u64::try_from(sequence_number)
        .map_err(|_| bad_column(1, format!("negative checkpoint seq {sequence_number}")))?;
    let kind = CheckpointKind::parse(&kind)
        .ok_or_else(|| bad_column(3, format!("unknown checkpoint kind {kind}")))?;
    let snapshot = serde_json::from_str(&snapshot_json)
        .map_err(|err| bad_column(4, format!("checkpoint snapshot: {err}")))?;
    Ok(Checkpoint {
        task_id: TaskId::new(task_id),
        sequence_number,
        work_item_id: work_item_id.map(WorkItemId::new),
        kind,
        snapshot,
        created_at: Timestamp::from_unix_millis(created_at),
    })
}

// ============================================================================
// SECTION: Checkpoint Operations
// ============================================================================

impl ControlStore {
    /// Appends a checkpoint, allocating the next dense sequence number.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the write fails.
    pub fn append_checkpoint(
        &self,
        task_id: &TaskId,
        work_item_id: Option<&WorkItemId>,
        kind: CheckpointKind,
        snapshot: &serde_json::Value,
        now: Timestamp,
    ) -> Result<Checkpoint, SqliteStoreError> {
        let snapshot_json = to_json_string(snapshot)?;
        let sequence_number = self.with_write(|tx| {
            let next: i64 = tx
                .query_row(
                    "SELECT COALESCE(MAX(sequence_number), 0) + 1 FROM checkpoints \
                     WHERE task_id = ?1",
                    params![task_id.as_str()],
                    |row| row.get(0),
                )
                .map_err(|err| classify_db_error(&err))?;
            tx.execute(
                "INSERT INTO checkpoints (task_id, sequence_number, work_item_id, kind, \
                 snapshot_json, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    task_id.as_str(),
                    next,
                    work_item_id.map(WorkItemId::as_str),
                    kind.as_str(),
                    snapshot_json,
                    now.as_unix_millis()
                ],
            )
            .map_err(|err| classify_db_error(&err))?;
            u64::try_from(next)
                .map_err(|_| SqliteStoreError::Corrupt(format!("checkpoint seq overflow {next}")))
        })?;
        Ok(Checkpoint {
            task_id: task_id.clone(),
            sequence_number,
            work_item_id: work_item_id.cloned(),
            kind,
            snapshot: snapshot.clone(),
            created_at: now,
        })
    }

    /// Returns the latest checkpoint for a task, when any.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn latest_checkpoint(
        &self,
        task_id: &TaskId,
    ) -> Result<Option<Checkpoint>, SqliteStoreError> {
        self.with_read(|connection| {
            connection
                .query_row(
                    "SELECT task_id, sequence_number, work_item_id, kind, snapshot_json, \
                     created_at FROM checkpoints WHERE task_id = ?1 \
                     ORDER BY sequence_number DESC LIMIT 1",
                    params![task_id.as_str()],
                    map_checkpoint_row,
                )
                .map(Some)
                .or_else(|err| {
                    if matches!(err, rusqlite::Error::QueryReturnedNoRows) {
                        Ok(None)
                    } else {
                        Err(classify_db_error(&err))
                    }
                })
        })
    }

    /// Returns the latest restartable checkpoint for a task, when any.
    ///
    /// Restartable kinds are `iteration_start`, `iteration_end`, and
    /// `state_transition`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn latest_restartable_checkpoint(
        &self,
        task_id: &TaskId,
    ) -> Result<Option<Checkpoint>, SqliteStoreError> {
        self.with_read(|connection| {
            connection
                .query_row(
                    "SELECT task_id, sequence_number, work_item_id, kind, snapshot_json, \
                     created_at FROM checkpoints WHERE task_id = ?1 \
                     AND kind IN ('iteration_start', 'iteration_end', 'state_transition') \
                     ORDER BY sequence_number DESC LIMIT 1",
                    params![task_id.as_str()],
                    map_checkpoint_row,
                )
                .map(Some)
                .or_else(|err| {
                    if matches!(err, rusqlite::Error::QueryReturnedNoRows) {
                        Ok(None)
                    } else {
                        Err(classify_db_error(&err))
                    }
                })
        })
    }

    /// Lists all checkpoints for a task, ascending by sequence number.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn list_checkpoints(&self, task_id: &TaskId) -> Result<Vec<Checkpoint>, SqliteStoreError> {
        self.with_read(|connection| {
            let mut stmt = connection
                .prepare(
                    "SELECT task_id, sequence_number, work_item_id, kind, snapshot_json, \
                     created_at FROM checkpoints WHERE task_id = ?1 ORDER BY sequence_number ASC",
                )
                .map_err(|err| classify_db_error(&err))?;
            let rows = stmt
                .query_map(params![task_id.as_str()], map_checkpoint_row)
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
// SECTION: Idempotency Operations
// ============================================================================

/// Outcome of an idempotency claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdempotencyClaim {
    /// Key is fresh (or a failed attempt is being retried); caller proceeds.
    Fresh,
    /// Key already completed with the same hash; cached response returned.
    Cached(Option<serde_json::Value>),
    /// Key is pending in another call; caller should back off.
    InFlight,
    /// Key was reused with a different request hash.
    HashMismatch,
}

impl ControlStore {
    /// Claims an idempotency key for a request hash.
    ///
    /// The claim inserts a `pending` row when fresh, returns the cached
    /// response when completed with the same hash, and reports a mismatch
    /// when the key was reused with a different hash.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the write fails.
    pub fn claim_idempotency_key(
        &self,
        key: &str,
        request_hash: &HashDigest,
        now: Timestamp,
        expires_at: Option<Timestamp>,
    ) -> Result<IdempotencyClaim, SqliteStoreError> {
        let hash = request_hash.to_string();
        self.with_write(|tx| {
            let existing: Option<(String, Option<String>, String, Option<i64>)> = tx
                .query_row(
                    "SELECT request_hash, response_json, status, expires_at \
                     FROM idempotency_keys WHERE key = ?1",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )
                .map(Some)
                .or_else(|err| {
                    if matches!(err, rusqlite::Error::QueryReturnedNoRows) {
                        Ok(None)
                    } else {
                        Err(classify_db_error(&err))
                    }
                })?;
            if let Some((stored_hash, response, status, stored_expiry)) = existing {
                let expired = stored_expiry
                    .is_some_and(|expiry| expiry < now.as_unix_millis());
                if !expired {
                    if stored_hash != hash {
                        return Ok(IdempotencyClaim::HashMismatch);
                    }
                    let status = IdempotencyStatus::parse(&status).ok_or_else(|| {
                        SqliteStoreError::Corrupt(format!("unknown idempotency status {status}"))
                    })?;
                    return Ok(match status {
                        IdempotencyStatus::Pending => IdempotencyClaim::InFlight,
                        IdempotencyStatus::Completed => {
                            let cached = response
                                .map(|raw| {
                                    serde_json::from_str(&raw).map_err(|err| {
                                        SqliteStoreError::Corrupt(format!(
                                            "idempotency response: {err}"
                                        ))
                                    })
                                })
                                .transpose()?;
                            IdempotencyClaim::Cached(cached)
                        }
                        IdempotencyStatus::Failed => {
                            reclaim_idempotency_key(tx, key, now)?;
                            IdempotencyClaim::Fresh
                        }
                    });
                }
                // Expired rows are replaced outright.
                tx.execute("DELETE FROM idempotency_keys WHERE key = ?1", params![key])
                    .map_err(|err| classify_db_error(&err))?;
            }
            tx.execute(
                "INSERT INTO idempotency_keys (key, request_hash, status, created_at, \
                 expires_at) VALUES (?1, ?2, 'pending', ?3, ?4)",
                params![
                    key,
                    hash,
                    now.as_unix_millis(),
                    expires_at.map(Timestamp::as_unix_millis)
                ],
            )
            .map_err(|err| classify_db_error(&err))?;
            Ok(IdempotencyClaim::Fresh)
        })
    }

    /// Resolves a pending idempotency key with its final status and response.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::NotFound`] when the key is not pending.
    pub fn resolve_idempotency_key(
        &self,
        key: &str,
        status: IdempotencyStatus,
        response: Option<&serde_json::Value>,
    ) -> Result<(), SqliteStoreError> {
        if status == IdempotencyStatus::Pending {
            return Err(SqliteStoreError::Invalid(
                "resolution status must be terminal".to_string(),
            ));
        }
        let response = response.map(to_json_string).transpose()?;
        self.with_write(|tx| {
            let updated = tx
                .execute(
                    "UPDATE idempotency_keys SET status = ?1, response_json = ?2 \
                     WHERE key = ?3 AND status = 'pending'",
                    params![status.as_str(), response, key],
                )
                .map_err(|err| classify_db_error(&err))?;
            if updated == 0 {
                return Err(SqliteStoreError::NotFound(format!(
                    "pending idempotency key {key}"
                )));
            }
            Ok(())
        })
    }

    /// Fetches an idempotency record by key.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn fetch_idempotency_record(
        &self,
        key: &str,
    ) -> Result<Option<IdempotencyRecord>, SqliteStoreError> {
        self.with_read(|connection| {
            connection
                .query_row(
                    "SELECT key, request_hash, response_json, status, created_at, expires_at \
                     FROM idempotency_keys WHERE key = ?1",
                    params![key],
                    |row| {
                        let key: String = row.get(0)?;
                        let request_hash: String = row.get(1)?;
                        let response_json: Option<String> = row.get(2)?;
                        let status: String = row.get(3)?;
                        let created_at: i64 = row.get(4)?;
                        let expires_at: Option<i64> = row.get(5)?;
                        Ok((key, request_hash, response_json, status, created_at, expires_at))
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
                .map(|(key, request_hash, response_json, status, created_at, expires_at)| {
                    let request_hash = HashDigest::parse(&request_hash)
                        .map_err(|err| SqliteStoreError::Corrupt(err.to_string()))?;
                    let status = IdempotencyStatus::parse(&status).ok_or_else(|| {
                        SqliteStoreError::Corrupt(format!("unknown idempotency status {status}"))
                    })?;
                    let response = response_json
                        .map(|raw| {
                            serde_json::from_str(&raw).map_err(|err| {
                                SqliteStoreError::Corrupt(format!("idempotency response: {err}"))
                            })
                        })
                        .transpose()?;
                    Ok(IdempotencyRecord {
                        key,
                        request_hash,
                        response,
                        status,
                        created_at: Timestamp::from_unix_millis(created_at),
                        expires_at: expires_at.map(Timestamp::from_unix_millis),
                    })
                })
                .transpose()
        })
    }
}

/// Rewinds a failed idempotency row back to `pending` for a retry.
fn reclaim_idempotency_key(
    tx: &rusqlite::Transaction<'_>,
    key: &str,
    now: Timestamp,
) -> Result<(), SqliteStoreError> {
    tx.execute(
        "UPDATE idempotency_keys SET status = 'pending', response_json = NULL, \
         created_at = ?1 WHERE key = ?2",
        params![now.as_unix_millis(), key],
    )
    .map_err(|err| classify_db_error(&err))?;
    Ok(())
}
