// crates/warden-store-sqlite/src/repo/work_items.rs
// ============================================================================
// Module: Work Item Repository
// Description: Work item rows, conditional lease updates, expiry sweep.
// Purpose: Enforce single-writer-per-item through atomic lease claims.
// Dependencies: rusqlite, serde_json, warden-core
// ============================================================================

//! ## Overview
//! Lease operations are single conditional UPDATEs: acquisition succeeds iff
//! the current lease is null or expired, heartbeat and release succeed iff
//! the caller still owns the lease. The sweep marks in-progress items with
//! expired leases as `expired` and returns them for recovery.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::Row;
use rusqlite::params;
use warden_core::Lease;
use warden_core::OwnerId;
use warden_core::TaskId;
use warden_core::Timestamp;
use warden_core::WorkItem;
use warden_core::WorkItemId;
use warden_core::WorkItemStatus;

use crate::repo::tasks::bad_column;
use crate::repo::to_json_string;
use crate::store::ControlStore;
use crate::store::SqliteStoreError;
use crate::store::classify_db_error;

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Column list shared by every work item query.
const WORK_ITEM_COLUMNS: &str = "work_item_id, task_id, work_type, status, lease_owner, \
     lease_acquired_at, lease_expires_at, lease_heartbeat_at, retry_count, input_json, \
     output_json, created_at, updated_at";

/// Maps one `work_items` row into a [`WorkItem`].
fn map_work_item_row(row: &Row<'_>) -> Result<WorkItem, rusqlite::Error> {
    let work_item_id: String = row.get(0)?;
    let task_id: String = row.get(1)?;
    let work_type: String = row.get(2)?;
    let status: String = row.get(3)?;
    let lease_owner: Option<String> = row.get(4)?;
    let lease_acquired_at: Option<i64> = row.get(5)?;
    let lease_expires_at: Option<i64> = row.get(6)?;
    let lease_heartbeat_at: Option<i64> = row.get(7)?;
    let retry_count: i64 = row.get(8)?;
    let input_json: String = row.get(9)?;
    let output_json: Option<String> = row.get(10)?;
    let created_at: i64 = row.get(11)?;
    let updated_at: i64 = row.get(12)?;
    let status = WorkItemStatus::parse(&status)
        .ok_or_else(|| bad_column(3, format!("unknown work item status {status}")))?;
    let lease = match (lease_owner, lease_acquired_at, lease_expires_at, lease_heartbeat_at) {
        (Some(owner), Some(acquired), Some(expires), Some(heartbeat)) => Some(Lease {
            owner_id: OwnerId::new(owner),
            acquired_at: Timestamp::from_unix_millis(acquired),
            expires_at: Timestamp::from_unix_millis(expires),
            heartbeat_at: Timestamp::from_unix_millis(heartbeat),
        }),
        _ => None,
    };
    let retry_count = u32::try_from(retry_count)
        .map_err(|_| bad_column(8, format!("negative retry count {retry_count}")))?;
    let input = serde_json::from_str(&input_json)
        .map_err(|err| bad_column(9, format!("work item input: {err}")))?;
    let output = match output_json {
        Some(raw) => Some(
            serde_json::from_str(&raw)
                .map_err(|err| bad_column(10, format!("work item output: {err}")))?,
        ),
        None => None,
    };
    Ok(WorkItem {
        work_item_id: WorkItemId::new(work_item_id),
        task_id: TaskId::new(task_id),
        work_type,
        status,
        lease,
        retry_count,
        input,
        output,
        created_at: Timestamp::from_unix_millis(created_at),
        updated_at: Timestamp::from_unix_millis(updated_at),
    })
}

// ============================================================================
// SECTION: Work Item Operations
// ============================================================================

impl ControlStore {
    /// Inserts a new pending work item.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the insert fails.
    pub fn insert_work_item(&self, item: &WorkItem) -> Result<(), SqliteStoreError> {
        let input = to_json_string(&item.input)?;
        let output = item.output.as_ref().map(to_json_string).transpose()?;
        self.with_write(|tx| {
            tx.execute(
                "INSERT INTO work_items (work_item_id, task_id, work_type, status, \
                 retry_count, input_json, output_json, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    item.work_item_id.as_str(),
                    item.task_id.as_str(),
                    item.work_type,
                    item.status.as_str(),
                    item.retry_count,
                    input,
                    output,
                    item.created_at.as_unix_millis(),
                    item.updated_at.as_unix_millis()
                ],
            )
            .map_err(|err| classify_db_error(&err))?;
            Ok(())
        })
    }

    /// Fetches a work item by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::NotFound`] when the item does not exist.
    pub fn fetch_work_item(&self, id: &WorkItemId) -> Result<WorkItem, SqliteStoreError> {
        self.with_read(|connection| {
            connection
                .query_row(
                    &format!("SELECT {WORK_ITEM_COLUMNS} FROM work_items WHERE work_item_id = ?1"),
                    params![id.as_str()],
                    map_work_item_row,
                )
                .map_err(|err| match err {
                    rusqlite::Error::QueryReturnedNoRows => {
                        SqliteStoreError::NotFound(format!("work item {id}"))
                    }
                    other => classify_db_error(&other),
                })
        })
    }

    /// Lists work items for a task, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn list_work_items(&self, task_id: &TaskId) -> Result<Vec<WorkItem>, SqliteStoreError> {
        self.with_read(|connection| {
            let mut stmt = connection
                .prepare(&format!(
                    "SELECT {WORK_ITEM_COLUMNS} FROM work_items WHERE task_id = ?1 \
                     ORDER BY work_item_id ASC"
                ))
                .map_err(|err| classify_db_error(&err))?;
            let rows = stmt
                .query_map(params![task_id.as_str()], map_work_item_row)
                .map_err(|err| classify_db_error(&err))?;
            let mut results = Vec::new();
            for row in rows {
                results.push(row.map_err(|err| classify_db_error(&err))?);
            }
            Ok(results)
        })
    }

    /// Attempts to acquire the lease on a work item.
    ///
    /// The claim succeeds iff the item is `pending`, or `in_progress` with a
    /// null or expired lease. Success moves the item to `in_progress`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the update fails; a lost race is the
    /// `Ok(false)` outcome, not an error.
    pub fn try_acquire_lease(
        &self,
        id: &WorkItemId,
        owner: &OwnerId,
        ttl_ms: i64,
        now: Timestamp,
    ) -> Result<bool, SqliteStoreError> {
        let now_ms = now.as_unix_millis();
        let expires = now_ms.saturating_add(ttl_ms);
        self.with_write(|tx| {
            let updated = tx
                .execute(
                    "UPDATE work_items SET status = 'in_progress', lease_owner = ?1, \
                     lease_acquired_at = ?2, lease_expires_at = ?3, lease_heartbeat_at = ?2, \
                     updated_at = ?2 \
                     WHERE work_item_id = ?4 \
                       AND status IN ('pending', 'in_progress') \
                       AND (lease_owner IS NULL OR lease_expires_at < ?2)",
                    params![owner.as_str(), now_ms, expires, id.as_str()],
                )
                .map_err(|err| classify_db_error(&err))?;
            Ok(updated == 1)
        })
    }

    /// Renews a lease held by `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the update fails; `Ok(false)` means
    /// the lease is no longer held by this owner.
    pub fn heartbeat_lease(
        &self,
        id: &WorkItemId,
        owner: &OwnerId,
        ttl_ms: i64,
        now: Timestamp,
    ) -> Result<bool, SqliteStoreError> {
        let now_ms = now.as_unix_millis();
        let expires = now_ms.saturating_add(ttl_ms);
        self.with_write(|tx| {
            let updated = tx
                .execute(
                    "UPDATE work_items SET lease_heartbeat_at = ?1, lease_expires_at = ?2, \
                     updated_at = ?1 \
                     WHERE work_item_id = ?3 AND status = 'in_progress' \
                       AND lease_owner = ?4 AND lease_expires_at >= ?1",
                    params![now_ms, expires, id.as_str(), owner.as_str()],
                )
                .map_err(|err| classify_db_error(&err))?;
            Ok(updated == 1)
        })
    }

    /// Releases a lease held by `owner` without completing the item.
    ///
    /// The item returns to `pending` for another worker to adopt.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the update fails; `Ok(false)` means
    /// the lease was not held by this owner.
    pub fn release_lease(
        &self,
        id: &WorkItemId,
        owner: &OwnerId,
        now: Timestamp,
    ) -> Result<bool, SqliteStoreError> {
        self.with_write(|tx| {
            let updated = tx
                .execute(
                    "UPDATE work_items SET status = 'pending', lease_owner = NULL, \
                     lease_acquired_at = NULL, lease_expires_at = NULL, \
                     lease_heartbeat_at = NULL, updated_at = ?1 \
                     WHERE work_item_id = ?2 AND status = 'in_progress' AND lease_owner = ?3",
                    params![now.as_unix_millis(), id.as_str(), owner.as_str()],
                )
                .map_err(|err| classify_db_error(&err))?;
            Ok(updated == 1)
        })
    }

    /// Completes a work item while holding its lease.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the update fails; `Ok(false)` means
    /// the lease was lost and the caller must abandon the result.
    pub fn finish_work_item(
        &self,
        id: &WorkItemId,
        owner: &OwnerId,
        status: WorkItemStatus,
        output: &serde_json::Value,
        now: Timestamp,
    ) -> Result<bool, SqliteStoreError> {
        if !status.is_terminal() {
            return Err(SqliteStoreError::Invalid(format!(
                "finish requires a terminal status, got {}",
                status.as_str()
            )));
        }
        let output = to_json_string(output)?;
        self.with_write(|tx| {
            let updated = tx
                .execute(
                    "UPDATE work_items SET status = ?1, output_json = ?2, lease_owner = NULL, \
                     lease_acquired_at = NULL, lease_expires_at = NULL, \
                     lease_heartbeat_at = NULL, updated_at = ?3 \
                     WHERE work_item_id = ?4 AND status = 'in_progress' AND lease_owner = ?5",
                    params![
                        status.as_str(),
                        output,
                        now.as_unix_millis(),
                        id.as_str(),
                        owner.as_str()
                    ],
                )
                .map_err(|err| classify_db_error(&err))?;
            Ok(updated == 1)
        })
    }

    /// Marks every in-progress item with an expired lease as `expired`.
    ///
    /// Returns the identifiers of the items swept so recovery can replace
    /// them with fresh pending rows.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the sweep query fails.
    pub fn sweep_expired_leases(
        &self,
        now: Timestamp,
    ) -> Result<Vec<WorkItemId>, SqliteStoreError> {
        self.with_write(|tx| {
            let mut stmt = tx
                .prepare(
                    "UPDATE work_items SET status = 'expired', updated_at = ?1 \
                     WHERE status = 'in_progress' AND lease_expires_at < ?1 \
                     RETURNING work_item_id",
                )
                .map_err(|err| classify_db_error(&err))?;
            let rows = stmt
                .query_map(params![now.as_unix_millis()], |row| row.get::<_, String>(0))
                .map_err(|err| classify_db_error(&err))?;
            let mut swept = Vec::new();
            for row in rows {
                swept.push(WorkItemId::new(row.map_err(|err| classify_db_error(&err))?));
            }
            Ok(swept)
        })
    }

    /// Bumps the retry counter of a work item.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the update fails.
    pub fn bump_retry_count(
        &self,
        id: &WorkItemId,
        now: Timestamp,
    ) -> Result<(), SqliteStoreError> {
        self.with_write(|tx| {
            tx.execute(
                "UPDATE work_items SET retry_count = retry_count + 1, updated_at = ?1 \
                 WHERE work_item_id = ?2",
                params![now.as_unix_millis(), id.as_str()],
            )
            .map_err(|err| classify_db_error(&err))?;
            Ok(())
        })
    }
}
