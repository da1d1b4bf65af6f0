// crates/warden-store-sqlite/src/repo/events.rs
// ============================================================================
// Module: Event Repository
// Description: Seq-ordered event stream with counter-backed allocation.
// Purpose: Guarantee dense, strictly monotonic per-task event sequences.
// Dependencies: rusqlite, serde_json, warden-core
// ============================================================================

//! ## Overview
//! The seq counter is materialized in the `task_event_seq` sibling table and
//! advanced inside the same transaction as the event insert, so concurrent
//! writers cannot produce gaps or duplicates. Readers page events in
//! ascending seq; the span tree is assembled by BFS over parent pointers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use rusqlite::Row;
use rusqlite::Transaction;
use rusqlite::params;
use warden_core::EventActor;
use warden_core::EventDraft;
use warden_core::EventPhase;
use warden_core::SpanId;
use warden_core::SpanNode;
use warden_core::TaskEvent;
use warden_core::TaskId;
use warden_core::Timestamp;

use crate::repo::tasks::bad_column;
use crate::repo::to_json_string;
use crate::store::ControlStore;
use crate::store::SqliteStoreError;
use crate::store::classify_db_error;

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Maps one `task_events` row into a [`TaskEvent`].
fn map_event_row(row: &Row<'_>) -> Result<TaskEvent, rusqlite::Error> {
    let task_id: String = row.get(0)?;
    let seq: i64 = row.get(1)?;
    let event_type: String = row.get(2)?;
    let phase: Option<String> = row.get(3)?;
    let actor: String = row.get(4)?;
    let span_id: String = row.get(5)?;
    let parent_span_id: Option<String> = row.get(6)?;
    let payload_json: String = row.get(7)?;
    let created_at: i64 = row.get(8)?;
    let seq = u64::try_from(seq).map_err(|_| bad_column(1, format!("negative seq {seq}")))?;
    let phase = match phase {
        Some(label) => Some(
            EventPhase::parse(&label)
                .ok_or_else(|| bad_column(3, format!("unknown event phase {label}")))?,
        ),
        None => None,
    };
    let actor = EventActor::parse(&actor)
        .ok_or_else(|| bad_column(4, format!("unknown event actor {actor}")))?;
    let payload = serde_json::from_str(&payload_json)
        .map_err(|err| bad_column(7, format!("event payload: {err}")))?;
    Ok(TaskEvent {
        task_id: TaskId::new(task_id),
        seq,
        event_type,
        phase,
        actor,
        span_id: SpanId::new(span_id),
        parent_span_id: parent_span_id.map(SpanId::new),
        payload,
        created_at: Timestamp::from_unix_millis(created_at),
    })
}

// ============================================================================
// SECTION: Seq Allocation
// ============================================================================

/// Allocates the next seq for a task inside an open transaction.
fn allocate_seq(tx: &Transaction<'_>, task_id: &TaskId) -> Result<u64, SqliteStoreError> {
    let allocated: i64 = tx
        .query_row(
            "INSERT INTO task_event_seq (task_id, next_seq) VALUES (?1, 1) \
             ON CONFLICT (task_id) DO UPDATE SET next_seq = next_seq + 1 \
             RETURNING next_seq",
            params![task_id.as_str()],
            |row| row.get(0),
        )
        .map_err(|err| classify_db_error(&err))?;
    u64::try_from(allocated)
        .map_err(|_| SqliteStoreError::Corrupt(format!("seq counter negative: {allocated}")))
}

// ============================================================================
// SECTION: Event Operations
// ============================================================================

impl ControlStore {
    /// Appends one event, allocating its seq atomically.
    ///
    /// Draft validation happens before the write: empty `event_type` or
    /// `span_id` is rejected outright.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] on an invalid draft and other
    /// variants when the write fails.
    pub fn append_event(
        &self,
        task_id: &TaskId,
        draft: &EventDraft,
        now: Timestamp,
    ) -> Result<TaskEvent, SqliteStoreError> {
        if draft.event_type.is_empty() {
            return Err(SqliteStoreError::Invalid("event_type must be non-empty".to_string()));
        }
        if draft.span_id.as_str().is_empty() {
            return Err(SqliteStoreError::Invalid("span_id must be non-empty".to_string()));
        }
        let payload = to_json_string(&draft.payload)?;
        let seq = self.with_write(|tx| {
            let seq = allocate_seq(tx, task_id)?;
            let seq_db = i64::try_from(seq)
                .map_err(|_| SqliteStoreError::Corrupt(format!("seq overflow: {seq}")))?;
            tx.execute(
                "INSERT INTO task_events (task_id, seq, event_type, phase, actor, span_id, \
                 parent_span_id, payload_json, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    task_id.as_str(),
                    seq_db,
                    draft.event_type,
                    draft.phase.map(EventPhase::as_str),
                    draft.actor.as_str(),
                    draft.span_id.as_str(),
                    draft.parent_span_id.as_ref().map(SpanId::as_str),
                    payload,
                    now.as_unix_millis()
                ],
            )
            .map_err(|err| classify_db_error(&err))?;
            Ok(seq)
        })?;
        Ok(TaskEvent {
            task_id: task_id.clone(),
            seq,
            event_type: draft.event_type.clone(),
            phase: draft.phase,
            actor: draft.actor,
            span_id: draft.span_id.clone(),
            parent_span_id: draft.parent_span_id.clone(),
            payload: draft.payload.clone(),
            created_at: now,
        })
    }

    /// Returns events with `seq > since_seq` in ascending order, capped.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn events_since(
        &self,
        task_id: &TaskId,
        since_seq: u64,
        limit: usize,
    ) -> Result<Vec<TaskEvent>, SqliteStoreError> {
        let since = i64::try_from(since_seq)
            .map_err(|_| SqliteStoreError::Invalid("since_seq too large".to_string()))?;
        let limit = i64::try_from(limit)
            .map_err(|_| SqliteStoreError::Invalid("limit too large".to_string()))?;
        self.with_read(|connection| {
            let mut stmt = connection
                .prepare(
                    "SELECT task_id, seq, event_type, phase, actor, span_id, parent_span_id, \
                     payload_json, created_at FROM task_events \
                     WHERE task_id = ?1 AND seq > ?2 ORDER BY seq ASC LIMIT ?3",
                )
                .map_err(|err| classify_db_error(&err))?;
            let rows = stmt
                .query_map(params![task_id.as_str(), since, limit], map_event_row)
                .map_err(|err| classify_db_error(&err))?;
            let mut results = Vec::new();
            for row in rows {
                results.push(row.map_err(|err| classify_db_error(&err))?);
            }
            Ok(results)
        })
    }

    /// Returns the latest seq recorded for a task (0 when none).
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn latest_seq(&self, task_id: &TaskId) -> Result<u64, SqliteStoreError> {
        self.with_read(|connection| {
            let latest: i64 = connection
                .query_row(
                    "SELECT COALESCE(MAX(seq), 0) FROM task_events WHERE task_id = ?1",
                    params![task_id.as_str()],
                    |row| row.get(0),
                )
                .map_err(|err| classify_db_error(&err))?;
            u64::try_from(latest)
                .map_err(|_| SqliteStoreError::Corrupt(format!("negative max seq {latest}")))
        })
    }

    /// Builds the span forest for a task by BFS over parent pointers.
    ///
    /// Roots are spans without a recorded parent, ordered by first event seq.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn span_tree(&self, task_id: &TaskId) -> Result<Vec<SpanNode>, SqliteStoreError> {
        let events = self.events_since(task_id, 0, usize::MAX / 2)?;
        Ok(assemble_span_forest(events))
    }
}

// ============================================================================
// SECTION: Span Assembly
// ============================================================================

/// Groups events by span and links children under parents.
fn assemble_span_forest(events: Vec<TaskEvent>) -> Vec<SpanNode> {
    let mut span_events: BTreeMap<String, Vec<TaskEvent>> = BTreeMap::new();
    let mut span_parent: BTreeMap<String, Option<String>> = BTreeMap::new();
    let mut span_order: Vec<String> = Vec::new();
    for event in events {
        let key = event.span_id.as_str().to_string();
        if !span_events.contains_key(&key) {
            span_order.push(key.clone());
            span_parent.insert(
                key.clone(),
                event.parent_span_id.as_ref().map(|parent| parent.as_str().to_string()),
            );
        }
        span_events.entry(key).or_default().push(event);
    }
    // Attach children to parents walking spans in first-seen order; orphaned
    // parents (no events of their own) make the child a root.
    let mut children: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut roots: Vec<String> = Vec::new();
    for span in &span_order {
        match span_parent.get(span).and_then(Clone::clone) {
            Some(parent) if span_events.contains_key(&parent) => {
                children.entry(parent).or_default().push(span.clone());
            }
            _ => roots.push(span.clone()),
        }
    }
    roots
        .into_iter()
        .map(|root| build_span_node(&root, &mut span_events, &children))
        .collect()
}

/// Recursively builds one span node.
fn build_span_node(
    span: &str,
    span_events: &mut BTreeMap<String, Vec<TaskEvent>>,
    children: &BTreeMap<String, Vec<String>>,
) -> SpanNode {
    let events = span_events.remove(span).unwrap_or_default();
    let child_nodes = children
        .get(span)
        .map(|kids| {
            kids.iter().map(|kid| build_span_node(kid, span_events, children)).collect::<Vec<_>>()
        })
        .unwrap_or_default();
    SpanNode {
        span_id: SpanId::new(span),
        events,
        children: child_nodes,
    }
}
