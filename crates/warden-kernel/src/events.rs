// crates/warden-kernel/src/events.rs
// ============================================================================
// Module: Event Log
// Description: Seq-ordered event emission with long-poll tailing.
// Purpose: Publish the per-task lifecycle stream consumed by UI and replay.
// Dependencies: tokio, warden-core, warden-store-sqlite
// ============================================================================

//! ## Overview
//! The event log wraps the store's counter-backed append with an in-process
//! notification fabric: every emit updates a per-task watch channel carrying
//! the latest seq, and `tail` suspends on it until new events arrive or the
//! timeout fires. Readers always see a dense, strictly increasing seq.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::watch;
use warden_core::EventDraft;
use warden_core::KernelError;
use warden_core::SpanNode;
use warden_core::TaskEvent;
use warden_core::TaskId;

use crate::context::KernelContext;
use crate::context::store_failure;
use crate::telemetry::KernelMetrics;

// ============================================================================
// SECTION: Event Log
// ============================================================================

/// Seq-ordered event log with long-poll support.
///
/// # Invariants
/// - Watch channels only ever move forward to larger seq values.
#[derive(Clone)]
pub struct EventLog {
    /// Shared kernel context.
    ctx: KernelContext,
    /// Per-task watch channels carrying the latest emitted seq.
    notifiers: std::sync::Arc<Mutex<HashMap<String, watch::Sender<u64>>>>,
    /// Operation counters.
    metrics: std::sync::Arc<KernelMetrics>,
}

impl EventLog {
    /// Creates an event log over the given context.
    #[must_use]
    pub fn new(ctx: KernelContext, metrics: std::sync::Arc<KernelMetrics>) -> Self {
        Self {
            ctx,
            notifiers: std::sync::Arc::new(Mutex::new(HashMap::new())),
            metrics,
        }
    }

    /// Emits one event, allocating its seq atomically.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] when the store write fails.
    pub fn emit(&self, task_id: &TaskId, draft: EventDraft) -> Result<TaskEvent, KernelError> {
        let event =
            self.ctx.store.append_event(task_id, &draft, self.ctx.now()).map_err(store_failure)?;
        self.metrics.incr_events();
        self.notify(task_id, event.seq);
        Ok(event)
    }

    /// Pushes the latest seq into the task's watch channel.
    fn notify(&self, task_id: &TaskId, seq: u64) {
        let mut guard = self.notifiers.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let sender = guard
            .entry(task_id.as_str().to_string())
            .or_insert_with(|| watch::channel(0).0);
        sender.send_if_modified(|latest| {
            if seq > *latest {
                *latest = seq;
                true
            } else {
                false
            }
        });
    }

    /// Returns a receiver that observes the latest seq for a task.
    #[must_use]
    pub fn subscribe(&self, task_id: &TaskId) -> watch::Receiver<u64> {
        let mut guard = self.notifiers.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard
            .entry(task_id.as_str().to_string())
            .or_insert_with(|| watch::channel(0).0)
            .subscribe()
    }

    /// Returns events after `since_seq` in ascending order.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] when the store read fails.
    pub fn events_since(
        &self,
        task_id: &TaskId,
        since_seq: u64,
        limit: usize,
    ) -> Result<Vec<TaskEvent>, KernelError> {
        self.ctx.store.events_since(task_id, since_seq, limit).map_err(store_failure)
    }

    /// Long-polls for events after `since_seq`.
    ///
    /// Returns immediately when events already exist; otherwise suspends
    /// until the next emit or the timeout, then re-reads. An empty result
    /// means the timeout fired with nothing new.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] when the store read fails.
    pub async fn tail(
        &self,
        task_id: &TaskId,
        since_seq: u64,
        limit: usize,
        timeout: Duration,
    ) -> Result<Vec<TaskEvent>, KernelError> {
        let immediate = self.events_since(task_id, since_seq, limit)?;
        if !immediate.is_empty() {
            return Ok(immediate);
        }
        let mut receiver = self.subscribe(task_id);
        let woke = tokio::time::timeout(timeout, async {
            loop {
                if *receiver.borrow_and_update() > since_seq {
                    return;
                }
                if receiver.changed().await.is_err() {
                    return;
                }
            }
        })
        .await;
        if woke.is_err() {
            return Ok(Vec::new());
        }
        self.events_since(task_id, since_seq, limit)
    }

    /// Returns the latest seq recorded for a task.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] when the store read fails.
    pub fn latest_seq(&self, task_id: &TaskId) -> Result<u64, KernelError> {
        self.ctx.store.latest_seq(task_id).map_err(store_failure)
    }

    /// Returns the span forest for a task.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] when the store read fails.
    pub fn span_tree(&self, task_id: &TaskId) -> Result<Vec<SpanNode>, KernelError> {
        self.ctx.store.span_tree(task_id).map_err(store_failure)
    }
}
