// crates/warden-core/src/core/event.rs
// ============================================================================
// Module: Warden Task Events
// Description: Append-only, seq-ordered lifecycle event stream.
// Purpose: Provide the source of truth for UI replay and audit.
// Dependencies: crate::core::{identifiers, time}, serde, serde_json
// ============================================================================

//! ## Overview
//! Every significant lifecycle step emits one [`TaskEvent`]. Events carry a
//! per-task `seq` that is strictly monotonic starting at 1 with no gaps; the
//! seq is the cursor for all tailing and replay. Events form a span forest
//! through `parent_span_id` pointers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::SpanId;
use crate::core::identifiers::TaskId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Event Phase
// ============================================================================

/// Lifecycle phase an event belongs to.
///
/// # Invariants
/// - Variants are stable for serialization and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPhase {
    /// Plan drafting and freezing.
    Planning,
    /// Frozen-step execution.
    Executing,
    /// Guardian verification.
    Verifying,
    /// Crash or lease-expiry recovery.
    Recovery,
}

impl EventPhase {
    /// Returns the stable storage label for the phase.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Executing => "executing",
            Self::Verifying => "verifying",
            Self::Recovery => "recovery",
        }
    }

    /// Parses a phase from its storage label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "planning" => Some(Self::Planning),
            "executing" => Some(Self::Executing),
            "verifying" => Some(Self::Verifying),
            "recovery" => Some(Self::Recovery),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Event Actor
// ============================================================================

/// Component that emitted an event.
///
/// # Invariants
/// - Variants are stable for serialization and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventActor {
    /// The task runner loop.
    Runner,
    /// The supervising process.
    Supervisor,
    /// A worker executing a step.
    Worker,
    /// The lease manager.
    Lease,
    /// The recovery sweep.
    Recovery,
    /// The system itself (startup, shutdown).
    System,
}

impl EventActor {
    /// Returns the stable storage label for the actor.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Runner => "runner",
            Self::Supervisor => "supervisor",
            Self::Worker => "worker",
            Self::Lease => "lease",
            Self::Recovery => "recovery",
            Self::System => "system",
        }
    }

    /// Parses an actor from its storage label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "runner" => Some(Self::Runner),
            "supervisor" => Some(Self::Supervisor),
            "worker" => Some(Self::Worker),
            "lease" => Some(Self::Lease),
            "recovery" => Some(Self::Recovery),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Task Event
// ============================================================================

/// One append-only lifecycle event.
///
/// # Invariants
/// - `(task_id, seq)` is unique; `seq` starts at 1 and is dense per task.
/// - `event_type`, `actor`, and `span_id` are non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEvent {
    /// Task the event belongs to.
    pub task_id: TaskId,
    /// Strictly monotonic per-task sequence number.
    pub seq: u64,
    /// Event type label (e.g. `runner_spawn`, `work_item_start`).
    pub event_type: String,
    /// Lifecycle phase when applicable.
    pub phase: Option<EventPhase>,
    /// Component that emitted the event.
    pub actor: EventActor,
    /// Span the event belongs to.
    pub span_id: SpanId,
    /// Parent span for nested spans.
    pub parent_span_id: Option<SpanId>,
    /// Structured event payload.
    pub payload: BTreeMap<String, Value>,
    /// Timestamp when the event was recorded.
    pub created_at: Timestamp,
}

/// Draft of an event prior to seq allocation.
///
/// # Invariants
/// - Field constraints match [`TaskEvent`]; `seq` is assigned by the event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDraft {
    /// Event type label.
    pub event_type: String,
    /// Lifecycle phase when applicable.
    pub phase: Option<EventPhase>,
    /// Component emitting the event.
    pub actor: EventActor,
    /// Span the event belongs to.
    pub span_id: SpanId,
    /// Parent span for nested spans.
    pub parent_span_id: Option<SpanId>,
    /// Structured event payload.
    pub payload: BTreeMap<String, Value>,
}

impl EventDraft {
    /// Creates a draft with an empty payload.
    #[must_use]
    pub fn new(event_type: impl Into<String>, actor: EventActor, span_id: SpanId) -> Self {
        Self {
            event_type: event_type.into(),
            phase: None,
            actor,
            span_id,
            parent_span_id: None,
            payload: BTreeMap::new(),
        }
    }

    /// Sets the lifecycle phase.
    #[must_use]
    pub const fn with_phase(mut self, phase: EventPhase) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Sets the parent span.
    #[must_use]
    pub fn with_parent(mut self, parent: SpanId) -> Self {
        self.parent_span_id = Some(parent);
        self
    }

    /// Inserts a payload entry.
    #[must_use]
    pub fn with_payload(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }
}

// ============================================================================
// SECTION: Span Tree
// ============================================================================

/// A node in the per-task span tree.
///
/// # Invariants
/// - `children` are ordered by their first event seq.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanNode {
    /// Span identifier.
    pub span_id: SpanId,
    /// Events recorded in this span, ascending by seq.
    pub events: Vec<TaskEvent>,
    /// Child spans.
    pub children: Vec<SpanNode>,
}
