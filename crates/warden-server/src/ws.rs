// crates/warden-server/src/ws.rs
// ============================================================================
// Module: WebSocket Event Stream
// Description: Streams task events in seq order over a WebSocket.
// Purpose: Give the UI a gap-free live feed with reconnect resume.
// Dependencies: axum, serde_json, warden-core
// ============================================================================

//! ## Overview
//! Clients connect to `/ws/tasks/{id}/events` with their last-seen seq; the
//! server resumes at `last_seq + 1` and then pushes every new event in seq
//! order. Any gap observed by a client is a bug: the stream always re-reads
//! the store after each wake-up, so missed notifications cannot skip events.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::extract::WebSocketUpgrade;
use axum::extract::ws::Message;
use axum::extract::ws::WebSocket;
use axum::response::Response;
use serde::Deserialize;
use warden_core::TaskId;

use crate::state::AppState;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Page size per store read.
const WS_BATCH_LIMIT: usize = 256;
/// Long-poll window per wake-up.
const WS_POLL_WINDOW: Duration = Duration::from_secs(30);

// ============================================================================
// SECTION: Handler
// ============================================================================

/// Query parameters for the WebSocket stream.
#[derive(Debug, Deserialize)]
pub(crate) struct WsQuery {
    /// Last seq the client has seen (0 for a full replay).
    #[serde(default)]
    since_seq: u64,
}

/// GET /ws/tasks/{id}/events
pub(crate) async fn ws_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<WsQuery>,
    upgrade: WebSocketUpgrade,
) -> Response {
    let task_id = TaskId::new(id);
    upgrade.on_upgrade(move |socket| stream_events(state, socket, task_id, query.since_seq))
}

/// Pushes events in seq order until the client disconnects.
async fn stream_events(
    state: Arc<AppState>,
    mut socket: WebSocket,
    task_id: TaskId,
    since_seq: u64,
) {
    let mut cursor = since_seq;
    loop {
        let batch = match state
            .kernel
            .events
            .tail(&task_id, cursor, WS_BATCH_LIMIT, WS_POLL_WINDOW)
            .await
        {
            Ok(batch) => batch,
            Err(err) => {
                tracing::warn!(task = %task_id, error = %err, "ws tail failed");
                let _ = socket.send(Message::Close(None)).await;
                return;
            }
        };
        for event in batch {
            debug_assert_eq!(event.seq, cursor + 1, "event stream must be gap-free");
            cursor = event.seq;
            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(err) => {
                    tracing::warn!(task = %task_id, error = %err, "event serialization failed");
                    continue;
                }
            };
            if socket.send(Message::Text(payload.into())).await.is_err() {
                return;
            }
        }
        // Drain any client frame between batches; close ends the stream.
        match tokio::time::timeout(Duration::from_millis(1), socket.recv()).await {
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) => return,
            _ => {}
        }
    }
}
