// crates/warden-server/tests/http_api.rs
// ============================================================================
// Module: HTTP API Scenario Tests
// Description: End-to-end flows over a live loopback server.
// Purpose: Validate the documented JSON surface and the smoke flow.
// ============================================================================

//! ## Overview
//! Spawns the real router on an ephemeral loopback port and drives it with a
//! plain HTTP client:
//! - Create, freeze, execute, and observe the dense event stream
//! - Admin gating on the grants and override endpoints
//! - Error envelopes for unfrozen plans

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;
use warden_core::OwnerId;
use warden_core::SystemClock;
use warden_kernel::Kernel;
use warden_kernel::runner::RunnerConfig;
use warden_server::bootstrap_kernel;
use warden_server::build_router;
use warden_server::build_state;
use warden_store_sqlite::ControlStore;
use warden_store_sqlite::SqliteStoreConfig;

// ============================================================================
// SECTION: Harness
// ============================================================================

/// A live server plus the handles tests need.
struct Harness {
    /// Base URL of the live server.
    base: String,
    /// Temp directory keeping the database alive.
    _dir: TempDir,
    /// HTTP client.
    client: reqwest::Client,
}

async fn spawn_server() -> Harness {
    let dir = TempDir::new().expect("tempdir");
    let clock = Arc::new(SystemClock);
    let store = ControlStore::open(
        SqliteStoreConfig::for_path(dir.path().join("warden.db")),
        OwnerId::generate(),
        warden_core::Clock::now(&SystemClock),
    )
    .expect("store open");
    let kernel = Kernel::assemble(store, clock, None, RunnerConfig::default());
    bootstrap_kernel(&kernel).expect("bootstrap");
    let state = build_state(kernel, "admin-secret".to_string(), "control-secret".to_string());
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr: SocketAddr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Harness {
        base: format!("http://{addr}"),
        _dir: dir,
        client: reqwest::Client::new(),
    }
}

// ============================================================================
// SECTION: Smoke Flow
// ============================================================================

#[tokio::test]
async fn create_freeze_execute_and_replay() {
    let harness = spawn_server().await;
    // Create a task with one no-op step.
    let created: Value = harness
        .client
        .post(format!("{}/api/tasks", harness.base))
        .json(&json!({
            "title": "echo",
            "steps": [{
                "position": 0,
                "action_id": "noop",
                "capability_id": "action.noop",
                "params": {}
            }]
        }))
        .send()
        .await
        .expect("create")
        .json()
        .await
        .expect("create body");
    let task_id = created["task_id"].as_str().expect("task_id").to_string();
    let plan_id = created["plan_id"].as_str().expect("plan_id").to_string();
    // Freeze the plan.
    let frozen: Value = harness
        .client
        .post(format!("{}/api/decisions/{plan_id}/freeze", harness.base))
        .send()
        .await
        .expect("freeze")
        .json()
        .await
        .expect("freeze body");
    assert!(frozen["plan_hash"].as_str().expect("hash").starts_with("sha256:"));
    assert!(frozen["frozen_at"].as_i64().expect("frozen_at") > 0);
    // Execute the step against the frozen decision.
    let executed: Value = harness
        .client
        .post(format!("{}/api/actions/execute", harness.base))
        .json(&json!({
            "action_id": "noop",
            "decision_id": plan_id,
            "params": {}
        }))
        .send()
        .await
        .expect("execute")
        .json()
        .await
        .expect("execute body");
    assert_eq!(executed["status"], json!("success"));
    // The task finalized to succeeded / done.
    let task: Value = harness
        .client
        .get(format!("{}/api/tasks/{task_id}", harness.base))
        .send()
        .await
        .expect("get task")
        .json()
        .await
        .expect("task body");
    assert_eq!(task["status"], json!("succeeded"));
    assert_eq!(task["exit_reason"], json!("done"));
    // The event stream replays densely from seq 1.
    let events: Value = harness
        .client
        .get(format!("{}/api/tasks/{task_id}/events?since_seq=0&limit=100", harness.base))
        .send()
        .await
        .expect("events")
        .json()
        .await
        .expect("events body");
    let events = events["events"].as_array().expect("events array");
    assert!(!events.is_empty());
    for (index, event) in events.iter().enumerate() {
        assert_eq!(
            event["seq"].as_u64().expect("seq"),
            u64::try_from(index).expect("index") + 1
        );
    }
    assert_eq!(events[0]["event_type"], json!("runner_spawn"));
    let last = events.last().expect("last");
    assert_eq!(last["event_type"], json!("runner_exit"));
    assert_eq!(last["payload"]["exit_reason"], json!("done"));
    // The span graph is reachable.
    let graph: Value = harness
        .client
        .get(format!("{}/api/tasks/{task_id}/graph", harness.base))
        .send()
        .await
        .expect("graph")
        .json()
        .await
        .expect("graph body");
    assert!(graph["spans"].as_array().is_some_and(|spans| !spans.is_empty()));
}

// ============================================================================
// SECTION: Precondition Failures
// ============================================================================

#[tokio::test]
async fn executing_against_a_draft_plan_is_a_conflict() {
    let harness = spawn_server().await;
    let created: Value = harness
        .client
        .post(format!("{}/api/tasks", harness.base))
        .json(&json!({
            "title": "draft only",
            "steps": [{
                "position": 0,
                "action_id": "noop",
                "capability_id": "action.noop",
                "params": {}
            }]
        }))
        .send()
        .await
        .expect("create")
        .json()
        .await
        .expect("create body");
    let plan_id = created["plan_id"].as_str().expect("plan_id");
    let response = harness
        .client
        .post(format!("{}/api/actions/execute", harness.base))
        .json(&json!({
            "action_id": "noop",
            "decision_id": plan_id,
            "params": {}
        }))
        .send()
        .await
        .expect("execute");
    assert_eq!(response.status(), reqwest::StatusCode::CONFLICT);
    let body: Value = response.json().await.expect("body");
    assert_eq!(body["error_code"], json!("ERROR_PLAN_NOT_FROZEN"));
}

// ============================================================================
// SECTION: Admin Gating
// ============================================================================

#[tokio::test]
async fn admin_endpoints_require_the_bearer_token() {
    let harness = spawn_server().await;
    // Without the token: refused.
    let response = harness
        .client
        .post(format!("{}/api/capabilities/grants", harness.base))
        .json(&json!({
            "agent_id": "local-operator",
            "capability_id": "action.noop"
        }))
        .send()
        .await
        .expect("grant");
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
    // With the token: created.
    let response = harness
        .client
        .post(format!("{}/api/capabilities/grants", harness.base))
        .bearer_auth("admin-secret")
        .json(&json!({
            "agent_id": "local-operator",
            "capability_id": "action.noop"
        }))
        .send()
        .await
        .expect("grant");
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    let body: Value = response.json().await.expect("body");
    let grant_id = body["grant_id"].as_str().expect("grant_id");
    // Revocation succeeds exactly once.
    let response = harness
        .client
        .post(format!("{}/api/capabilities/{grant_id}/revoke", harness.base))
        .bearer_auth("admin-secret")
        .send()
        .await
        .expect("revoke");
    assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);
    let response = harness
        .client
        .post(format!("{}/api/capabilities/{grant_id}/revoke", harness.base))
        .bearer_auth("admin-secret")
        .send()
        .await
        .expect("revoke again");
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn override_minting_enforces_the_justification_floor() {
    let harness = spawn_server().await;
    let response = harness
        .client
        .post(format!("{}/api/governance/override", harness.base))
        .bearer_auth("admin-secret")
        .json(&json!({
            "agent_id": "local-operator",
            "capability_id": "action.noop",
            "justification": "too short"
        }))
        .send()
        .await
        .expect("mint");
    assert_eq!(response.status(), reqwest::StatusCode::FORBIDDEN);
    let response = harness
        .client
        .post(format!("{}/api/governance/override", harness.base))
        .bearer_auth("admin-secret")
        .json(&json!({
            "agent_id": "local-operator",
            "capability_id": "action.noop",
            "justification": "j".repeat(120)
        }))
        .send()
        .await
        .expect("mint");
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
}
