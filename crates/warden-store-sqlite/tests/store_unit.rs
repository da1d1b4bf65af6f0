// crates/warden-store-sqlite/tests/store_unit.rs
// ============================================================================
// Module: SQLite Store Integrity Unit Tests
// Description: Targeted integrity tests for the control-plane store.
// Purpose: Validate the migration ladder, instance lock, lease atomicity,
//          seq density, immutability triggers, and single-use overrides.
// ============================================================================

//! ## Overview
//! Unit-level tests for store integrity invariants:
//! - Migration ladder bookkeeping and idempotent reopen
//! - Instance lock contention between two openers
//! - Task terminal-status protection
//! - Dense event sequences under the counter table
//! - Append-only triggers on events, checkpoints, and the risk timeline
//! - Lease acquire/heartbeat/release/sweep atomicity
//! - Frozen-plan content lock and hash verification
//! - Trust transition cycle enforcement
//! - Emergency override single-use consumption

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeMap;

use rusqlite::Connection;
use rusqlite::params;
use serde_json::json;
use tempfile::TempDir;
use warden_core::AgentId;
use warden_core::CapabilityId;
use warden_core::CheckpointKind;
use warden_core::DEFAULT_HASH_ALGORITHM;
use warden_core::DecisionPlan;
use warden_core::EmergencyOverride;
use warden_core::EventActor;
use warden_core::EventDraft;
use warden_core::ExitReason;
use warden_core::OverrideId;
use warden_core::OwnerId;
use warden_core::PlanStatus;
use warden_core::PlanStep;
use warden_core::SpanId;
use warden_core::Task;
use warden_core::TaskId;
use warden_core::TaskStatus;
use warden_core::Timestamp;
use warden_core::TrustRecord;
use warden_core::TrustState;
use warden_core::TrustTransition;
use warden_core::WorkItem;
use warden_core::WorkItemId;
use warden_core::WorkItemStatus;
use warden_core::hash_bytes;
use warden_store_sqlite::CURRENT_SCHEMA_VERSION;
use warden_store_sqlite::ControlStore;
use warden_store_sqlite::IdempotencyClaim;
use warden_store_sqlite::SqliteStoreConfig;
use warden_store_sqlite::SqliteStoreError;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn now(ms: i64) -> Timestamp {
    Timestamp::from_unix_millis(ms)
}

fn open_store(dir: &TempDir, owner: &str, at: i64) -> ControlStore {
    ControlStore::open(
        SqliteStoreConfig::for_path(dir.path().join("warden.db")),
        OwnerId::new(owner),
        now(at),
    )
    .expect("store open")
}

fn raw_connection(dir: &TempDir) -> Connection {
    Connection::open(dir.path().join("warden.db")).expect("raw connection")
}

fn sample_task(id: &str, at: i64) -> Task {
    Task {
        task_id: TaskId::new(id),
        session_id: None,
        title: format!("task {id}"),
        status: TaskStatus::Created,
        exit_reason: None,
        project_id: None,
        repo_id: None,
        metadata: BTreeMap::new(),
        created_at: now(at),
        updated_at: now(at),
    }
}

fn sample_work_item(store: &ControlStore, task_id: &TaskId, id: &str, at: i64) -> WorkItemId {
    let item = WorkItem {
        work_item_id: WorkItemId::new(id),
        task_id: task_id.clone(),
        work_type: "noop".to_string(),
        status: WorkItemStatus::Pending,
        lease: None,
        retry_count: 0,
        input: json!({}),
        output: None,
        created_at: now(at),
        updated_at: now(at),
    };
    store.insert_work_item(&item).expect("work item insert");
    item.work_item_id
}

fn draft_plan(store: &ControlStore, task_id: &TaskId, plan_id: &str, at: i64) {
    let plan = DecisionPlan {
        plan_id: warden_core::PlanId::new(plan_id),
        task_id: task_id.clone(),
        status: PlanStatus::Draft,
        steps: vec![PlanStep {
            position: 0,
            action_id: warden_core::ActionId::new("noop"),
            capability_id: CapabilityId::new("action.noop"),
            params: json!({}),
            parallel_group: None,
        }],
        alternatives: Vec::new(),
        plan_hash: None,
        frozen_at: None,
        created_at: now(at),
    };
    store.insert_plan(&plan).expect("plan insert");
}

// ============================================================================
// SECTION: Migration Ladder
// ============================================================================

#[test]
fn ladder_records_every_version_and_reopen_is_idempotent() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir, "owner-1", 1_000);
    drop(store);
    let connection = raw_connection(&dir);
    let versions: Vec<i64> = connection
        .prepare("SELECT version FROM schema_version ORDER BY version")
        .expect("prepare")
        .query_map([], |row| row.get(0))
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("rows");
    let expected: Vec<i64> = (1 ..= CURRENT_SCHEMA_VERSION).collect();
    assert_eq!(versions, expected);
    drop(connection);
    // Reopening applies nothing new and succeeds.
    let store = open_store(&dir, "owner-1", 2_000);
    store.readiness().expect("readiness after reopen");
}

// ============================================================================
// SECTION: Instance Lock
// ============================================================================

#[test]
fn second_live_opener_is_refused() {
    let dir = TempDir::new().expect("tempdir");
    let first = open_store(&dir, "owner-a", 1_000);
    let second = ControlStore::open(
        SqliteStoreConfig::for_path(dir.path().join("warden.db")),
        OwnerId::new("owner-b"),
        now(2_000),
    );
    assert!(matches!(second, Err(SqliteStoreError::Contention(_))));
    drop(first);
    // After the first holder's TTL elapses, adoption succeeds.
    let adopted = ControlStore::open(
        SqliteStoreConfig::for_path(dir.path().join("warden.db")),
        OwnerId::new("owner-b"),
        now(120_000),
    );
    assert!(adopted.is_ok());
}

// ============================================================================
// SECTION: Task Lifecycle
// ============================================================================

#[test]
fn terminal_tasks_reject_further_status_updates() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir, "owner-1", 1_000);
    let task = sample_task("t-terminal", 1_000);
    store.insert_task(&task).expect("insert");
    store
        .update_task_status(&task.task_id, TaskStatus::Executing, None, now(2_000))
        .expect("to executing");
    store
        .update_task_status(
            &task.task_id,
            TaskStatus::Succeeded,
            Some(ExitReason::Done),
            now(3_000),
        )
        .expect("to succeeded");
    let err = store
        .update_task_status(&task.task_id, TaskStatus::Executing, None, now(4_000))
        .expect_err("terminal row must refuse updates");
    assert!(matches!(err, SqliteStoreError::NotFound(_)));
    let fetched = store.fetch_task(&task.task_id).expect("fetch");
    assert_eq!(fetched.status, TaskStatus::Succeeded);
    assert_eq!(fetched.exit_reason, Some(ExitReason::Done));
}

// ============================================================================
// SECTION: Event Sequences
// ============================================================================

#[test]
fn event_seqs_are_dense_and_strictly_increasing() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir, "owner-1", 1_000);
    let task = sample_task("t-events", 1_000);
    store.insert_task(&task).expect("insert");
    for index in 0 .. 25 {
        let draft = EventDraft::new(
            format!("event_{index}"),
            EventActor::Runner,
            SpanId::new("span-root"),
        );
        let event = store.append_event(&task.task_id, &draft, now(2_000 + index)).expect("append");
        assert_eq!(event.seq, u64::try_from(index).expect("index") + 1);
    }
    let events = store.events_since(&task.task_id, 0, 100).expect("read");
    let seqs: Vec<u64> = events.iter().map(|event| event.seq).collect();
    let expected: Vec<u64> = (1 ..= 25).collect();
    assert_eq!(seqs, expected);
}

#[test]
fn event_rows_are_immutable() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir, "owner-1", 1_000);
    let task = sample_task("t-frozen-events", 1_000);
    store.insert_task(&task).expect("insert");
    let draft = EventDraft::new("runner_spawn", EventActor::Runner, SpanId::new("span-root"));
    store.append_event(&task.task_id, &draft, now(1_500)).expect("append");
    let connection = raw_connection(&dir);
    let update = connection.execute(
        "UPDATE task_events SET event_type = 'tampered' WHERE task_id = ?1",
        params![task.task_id.as_str()],
    );
    assert!(update.is_err(), "immutability trigger must reject UPDATE");
    let delete = connection
        .execute("DELETE FROM task_events WHERE task_id = ?1", params![task.task_id.as_str()]);
    assert!(delete.is_err(), "immutability trigger must reject DELETE");
}

#[test]
fn empty_events_reject_invalid_drafts() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir, "owner-1", 1_000);
    let task = sample_task("t-bad-events", 1_000);
    store.insert_task(&task).expect("insert");
    let empty_type = EventDraft::new("", EventActor::Runner, SpanId::new("span-root"));
    assert!(matches!(
        store.append_event(&task.task_id, &empty_type, now(1_100)),
        Err(SqliteStoreError::Invalid(_))
    ));
    let empty_span = EventDraft::new("runner_spawn", EventActor::Runner, SpanId::new(""));
    assert!(matches!(
        store.append_event(&task.task_id, &empty_span, now(1_200)),
        Err(SqliteStoreError::Invalid(_))
    ));
}

// ============================================================================
// SECTION: Checkpoints
// ============================================================================

#[test]
fn checkpoints_are_dense_and_append_only() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir, "owner-1", 1_000);
    let task = sample_task("t-checkpoints", 1_000);
    store.insert_task(&task).expect("insert");
    for index in 0 .. 5 {
        let checkpoint = store
            .append_checkpoint(
                &task.task_id,
                None,
                CheckpointKind::IterationStart,
                &json!({ "iteration": index }),
                now(2_000 + index),
            )
            .expect("checkpoint");
        assert_eq!(checkpoint.sequence_number, u64::try_from(index).expect("index") + 1);
    }
    let latest = store.latest_checkpoint(&task.task_id).expect("latest").expect("present");
    assert_eq!(latest.sequence_number, 5);
    let connection = raw_connection(&dir);
    let update = connection.execute(
        "UPDATE checkpoints SET snapshot_json = '{}' WHERE task_id = ?1",
        params![task.task_id.as_str()],
    );
    assert!(update.is_err(), "checkpoints must be immutable");
}

#[test]
fn restartable_checkpoint_lookup_skips_non_restartable_kinds() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir, "owner-1", 1_000);
    let task = sample_task("t-restartable", 1_000);
    store.insert_task(&task).expect("insert");
    store
        .append_checkpoint(
            &task.task_id,
            None,
            CheckpointKind::IterationStart,
            &json!({}),
            now(2_000),
        )
        .expect("checkpoint");
    store
        .append_checkpoint(
            &task.task_id,
            None,
            CheckpointKind::LlmResponse,
            &json!({}),
            now(3_000),
        )
        .expect("checkpoint");
    let restartable = store
        .latest_restartable_checkpoint(&task.task_id)
        .expect("lookup")
        .expect("present");
    assert_eq!(restartable.kind, CheckpointKind::IterationStart);
    assert_eq!(restartable.sequence_number, 1);
}

// ============================================================================
// SECTION: Idempotency
// ============================================================================

#[test]
fn idempotency_contract_covers_fresh_cached_and_mismatch() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir, "owner-1", 1_000);
    let hash_a = hash_bytes(DEFAULT_HASH_ALGORITHM, b"request-a");
    let hash_b = hash_bytes(DEFAULT_HASH_ALGORITHM, b"request-b");
    let claim = store
        .claim_idempotency_key("key-1", &hash_a, now(1_000), None)
        .expect("claim");
    assert_eq!(claim, IdempotencyClaim::Fresh);
    // Same key, same hash, still pending.
    let claim = store
        .claim_idempotency_key("key-1", &hash_a, now(1_100), None)
        .expect("claim");
    assert_eq!(claim, IdempotencyClaim::InFlight);
    store
        .resolve_idempotency_key(
            "key-1",
            warden_core::IdempotencyStatus::Completed,
            Some(&json!({ "ok": true })),
        )
        .expect("resolve");
    let claim = store
        .claim_idempotency_key("key-1", &hash_a, now(1_200), None)
        .expect("claim");
    assert_eq!(claim, IdempotencyClaim::Cached(Some(json!({ "ok": true }))));
    // Same key, different hash: caller bug.
    let claim = store
        .claim_idempotency_key("key-1", &hash_b, now(1_300), None)
        .expect("claim");
    assert_eq!(claim, IdempotencyClaim::HashMismatch);
}

// ============================================================================
// SECTION: Leases
// ============================================================================

#[test]
fn lease_claims_are_exclusive_until_expiry() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir, "owner-1", 1_000);
    let task = sample_task("t-leases", 1_000);
    store.insert_task(&task).expect("insert");
    let item = sample_work_item(&store, &task.task_id, "wi-1", 1_000);
    let alice = OwnerId::new("alice");
    let bob = OwnerId::new("bob");
    assert!(store.try_acquire_lease(&item, &alice, 2_000, now(10_000)).expect("acquire"));
    // Bob cannot steal a live lease.
    assert!(!store.try_acquire_lease(&item, &bob, 2_000, now(11_000)).expect("acquire"));
    // Heartbeat extends only for the holder.
    assert!(store.heartbeat_lease(&item, &alice, 2_000, now(11_500)).expect("heartbeat"));
    assert!(!store.heartbeat_lease(&item, &bob, 2_000, now(11_600)).expect("heartbeat"));
    // After expiry Bob adopts.
    assert!(store.try_acquire_lease(&item, &bob, 2_000, now(20_000)).expect("acquire"));
    let fetched = store.fetch_work_item(&item).expect("fetch");
    assert_eq!(fetched.lease.expect("lease").owner_id, bob);
}

#[test]
fn sweep_marks_only_expired_items() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir, "owner-1", 1_000);
    let task = sample_task("t-sweep", 1_000);
    store.insert_task(&task).expect("insert");
    let expired = sample_work_item(&store, &task.task_id, "wi-expired", 1_000);
    let live = sample_work_item(&store, &task.task_id, "wi-live", 1_000);
    let owner = OwnerId::new("worker");
    assert!(store.try_acquire_lease(&expired, &owner, 1_000, now(10_000)).expect("acquire"));
    assert!(store.try_acquire_lease(&live, &owner, 60_000, now(10_000)).expect("acquire"));
    let swept = store.sweep_expired_leases(now(12_000)).expect("sweep");
    assert_eq!(swept, vec![expired.clone()]);
    assert_eq!(
        store.fetch_work_item(&expired).expect("fetch").status,
        WorkItemStatus::Expired
    );
    assert_eq!(
        store.fetch_work_item(&live).expect("fetch").status,
        WorkItemStatus::InProgress
    );
}

#[test]
fn finishing_requires_the_lease_holder() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir, "owner-1", 1_000);
    let task = sample_task("t-finish", 1_000);
    store.insert_task(&task).expect("insert");
    let item = sample_work_item(&store, &task.task_id, "wi-finish", 1_000);
    let owner = OwnerId::new("worker");
    let impostor = OwnerId::new("impostor");
    assert!(store.try_acquire_lease(&item, &owner, 60_000, now(10_000)).expect("acquire"));
    assert!(
        !store
            .finish_work_item(&item, &impostor, WorkItemStatus::Completed, &json!({}), now(11_000))
            .expect("finish")
    );
    assert!(
        store
            .finish_work_item(&item, &owner, WorkItemStatus::Completed, &json!({}), now(12_000))
            .expect("finish")
    );
    assert_eq!(
        store.fetch_work_item(&item).expect("fetch").status,
        WorkItemStatus::Completed
    );
}

// ============================================================================
// SECTION: Frozen Plans
// ============================================================================

#[test]
fn freeze_sets_hash_and_locks_content() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir, "owner-1", 1_000);
    let task = sample_task("t-plan", 1_000);
    store.insert_task(&task).expect("insert");
    draft_plan(&store, &task.task_id, "plan-1", 1_000);
    let plan_id = warden_core::PlanId::new("plan-1");
    let digest = store.freeze_plan(&plan_id, now(2_000)).expect("freeze");
    let plan = store.fetch_plan(&plan_id).expect("fetch");
    assert_eq!(plan.status, PlanStatus::Frozen);
    assert_eq!(plan.plan_hash.as_ref().expect("hash"), &digest);
    assert!(plan.frozen_at.is_some());
    // Freezing twice is rejected.
    assert!(matches!(
        store.freeze_plan(&plan_id, now(3_000)),
        Err(SqliteStoreError::NotFound(_))
    ));
    // Direct content tampering is rejected by the trigger.
    let connection = raw_connection(&dir);
    let tamper = connection.execute(
        "UPDATE decision_plans SET steps_json = '[]' WHERE plan_id = 'plan-1'",
        [],
    );
    assert!(tamper.is_err(), "frozen content must be trigger-locked");
    // Stored hash verification matches recomputation.
    let verified = store.verify_frozen_plan(&plan_id).expect("verify");
    assert_eq!(verified, digest);
    // Lineage row was written with the freeze.
    let lineage = store.list_lineage(&task.task_id).expect("lineage");
    assert!(lineage.iter().any(|row| row.ref_id == "plan-1"));
}

#[test]
fn bypassed_trigger_surfaces_as_hash_mismatch() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir, "owner-1", 1_000);
    let task = sample_task("t-tamper", 1_000);
    store.insert_task(&task).expect("insert");
    draft_plan(&store, &task.task_id, "plan-tamper", 1_000);
    let plan_id = warden_core::PlanId::new("plan-tamper");
    store.freeze_plan(&plan_id, now(2_000)).expect("freeze");
    let connection = raw_connection(&dir);
    connection
        .execute("DROP TRIGGER decision_plans_frozen_content_lock", [])
        .expect("drop trigger (test harness bypass)");
    connection
        .execute(
            "UPDATE decision_plans SET steps_json = '[]' WHERE plan_id = 'plan-tamper'",
            [],
        )
        .expect("tamper");
    let err = store.verify_frozen_plan(&plan_id).expect_err("tampered plan must fail");
    assert!(matches!(err, SqliteStoreError::Corrupt(_)));
}

// ============================================================================
// SECTION: Trust Cycle
// ============================================================================

#[test]
fn trust_transitions_reject_jumps_at_the_storage_layer() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir, "owner-1", 1_000);
    let connection = raw_connection(&dir);
    let jump = connection.execute(
        "INSERT INTO trust_transitions (extension_id, action_id, old_state, new_state, \
         trigger_event, explain_text, risk_json, policy_json, transitioned_at) \
         VALUES ('ext', 'act', 'EARNING', 'DEGRADING', 'test', 'jump', 'null', 'null', 1000)",
        [],
    );
    assert!(jump.is_err(), "EARNING -> DEGRADING must be rejected");
    drop(connection);
    // The legal cycle commits through the typed surface.
    let record = TrustRecord {
        extension_id: warden_core::ExtensionId::new("ext"),
        action_id: warden_core::ActionId::new("act"),
        state: TrustState::Earning,
        consecutive_successes: 10,
        policy_rejections: 0,
        score: 10.0,
        updated_at: now(1_000),
    };
    store.insert_trust_record(&record, false, None).expect("insert");
    let transition = TrustTransition {
        extension_id: record.extension_id.clone(),
        action_id: record.action_id.clone(),
        old_state: TrustState::Earning,
        new_state: TrustState::Stable,
        trigger_event: "consecutive_successes".to_string(),
        explain: "10 consecutive successes with no policy rejections".to_string(),
        risk_context: json!(null),
        policy_context: json!(null),
        transitioned_at: now(2_000),
    };
    store.apply_trust_transition(&transition, 0, 0).expect("legal transition");
    let history = store
        .list_trust_transitions(&record.extension_id, &record.action_id)
        .expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].new_state, TrustState::Stable);
    assert!(history[0].explain.contains("10 consecutive successes"));
}

#[test]
fn new_trust_records_must_start_earning() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir, "owner-1", 1_000);
    let record = TrustRecord {
        extension_id: warden_core::ExtensionId::new("ext2"),
        action_id: warden_core::ActionId::new("act2"),
        state: TrustState::Stable,
        consecutive_successes: 0,
        policy_rejections: 0,
        score: 0.0,
        updated_at: now(1_000),
    };
    let err = store.insert_trust_record(&record, false, None).expect_err("must reject");
    assert!(matches!(err, SqliteStoreError::Constraint(_)));
}

#[test]
fn marketplace_inheritance_caps_are_database_enforced() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir, "owner-1", 1_000);
    let record = TrustRecord {
        extension_id: warden_core::ExtensionId::new("mkt"),
        action_id: warden_core::ActionId::new("act"),
        state: TrustState::Earning,
        consecutive_successes: 0,
        policy_rejections: 0,
        score: 80.0,
        updated_at: now(1_000),
    };
    // Score above the 70 cap is rejected for marketplace origin.
    let err = store
        .insert_trust_record(&record, true, Some("MEDIUM"))
        .expect_err("cap must reject");
    assert!(matches!(err, SqliteStoreError::Constraint(_)));
    // A capped score with a valid tier is accepted.
    let capped = TrustRecord {
        score: 70.0,
        ..record
    };
    store.insert_trust_record(&capped, true, Some("MEDIUM")).expect("capped insert");
}

// ============================================================================
// SECTION: Risk Timeline
// ============================================================================

#[test]
fn risk_timeline_rows_reject_update_and_delete() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir, "owner-1", 1_000);
    let assessment = warden_core::RiskAssessment {
        capability_id: CapabilityId::new("action.noop"),
        agent_id: AgentId::new("agent-1"),
        score: 42.0,
        level: warden_core::RiskLevel::Medium,
        dimensions: warden_core::RiskDimensions::default(),
        assessed_at: now(1_000),
    };
    store.record_risk_assessment(&assessment, None).expect("record");
    let connection = raw_connection(&dir);
    assert!(
        connection.execute("UPDATE risk_timeline SET score = 0.0", []).is_err(),
        "risk timeline UPDATE must fail"
    );
    assert!(
        connection.execute("DELETE FROM risk_timeline", []).is_err(),
        "risk timeline DELETE must fail"
    );
    assert!(
        connection.execute("UPDATE risk_assessments SET score = 0.0", []).is_err(),
        "risk assessment UPDATE must fail"
    );
}

// ============================================================================
// SECTION: Emergency Overrides
// ============================================================================

#[test]
fn override_tokens_are_single_use() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir, "owner-1", 1_000);
    let agent = AgentId::new("agent-1");
    let capability = CapabilityId::new("action.noop");
    let token = EmergencyOverride {
        override_id: OverrideId::new("ovr-1"),
        agent_id: agent.clone(),
        capability_id: capability.clone(),
        justification: "x".repeat(120),
        used: false,
        minted_at: now(1_000),
        expires_at: now(100_000),
        consumed_at: None,
    };
    store.mint_override(&token).expect("mint");
    assert!(
        store
            .consume_override(&token.override_id, &agent, &capability, now(2_000))
            .expect("consume")
    );
    // Second consumption fails: used flag moved 0 -> 1 exactly once.
    assert!(
        !store
            .consume_override(&token.override_id, &agent, &capability, now(3_000))
            .expect("consume")
    );
    let fetched = store.fetch_override(&token.override_id).expect("fetch");
    assert!(fetched.used);
    assert!(fetched.consumed_at.is_some());
}

#[test]
fn override_justification_must_be_long_enough() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir, "owner-1", 1_000);
    let token = EmergencyOverride {
        override_id: OverrideId::new("ovr-short"),
        agent_id: AgentId::new("agent-1"),
        capability_id: CapabilityId::new("action.noop"),
        justification: "too short".to_string(),
        used: false,
        minted_at: now(1_000),
        expires_at: now(100_000),
        consumed_at: None,
    };
    assert!(matches!(
        store.mint_override(&token),
        Err(SqliteStoreError::Invalid(_))
    ));
}
