// crates/warden-store-sqlite/tests/proptest_invariants.rs
// ============================================================================
// Module: Store Property Tests
// Description: Generative checks for seq density and trust-cycle legality.
// Purpose: Exercise universal invariants over randomized inputs.
// ============================================================================

//! ## Overview
//! Property tests for the store-level universal invariants:
//! - Event seqs always form exactly `{1..N}` regardless of draft content.
//! - Only the three cycle edges ever commit into `trust_transitions`.
//! - Quota charges never let `current_usage` exceed the limit.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeMap;

use proptest::prelude::*;
use tempfile::TempDir;
use warden_core::AgentId;
use warden_core::EventActor;
use warden_core::EventDraft;
use warden_core::OwnerId;
use warden_core::Quota;
use warden_core::ResourceType;
use warden_core::SpanId;
use warden_core::Task;
use warden_core::TaskId;
use warden_core::TaskStatus;
use warden_core::Timestamp;
use warden_core::TrustState;
use warden_store_sqlite::ControlStore;
use warden_store_sqlite::QuotaCharge;
use warden_store_sqlite::SqliteStoreConfig;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn open_store(dir: &TempDir) -> ControlStore {
    ControlStore::open(
        SqliteStoreConfig::for_path(dir.path().join("warden.db")),
        OwnerId::new("prop-owner"),
        Timestamp::from_unix_millis(1_000),
    )
    .expect("store open")
}

fn insert_task(store: &ControlStore, id: &str) -> TaskId {
    let task = Task {
        task_id: TaskId::new(id),
        session_id: None,
        title: "prop task".to_string(),
        status: TaskStatus::Created,
        exit_reason: None,
        project_id: None,
        repo_id: None,
        metadata: BTreeMap::new(),
        created_at: Timestamp::from_unix_millis(1_000),
        updated_at: Timestamp::from_unix_millis(1_000),
    };
    store.insert_task(&task).expect("task insert");
    task.task_id
}

/// Strategy over arbitrary trust state pairs.
fn trust_state_strategy() -> impl Strategy<Value = TrustState> {
    prop_oneof![
        Just(TrustState::Earning),
        Just(TrustState::Stable),
        Just(TrustState::Degrading),
    ]
}

// ============================================================================
// SECTION: Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn event_seqs_form_a_dense_prefix(
        event_types in prop::collection::vec("[a-z_]{1,16}", 1..40)
    ) {
        let dir = TempDir::new().expect("tempdir");
        let store = open_store(&dir);
        let task_id = insert_task(&store, "t-prop-events");
        for (index, event_type) in event_types.iter().enumerate() {
            let draft = EventDraft::new(
                event_type.clone(),
                EventActor::Worker,
                SpanId::new("span"),
            );
            let at = Timestamp::from_unix_millis(2_000 + i64::try_from(index).expect("index"));
            store.append_event(&task_id, &draft, at).expect("append");
        }
        let events = store.events_since(&task_id, 0, 1_000).expect("read");
        let seqs: Vec<u64> = events.iter().map(|event| event.seq).collect();
        let expected: Vec<u64> =
            (1 ..= u64::try_from(event_types.len()).expect("len")).collect();
        prop_assert_eq!(seqs, expected);
    }

    #[test]
    fn only_cycle_edges_commit(
        old_state in trust_state_strategy(),
        new_state in trust_state_strategy(),
    ) {
        let dir = TempDir::new().expect("tempdir");
        let _store = open_store(&dir);
        let connection =
            rusqlite::Connection::open(dir.path().join("warden.db")).expect("raw connection");
        let result = connection.execute(
            "INSERT INTO trust_transitions (extension_id, action_id, old_state, new_state, \
             trigger_event, explain_text, risk_json, policy_json, transitioned_at) \
             VALUES ('ext', 'act', ?1, ?2, 'prop', 'prop', 'null', 'null', 1000)",
            rusqlite::params![old_state.as_str(), new_state.as_str()],
        );
        let legal = matches!(
            (old_state, new_state),
            (TrustState::Earning, TrustState::Stable)
                | (TrustState::Stable, TrustState::Degrading)
                | (TrustState::Degrading, TrustState::Earning)
        );
        prop_assert_eq!(result.is_ok(), legal);
    }

    #[test]
    fn quota_usage_never_exceeds_the_limit(
        limit in 1_u64..1_000,
        deltas in prop::collection::vec(1_u64..200, 1..20),
    ) {
        let dir = TempDir::new().expect("tempdir");
        let store = open_store(&dir);
        let agent = AgentId::new("prop-agent");
        store
            .upsert_quota(&Quota {
                agent_id: agent.clone(),
                resource: ResourceType::Tokens,
                limit,
                current_usage: 0,
                reset_interval_ms: None,
                last_reset: Timestamp::from_unix_millis(1_000),
            })
            .expect("quota");
        let mut charged_total: u64 = 0;
        for (index, delta) in deltas.iter().enumerate() {
            let at = Timestamp::from_unix_millis(2_000 + i64::try_from(index).expect("index"));
            match store.charge_quota(&agent, ResourceType::Tokens, *delta, at).expect("charge") {
                QuotaCharge::Charged => charged_total += *delta,
                QuotaCharge::Exceeded { remaining } => {
                    prop_assert!(charged_total + *delta > limit);
                    prop_assert_eq!(remaining, limit - charged_total);
                }
            }
        }
        let quota = store
            .fetch_quota(&agent, ResourceType::Tokens)
            .expect("fetch")
            .expect("present");
        prop_assert!(quota.current_usage <= quota.limit);
        prop_assert_eq!(quota.current_usage, charged_total);
    }
}
