// crates/warden-core/tests/plan_hash.rs
// ============================================================================
// Module: Plan Hash Property Tests
// Description: Content-addressing invariants for decision plans.
// Purpose: Verify hash stability and mutation sensitivity.
// ============================================================================

//! ## Overview
//! Generative checks over [`plan_content_hash`]:
//! - The same steps and alternatives always hash identically.
//! - Any change to a step's parameters changes the hash.
//! - Alternatives participate in the hash.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions and helpers are permitted."
)]

use proptest::prelude::*;
use serde_json::json;
use warden_core::ActionId;
use warden_core::CapabilityId;
use warden_core::DEFAULT_HASH_ALGORITHM;
use warden_core::OptionId;
use warden_core::PlanAlternative;
use warden_core::PlanStep;
use warden_core::plan_content_hash;

// ============================================================================
// SECTION: Strategies
// ============================================================================

fn step_strategy() -> impl Strategy<Value = PlanStep> {
    ("[a-z]{1,12}", "[a-z.]{1,24}", 0_u32..16, any::<i64>()).prop_map(
        |(action, capability, position, payload)| PlanStep {
            position,
            action_id: ActionId::new(action),
            capability_id: CapabilityId::new(capability),
            params: json!({ "value": payload }),
            parallel_group: None,
        },
    )
}

fn alternative_strategy() -> impl Strategy<Value = PlanAlternative> {
    ("[a-z]{1,8}", 0_u64..10_000, 0_u64..10_000).prop_map(|(id, cost, time_ms)| {
        PlanAlternative {
            option_id: OptionId::new(id),
            description: "candidate".to_string(),
            cost,
            time_ms,
            risks: Vec::new(),
            benefits: Vec::new(),
        }
    })
}

// ============================================================================
// SECTION: Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn identical_content_hashes_identically(
        steps in prop::collection::vec(step_strategy(), 0..8),
        alternatives in prop::collection::vec(alternative_strategy(), 0..4),
    ) {
        let first = plan_content_hash(DEFAULT_HASH_ALGORITHM, &steps, &alternatives)
            .expect("hash");
        let second = plan_content_hash(DEFAULT_HASH_ALGORITHM, &steps, &alternatives)
            .expect("hash");
        prop_assert_eq!(first, second);
    }

    #[test]
    fn changing_a_step_changes_the_hash(
        mut steps in prop::collection::vec(step_strategy(), 1..8),
    ) {
        let original = plan_content_hash(DEFAULT_HASH_ALGORITHM, &steps, &[]).expect("hash");
        steps[0].params = json!({ "value": "mutated" });
        let mutated = plan_content_hash(DEFAULT_HASH_ALGORITHM, &steps, &[]).expect("hash");
        prop_assert_ne!(original, mutated);
    }

    #[test]
    fn alternatives_participate_in_the_hash(
        steps in prop::collection::vec(step_strategy(), 0..4),
        alternative in alternative_strategy(),
    ) {
        let without = plan_content_hash(DEFAULT_HASH_ALGORITHM, &steps, &[]).expect("hash");
        let with = plan_content_hash(
            DEFAULT_HASH_ALGORITHM,
            &steps,
            std::slice::from_ref(&alternative),
        )
        .expect("hash");
        prop_assert_ne!(without, with);
    }
}
