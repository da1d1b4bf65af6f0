// crates/warden-kernel/tests/common/mod.rs
// ============================================================================
// Module: Kernel Test Fixtures
// Description: Shared kernel assembly and seeding helpers for scenarios.
// Purpose: Build a kernel over a temp store with a manual clock.
// ============================================================================

//! ## Overview
//! Scenario fixtures: a kernel assembled over a temporary database with a
//! [`ManualClock`], a seeded operator profile, the built-in capability
//! definitions, and the no-op handler registered.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    dead_code,
    reason = "Test-only fixtures are permitted and not every test uses every helper."
)]

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use warden_core::ActionId;
use warden_core::AgentId;
use warden_core::AgentProfile;
use warden_core::AgentTier;
use warden_core::CapabilityDefinition;
use warden_core::CapabilityDomain;
use warden_core::CapabilityId;
use warden_core::CapabilityLevel;
use warden_core::EscalationPolicy;
use warden_core::ManualClock;
use warden_core::OwnerId;
use warden_core::PlanStep;
use warden_core::Timestamp;
use warden_kernel::AutonomousMode;
use warden_kernel::Kernel;
use warden_kernel::handlers::NoopHandler;
use warden_kernel::runner::RunnerConfig;
use warden_store_sqlite::ControlStore;
use warden_store_sqlite::SqliteStoreConfig;

/// A kernel plus the handles tests need to drive it.
pub struct Fixture {
    /// Assembled kernel under test.
    pub kernel: Kernel,
    /// Manual clock shared with the kernel.
    pub clock: Arc<ManualClock>,
    /// Temp directory keeping the database alive.
    pub dir: TempDir,
    /// Seeded operator agent.
    pub agent: AgentId,
}

/// Assembles a kernel over a fresh temp store.
pub fn fixture(mode: AutonomousMode, lease_ttl_ms: i64) -> Fixture {
    let dir = TempDir::new().expect("tempdir");
    let clock = Arc::new(ManualClock::starting_at(1_000_000));
    let store = ControlStore::open(
        SqliteStoreConfig::for_path(dir.path().join("warden.db")),
        OwnerId::new("test-instance"),
        clock.now_ts(),
    )
    .expect("store open");
    let config = RunnerConfig {
        lease_ttl_ms,
        heartbeat_interval_ms: lease_ttl_ms / 2,
        max_iterations: 50,
        autonomous_mode: mode,
    };
    let kernel = Kernel::assemble(store, clock.clone(), None, config);
    let agent = AgentId::new("operator");
    seed(&kernel, &agent);
    Fixture {
        kernel,
        clock,
        dir,
        agent,
    }
}

/// Seeds capabilities, the operator profile, and the no-op handler.
fn seed(kernel: &Kernel, agent: &AgentId) {
    let now = kernel.ctx.now();
    for (capability, level) in [
        ("action.noop", CapabilityLevel::Write),
        ("action.deploy", CapabilityLevel::Write),
    ] {
        kernel
            .ctx
            .store
            .register_capability(&CapabilityDefinition {
                capability_id: CapabilityId::new(capability),
                domain: CapabilityDomain::Action,
                level,
                version: 1,
                registered_at: now,
            })
            .expect("capability");
    }
    kernel
        .ctx
        .store
        .upsert_agent_profile(&AgentProfile {
            agent_id: agent.clone(),
            tier: AgentTier::from_raw(3).expect("tier"),
            allowed_capabilities: vec!["action.*".to_string()],
            forbidden_capabilities: Vec::new(),
            escalation_policy: EscalationPolicy::RequestApproval,
            registered_at: now,
        })
        .expect("profile");
    kernel.executor.register_handler(&ActionId::new("noop"), Arc::new(NoopHandler));
}

/// Registers a low-tier agent whose calls escalate.
pub fn seed_low_tier_agent(kernel: &Kernel, agent: &AgentId) {
    kernel
        .ctx
        .store
        .upsert_agent_profile(&AgentProfile {
            agent_id: agent.clone(),
            tier: AgentTier::from_raw(1).expect("tier"),
            allowed_capabilities: vec!["action.*".to_string()],
            forbidden_capabilities: Vec::new(),
            escalation_policy: EscalationPolicy::RequestApproval,
            registered_at: kernel.ctx.now(),
        })
        .expect("profile");
}

/// Builds a single no-op plan step.
pub fn noop_step() -> PlanStep {
    PlanStep {
        position: 0,
        action_id: ActionId::new("noop"),
        capability_id: CapabilityId::new("action.noop"),
        params: json!({}),
        parallel_group: None,
    }
}

/// Extension trait giving the manual clock a `Timestamp` shorthand.
pub trait ClockExt {
    /// Returns the current timestamp.
    fn now_ts(&self) -> Timestamp;
}

impl ClockExt for ManualClock {
    fn now_ts(&self) -> Timestamp {
        warden_core::Clock::now(self)
    }
}
