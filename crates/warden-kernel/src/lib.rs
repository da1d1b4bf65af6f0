// crates/warden-kernel/src/lib.rs
// ============================================================================
// Module: Warden Kernel Crate Root
// Description: The task lifecycle kernel of the control plane.
// Purpose: Compose leases, events, authorization, decisions, governance,
//          execution, recovery, and trust behind one bootstrap facade.
// Dependencies: globset, serde, serde_json, thiserror, tokio, tracing,
//               warden-core, warden-store-sqlite
// ============================================================================

//! ## Overview
//! `warden-kernel` drives tasks through the governed lifecycle: planning,
//! execution, verification, and recovery. Every privileged operation passes
//! the capability authorizer; every action request passes the policy / risk
//! / quota gate; every mutation lands in the single-writer store with a
//! seq-ordered event trail sufficient to replay any decision.

// ============================================================================
// SECTION: Modules
// ============================================================================

/// The capability authorizer.
pub mod authorizer;
/// Bootstrap context shared by components.
pub mod context;
/// Decision recorder pipeline.
pub mod decisions;
/// Seq-ordered event log.
pub mod events;
/// Action executor.
pub mod executor;
/// Policy / risk / quota engine.
pub mod governance;
/// Built-in guardian.
pub mod guardian;
/// Built-in action handlers.
pub mod handlers;
/// Lease manager.
pub mod lease;
/// Checkpoint and crash recovery.
pub mod recovery;
/// Task runner loop.
pub mod runner;
/// Kernel telemetry counters.
pub mod telemetry;
/// Trust trajectory state machine.
pub mod trust;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use warden_core::Clock;
use warden_core::Guardian;
use warden_store_sqlite::ControlStore;

use crate::authorizer::Authorizer;
use crate::context::KernelContext;
use crate::decisions::DecisionRecorder;
use crate::events::EventLog;
use crate::executor::ActionExecutor;
use crate::governance::GovernanceEngine;
use crate::guardian::AutoGuardian;
use crate::lease::LeaseManager;
use crate::recovery::RecoveryService;
use crate::runner::RunnerConfig;
use crate::runner::TaskRunner;
use crate::telemetry::KernelMetrics;
use crate::trust::TrustTrajectory;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use crate::authorizer::AuthzDecision;
pub use crate::authorizer::AuthzRequest;
pub use crate::authorizer::CallFrame;
pub use crate::authorizer::CallPath;
pub use crate::executor::ExecuteRequest;
pub use crate::governance::GateRequest;
pub use crate::governance::GateResult;
pub use crate::governance::QuotaStatus;
pub use crate::runner::AutonomousMode;
pub use crate::runner::RunOutcome;
pub use crate::runner::TaskRequest;

// ============================================================================
// SECTION: Kernel Facade
// ============================================================================

/// The assembled kernel, one per process.
///
/// # Invariants
/// - All components share the same store and clock.
#[derive(Clone)]
pub struct Kernel {
    /// Shared bootstrap context.
    pub ctx: KernelContext,
    /// Event log.
    pub events: EventLog,
    /// Lease manager.
    pub leases: LeaseManager,
    /// Capability authorizer.
    pub authorizer: Authorizer,
    /// Decision recorder.
    pub decisions: DecisionRecorder,
    /// Policy / risk / quota engine.
    pub governance: GovernanceEngine,
    /// Action executor.
    pub executor: ActionExecutor,
    /// Recovery service.
    pub recovery: RecoveryService,
    /// Trust trajectory.
    pub trust: TrustTrajectory,
    /// Task runner.
    pub runner: TaskRunner,
    /// Operation counters.
    pub metrics: Arc<KernelMetrics>,
}

impl Kernel {
    /// Assembles a kernel over an opened store.
    #[must_use]
    pub fn assemble(
        store: ControlStore,
        clock: Arc<dyn Clock>,
        guardian: Option<Arc<dyn Guardian>>,
        config: RunnerConfig,
    ) -> Self {
        let ctx = KernelContext::new(store, clock);
        let metrics = KernelMetrics::shared();
        let events = EventLog::new(ctx.clone(), metrics.clone());
        let leases = LeaseManager::new(ctx.clone(), config.lease_ttl_ms);
        let authorizer = Authorizer::new(ctx.clone());
        let decisions = DecisionRecorder::new(ctx.clone(), events.clone());
        let governance = GovernanceEngine::new(ctx.clone());
        let executor = ActionExecutor::new(ctx.clone());
        let recovery = RecoveryService::new(ctx.clone(), events.clone(), leases.clone());
        let trust = TrustTrajectory::new(ctx.clone());
        let guardian = guardian.unwrap_or_else(|| Arc::new(AutoGuardian));
        let runner = TaskRunner::new(
            ctx.clone(),
            events.clone(),
            leases.clone(),
            authorizer.clone(),
            decisions.clone(),
            governance.clone(),
            executor.clone(),
            recovery.clone(),
            trust.clone(),
            guardian,
            config,
        );
        Self {
            ctx,
            events,
            leases,
            authorizer,
            decisions,
            governance,
            executor,
            recovery,
            trust,
            runner,
            metrics,
        }
    }
}
