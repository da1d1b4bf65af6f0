// crates/warden-server/src/lib.rs
// ============================================================================
// Module: Warden Server Crate Root
// Description: HTTP and WebSocket surface over the kernel.
// Purpose: Expose the control plane to the desktop shell and UI.
// Dependencies: axum, serde, serde_json, tokio, tracing, warden-core,
//               warden-kernel, warden-store-sqlite
// ============================================================================

//! ## Overview
//! `warden-server` wires the kernel behind the documented JSON routes and
//! the seq-ordered WebSocket event stream. Bootstrap seeds the built-in
//! capability definitions, the default operator profile, and the built-in
//! action handlers so a fresh install can run the smoke flow end to end.

// ============================================================================
// SECTION: Modules
// ============================================================================

/// Wire DTOs.
pub mod api_types;
/// Router and HTTP handlers.
pub mod routes;
/// Shared handler state.
pub mod state;
/// WebSocket streaming.
pub mod ws;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use warden_core::ActionId;
use warden_core::AgentId;
use warden_core::AgentProfile;
use warden_core::AgentTier;
use warden_core::CapabilityDefinition;
use warden_core::CapabilityDomain;
use warden_core::CapabilityId;
use warden_core::CapabilityLevel;
use warden_core::EscalationPolicy;
use warden_core::KernelError;
use warden_core::KernelErrorCode;
use warden_kernel::Kernel;
use warden_kernel::handlers::EchoHandler;
use warden_kernel::handlers::NoopHandler;

use crate::state::AppState;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use crate::routes::build_router;

// ============================================================================
// SECTION: Bootstrap
// ============================================================================

/// Default agent identity for loopback traffic.
pub const DEFAULT_AGENT_ID: &str = "local-operator";

/// Seeds built-in capabilities, the operator profile, and handlers.
///
/// Seeding is idempotent: existing definitions are left untouched and the
/// operator profile is upserted.
///
/// # Errors
///
/// Returns [`KernelError`] when persistence fails.
pub fn bootstrap_kernel(kernel: &Kernel) -> Result<(), KernelError> {
    let now = kernel.ctx.now();
    let builtins = [
        ("action.noop", CapabilityDomain::Action, CapabilityLevel::Write),
        ("action.echo", CapabilityDomain::Action, CapabilityLevel::Read),
        ("state.read", CapabilityDomain::State, CapabilityLevel::Read),
        ("state.memory.propose", CapabilityDomain::State, CapabilityLevel::Propose),
        ("state.memory.write", CapabilityDomain::State, CapabilityLevel::Write),
    ];
    for (capability_id, domain, level) in builtins {
        let definition = CapabilityDefinition {
            capability_id: CapabilityId::new(capability_id),
            domain,
            level,
            version: 1,
            registered_at: now,
        };
        match kernel.ctx.store.register_capability(&definition) {
            Ok(()) | Err(warden_store_sqlite::SqliteStoreError::Constraint(_)) => {}
            Err(err) => {
                return Err(KernelError::new(
                    KernelErrorCode::ErrorStoreFailure,
                    err.to_string(),
                ));
            }
        }
    }
    let Some(operator_tier) = AgentTier::from_raw(3) else {
        return Err(KernelError::new(
            KernelErrorCode::ErrorStoreFailure,
            "operator tier out of range",
        ));
    };
    let profile = AgentProfile {
        agent_id: AgentId::new(DEFAULT_AGENT_ID),
        tier: operator_tier,
        allowed_capabilities: vec!["action.*".to_string(), "state.*".to_string()],
        forbidden_capabilities: Vec::new(),
        escalation_policy: EscalationPolicy::RequestApproval,
        registered_at: now,
    };
    kernel
        .ctx
        .store
        .upsert_agent_profile(&profile)
        .map_err(|err| KernelError::new(KernelErrorCode::ErrorStoreFailure, err.to_string()))?;
    kernel.executor.register_handler(&ActionId::new("noop"), Arc::new(NoopHandler));
    kernel.executor.register_handler(&ActionId::new("echo"), Arc::new(EchoHandler));
    Ok(())
}

/// Builds the shared state for the router.
#[must_use]
pub fn build_state(kernel: Kernel, admin_token: String, control_token: String) -> Arc<AppState> {
    AppState {
        kernel,
        admin_token,
        control_token,
        default_agent: AgentId::new(DEFAULT_AGENT_ID),
    }
    .shared()
}
