// crates/warden-server/src/state.rs
// ============================================================================
// Module: Server State
// Description: Shared state handed to every Axum handler.
// Purpose: Carry the kernel, auth tokens, and bootstrap identity.
// Dependencies: warden-core, warden-kernel
// ============================================================================

//! ## Overview
//! All handlers receive `State<Arc<AppState>>`. The state owns the assembled
//! kernel plus the two bearer tokens: `admin_token` gates grant, override,
//! and profile endpoints; `control_token` gates loopback control calls.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::http::HeaderMap;
use warden_core::AgentId;
use warden_kernel::Kernel;

// ============================================================================
// SECTION: App State
// ============================================================================

/// Shared, clone-cheap server state.
///
/// # Invariants
/// - Tokens are compared with simple equality; rotation requires restart.
#[derive(Clone)]
pub struct AppState {
    /// Assembled kernel.
    pub kernel: Kernel,
    /// Bearer token for admin endpoints.
    pub admin_token: String,
    /// Per-run token for loopback control endpoints.
    pub control_token: String,
    /// Default agent identity for unauthenticated task traffic.
    pub default_agent: AgentId,
}

impl AppState {
    /// Wraps the state for Axum.
    #[must_use]
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Returns true when the request carries the admin bearer token.
    #[must_use]
    pub fn is_admin(&self, headers: &HeaderMap) -> bool {
        bearer_token(headers).is_some_and(|token| token == self.admin_token)
    }

    /// Returns true when the request may drive loopback control endpoints.
    ///
    /// An empty configured control token leaves the control surface open;
    /// the admin token always qualifies.
    #[must_use]
    pub fn is_control(&self, headers: &HeaderMap) -> bool {
        if self.control_token.is_empty() {
            return true;
        }
        bearer_token(headers)
            .is_some_and(|token| token == self.control_token || token == self.admin_token)
    }
}

/// Extracts the bearer token from the Authorization header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}
