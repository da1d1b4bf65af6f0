// crates/warden-kernel/src/handlers.rs
// ============================================================================
// Module: Built-in Action Handlers
// Description: Handlers shipped with the kernel for bootstrap and tests.
// Purpose: Provide a no-op and an echo handler behind the handler trait.
// Dependencies: warden-core
// ============================================================================

//! ## Overview
//! Real tool providers (shell, SSH, cloud APIs, LLMs) register their own
//! [`ActionHandler`] implementations at startup. The kernel ships two
//! built-ins: `noop` (no side effects, reversible) used by smoke flows, and
//! `echo` which returns its parameters and declares no effects.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::json;
use warden_core::ActionHandler;
use warden_core::HandlerError;
use warden_core::HandlerRequest;
use warden_core::HandlerResponse;

// ============================================================================
// SECTION: Noop Handler
// ============================================================================

/// Handler that does nothing and succeeds.
///
/// # Invariants
/// - Declares no side effects and observes none.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl ActionHandler for NoopHandler {
    fn declared_effects(&self) -> Vec<String> {
        Vec::new()
    }

    fn is_reversible(&self) -> bool {
        true
    }

    fn execute(&self, _request: &HandlerRequest) -> Result<HandlerResponse, HandlerError> {
        Ok(HandlerResponse {
            result: json!({ "ok": true }),
            effects: Vec::new(),
        })
    }

    fn rollback(&self, _request: &HandlerRequest) -> Result<HandlerResponse, HandlerError> {
        Ok(HandlerResponse {
            result: json!({ "ok": true, "rolled_back": true }),
            effects: Vec::new(),
        })
    }
}

// ============================================================================
// SECTION: Echo Handler
// ============================================================================

/// Handler that returns its parameters unchanged.
///
/// # Invariants
/// - Irreversible by declaration; rollback always fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

impl ActionHandler for EchoHandler {
    fn declared_effects(&self) -> Vec<String> {
        Vec::new()
    }

    fn is_reversible(&self) -> bool {
        false
    }

    fn execute(&self, request: &HandlerRequest) -> Result<HandlerResponse, HandlerError> {
        Ok(HandlerResponse {
            result: json!({ "echo": request.params }),
            effects: Vec::new(),
        })
    }

    fn rollback(&self, _request: &HandlerRequest) -> Result<HandlerResponse, HandlerError> {
        Err(HandlerError::Failure("echo is irreversible".to_string()))
    }
}
