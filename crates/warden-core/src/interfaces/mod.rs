// crates/warden-core/src/interfaces/mod.rs
// ============================================================================
// Module: Warden Interfaces
// Description: Backend-agnostic interfaces for storage, handlers, review.
// Purpose: Define the contract surfaces used by the Warden kernel.
// Dependencies: crate::core, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Interfaces define how the kernel integrates with storage and external
//! tool providers without embedding backend-specific details.
//! Implementations must be deterministic where possible and fail closed on
//! missing or invalid data.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::identifiers::ActionId;
use crate::core::identifiers::AgentId;
use crate::core::identifiers::TaskId;
use crate::core::task::Task;
use crate::core::time::Timestamp;
use crate::core::verdict::VerdictOutcome;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Storage-layer errors shared by every repository surface.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - Messages avoid embedding raw payloads.
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    /// Store I/O error.
    #[error("store io error: {0}")]
    Io(String),
    /// Database engine error.
    #[error("store db error: {0}")]
    Db(String),
    /// Row exists but violates an integrity expectation.
    #[error("store corruption: {0}")]
    Corrupt(String),
    /// Requested row does not exist.
    #[error("store row not found: {0}")]
    NotFound(String),
    /// Write conflicted with a database-enforced invariant.
    #[error("store constraint violation: {0}")]
    Constraint(String),
    /// Invalid data presented to the store.
    #[error("store invalid data: {0}")]
    Invalid(String),
    /// Migration ladder failed to apply.
    #[error("store migration failure: {0}")]
    Migration(String),
    /// Another process holds the instance lock.
    #[error("store instance contention: {0}")]
    Contention(String),
}

// ============================================================================
// SECTION: Action Handlers
// ============================================================================

/// Handler invocation request.
///
/// # Invariants
/// - `params` were validated by the authorizer and policy engine upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerRequest {
    /// Action being invoked.
    pub action_id: ActionId,
    /// Task context.
    pub task_id: TaskId,
    /// Agent on whose behalf the action runs.
    pub agent_id: AgentId,
    /// Handler parameters.
    pub params: Value,
    /// When true the handler must not produce side effects.
    pub dry_run: bool,
    /// Invocation timestamp.
    pub invoked_at: Timestamp,
}

/// One side effect reported by a handler.
///
/// # Invariants
/// - `effect_type` matches the vocabulary used in declarations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedEffect {
    /// Effect type label.
    pub effect_type: String,
    /// Effect target description.
    pub target: String,
}

/// Handler invocation response.
///
/// # Invariants
/// - `effects` lists every externally observable change the handler made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerResponse {
    /// Result payload.
    pub result: Value,
    /// Side effects the handler observed itself producing.
    pub effects: Vec<ReportedEffect>,
}

/// Action handler errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Handler failed; retries may be permitted.
    #[error("handler failure: {0}")]
    Failure(String),
    /// Handler rejected the parameters.
    #[error("handler rejected params: {0}")]
    InvalidParams(String),
    /// Handler exceeded its execution timeout.
    #[error("handler timed out after {0} ms")]
    Timeout(u64),
}

/// Backend-agnostic action handler.
///
/// Providers (shell, SSH, cloud APIs, LLMs) are registered behind this trait;
/// the kernel treats them as opaque capability handlers.
pub trait ActionHandler: Send + Sync {
    /// Returns the effect types this handler declares up front.
    fn declared_effects(&self) -> Vec<String>;

    /// Returns true when the handler supplies a rollback plan.
    fn is_reversible(&self) -> bool;

    /// Executes the action.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when execution fails or parameters are
    /// rejected.
    fn execute(&self, request: &HandlerRequest) -> Result<HandlerResponse, HandlerError>;

    /// Executes the inverse plan for a prior invocation.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when the rollback fails. Irreversible
    /// handlers must return [`HandlerError::Failure`]; the executor records
    /// `not_applicable` without calling this.
    fn rollback(&self, request: &HandlerRequest) -> Result<HandlerResponse, HandlerError>;
}

// ============================================================================
// SECTION: Guardian
// ============================================================================

/// Guardian review errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum GuardianError {
    /// Reviewer reported an error.
    #[error("guardian review error: {0}")]
    Review(String),
}

/// Verifier producing immutable verdicts for finished tasks.
pub trait Guardian: Send + Sync {
    /// Reviews a task's outcome and produces a verdict.
    ///
    /// # Errors
    ///
    /// Returns [`GuardianError`] when the review cannot be completed.
    fn review(&self, task: &Task, summary: &Value) -> Result<VerdictOutcome, GuardianError>;
}
