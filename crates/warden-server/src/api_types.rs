// crates/warden-server/src/api_types.rs
// ============================================================================
// Module: API Types
// Description: Request and response bodies for the HTTP surface.
// Purpose: Keep wire shapes separate from kernel types.
// Dependencies: serde, serde_json, warden-core
// ============================================================================

//! ## Overview
//! Wire DTOs for the HTTP API. Kernel types serialize directly where their
//! shape is already the contract (tasks, events, plans); these types cover
//! the request bodies and the thin response envelopes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use warden_core::PlanAlternative;
use warden_core::PlanStep;

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Body of `POST /api/tasks`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskBody {
    /// Human-readable title.
    pub title: String,
    /// Optional session back-reference.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Agent that will execute the plan (defaults to the server identity).
    #[serde(default)]
    pub agent_id: Option<String>,
    /// Ordered plan steps.
    #[serde(default)]
    pub steps: Vec<PlanStep>,
    /// Alternatives considered.
    #[serde(default)]
    pub alternatives: Vec<PlanAlternative>,
    /// Caller metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// Body of `POST /api/actions/execute`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteActionBody {
    /// Action to execute.
    pub action_id: String,
    /// Handler parameters.
    #[serde(default)]
    pub params: Value,
    /// Frozen plan authorizing the action.
    pub decision_id: String,
    /// Agent identity (defaults to the server identity).
    #[serde(default)]
    pub agent_id: Option<String>,
    /// Optional idempotency key.
    #[serde(default)]
    pub idempotency_key: Option<String>,
    /// Optional emergency override token.
    #[serde(default)]
    pub override_token: Option<String>,
}

/// Body of `POST /api/agents`.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterAgentBody {
    /// Agent identifier.
    pub agent_id: String,
    /// Tier ceiling (0..=3).
    pub tier: u8,
    /// Glob patterns for allowed capabilities.
    #[serde(default)]
    pub allowed_capabilities: Vec<String>,
    /// Glob patterns for forbidden capabilities.
    #[serde(default)]
    pub forbidden_capabilities: Vec<String>,
    /// Escalation policy label.
    pub escalation_policy: String,
}

/// Body of `POST /api/capabilities/grants`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateGrantBody {
    /// Agent receiving the grant.
    pub agent_id: String,
    /// Capability being granted.
    pub capability_id: String,
    /// Optional scope restriction.
    #[serde(default)]
    pub scope: Option<String>,
    /// Optional expiry in unix milliseconds.
    #[serde(default)]
    pub expires_at: Option<i64>,
}

/// Body of `POST /api/escalations/{id}/approve` and `/reject`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ResolveEscalationBody {
    /// Reviewer note.
    #[serde(default)]
    pub note: Option<String>,
    /// Grant TTL in milliseconds for approvals.
    #[serde(default)]
    pub grant_ttl_ms: Option<i64>,
}

/// Body of `POST /api/governance/override`.
#[derive(Debug, Clone, Deserialize)]
pub struct MintOverrideBody {
    /// Agent the override is minted for.
    pub agent_id: String,
    /// Capability of the blocked operation.
    pub capability_id: String,
    /// Admin justification (at least 100 characters).
    pub justification: String,
    /// Token TTL in milliseconds.
    #[serde(default = "default_override_ttl_ms")]
    pub ttl_ms: i64,
}

/// Default TTL for override tokens (one hour).
const fn default_override_ttl_ms() -> i64 {
    3_600_000
}

// ============================================================================
// SECTION: Responses
// ============================================================================

/// Response of `POST /api/tasks`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateTaskResponse {
    /// Created task identifier.
    pub task_id: String,
    /// Draft plan identifier.
    pub plan_id: String,
}

/// Response of `POST /api/decisions/{plan_id}/freeze`.
#[derive(Debug, Clone, Serialize)]
pub struct FreezeResponse {
    /// Content hash of the frozen plan.
    pub plan_hash: String,
    /// Freeze timestamp in unix milliseconds.
    pub frozen_at: i64,
}

/// Error envelope returned by every failing endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Stable machine-readable code.
    pub error_code: String,
    /// Human-readable message.
    pub message: String,
    /// Structured context payload.
    pub context: Value,
}

/// Response of `GET /api/health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall readiness flag.
    pub ok: bool,
    /// Service name.
    pub service: &'static str,
    /// Crate version.
    pub version: &'static str,
}
