// crates/warden-server/src/routes.rs
// ============================================================================
// Module: HTTP Routes
// Description: Axum router and all HTTP handlers for the control plane.
// Purpose: Expose the kernel over the documented JSON surface.
// Dependencies: axum, serde_json, warden-core, warden-kernel
// ============================================================================

//! ## Overview
//! `build_router` is the single entry point; the CLI calls it and attaches
//! the listener. Admin endpoints (grants, revocations, escalation review,
//! overrides) require the admin bearer token; everything else is loopback
//! traffic gated by deployment.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;
use warden_core::AgentId;
use warden_core::CapabilityGrant;
use warden_core::CapabilityId;
use warden_core::EscalationId;
use warden_core::GrantId;
use warden_core::KernelError;
use warden_core::KernelErrorCode;
use warden_core::OverrideId;
use warden_core::PlanId;
use warden_core::ResourceType;
use warden_core::RiskDimensions;
use warden_core::SessionId;
use warden_core::SpanId;
use warden_core::TaskId;
use warden_core::Timestamp;
use warden_kernel::ExecuteRequest;
use warden_kernel::GateRequest;

use crate::api_types::CreateGrantBody;
use crate::api_types::CreateTaskBody;
use crate::api_types::CreateTaskResponse;
use crate::api_types::ErrorResponse;
use crate::api_types::ExecuteActionBody;
use crate::api_types::FreezeResponse;
use crate::api_types::HealthResponse;
use crate::api_types::MintOverrideBody;
use crate::api_types::RegisterAgentBody;
use crate::api_types::ResolveEscalationBody;
use crate::state::AppState;
use crate::ws::ws_events;

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the complete application router wired to the given state.
#[must_use]
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/metrics", get(metrics))
        .route("/api/tasks", post(create_task))
        .route("/api/tasks/{id}", get(get_task))
        .route("/api/tasks/{id}/events", get(get_events))
        .route("/api/tasks/{id}/graph", get(get_graph))
        .route("/api/tasks/{id}/audits", get(get_audits))
        .route("/api/tasks/{id}/run", post(run_task))
        .route("/api/tasks/{id}/cancel", post(cancel_task))
        .route("/api/decisions/{plan_id}/freeze", post(freeze_plan))
        .route("/api/actions/execute", post(execute_action))
        .route("/api/agents", post(register_agent))
        .route("/api/agents/{id}", get(get_agent))
        .route("/api/capabilities/grants", post(create_grant))
        .route("/api/capabilities/{id}/revoke", post(revoke_grant))
        .route("/api/escalations", get(list_escalations))
        .route("/api/escalations/{id}/approve", post(approve_escalation))
        .route("/api/escalations/{id}/reject", post(reject_escalation))
        .route("/api/governance/policies", get(list_policies))
        .route("/api/governance/override", post(mint_override))
        .route("/ws/tasks/{id}/events", get(ws_events))
        .with_state(state)
}

// ============================================================================
// SECTION: Error Mapping
// ============================================================================

/// Maps a kernel error onto an HTTP response.
pub(crate) fn error_response(err: &KernelError) -> Response {
    let status = match err.code {
        KernelErrorCode::ErrorAuthDenied
        | KernelErrorCode::ErrorPolicyDenied
        | KernelErrorCode::ErrorPathInvalid => StatusCode::FORBIDDEN,
        KernelErrorCode::ErrorAuthEscalated => StatusCode::ACCEPTED,
        KernelErrorCode::ErrorQuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
        KernelErrorCode::ErrorPlanNotFrozen
        | KernelErrorCode::ErrorPlanHashMismatch
        | KernelErrorCode::ErrorIdempotencyMismatch => StatusCode::CONFLICT,
        KernelErrorCode::ErrorLeaseLost => StatusCode::LOCKED,
        KernelErrorCode::ErrorCheckpointInvalid
        | KernelErrorCode::ErrorHandlerFailure
        | KernelErrorCode::ErrorRollbackFailed
        | KernelErrorCode::ErrorStoreMigration
        | KernelErrorCode::ErrorStoreFailure => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error_code: err.code.as_str().to_string(),
            message: err.message.clone(),
            context: err.context.clone(),
        }),
    )
        .into_response()
}

/// Shorthand for a 404 with the standard error envelope.
fn not_found(message: String) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error_code: "NOT_FOUND".to_string(),
            message,
            context: Value::Null,
        }),
    )
        .into_response()
}

/// Shorthand for a 401 with the standard error envelope.
fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error_code: "UNAUTHORIZED".to_string(),
            message: "bearer token required".to_string(),
            context: Value::Null,
        }),
    )
        .into_response()
}

// ============================================================================
// SECTION: Health and Metrics
// ============================================================================

/// GET /api/health
async fn health(State(state): State<Arc<AppState>>) -> Response {
    let ok = state.kernel.ctx.store.readiness().is_ok();
    let status = if ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (
        status,
        Json(HealthResponse {
            ok,
            service: "warden",
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
        .into_response()
}

/// GET /api/metrics
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    Json(state.kernel.metrics.snapshot()).into_response()
}

// ============================================================================
// SECTION: Task Endpoints
// ============================================================================

/// POST /api/tasks
async fn create_task(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateTaskBody>,
) -> Response {
    let agent_id =
        body.agent_id.map_or_else(|| state.default_agent.clone(), AgentId::new);
    let request = warden_kernel::TaskRequest {
        title: body.title,
        session_id: body.session_id.map(SessionId::new),
        agent_id,
        steps: body.steps,
        alternatives: body.alternatives,
        metadata: body.metadata,
    };
    match state.kernel.runner.create_task(&request) {
        Ok(task) => (
            StatusCode::CREATED,
            Json(CreateTaskResponse {
                task_id: task.task_id.as_str().to_string(),
                plan_id: warden_kernel::runner::TaskRunner::plan_id_for(&task.task_id)
                    .as_str()
                    .to_string(),
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

/// GET /api/tasks/{id}
async fn get_task(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.kernel.ctx.store.fetch_task(&TaskId::new(id)) {
        Ok(task) => Json(task).into_response(),
        Err(warden_store_sqlite::SqliteStoreError::NotFound(message)) => not_found(message),
        Err(err) => error_response(&KernelError::new(
            KernelErrorCode::ErrorStoreFailure,
            err.to_string(),
        )),
    }
}

/// Query parameters for the events endpoint.
#[derive(Debug, Deserialize)]
struct EventsQuery {
    /// Return events with seq greater than this cursor.
    #[serde(default)]
    since_seq: u64,
    /// Maximum number of events to return.
    #[serde(default = "default_events_limit")]
    limit: usize,
    /// Long-poll timeout in milliseconds (0 returns immediately).
    #[serde(default)]
    wait_ms: u64,
}

/// Default page size for event reads.
const fn default_events_limit() -> usize {
    256
}

/// GET /api/tasks/{id}/events
async fn get_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Response {
    let task_id = TaskId::new(id);
    let result = if query.wait_ms == 0 {
        state.kernel.events.events_since(&task_id, query.since_seq, query.limit)
    } else {
        state
            .kernel
            .events
            .tail(
                &task_id,
                query.since_seq,
                query.limit,
                std::time::Duration::from_millis(query.wait_ms),
            )
            .await
    };
    match result {
        Ok(events) => Json(json!({ "events": events })).into_response(),
        Err(err) => error_response(&err),
    }
}

/// GET /api/tasks/{id}/graph
async fn get_graph(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.kernel.events.span_tree(&TaskId::new(id)) {
        Ok(tree) => Json(json!({ "spans": tree })).into_response(),
        Err(err) => error_response(&err),
    }
}

/// GET /api/tasks/{id}/audits
async fn get_audits(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.kernel.ctx.store.list_audits(&TaskId::new(id)) {
        Ok(audits) => Json(json!({ "audits": audits })).into_response(),
        Err(err) => error_response(&KernelError::new(
            KernelErrorCode::ErrorStoreFailure,
            err.to_string(),
        )),
    }
}

/// POST /api/tasks/{id}/run
async fn run_task(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !state.is_control(&headers) {
        return unauthorized();
    }
    let task_id = TaskId::new(id);
    if let Err(err) = state.kernel.ctx.store.fetch_task(&task_id) {
        return match err {
            warden_store_sqlite::SqliteStoreError::NotFound(message) => not_found(message),
            other => error_response(&KernelError::new(
                KernelErrorCode::ErrorStoreFailure,
                other.to_string(),
            )),
        };
    }
    let kernel = state.kernel.clone();
    let agent = state.default_agent.clone();
    let spawned_task = task_id.clone();
    tokio::spawn(async move {
        match kernel.runner.run(&spawned_task, &agent).await {
            Ok(outcome) => {
                kernel.metrics.incr_tasks_finished();
                tracing::info!(task = %spawned_task, ?outcome, "runner pass finished");
            }
            Err(err) => {
                tracing::error!(task = %spawned_task, error = %err, "runner pass failed");
            }
        }
    });
    (StatusCode::ACCEPTED, Json(json!({ "task_id": task_id.as_str() }))).into_response()
}

/// POST /api/tasks/{id}/cancel
async fn cancel_task(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !state.is_control(&headers) {
        return unauthorized();
    }
    match state.kernel.runner.cancel_task(&TaskId::new(id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(&err),
    }
}

// ============================================================================
// SECTION: Decision Endpoints
// ============================================================================

/// POST /api/decisions/{plan_id}/freeze
async fn freeze_plan(
    State(state): State<Arc<AppState>>,
    Path(plan_id): Path<String>,
) -> Response {
    let plan_id = PlanId::new(plan_id);
    let span = SpanId::generate();
    match state.kernel.decisions.freeze(&plan_id, &span) {
        Ok(digest) => {
            let frozen_at = state
                .kernel
                .decisions
                .fetch_plan(&plan_id)
                .ok()
                .and_then(|plan| plan.frozen_at)
                .map_or(0, Timestamp::as_unix_millis);
            Json(FreezeResponse {
                plan_hash: digest.to_string(),
                frozen_at,
            })
            .into_response()
        }
        Err(err) => error_response(&err),
    }
}

// ============================================================================
// SECTION: Action Endpoints
// ============================================================================

/// POST /api/actions/execute
async fn execute_action(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ExecuteActionBody>,
) -> Response {
    let agent_id =
        body.agent_id.map_or_else(|| state.default_agent.clone(), AgentId::new);
    let decision_id = PlanId::new(body.decision_id);
    let action_id = warden_core::ActionId::new(body.action_id);
    let plan = match state.kernel.decisions.fetch_plan(&decision_id) {
        Ok(plan) => plan,
        Err(err) => return error_response(&err),
    };
    // The step's declared capability gates the call; unknown actions fall
    // back to the action-domain namespace.
    let capability_id = plan
        .steps
        .iter()
        .find(|step| step.action_id == action_id)
        .map_or_else(
            || CapabilityId::new(format!("action.{action_id}")),
            |step| step.capability_id.clone(),
        );
    let authz = state.kernel.authorizer.authorize(&warden_kernel::AuthzRequest {
        agent_id: agent_id.clone(),
        capability_id: capability_id.clone(),
        task_id: Some(plan.task_id.clone()),
        call_path: warden_kernel::CallPath::new(
            SessionId::new(plan.task_id.as_str()),
            vec![
                warden_kernel::CallFrame::Decision,
                warden_kernel::CallFrame::Governance,
                warden_kernel::CallFrame::Action,
            ],
        ),
    });
    match authz {
        Ok(decision) if decision.is_allowed() => {}
        Ok(warden_kernel::AuthzDecision::Escalated {
            escalation_id,
        }) => {
            return error_response(
                &KernelError::new(
                    KernelErrorCode::ErrorAuthEscalated,
                    format!("call escalated for review as {escalation_id}"),
                )
                .with_context(json!({ "escalation_id": escalation_id.as_str() })),
            );
        }
        Ok(_) => {
            state.kernel.metrics.incr_auth_denials();
            return error_response(&KernelError::new(
                KernelErrorCode::ErrorAuthDenied,
                "authorization denied",
            ));
        }
        Err(err) => return error_response(&err),
    }
    let gate = match state.kernel.governance.gate(&GateRequest {
        capability_id,
        agent_id: agent_id.clone(),
        task_id: Some(plan.task_id.clone()),
        estimated_cost: BTreeMap::from([(ResourceType::ApiCalls, 1)]),
        risk_factors: RiskDimensions::default(),
        numeric_context: BTreeMap::new(),
        string_context: BTreeMap::from([(
            "action_id".to_string(),
            action_id.as_str().to_string(),
        )]),
        selection_confidence: None,
        override_token: body.override_token.map(OverrideId::new),
    }) {
        Ok(gate) => gate,
        Err(err) => return error_response(&err),
    };
    let request = ExecuteRequest {
        action_id,
        task_id: plan.task_id.clone(),
        agent_id,
        decision_id,
        params: body.params,
        gate,
        idempotency_key: body.idempotency_key,
    };
    match state.kernel.executor.execute(&request) {
        Ok(record) => {
            state.kernel.metrics.incr_actions();
            if let Err(err) = state.kernel.runner.finalize_if_complete(&plan.task_id) {
                tracing::warn!(task = %plan.task_id, error = %err, "finalize check failed");
            }
            Json(record).into_response()
        }
        Err(err) => {
            if err.code == KernelErrorCode::ErrorPolicyDenied {
                state.kernel.metrics.incr_policy_denials();
            }
            error_response(&err)
        }
    }
}

// ============================================================================
// SECTION: Agent Endpoints
// ============================================================================

/// POST /api/agents (admin)
async fn register_agent(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<RegisterAgentBody>,
) -> Response {
    if !state.is_admin(&headers) {
        return unauthorized();
    }
    let Some(tier) = warden_core::AgentTier::from_raw(body.tier) else {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse {
                error_code: "INVALID_TIER".to_string(),
                message: format!("tier {} is out of range 0..=3", body.tier),
                context: Value::Null,
            }),
        )
            .into_response();
    };
    let Some(escalation_policy) = warden_core::EscalationPolicy::parse(&body.escalation_policy)
    else {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse {
                error_code: "INVALID_ESCALATION_POLICY".to_string(),
                message: format!("unknown escalation policy {}", body.escalation_policy),
                context: Value::Null,
            }),
        )
            .into_response();
    };
    let profile = warden_core::AgentProfile {
        agent_id: AgentId::new(body.agent_id),
        tier,
        allowed_capabilities: body.allowed_capabilities,
        forbidden_capabilities: body.forbidden_capabilities,
        escalation_policy,
        registered_at: state.kernel.ctx.now(),
    };
    match state.kernel.ctx.store.upsert_agent_profile(&profile) {
        Ok(()) => (
            StatusCode::CREATED,
            Json(json!({ "agent_id": profile.agent_id.as_str() })),
        )
            .into_response(),
        Err(err) => error_response(&KernelError::new(
            KernelErrorCode::ErrorStoreFailure,
            err.to_string(),
        )),
    }
}

/// GET /api/agents/{id}
async fn get_agent(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.kernel.ctx.store.fetch_agent_profile(&AgentId::new(id)) {
        Ok(profile) => Json(profile).into_response(),
        Err(warden_store_sqlite::SqliteStoreError::NotFound(message)) => not_found(message),
        Err(err) => error_response(&KernelError::new(
            KernelErrorCode::ErrorStoreFailure,
            err.to_string(),
        )),
    }
}

// ============================================================================
// SECTION: Capability Endpoints
// ============================================================================

/// POST /api/capabilities/grants (admin)
async fn create_grant(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateGrantBody>,
) -> Response {
    if !state.is_admin(&headers) {
        return unauthorized();
    }
    let now = state.kernel.ctx.now();
    let grant = CapabilityGrant {
        grant_id: GrantId::generate(),
        agent_id: AgentId::new(body.agent_id),
        capability_id: CapabilityId::new(body.capability_id),
        scope: body.scope,
        granted_at: now,
        expires_at: body.expires_at.map(Timestamp::from_unix_millis),
        revoked_at: None,
    };
    match state.kernel.ctx.store.insert_grant(&grant) {
        Ok(()) => (
            StatusCode::CREATED,
            Json(json!({ "grant_id": grant.grant_id.as_str() })),
        )
            .into_response(),
        Err(err) => error_response(&KernelError::new(
            KernelErrorCode::ErrorStoreFailure,
            err.to_string(),
        )),
    }
}

/// POST /api/capabilities/{id}/revoke (admin)
async fn revoke_grant(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !state.is_admin(&headers) {
        return unauthorized();
    }
    let now = state.kernel.ctx.now();
    match state.kernel.ctx.store.revoke_grant(&GrantId::new(id), "admin", now) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(warden_store_sqlite::SqliteStoreError::NotFound(message)) => not_found(message),
        Err(err) => error_response(&KernelError::new(
            KernelErrorCode::ErrorStoreFailure,
            err.to_string(),
        )),
    }
}

// ============================================================================
// SECTION: Escalation Endpoints
// ============================================================================

/// Query parameters for the escalation list.
#[derive(Debug, Deserialize)]
struct EscalationsQuery {
    /// Status filter (defaults to pending).
    #[serde(default = "default_escalation_status")]
    status: String,
}

/// Default status filter for the escalation list.
fn default_escalation_status() -> String {
    "pending".to_string()
}

/// GET /api/escalations (admin)
async fn list_escalations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<EscalationsQuery>,
) -> Response {
    if !state.is_admin(&headers) {
        return unauthorized();
    }
    let Some(status) = warden_core::EscalationStatus::parse(&query.status) else {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse {
                error_code: "INVALID_STATUS".to_string(),
                message: format!("unknown escalation status {}", query.status),
                context: Value::Null,
            }),
        )
            .into_response();
    };
    match state.kernel.ctx.store.list_escalations(status) {
        Ok(escalations) => Json(json!({ "escalations": escalations })).into_response(),
        Err(err) => error_response(&KernelError::new(
            KernelErrorCode::ErrorStoreFailure,
            err.to_string(),
        )),
    }
}

/// POST /api/escalations/{id}/approve (admin)
async fn approve_escalation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Option<Json<ResolveEscalationBody>>,
) -> Response {
    resolve_escalation(&state, &headers, &id, true, body.map(|Json(b)| b).unwrap_or_default())
}

/// POST /api/escalations/{id}/reject (admin)
async fn reject_escalation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Option<Json<ResolveEscalationBody>>,
) -> Response {
    resolve_escalation(&state, &headers, &id, false, body.map(|Json(b)| b).unwrap_or_default())
}

/// Shared approve/reject implementation.
fn resolve_escalation(
    state: &Arc<AppState>,
    headers: &HeaderMap,
    id: &str,
    approve: bool,
    body: ResolveEscalationBody,
) -> Response {
    if !state.is_admin(headers) {
        return unauthorized();
    }
    let escalation_id = EscalationId::new(id);
    let escalation = match state.kernel.ctx.store.fetch_escalation(&escalation_id) {
        Ok(escalation) => escalation,
        Err(warden_store_sqlite::SqliteStoreError::NotFound(message)) => {
            return not_found(message);
        }
        Err(err) => {
            return error_response(&KernelError::new(
                KernelErrorCode::ErrorStoreFailure,
                err.to_string(),
            ));
        }
    };
    let now = state.kernel.ctx.now();
    let grant = approve.then(|| CapabilityGrant {
        grant_id: GrantId::generate(),
        agent_id: escalation.agent_id.clone(),
        capability_id: escalation.capability_id.clone(),
        scope: Some(format!("escalation {escalation_id}")),
        granted_at: now,
        expires_at: body.grant_ttl_ms.map(|ttl| now.plus_millis(ttl)),
        revoked_at: None,
    });
    let note = body.note.unwrap_or_else(|| {
        if approve { "approved".to_string() } else { "rejected".to_string() }
    });
    match state.kernel.ctx.store.resolve_escalation(
        &escalation_id,
        approve,
        &note,
        grant.as_ref(),
        now,
    ) {
        Ok(()) => Json(json!({
            "escalation_id": escalation_id.as_str(),
            "status": if approve { "approved" } else { "rejected" },
            "grant_id": grant.map(|g| g.grant_id.as_str().to_string()),
        }))
        .into_response(),
        Err(warden_store_sqlite::SqliteStoreError::NotFound(message)) => not_found(message),
        Err(err) => error_response(&KernelError::new(
            KernelErrorCode::ErrorStoreFailure,
            err.to_string(),
        )),
    }
}

// ============================================================================
// SECTION: Governance Endpoints
// ============================================================================

/// GET /api/governance/policies
async fn list_policies(State(state): State<Arc<AppState>>) -> Response {
    match state.kernel.ctx.store.list_active_policies() {
        Ok(policies) => Json(json!({ "policies": policies })).into_response(),
        Err(err) => error_response(&KernelError::new(
            KernelErrorCode::ErrorStoreFailure,
            err.to_string(),
        )),
    }
}

/// POST /api/governance/override (admin)
async fn mint_override(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<MintOverrideBody>,
) -> Response {
    if !state.is_admin(&headers) {
        return unauthorized();
    }
    match state.kernel.governance.mint_override(
        &AgentId::new(body.agent_id),
        &CapabilityId::new(body.capability_id),
        &body.justification,
        body.ttl_ms,
    ) {
        Ok(token) => (
            StatusCode::CREATED,
            Json(json!({
                "override_id": token.override_id.as_str(),
                "expires_at": token.expires_at.as_unix_millis(),
            })),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}
