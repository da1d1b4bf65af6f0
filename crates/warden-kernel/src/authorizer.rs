// crates/warden-kernel/src/authorizer.rs
// ============================================================================
// Module: Capability Authorizer
// Description: The single gate for every privileged operation.
// Purpose: Evaluate grants, tier ceilings, glob sets, and call paths.
// Dependencies: globset, warden-core, warden-store-sqlite
// ============================================================================

//! ## Overview
//! Every privileged call passes through [`Authorizer::authorize`]. The
//! decision combines the agent profile (tier ceiling, allow/forbid glob
//! sets), active grants, and call-path validation. The forbidden set wins
//! over the allowed set; `admin` level is reachable only through an explicit
//! grant; an action frame is legal only after Decision → Governance. Every
//! evaluation, allowed or not, lands in the invocation audit.

// ============================================================================
// SECTION: Imports
// ============================================================================

use globset::Glob;
use globset::GlobSet;
use globset::GlobSetBuilder;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use warden_core::AgentId;
use warden_core::AgentProfile;
use warden_core::AuditSeverity;
use warden_core::CapabilityDefinition;
use warden_core::CapabilityGrant;
use warden_core::CapabilityId;
use warden_core::CapabilityLevel;
use warden_core::EscalationId;
use warden_core::EscalationPolicy;
use warden_core::EscalationRequest;
use warden_core::EscalationStatus;
use warden_core::GrantId;
use warden_core::KernelError;
use warden_core::KernelErrorCode;
use warden_core::SessionId;
use warden_core::TaskId;
use warden_store_sqlite::InvocationOutcome;

use crate::context::KernelContext;
use crate::context::store_failure;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Expiry for grants minted by the `temporary_grant` escalation policy (ms).
const TEMPORARY_GRANT_TTL_MS: i64 = 15 * 60 * 1000;

// ============================================================================
// SECTION: Call Path
// ============================================================================

/// One frame of the capability call stack.
///
/// # Invariants
/// - Variants are stable for serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallFrame {
    /// State read/write surface.
    State,
    /// Decision recording surface.
    Decision,
    /// Governance gate surface.
    Governance,
    /// Action execution surface.
    Action,
    /// Evidence capture surface.
    Evidence,
}

impl CallFrame {
    /// Returns the stable label for the frame.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::State => "state",
            Self::Decision => "decision",
            Self::Governance => "governance",
            Self::Action => "action",
            Self::Evidence => "evidence",
        }
    }
}

/// The call path presented with an authorization request.
///
/// # Invariants
/// - `call_stack` is ordered oldest frame first; the last frame is the
///   surface being invoked right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallPath {
    /// Session the call belongs to.
    pub session_id: SessionId,
    /// Ordered call stack.
    pub call_stack: Vec<CallFrame>,
}

impl CallPath {
    /// Creates a call path.
    #[must_use]
    pub const fn new(session_id: SessionId, call_stack: Vec<CallFrame>) -> Self {
        Self {
            session_id,
            call_stack,
        }
    }
}

/// Validates the Decision → Governance → Action chain.
///
/// Rejected shapes: a Decision frame immediately followed by Action, and an
/// Action frame that was not preceded by Decision and then Governance.
#[must_use]
pub fn call_path_is_valid(stack: &[CallFrame]) -> bool {
    for pair in stack.windows(2) {
        if pair[0] == CallFrame::Decision && pair[1] == CallFrame::Action {
            return false;
        }
    }
    for (index, frame) in stack.iter().enumerate() {
        if *frame == CallFrame::Action {
            let prefix = &stack[.. index];
            let decision_at = prefix.iter().position(|f| *f == CallFrame::Decision);
            let governance_after_decision = decision_at.is_some_and(|at| {
                prefix[at ..].iter().any(|f| *f == CallFrame::Governance)
            });
            if !governance_after_decision {
                return false;
            }
        }
    }
    true
}

// ============================================================================
// SECTION: Decision Types
// ============================================================================

/// Outcome of an authorization evaluation.
///
/// # Invariants
/// - `Escalated` always has a persisted escalation row behind it, except for
///   the `temporary_grant` and `log_only` policies which allow inline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthzDecision {
    /// Call may proceed.
    Allowed {
        /// Why the call was allowed.
        rationale: String,
    },
    /// Call is refused.
    Denied {
        /// Why the call was denied.
        rationale: String,
    },
    /// Call paused pending review.
    Escalated {
        /// Identifier of the pending escalation row.
        escalation_id: EscalationId,
    },
}

impl AuthzDecision {
    /// Returns true when the call may proceed.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Full authorization request.
///
/// # Invariants
/// - `task_id` is `None` only for calls outside any task context.
#[derive(Debug, Clone)]
pub struct AuthzRequest {
    /// Agent making the call.
    pub agent_id: AgentId,
    /// Capability being invoked.
    pub capability_id: CapabilityId,
    /// Task context, when known.
    pub task_id: Option<TaskId>,
    /// Call path for chain validation.
    pub call_path: CallPath,
}

// ============================================================================
// SECTION: Authorizer
// ============================================================================

/// The capability authorizer.
///
/// # Invariants
/// - Every evaluation writes one `capability_invocations` row.
/// - Unknown agents and unregistered capabilities are denied, never skipped.
#[derive(Clone)]
pub struct Authorizer {
    /// Shared kernel context.
    ctx: KernelContext,
}

impl Authorizer {
    /// Creates an authorizer over the given context.
    #[must_use]
    pub const fn new(ctx: KernelContext) -> Self {
        Self {
            ctx,
        }
    }

    /// Evaluates an authorization request.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] with [`KernelErrorCode::ErrorPathInvalid`]
    /// for a violated call chain, and store-failure errors when persistence
    /// breaks. Deny and escalate outcomes are values, not errors.
    pub fn authorize(&self, request: &AuthzRequest) -> Result<AuthzDecision, KernelError> {
        let path_valid = call_path_is_valid(&request.call_path.call_stack);
        self.record_call_path(request, path_valid)?;
        if !path_valid {
            let rationale = "call path violates Decision -> Governance -> Action".to_string();
            self.record_outcome(request, InvocationOutcome::Denied, &rationale)?;
            self.ctx.audit(
                request.task_id.as_ref(),
                AuditSeverity::High,
                KernelErrorCode::ErrorPathInvalid.as_str(),
                &rationale,
                json!({
                    "agent_id": request.agent_id.as_str(),
                    "capability_id": request.capability_id.as_str(),
                }),
            );
            return Err(KernelError::new(KernelErrorCode::ErrorPathInvalid, rationale));
        }
        let profile = match self.ctx.store.fetch_agent_profile(&request.agent_id) {
            Ok(profile) => profile,
            Err(warden_store_sqlite::SqliteStoreError::NotFound(_)) => {
                let rationale = format!("agent {} has no profile", request.agent_id);
                self.record_outcome(request, InvocationOutcome::Denied, &rationale)?;
                return Ok(AuthzDecision::Denied {
                    rationale,
                });
            }
            Err(err) => return Err(store_failure(err)),
        };
        let definition = match self.ctx.store.fetch_capability(&request.capability_id) {
            Ok(definition) => definition,
            Err(warden_store_sqlite::SqliteStoreError::NotFound(_)) => {
                let rationale =
                    format!("capability {} is not registered", request.capability_id);
                self.record_outcome(request, InvocationOutcome::Denied, &rationale)?;
                return Ok(AuthzDecision::Denied {
                    rationale,
                });
            }
            Err(err) => return Err(store_failure(err)),
        };
        // Forbidden set wins over everything that follows.
        if Self::pattern_match(&profile.forbidden_capabilities, &request.capability_id)? {
            let rationale = format!(
                "capability {} matches the forbidden set of agent {}",
                request.capability_id, request.agent_id
            );
            self.record_outcome(request, InvocationOutcome::Denied, &rationale)?;
            return Ok(AuthzDecision::Denied {
                rationale,
            });
        }
        let grant = self.active_grant(request)?;
        if definition.level == CapabilityLevel::Admin {
            return if grant.is_some() {
                let rationale = "admin capability authorized by explicit grant".to_string();
                self.record_outcome(request, InvocationOutcome::Allowed, &rationale)?;
                Ok(AuthzDecision::Allowed {
                    rationale,
                })
            } else {
                let rationale = format!(
                    "admin capability {} requires an explicit grant",
                    request.capability_id
                );
                self.record_outcome(request, InvocationOutcome::Denied, &rationale)?;
                Ok(AuthzDecision::Denied {
                    rationale,
                })
            };
        }
        if grant.is_some() {
            let rationale = "authorized by active grant".to_string();
            self.record_outcome(request, InvocationOutcome::Allowed, &rationale)?;
            return Ok(AuthzDecision::Allowed {
                rationale,
            });
        }
        let allowed_pattern =
            Self::pattern_match(&profile.allowed_capabilities, &request.capability_id)?;
        let within_tier = definition.level <= profile.tier.ceiling();
        if allowed_pattern && within_tier {
            let rationale = format!(
                "allowed by profile pattern within tier {} ceiling",
                profile.tier.get()
            );
            self.record_outcome(request, InvocationOutcome::Allowed, &rationale)?;
            return Ok(AuthzDecision::Allowed {
                rationale,
            });
        }
        let shortfall = if allowed_pattern {
            format!(
                "level {} exceeds tier {} ceiling {}",
                definition.level.as_str(),
                profile.tier.get(),
                profile.tier.ceiling().as_str()
            )
        } else {
            "no allowed pattern matches".to_string()
        };
        self.escalate(request, &profile, &definition, &shortfall)
    }

    /// Applies the profile's escalation policy to an insufficient call.
    fn escalate(
        &self,
        request: &AuthzRequest,
        profile: &AgentProfile,
        definition: &CapabilityDefinition,
        shortfall: &str,
    ) -> Result<AuthzDecision, KernelError> {
        match profile.escalation_policy {
            EscalationPolicy::Deny => {
                let rationale = format!("insufficient privilege ({shortfall})");
                self.record_outcome(request, InvocationOutcome::Denied, &rationale)?;
                Ok(AuthzDecision::Denied {
                    rationale,
                })
            }
            EscalationPolicy::RequestApproval => {
                let escalation = EscalationRequest {
                    escalation_id: EscalationId::generate(),
                    agent_id: request.agent_id.clone(),
                    capability_id: request.capability_id.clone(),
                    task_id: request.task_id.clone(),
                    status: EscalationStatus::Pending,
                    reason: format!("insufficient privilege ({shortfall})"),
                    requested_at: self.ctx.now(),
                    resolved_at: None,
                    resolution_note: None,
                };
                self.ctx.store.insert_escalation(&escalation).map_err(store_failure)?;
                self.record_outcome(request, InvocationOutcome::Escalated, &escalation.reason)?;
                Ok(AuthzDecision::Escalated {
                    escalation_id: escalation.escalation_id,
                })
            }
            EscalationPolicy::TemporaryGrant => {
                let now = self.ctx.now();
                let grant = CapabilityGrant {
                    grant_id: GrantId::generate(),
                    agent_id: request.agent_id.clone(),
                    capability_id: request.capability_id.clone(),
                    scope: Some("temporary escalation".to_string()),
                    granted_at: now,
                    expires_at: Some(now.plus_millis(TEMPORARY_GRANT_TTL_MS)),
                    revoked_at: None,
                };
                self.ctx.store.insert_grant(&grant).map_err(store_failure)?;
                let rationale =
                    format!("temporary grant {} minted ({shortfall})", grant.grant_id);
                self.record_outcome(request, InvocationOutcome::Allowed, &rationale)?;
                self.ctx.audit(
                    request.task_id.as_ref(),
                    AuditSeverity::Warning,
                    "TEMPORARY_GRANT_MINTED",
                    &rationale,
                    json!({
                        "agent_id": request.agent_id.as_str(),
                        "capability_id": request.capability_id.as_str(),
                        "level": definition.level.as_str(),
                    }),
                );
                Ok(AuthzDecision::Allowed {
                    rationale,
                })
            }
            EscalationPolicy::LogOnly => {
                let rationale = format!("allowed by log_only policy despite {shortfall}");
                self.record_outcome(request, InvocationOutcome::Allowed, &rationale)?;
                self.ctx.audit(
                    request.task_id.as_ref(),
                    AuditSeverity::Warning,
                    "LOG_ONLY_BYPASS",
                    &rationale,
                    json!({
                        "agent_id": request.agent_id.as_str(),
                        "capability_id": request.capability_id.as_str(),
                    }),
                );
                Ok(AuthzDecision::Allowed {
                    rationale,
                })
            }
        }
    }

    /// Returns the first active grant for the request, when any.
    fn active_grant(
        &self,
        request: &AuthzRequest,
    ) -> Result<Option<CapabilityGrant>, KernelError> {
        let now = self.ctx.now();
        let grants = self
            .ctx
            .store
            .list_grants_for(&request.agent_id, &request.capability_id)
            .map_err(store_failure)?;
        Ok(grants.into_iter().find(|grant| grant.is_active(now)))
    }

    /// Builds a glob set and tests the capability identifier against it.
    fn pattern_match(patterns: &[String], capability: &CapabilityId) -> Result<bool, KernelError> {
        if patterns.is_empty() {
            return Ok(false);
        }
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|err| {
                KernelError::new(
                    KernelErrorCode::ErrorStoreFailure,
                    format!("invalid capability pattern {pattern}: {err}"),
                )
            })?;
            builder.add(glob);
        }
        let set: GlobSet = builder.build().map_err(|err| {
            KernelError::new(
                KernelErrorCode::ErrorStoreFailure,
                format!("capability pattern set: {err}"),
            )
        })?;
        Ok(set.is_match(capability.as_str()))
    }

    /// Writes the invocation audit row for an evaluation.
    fn record_outcome(
        &self,
        request: &AuthzRequest,
        outcome: InvocationOutcome,
        rationale: &str,
    ) -> Result<(), KernelError> {
        self.ctx
            .store
            .record_invocation(
                &request.agent_id,
                &request.capability_id,
                request.task_id.as_ref(),
                outcome,
                rationale,
                self.ctx.now(),
            )
            .map_err(store_failure)
    }

    /// Writes the call-path audit row for an evaluation.
    fn record_call_path(&self, request: &AuthzRequest, valid: bool) -> Result<(), KernelError> {
        let stack: Vec<String> = request
            .call_path
            .call_stack
            .iter()
            .map(|frame| frame.as_str().to_string())
            .collect();
        self.ctx
            .store
            .record_call_path(&request.call_path.session_id, &stack, valid, self.ctx.now())
            .map_err(store_failure)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions use unwraps for clarity."
    )]

    use super::*;

    #[test]
    fn decision_directly_into_action_is_invalid() {
        assert!(!call_path_is_valid(&[CallFrame::Decision, CallFrame::Action]));
    }

    #[test]
    fn governed_chain_is_valid() {
        assert!(call_path_is_valid(&[
            CallFrame::Decision,
            CallFrame::Governance,
            CallFrame::Action
        ]));
    }

    #[test]
    fn action_without_decision_is_invalid() {
        assert!(!call_path_is_valid(&[CallFrame::Governance, CallFrame::Action]));
        assert!(!call_path_is_valid(&[CallFrame::Action]));
    }

    #[test]
    fn non_action_stacks_are_valid() {
        assert!(call_path_is_valid(&[CallFrame::State, CallFrame::Decision]));
        assert!(call_path_is_valid(&[]));
    }
}
