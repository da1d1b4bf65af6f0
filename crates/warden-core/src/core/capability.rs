// crates/warden-core/src/core/capability.rs
// ============================================================================
// Module: Warden Capability Taxonomy
// Description: Capability definitions, grants, agent profiles, escalations.
// Purpose: Model the atomic permissions gating every privileged operation.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! A capability is a named atomic permission `(domain, level)`. Agents carry
//! a profile with a tier ceiling plus allow/forbid glob patterns; grants bind
//! a specific capability to an agent, possibly scoped and time-bound. The
//! authorizer combines all of these on every privileged call and fails
//! closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::AgentId;
use crate::core::identifiers::CapabilityId;
use crate::core::identifiers::EscalationId;
use crate::core::identifiers::GrantId;
use crate::core::identifiers::TaskId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Domains and Levels
// ============================================================================

/// Capability domain.
///
/// # Invariants
/// - Variants are stable for serialization and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityDomain {
    /// State reads and writes (memory, knowledge base).
    State,
    /// Decision recording and freezing.
    Decision,
    /// Externally visible actions.
    Action,
    /// Governance checks and overrides.
    Governance,
    /// Evidence capture.
    Evidence,
}

impl CapabilityDomain {
    /// Returns the stable storage label for the domain.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::State => "state",
            Self::Decision => "decision",
            Self::Action => "action",
            Self::Governance => "governance",
            Self::Evidence => "evidence",
        }
    }

    /// Parses a domain from its storage label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "state" => Some(Self::State),
            "decision" => Some(Self::Decision),
            "action" => Some(Self::Action),
            "governance" => Some(Self::Governance),
            "evidence" => Some(Self::Evidence),
            _ => None,
        }
    }
}

/// Capability privilege level, totally ordered.
///
/// # Invariants
/// - Ordering is `none < read < propose < write < admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityLevel {
    /// No access.
    None,
    /// Read-only access.
    Read,
    /// May propose changes for review.
    Propose,
    /// May perform writes.
    Write,
    /// Administrative access; requires an explicit admin grant.
    Admin,
}

impl CapabilityLevel {
    /// Returns the stable storage label for the level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Read => "read",
            Self::Propose => "propose",
            Self::Write => "write",
            Self::Admin => "admin",
        }
    }

    /// Parses a level from its storage label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "none" => Some(Self::None),
            "read" => Some(Self::Read),
            "propose" => Some(Self::Propose),
            "write" => Some(Self::Write),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Agent Tier
// ============================================================================

/// Agent-wide ceiling on the maximum capability level.
///
/// # Invariants
/// - Tier 0 caps at `none`, 1 at `read`, 2 at `propose`, 3 at `write`.
/// - `admin` is never reachable through a tier alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentTier(u8);

impl AgentTier {
    /// Creates a tier, rejecting values above 3.
    #[must_use]
    pub const fn from_raw(raw: u8) -> Option<Self> {
        if raw <= 3 { Some(Self(raw)) } else { None }
    }

    /// Returns the raw tier value (0..=3).
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Returns the maximum capability level this tier permits.
    #[must_use]
    pub const fn ceiling(self) -> CapabilityLevel {
        match self.0 {
            0 => CapabilityLevel::None,
            1 => CapabilityLevel::Read,
            2 => CapabilityLevel::Propose,
            _ => CapabilityLevel::Write,
        }
    }
}

// ============================================================================
// SECTION: Capability Definition
// ============================================================================

/// Registered atomic capability.
///
/// # Invariants
/// - Immutable once registered; new behavior requires a new `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDefinition {
    /// Capability identifier.
    pub capability_id: CapabilityId,
    /// Capability domain.
    pub domain: CapabilityDomain,
    /// Privilege level required to invoke the capability.
    pub level: CapabilityLevel,
    /// Definition version.
    pub version: u32,
    /// Registration timestamp.
    pub registered_at: Timestamp,
}

// ============================================================================
// SECTION: Capability Grant
// ============================================================================

/// Active binding of a capability to an agent.
///
/// # Invariants
/// - Revocation never deletes the row; `revoked_at` is set and audited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityGrant {
    /// Grant identifier.
    pub grant_id: GrantId,
    /// Agent the capability is granted to.
    pub agent_id: AgentId,
    /// Granted capability.
    pub capability_id: CapabilityId,
    /// Optional scope restriction (opaque to the authorizer core).
    pub scope: Option<String>,
    /// Grant creation timestamp.
    pub granted_at: Timestamp,
    /// Optional expiry.
    pub expires_at: Option<Timestamp>,
    /// Revocation timestamp, when revoked.
    pub revoked_at: Option<Timestamp>,
}

impl CapabilityGrant {
    /// Returns true when the grant is active at the given instant.
    #[must_use]
    pub fn is_active(&self, now: Timestamp) -> bool {
        if self.revoked_at.is_some() {
            return false;
        }
        match self.expires_at {
            Some(expiry) => now.is_before(expiry),
            None => true,
        }
    }
}

// ============================================================================
// SECTION: Agent Profile
// ============================================================================

/// Policy applied when an agent lacks privilege for a call.
///
/// # Invariants
/// - Variants are stable for serialization and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationPolicy {
    /// Deny outright.
    Deny,
    /// Create an escalation request for human review.
    RequestApproval,
    /// Mint a temporary grant and allow.
    TemporaryGrant,
    /// Allow but record the violation.
    LogOnly,
}

impl EscalationPolicy {
    /// Returns the stable storage label for the policy.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deny => "deny",
            Self::RequestApproval => "request_approval",
            Self::TemporaryGrant => "temporary_grant",
            Self::LogOnly => "log_only",
        }
    }

    /// Parses a policy from its storage label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "deny" => Some(Self::Deny),
            "request_approval" => Some(Self::RequestApproval),
            "temporary_grant" => Some(Self::TemporaryGrant),
            "log_only" => Some(Self::LogOnly),
            _ => None,
        }
    }
}

/// Agent authorization profile.
///
/// # Invariants
/// - `forbidden_capabilities` wins over `allowed_capabilities` on overlap.
/// - Patterns are glob expressions over capability identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Agent identifier.
    pub agent_id: AgentId,
    /// Tier ceiling for the agent.
    pub tier: AgentTier,
    /// Glob patterns for capabilities the agent may use.
    pub allowed_capabilities: Vec<String>,
    /// Glob patterns for capabilities the agent must never use.
    pub forbidden_capabilities: Vec<String>,
    /// Policy applied on insufficient privilege.
    pub escalation_policy: EscalationPolicy,
    /// Registration timestamp.
    pub registered_at: Timestamp,
}

// ============================================================================
// SECTION: Escalation Request
// ============================================================================

/// Status of an escalation request.
///
/// # Invariants
/// - Variants are stable for serialization and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStatus {
    /// Awaiting review.
    Pending,
    /// Approved; a temporary grant was minted.
    Approved,
    /// Rejected with rationale.
    Rejected,
}

impl EscalationStatus {
    /// Returns the stable storage label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Parses a status from its storage label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Pending-review record created when authorization escalates.
///
/// # Invariants
/// - `resolved_at` and `resolution_note` are set together on approve/reject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationRequest {
    /// Escalation identifier.
    pub escalation_id: EscalationId,
    /// Agent whose call escalated.
    pub agent_id: AgentId,
    /// Capability that was requested.
    pub capability_id: CapabilityId,
    /// Task in whose context the call was made, when known.
    pub task_id: Option<TaskId>,
    /// Request status.
    pub status: EscalationStatus,
    /// Reason produced by the authorizer.
    pub reason: String,
    /// Creation timestamp.
    pub requested_at: Timestamp,
    /// Resolution timestamp.
    pub resolved_at: Option<Timestamp>,
    /// Reviewer note recorded at resolution.
    pub resolution_note: Option<String>,
}
