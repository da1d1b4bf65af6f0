// crates/warden-core/src/lib.rs
// ============================================================================
// Module: Warden Core Crate Root
// Description: Data model, hashing, errors, and interface traits.
// Purpose: Provide the shared vocabulary for every Warden crate.
// Dependencies: serde, serde_json, serde_jcs, sha2, thiserror, uuid
// ============================================================================

//! ## Overview
//! `warden-core` defines the canonical data model of the agent-execution
//! control plane: tasks, events, work items, checkpoints, capabilities,
//! decisions, actions, policies, risk, and trust. It also defines the
//! storage and handler interfaces the kernel is written against. The crate
//! holds no I/O; everything here is plain data and pure functions.

// ============================================================================
// SECTION: Modules
// ============================================================================

/// Canonical entities of the task lifecycle kernel.
pub mod core;
/// Stable error codes and the structured kernel error.
pub mod errors;
/// Backend-agnostic interface traits.
pub mod interfaces;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use crate::core::action::ExecutionRecord;
pub use crate::core::action::ExecutionStatus;
pub use crate::core::action::ObservedEffect;
pub use crate::core::action::ReplayMode;
pub use crate::core::action::ReplayOutcome;
pub use crate::core::action::RollbackRecord;
pub use crate::core::action::RollbackStatus;
pub use crate::core::action::SideEffectLedger;
pub use crate::core::capability::AgentProfile;
pub use crate::core::capability::AgentTier;
pub use crate::core::capability::CapabilityDefinition;
pub use crate::core::capability::CapabilityDomain;
pub use crate::core::capability::CapabilityGrant;
pub use crate::core::capability::CapabilityLevel;
pub use crate::core::capability::EscalationPolicy;
pub use crate::core::capability::EscalationRequest;
pub use crate::core::capability::EscalationStatus;
pub use crate::core::checkpoint::Checkpoint;
pub use crate::core::checkpoint::CheckpointKind;
pub use crate::core::checkpoint::IdempotencyRecord;
pub use crate::core::checkpoint::IdempotencyStatus;
pub use crate::core::decision::ConfidenceBand;
pub use crate::core::decision::DecisionPlan;
pub use crate::core::decision::Evaluation;
pub use crate::core::decision::PlanAlternative;
pub use crate::core::decision::PlanStatus;
pub use crate::core::decision::PlanStep;
pub use crate::core::decision::RationaleExtension;
pub use crate::core::decision::RejectedOption;
pub use crate::core::decision::Selection;
pub use crate::core::decision::plan_content_hash;
pub use crate::core::event::EventActor;
pub use crate::core::event::EventDraft;
pub use crate::core::event::EventPhase;
pub use crate::core::event::SpanNode;
pub use crate::core::event::TaskEvent;
pub use crate::core::hashing::DEFAULT_HASH_ALGORITHM;
pub use crate::core::hashing::HashAlgorithm;
pub use crate::core::hashing::HashDigest;
pub use crate::core::hashing::HashError;
pub use crate::core::hashing::canonical_json_bytes;
pub use crate::core::hashing::hash_bytes;
pub use crate::core::hashing::hash_canonical_json;
pub use crate::core::identifiers::ActionId;
pub use crate::core::identifiers::AgentId;
pub use crate::core::identifiers::CapabilityId;
pub use crate::core::identifiers::EscalationId;
pub use crate::core::identifiers::EvaluationId;
pub use crate::core::identifiers::EvidenceId;
pub use crate::core::identifiers::ExecutionId;
pub use crate::core::identifiers::ExtensionId;
pub use crate::core::identifiers::GrantId;
pub use crate::core::identifiers::OptionId;
pub use crate::core::identifiers::OverrideId;
pub use crate::core::identifiers::OwnerId;
pub use crate::core::identifiers::PlanId;
pub use crate::core::identifiers::PolicyId;
pub use crate::core::identifiers::SessionId;
pub use crate::core::identifiers::SpanId;
pub use crate::core::identifiers::TaskId;
pub use crate::core::identifiers::WorkItemId;
pub use crate::core::policy::EmergencyOverride;
pub use crate::core::policy::MIN_OVERRIDE_JUSTIFICATION_CHARS;
pub use crate::core::policy::Policy;
pub use crate::core::policy::PolicyRule;
pub use crate::core::policy::PolicyVerdict;
pub use crate::core::policy::Quota;
pub use crate::core::policy::ResourceType;
pub use crate::core::policy::RuleCondition;
pub use crate::core::policy::ThresholdOp;
pub use crate::core::risk::InheritanceInputs;
pub use crate::core::risk::RiskAssessment;
pub use crate::core::risk::RiskDimensions;
pub use crate::core::risk::RiskLevel;
pub use crate::core::risk::TrustRecord;
pub use crate::core::risk::TrustState;
pub use crate::core::risk::TrustTransition;
pub use crate::core::task::ExitReason;
pub use crate::core::task::LineageKind;
pub use crate::core::task::Task;
pub use crate::core::task::TaskLineage;
pub use crate::core::task::TaskStatus;
pub use crate::core::time::Clock;
pub use crate::core::time::ManualClock;
pub use crate::core::time::SystemClock;
pub use crate::core::time::Timestamp;
pub use crate::core::verdict::AuditSeverity;
pub use crate::core::verdict::GuardianVerdict;
pub use crate::core::verdict::TaskAudit;
pub use crate::core::verdict::VerdictOutcome;
pub use crate::core::work::Lease;
pub use crate::core::work::WorkItem;
pub use crate::core::work::WorkItemStatus;
pub use crate::errors::KernelError;
pub use crate::errors::KernelErrorCode;
pub use crate::interfaces::ActionHandler;
pub use crate::interfaces::Guardian;
pub use crate::interfaces::GuardianError;
pub use crate::interfaces::HandlerError;
pub use crate::interfaces::HandlerRequest;
pub use crate::interfaces::HandlerResponse;
pub use crate::interfaces::ReportedEffect;
pub use crate::interfaces::StoreError;
