// crates/warden-core/src/core/identifiers.rs
// ============================================================================
// Module: Warden Identifiers
// Description: Canonical opaque identifiers for tasks, plans, and agents.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: serde, uuid
// ============================================================================

//! ## Overview
//! This module defines the canonical identifiers used throughout Warden.
//! Identifiers are opaque strings on the wire. Row-scoped identifiers
//! ([`TaskId`], [`WorkItemId`], and friends) are generated as UUIDv7 values
//! so they sort by creation time, which keeps listing queries index-friendly.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

// ============================================================================
// SECTION: Identifier Macro
// ============================================================================

/// Defines an opaque string-backed identifier newtype.
macro_rules! opaque_id {
    ($(#[$outer:meta])* $name:ident) => {
        $(#[$outer])*
        ///
        /// # Invariants
        /// - Opaque UTF-8 string; no normalization or validation is applied by this type.
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from an opaque string.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

/// Adds a time-sortable UUIDv7 generator to an identifier newtype.
macro_rules! sortable_id {
    ($name:ident) => {
        impl $name {
            /// Generates a fresh time-sortable identifier (UUIDv7).
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::now_v7().to_string())
            }
        }
    };
}

// ============================================================================
// SECTION: Aggregate Identifiers
// ============================================================================

opaque_id! {
    /// Task identifier (root aggregate, 128-bit time-sortable).
    TaskId
}
sortable_id!(TaskId);

opaque_id! {
    /// Work item identifier inside a task.
    WorkItemId
}
sortable_id!(WorkItemId);

opaque_id! {
    /// Span identifier within a task's execution tree.
    SpanId
}
sortable_id!(SpanId);

opaque_id! {
    /// Session identifier back-referenced by a task.
    SessionId
}

// ============================================================================
// SECTION: Decision Identifiers
// ============================================================================

opaque_id! {
    /// Decision plan identifier.
    PlanId
}
sortable_id!(PlanId);

opaque_id! {
    /// Evaluation identifier within the decision pipeline.
    EvaluationId
}
sortable_id!(EvaluationId);

opaque_id! {
    /// Option identifier inside a plan's alternative set.
    OptionId
}

opaque_id! {
    /// Evidence record identifier referenced by selections and executions.
    EvidenceId
}
sortable_id!(EvidenceId);

// ============================================================================
// SECTION: Capability Identifiers
// ============================================================================

opaque_id! {
    /// Capability identifier (dot-separated, e.g. `action.shell.exec`).
    CapabilityId
}

opaque_id! {
    /// Agent identifier bound to a profile and grants.
    AgentId
}

opaque_id! {
    /// Capability grant identifier.
    GrantId
}
sortable_id!(GrantId);

opaque_id! {
    /// Escalation request identifier.
    EscalationId
}
sortable_id!(EscalationId);

opaque_id! {
    /// Extension identifier used by the trust trajectory.
    ExtensionId
}

// ============================================================================
// SECTION: Governance Identifiers
// ============================================================================

opaque_id! {
    /// Action identifier registered with the executor.
    ActionId
}

opaque_id! {
    /// Action execution log identifier.
    ExecutionId
}
sortable_id!(ExecutionId);

opaque_id! {
    /// Policy identifier.
    PolicyId
}

opaque_id! {
    /// Emergency override token identifier.
    OverrideId
}
sortable_id!(OverrideId);

opaque_id! {
    /// Lease owner identifier (one per runner worker).
    OwnerId
}
sortable_id!(OwnerId);

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
    fn generated_task_ids_are_unique_and_time_prefixed() {
        let first = TaskId::generate();
        let second = TaskId::generate();
        assert_ne!(first, second);
        // The UUIDv7 timestamp prefix never decreases across calls.
        assert!(first.as_str()[.. 13].le(&second.as_str()[.. 13]));
    }

    #[test]
    fn identifiers_serialize_transparently() {
        let id = CapabilityId::new("action.shell.exec");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"action.shell.exec\"");
        let back: CapabilityId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
