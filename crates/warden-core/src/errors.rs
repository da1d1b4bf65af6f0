// crates/warden-core/src/errors.rs
// ============================================================================
// Module: Warden Error Taxonomy
// Description: Stable error codes and the structured kernel error type.
// Purpose: Propagate failures as structured {error_code, message, context}.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Every failure surfaced by the kernel carries a stable machine-readable
//! code, a human-readable message, and a structured context payload. The code
//! set is closed: callers may match on it programmatically and audit rows
//! quote it verbatim.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Error Codes
// ============================================================================

/// Stable kernel error codes.
///
/// # Invariants
/// - Wire labels are stable; new failures require new variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KernelErrorCode {
    /// Authorizer denied the call.
    ErrorAuthDenied,
    /// Authorizer escalated the call for review.
    ErrorAuthEscalated,
    /// Call path violated the Decision → Governance → Action chain.
    ErrorPathInvalid,
    /// Policy engine returned DENY.
    ErrorPolicyDenied,
    /// A quota was exhausted.
    ErrorQuotaExceeded,
    /// Execution referenced a plan that is not frozen.
    ErrorPlanNotFrozen,
    /// Stored plan hash no longer matches recomputation.
    ErrorPlanHashMismatch,
    /// Idempotency key reused with a different request hash.
    ErrorIdempotencyMismatch,
    /// Lease was lost mid-operation.
    ErrorLeaseLost,
    /// Recovery found no usable checkpoint.
    ErrorCheckpointInvalid,
    /// Action handler reported a failure.
    ErrorHandlerFailure,
    /// Rollback execution failed.
    ErrorRollbackFailed,
    /// Store migration failed at startup.
    ErrorStoreMigration,
    /// Store operation failed at runtime.
    ErrorStoreFailure,
}

impl KernelErrorCode {
    /// Returns the stable wire label for the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ErrorAuthDenied => "ERROR_AUTH_DENIED",
            Self::ErrorAuthEscalated => "ERROR_AUTH_ESCALATED",
            Self::ErrorPathInvalid => "ERROR_PATH_INVALID",
            Self::ErrorPolicyDenied => "ERROR_POLICY_DENIED",
            Self::ErrorQuotaExceeded => "ERROR_QUOTA_EXCEEDED",
            Self::ErrorPlanNotFrozen => "ERROR_PLAN_NOT_FROZEN",
            Self::ErrorPlanHashMismatch => "ERROR_PLAN_HASH_MISMATCH",
            Self::ErrorIdempotencyMismatch => "ERROR_IDEMPOTENCY_MISMATCH",
            Self::ErrorLeaseLost => "ERROR_LEASE_LOST",
            Self::ErrorCheckpointInvalid => "ERROR_CHECKPOINT_INVALID",
            Self::ErrorHandlerFailure => "ERROR_HANDLER_FAILURE",
            Self::ErrorRollbackFailed => "ERROR_ROLLBACK_FAILED",
            Self::ErrorStoreMigration => "ERROR_STORE_MIGRATION",
            Self::ErrorStoreFailure => "ERROR_STORE_FAILURE",
        }
    }

    /// Returns true when the runner may retry or pause instead of aborting.
    #[must_use]
    pub const fn is_recoverable(self) -> bool {
        matches!(
            self,
            Self::ErrorHandlerFailure | Self::ErrorQuotaExceeded | Self::ErrorAuthEscalated
        )
    }

    /// Returns true when the failure is a security signal worth a HIGH audit.
    #[must_use]
    pub const fn is_security_signal(self) -> bool {
        matches!(self, Self::ErrorPathInvalid | Self::ErrorPlanHashMismatch)
    }
}

// ============================================================================
// SECTION: Kernel Error
// ============================================================================

/// Structured kernel failure.
///
/// # Invariants
/// - `context` never embeds secrets or raw payload bodies.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{}: {message}", code.as_str())]
pub struct KernelError {
    /// Stable machine-readable code.
    pub code: KernelErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Structured context payload.
    pub context: Value,
}

impl KernelError {
    /// Creates an error with an empty context.
    #[must_use]
    pub fn new(code: KernelErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: Value::Null,
        }
    }

    /// Attaches a structured context payload.
    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
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
    fn codes_render_spec_labels() {
        assert_eq!(KernelErrorCode::ErrorAuthDenied.as_str(), "ERROR_AUTH_DENIED");
        assert_eq!(KernelErrorCode::ErrorPlanHashMismatch.as_str(), "ERROR_PLAN_HASH_MISMATCH");
        assert_eq!(
            KernelErrorCode::ErrorIdempotencyMismatch.as_str(),
            "ERROR_IDEMPOTENCY_MISMATCH"
        );
    }

    #[test]
    fn recoverability_classification_matches_propagation_policy() {
        assert!(KernelErrorCode::ErrorHandlerFailure.is_recoverable());
        assert!(KernelErrorCode::ErrorQuotaExceeded.is_recoverable());
        assert!(!KernelErrorCode::ErrorPlanHashMismatch.is_recoverable());
        assert!(!KernelErrorCode::ErrorStoreMigration.is_recoverable());
    }

    #[test]
    fn error_display_quotes_the_code() {
        let err = KernelError::new(KernelErrorCode::ErrorLeaseLost, "lease expired mid-step");
        assert_eq!(err.to_string(), "ERROR_LEASE_LOST: lease expired mid-step");
    }
}
