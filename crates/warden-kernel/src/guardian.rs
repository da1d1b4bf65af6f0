// crates/warden-kernel/src/guardian.rs
// ============================================================================
// Module: Automatic Guardian
// Description: Built-in verifier for the verification phase.
// Purpose: Produce PASS/FAIL verdicts from the execution record summary.
// Dependencies: warden-core
// ============================================================================

//! ## Overview
//! The automatic guardian is the default verifier: it passes a task with no
//! unresolved failed execution and fails one that still has a failure not
//! superseded by a later success (the runner pre-filters retried steps out
//! of `failed_executions`). Deployments plug in human or model-backed
//! reviewers through the same [`Guardian`] trait.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;
use warden_core::Guardian;
use warden_core::GuardianError;
use warden_core::Task;
use warden_core::VerdictOutcome;

// ============================================================================
// SECTION: Automatic Guardian
// ============================================================================

/// Default automatic verifier.
///
/// # Invariants
/// - Never returns `NEEDS_REVIEW`; that outcome is reserved for human-backed
///   guardians.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoGuardian;

impl Guardian for AutoGuardian {
    fn review(&self, _task: &Task, summary: &Value) -> Result<VerdictOutcome, GuardianError> {
        let failed = summary
            .get("failed_executions")
            .and_then(Value::as_u64)
            .ok_or_else(|| GuardianError::Review("summary missing failed_executions".to_string()))?;
        if failed == 0 {
            Ok(VerdictOutcome::Pass)
        } else {
            Ok(VerdictOutcome::Fail)
        }
    }
}
