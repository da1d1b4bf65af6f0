// crates/warden-core/src/core/time.rs
// ============================================================================
// Module: Warden Time Model
// Description: Canonical timestamp representation and clock seam.
// Purpose: Provide deterministic, replayable time values across Warden records.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Warden stamps every persisted row with an explicit unix-millisecond
//! timestamp. Kernel components never read wall-clock time directly; they go
//! through the [`Clock`] seam so tests can drive logical time and replays
//! stay deterministic.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Canonical timestamp in unix epoch milliseconds.
///
/// # Invariants
/// - Values are explicitly provided by callers via a [`Clock`].
/// - No validation is performed; monotonicity is a caller responsibility.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix epoch milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as unix epoch milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns a new timestamp offset by the given number of milliseconds.
    #[must_use]
    pub const fn plus_millis(self, millis: i64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    /// Returns true when this timestamp is strictly before `other`.
    #[must_use]
    pub const fn is_before(self, other: Self) -> bool {
        self.0 < other.0
    }
}

// ============================================================================
// SECTION: Clock Seam
// ============================================================================

/// Source of timestamps for kernel components.
///
/// Implementations must be cheap to call; the kernel reads the clock on every
/// persisted mutation.
pub trait Clock: Send + Sync {
    /// Returns the current timestamp.
    fn now(&self) -> Timestamp;
}

/// Wall-clock implementation backed by [`SystemTime`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| i64::try_from(duration.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        Timestamp::from_unix_millis(millis)
    }
}

/// Manually advanced clock for deterministic tests.
///
/// # Invariants
/// - `now` never goes backwards unless a test explicitly sets it backwards.
#[derive(Debug, Default)]
pub struct ManualClock {
    /// Current logical time in unix milliseconds.
    current: Mutex<i64>,
}

impl ManualClock {
    /// Creates a manual clock starting at the given unix milliseconds.
    #[must_use]
    pub fn starting_at(millis: i64) -> Self {
        Self {
            current: Mutex::new(millis),
        }
    }

    /// Advances the clock by the given number of milliseconds.
    pub fn advance_millis(&self, millis: i64) {
        let mut guard = self.current.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = guard.saturating_add(millis);
    }

    /// Sets the clock to an absolute unix-millisecond value.
    pub fn set_millis(&self, millis: i64) {
        let mut guard = self.current.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = millis;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        let guard = self.current.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Timestamp::from_unix_millis(*guard)
    }
}
