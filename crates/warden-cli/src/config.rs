// crates/warden-cli/src/config.rs
// ============================================================================
// Module: CLI Configuration
// Description: Environment-driven configuration for the warden process.
// Purpose: Resolve the documented environment variables with validation.
// Dependencies: warden-kernel
// ============================================================================

//! ## Overview
//! Configuration comes from the documented environment variables; CLI flags
//! override nothing except the bind address. Validation fails closed: a
//! malformed value is a configuration error (exit code 2), never a silent
//! default.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;

use warden_kernel::AutonomousMode;
use warden_kernel::runner::RunnerConfig;

// ============================================================================
// SECTION: Environment Names
// ============================================================================

/// Base path for the database, logs, and secrets.
pub const ENV_DATA_DIR: &str = "DATA_DIR";
/// Bearer token for admin endpoints.
pub const ENV_ADMIN_TOKEN: &str = "ADMIN_TOKEN";
/// Per-run token for loopback control endpoints.
pub const ENV_CONTROL_TOKEN: &str = "CONTROL_TOKEN";
/// Lease TTL in seconds.
pub const ENV_LEASE_TTL_SECONDS: &str = "LEASE_TTL_SECONDS";
/// Heartbeat interval in seconds.
pub const ENV_HEARTBEAT_INTERVAL_SECONDS: &str = "HEARTBEAT_INTERVAL_SECONDS";
/// Iteration cap per task.
pub const ENV_MAX_TASK_ITERATIONS: &str = "MAX_TASK_ITERATIONS";
/// Plan-freeze auto-approval mode.
pub const ENV_AUTONOMOUS_MODE: &str = "AUTONOMOUS_MODE";

/// Default lease TTL in seconds.
const DEFAULT_LEASE_TTL_SECONDS: i64 = 300;
/// Default iteration cap.
const DEFAULT_MAX_TASK_ITERATIONS: u32 = 50;

// ============================================================================
// SECTION: Config Types
// ============================================================================

/// Resolved process configuration.
///
/// # Invariants
/// - `heartbeat_interval_seconds <= lease_ttl_seconds / 2`.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Admin bearer token.
    pub admin_token: String,
    /// Loopback control token.
    pub control_token: String,
    /// Lease TTL in seconds.
    pub lease_ttl_seconds: i64,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_seconds: i64,
    /// Iteration cap per task.
    pub max_task_iterations: u32,
    /// Plan-freeze auto-approval mode.
    pub autonomous_mode: AutonomousMode,
}

/// Configuration resolution errors (exit code 2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    /// What failed to resolve.
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

impl ProcessConfig {
    /// Resolves configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a missing `DATA_DIR` or any malformed
    /// numeric or mode value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve(|name| std::env::var(name).ok())
    }

    /// Resolves configuration through an injectable variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a missing `DATA_DIR` or any malformed
    /// numeric or mode value.
    pub fn resolve(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let data_dir = lookup(ENV_DATA_DIR).ok_or_else(|| ConfigError {
            message: format!("{ENV_DATA_DIR} must be set"),
        })?;
        if data_dir.trim().is_empty() {
            return Err(ConfigError {
                message: format!("{ENV_DATA_DIR} must not be empty"),
            });
        }
        let admin_token = lookup(ENV_ADMIN_TOKEN).unwrap_or_default();
        let control_token = lookup(ENV_CONTROL_TOKEN).unwrap_or_default();
        let lease_ttl_seconds =
            parse_i64(&lookup, ENV_LEASE_TTL_SECONDS, DEFAULT_LEASE_TTL_SECONDS)?;
        if lease_ttl_seconds <= 0 {
            return Err(ConfigError {
                message: format!("{ENV_LEASE_TTL_SECONDS} must be positive"),
            });
        }
        let heartbeat_default = lease_ttl_seconds / 2;
        let heartbeat_interval_seconds =
            parse_i64(&lookup, ENV_HEARTBEAT_INTERVAL_SECONDS, heartbeat_default)?;
        if heartbeat_interval_seconds <= 0
            || heartbeat_interval_seconds > lease_ttl_seconds / 2
        {
            return Err(ConfigError {
                message: format!(
                    "{ENV_HEARTBEAT_INTERVAL_SECONDS} must be positive and at most half of \
                     {ENV_LEASE_TTL_SECONDS}"
                ),
            });
        }
        let max_task_iterations = match lookup(ENV_MAX_TASK_ITERATIONS) {
            Some(raw) => raw.parse::<u32>().map_err(|_| ConfigError {
                message: format!("{ENV_MAX_TASK_ITERATIONS} must be an unsigned integer"),
            })?,
            None => DEFAULT_MAX_TASK_ITERATIONS,
        };
        let autonomous_mode = match lookup(ENV_AUTONOMOUS_MODE) {
            Some(raw) => AutonomousMode::parse(&raw).ok_or_else(|| ConfigError {
                message: format!("{ENV_AUTONOMOUS_MODE} must be one of off, assisted, full"),
            })?,
            None => AutonomousMode::Off,
        };
        Ok(Self {
            data_dir: PathBuf::from(data_dir),
            admin_token,
            control_token,
            lease_ttl_seconds,
            heartbeat_interval_seconds,
            max_task_iterations,
            autonomous_mode,
        })
    }

    /// Returns the database path under the data directory.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("warden.db")
    }

    /// Returns the runner configuration derived from this config.
    #[must_use]
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            lease_ttl_ms: self.lease_ttl_seconds.saturating_mul(1000),
            heartbeat_interval_ms: self.heartbeat_interval_seconds.saturating_mul(1000),
            max_iterations: self.max_task_iterations,
            autonomous_mode: self.autonomous_mode,
        }
    }
}

/// Parses an optional integer variable through the lookup.
fn parse_i64(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: i64,
) -> Result<i64, ConfigError> {
    match lookup(name) {
        Some(raw) => raw.parse::<i64>().map_err(|_| ConfigError {
            message: format!("{name} must be an integer"),
        }),
        None => Ok(default),
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

    use std::collections::BTreeMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> =
            pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn missing_data_dir_is_a_config_error() {
        let err = ProcessConfig::resolve(lookup_from(&[])).expect_err("must fail");
        assert!(err.message.contains(ENV_DATA_DIR));
    }

    #[test]
    fn defaults_apply_when_only_data_dir_is_set() {
        let config =
            ProcessConfig::resolve(lookup_from(&[(ENV_DATA_DIR, "/tmp/warden")])).expect("resolve");
        assert_eq!(config.lease_ttl_seconds, 300);
        assert_eq!(config.heartbeat_interval_seconds, 150);
        assert_eq!(config.max_task_iterations, 50);
        assert_eq!(config.autonomous_mode, AutonomousMode::Off);
        assert_eq!(config.database_path(), PathBuf::from("/tmp/warden/warden.db"));
    }

    #[test]
    fn heartbeat_above_half_ttl_is_rejected() {
        let err = ProcessConfig::resolve(lookup_from(&[
            (ENV_DATA_DIR, "/tmp/warden"),
            (ENV_LEASE_TTL_SECONDS, "100"),
            (ENV_HEARTBEAT_INTERVAL_SECONDS, "80"),
        ]))
        .expect_err("must fail");
        assert!(err.message.contains(ENV_HEARTBEAT_INTERVAL_SECONDS));
    }

    #[test]
    fn autonomous_mode_labels_parse_strictly() {
        let config = ProcessConfig::resolve(lookup_from(&[
            (ENV_DATA_DIR, "/tmp/warden"),
            (ENV_AUTONOMOUS_MODE, "full"),
        ]))
        .expect("resolve");
        assert_eq!(config.autonomous_mode, AutonomousMode::Full);
        let err = ProcessConfig::resolve(lookup_from(&[
            (ENV_DATA_DIR, "/tmp/warden"),
            (ENV_AUTONOMOUS_MODE, "turbo"),
        ]))
        .expect_err("must fail");
        assert!(err.message.contains(ENV_AUTONOMOUS_MODE));
    }
}
