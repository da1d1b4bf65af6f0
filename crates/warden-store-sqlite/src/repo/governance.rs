// crates/warden-store-sqlite/src/repo/governance.rs
// ============================================================================
// Module: Governance Repository
// Description: Policies, evaluation audit, quotas, emergency overrides.
// Purpose: Persist the governance gates and their consumption state.
// Dependencies: rusqlite, serde_json, warden-core
// ============================================================================

//! ## Overview
//! Policy activation swaps the active version atomically (deactivate old,
//! activate new, one transaction). Quota charges apply lazy interval
//! rollover inside the writer transaction. Override consumption is the
//! single conditional UPDATE that makes each token authorize exactly one
//! action.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::params;
use warden_core::AgentId;
use warden_core::CapabilityId;
use warden_core::EmergencyOverride;
use warden_core::MIN_OVERRIDE_JUSTIFICATION_CHARS;
use warden_core::OverrideId;
use warden_core::Policy;
use warden_core::PolicyId;
use warden_core::PolicyVerdict;
use warden_core::Quota;
use warden_core::ResourceType;
use warden_core::TaskId;
use warden_core::Timestamp;

use crate::repo::from_json_str;
use crate::repo::to_json_string;
use crate::store::ControlStore;
use crate::store::SqliteStoreError;
use crate::store::classify_db_error;

// ============================================================================
// SECTION: Quota Charge Outcome
// ============================================================================

/// Outcome of a quota charge attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaCharge {
    /// Charge applied; usage stayed within the limit.
    Charged,
    /// Charge refused; applying it would exceed the limit.
    Exceeded {
        /// Units remaining in the current interval.
        remaining: u64,
    },
}

// ============================================================================
// SECTION: Policy Operations
// ============================================================================

impl ControlStore {
    /// Inserts a policy version and atomically makes it the active one.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the write fails.
    pub fn activate_policy(&self, policy: &Policy) -> Result<(), SqliteStoreError> {
        let rules = to_json_string(&policy.rules)?;
        self.with_write(|tx| {
            tx.execute(
                "UPDATE policies SET active = 0 WHERE policy_id = ?1 AND active = 1",
                params![policy.policy_id.as_str()],
            )
            .map_err(|err| classify_db_error(&err))?;
            tx.execute(
                "INSERT INTO policies (policy_id, version, rules_json, active, created_at) \
                 VALUES (?1, ?2, ?3, 1, ?4)",
                params![
                    policy.policy_id.as_str(),
                    policy.version,
                    rules,
                    policy.created_at.as_unix_millis()
                ],
            )
            .map_err(|err| classify_db_error(&err))?;
            Ok(())
        })
    }

    /// Lists every active policy.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn list_active_policies(&self) -> Result<Vec<Policy>, SqliteStoreError> {
        self.with_read(|connection| {
            let mut stmt = connection
                .prepare(
                    "SELECT policy_id, version, rules_json, active, created_at FROM policies \
                     WHERE active = 1 ORDER BY policy_id ASC",
                )
                .map_err(|err| classify_db_error(&err))?;
            let rows = stmt
                .query_map([], |row| {
                    let policy_id: String = row.get(0)?;
                    let version: i64 = row.get(1)?;
                    let rules_json: String = row.get(2)?;
                    let active: i64 = row.get(3)?;
                    let created_at: i64 = row.get(4)?;
                    Ok((policy_id, version, rules_json, active, created_at))
                })
                .map_err(|err| classify_db_error(&err))?;
            let mut results = Vec::new();
            for row in rows {
                let (policy_id, version, rules_json, active, created_at) =
                    row.map_err(|err| classify_db_error(&err))?;
                let version = u32::try_from(version).map_err(|_| {
                    SqliteStoreError::Corrupt(format!("bad policy version {version}"))
                })?;
                results.push(Policy {
                    policy_id: PolicyId::new(policy_id),
                    version,
                    rules: from_json_str(&rules_json)?,
                    active: active != 0,
                    created_at: Timestamp::from_unix_millis(created_at),
                });
            }
            Ok(results)
        })
    }

    /// Records one policy evaluation outcome in the audit table.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the write fails.
    pub fn record_policy_evaluation(
        &self,
        agent_id: &AgentId,
        capability_id: &CapabilityId,
        task_id: Option<&TaskId>,
        verdict: PolicyVerdict,
        triggered_rules: &[String],
        reason: Option<&str>,
        now: Timestamp,
    ) -> Result<(), SqliteStoreError> {
        let triggered = to_json_string(&triggered_rules)?;
        self.with_write(|tx| {
            tx.execute(
                "INSERT INTO policy_evaluations (agent_id, capability_id, task_id, verdict, \
                 triggered_json, reason, evaluated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    agent_id.as_str(),
                    capability_id.as_str(),
                    task_id.map(TaskId::as_str),
                    verdict.as_str(),
                    triggered,
                    reason,
                    now.as_unix_millis()
                ],
            )
            .map_err(|err| classify_db_error(&err))?;
            Ok(())
        })
    }

    /// Counts recorded evaluations for an agent with a given verdict.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn count_policy_evaluations(
        &self,
        agent_id: &AgentId,
        verdict: PolicyVerdict,
    ) -> Result<u64, SqliteStoreError> {
        self.with_read(|connection| {
            let count: i64 = connection
                .query_row(
                    "SELECT COUNT(*) FROM policy_evaluations \
                     WHERE agent_id = ?1 AND verdict = ?2",
                    params![agent_id.as_str(), verdict.as_str()],
                    |row| row.get(0),
                )
                .map_err(|err| classify_db_error(&err))?;
            u64::try_from(count)
                .map_err(|_| SqliteStoreError::Corrupt("negative count".to_string()))
        })
    }
}

// ============================================================================
// SECTION: Quota Operations
// ============================================================================

impl ControlStore {
    /// Creates or replaces a quota row.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the write fails.
    pub fn upsert_quota(&self, quota: &Quota) -> Result<(), SqliteStoreError> {
        let limit = i64::try_from(quota.limit)
            .map_err(|_| SqliteStoreError::Invalid("quota limit overflow".to_string()))?;
        let usage = i64::try_from(quota.current_usage)
            .map_err(|_| SqliteStoreError::Invalid("quota usage overflow".to_string()))?;
        let interval = quota
            .reset_interval_ms
            .map(i64::try_from)
            .transpose()
            .map_err(|_| SqliteStoreError::Invalid("quota interval overflow".to_string()))?;
        self.with_write(|tx| {
            tx.execute(
                "INSERT INTO quotas (agent_id, resource, quota_limit, current_usage, \
                 reset_interval_ms, last_reset) VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                 ON CONFLICT (agent_id, resource) DO UPDATE SET \
                 quota_limit = excluded.quota_limit, current_usage = excluded.current_usage, \
                 reset_interval_ms = excluded.reset_interval_ms, last_reset = excluded.last_reset",
                params![
                    quota.agent_id.as_str(),
                    quota.resource.as_str(),
                    limit,
                    usage,
                    interval,
                    quota.last_reset.as_unix_millis()
                ],
            )
            .map_err(|err| classify_db_error(&err))?;
            Ok(())
        })
    }

    /// Fetches a quota row, when configured.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn fetch_quota(
        &self,
        agent_id: &AgentId,
        resource: ResourceType,
    ) -> Result<Option<Quota>, SqliteStoreError> {
        self.with_read(|connection| {
            connection
                .query_row(
                    "SELECT quota_limit, current_usage, reset_interval_ms, last_reset \
                     FROM quotas WHERE agent_id = ?1 AND resource = ?2",
                    params![agent_id.as_str(), resource.as_str()],
                    |row| {
                        let limit: i64 = row.get(0)?;
                        let current_usage: i64 = row.get(1)?;
                        let reset_interval_ms: Option<i64> = row.get(2)?;
                        let last_reset: i64 = row.get(3)?;
                        Ok((limit, current_usage, reset_interval_ms, last_reset))
                    },
                )
                .map(Some)
                .or_else(|err| {
                    if matches!(err, rusqlite::Error::QueryReturnedNoRows) {
                        Ok(None)
                    } else {
                        Err(classify_db_error(&err))
                    }
                })?
                .map(|(limit, current_usage, reset_interval_ms, last_reset)| {
                    let limit = u64::try_from(limit).map_err(|_| {
                        SqliteStoreError::Corrupt(format!("negative quota limit {limit}"))
                    })?;
                    let current_usage = u64::try_from(current_usage).map_err(|_| {
                        SqliteStoreError::Corrupt(format!("negative quota usage {current_usage}"))
                    })?;
                    let reset_interval_ms = reset_interval_ms
                        .map(|value| {
                            u64::try_from(value).map_err(|_| {
                                SqliteStoreError::Corrupt(format!("bad reset interval {value}"))
                            })
                        })
                        .transpose()?;
                    Ok(Quota {
                        agent_id: agent_id.clone(),
                        resource,
                        limit,
                        current_usage,
                        reset_interval_ms,
                        last_reset: Timestamp::from_unix_millis(last_reset),
                    })
                })
                .transpose()
        })
    }

    /// Charges a quota, applying lazy rollover first.
    ///
    /// A missing quota row means the resource is unmetered for this agent;
    /// the charge trivially succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the write fails.
    pub fn charge_quota(
        &self,
        agent_id: &AgentId,
        resource: ResourceType,
        delta: u64,
        now: Timestamp,
    ) -> Result<QuotaCharge, SqliteStoreError> {
        let delta = i64::try_from(delta)
            .map_err(|_| SqliteStoreError::Invalid("quota delta overflow".to_string()))?;
        self.with_write(|tx| {
            let row: Option<(i64, i64, Option<i64>, i64)> = tx
                .query_row(
                    "SELECT quota_limit, current_usage, reset_interval_ms, last_reset \
                     FROM quotas WHERE agent_id = ?1 AND resource = ?2",
                    params![agent_id.as_str(), resource.as_str()],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )
                .map(Some)
                .or_else(|err| {
                    if matches!(err, rusqlite::Error::QueryReturnedNoRows) {
                        Ok(None)
                    } else {
                        Err(classify_db_error(&err))
                    }
                })?;
            let Some((limit, mut usage, reset_interval, mut last_reset)) = row else {
                return Ok(QuotaCharge::Charged);
            };
            // Lazy rollover: the interval elapsed, so usage restarts.
            if let Some(interval) = reset_interval
                && now.as_unix_millis().saturating_sub(last_reset) >= interval
            {
                usage = 0;
                last_reset = now.as_unix_millis();
            }
            if usage.saturating_add(delta) > limit {
                let remaining = u64::try_from(limit.saturating_sub(usage)).unwrap_or(0);
                // Persist the rollover even on refusal so the window stays
                // anchored to real elapsed intervals.
                tx.execute(
                    "UPDATE quotas SET current_usage = ?1, last_reset = ?2 \
                     WHERE agent_id = ?3 AND resource = ?4",
                    params![usage, last_reset, agent_id.as_str(), resource.as_str()],
                )
                .map_err(|err| classify_db_error(&err))?;
                return Ok(QuotaCharge::Exceeded {
                    remaining,
                });
            }
            tx.execute(
                "UPDATE quotas SET current_usage = ?1, last_reset = ?2 \
                 WHERE agent_id = ?3 AND resource = ?4",
                params![
                    usage.saturating_add(delta),
                    last_reset,
                    agent_id.as_str(),
                    resource.as_str()
                ],
            )
            .map_err(|err| classify_db_error(&err))?;
            Ok(QuotaCharge::Charged)
        })
    }
}

// ============================================================================
// SECTION: Override Operations
// ============================================================================

impl ControlStore {
    /// Mints a single-use emergency override token.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when the justification is too
    /// short and other variants when the write fails.
    pub fn mint_override(&self, token: &EmergencyOverride) -> Result<(), SqliteStoreError> {
        if token.justification.chars().count() < MIN_OVERRIDE_JUSTIFICATION_CHARS {
            return Err(SqliteStoreError::Invalid(format!(
                "override justification must be at least {MIN_OVERRIDE_JUSTIFICATION_CHARS} \
                 characters"
            )));
        }
        self.with_write(|tx| {
            tx.execute(
                "INSERT INTO emergency_overrides (override_id, agent_id, capability_id, \
                 justification, used, minted_at, expires_at) VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6)",
                params![
                    token.override_id.as_str(),
                    token.agent_id.as_str(),
                    token.capability_id.as_str(),
                    token.justification,
                    token.minted_at.as_unix_millis(),
                    token.expires_at.as_unix_millis()
                ],
            )
            .map_err(|err| classify_db_error(&err))?;
            Ok(())
        })
    }

    /// Consumes an override token atomically; each token authorizes exactly
    /// one action.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the write fails; `Ok(false)` means
    /// the token was already used, expired, or bound to another operation.
    pub fn consume_override(
        &self,
        override_id: &OverrideId,
        agent_id: &AgentId,
        capability_id: &CapabilityId,
        now: Timestamp,
    ) -> Result<bool, SqliteStoreError> {
        self.with_write(|tx| {
            let consumed: Option<String> = tx
                .query_row(
                    "UPDATE emergency_overrides SET used = 1, consumed_at = ?1 \
                     WHERE override_id = ?2 AND agent_id = ?3 AND capability_id = ?4 \
                       AND used = 0 AND expires_at > ?1 \
                     RETURNING override_id",
                    params![
                        now.as_unix_millis(),
                        override_id.as_str(),
                        agent_id.as_str(),
                        capability_id.as_str()
                    ],
                    |row| row.get(0),
                )
                .map(Some)
                .or_else(|err| {
                    if matches!(err, rusqlite::Error::QueryReturnedNoRows) {
                        Ok(None)
                    } else {
                        Err(classify_db_error(&err))
                    }
                })?;
            Ok(consumed.is_some())
        })
    }

    /// Fetches an override token.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::NotFound`] when it does not exist.
    pub fn fetch_override(
        &self,
        override_id: &OverrideId,
    ) -> Result<EmergencyOverride, SqliteStoreError> {
        self.with_read(|connection| {
            connection
                .query_row(
                    "SELECT override_id, agent_id, capability_id, justification, used, \
                     minted_at, expires_at, consumed_at FROM emergency_overrides \
                     WHERE override_id = ?1",
                    params![override_id.as_str()],
                    |row| {
                        let override_id: String = row.get(0)?;
                        let agent_id: String = row.get(1)?;
                        let capability_id: String = row.get(2)?;
                        let justification: String = row.get(3)?;
                        let used: i64 = row.get(4)?;
                        let minted_at: i64 = row.get(5)?;
                        let expires_at: i64 = row.get(6)?;
                        let consumed_at: Option<i64> = row.get(7)?;
                        Ok(EmergencyOverride {
                            override_id: OverrideId::new(override_id),
                            agent_id: AgentId::new(agent_id),
                            capability_id: CapabilityId::new(capability_id),
                            justification,
                            used: used != 0,
                            minted_at: Timestamp::from_unix_millis(minted_at),
                            expires_at: Timestamp::from_unix_millis(expires_at),
                            consumed_at: consumed_at.map(Timestamp::from_unix_millis),
                        })
                    },
                )
                .map_err(|err| match err {
                    rusqlite::Error::QueryReturnedNoRows => {
                        SqliteStoreError::NotFound(format!("override {override_id}"))
                    }
                    other => classify_db_error(&other),
                })
        })
    }
}
