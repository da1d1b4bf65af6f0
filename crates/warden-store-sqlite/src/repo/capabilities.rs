// crates/warden-store-sqlite/src/repo/capabilities.rs
// ============================================================================
// Module: Capability Repository
// Description: Definitions, profiles, grants, escalations, call audit.
// Purpose: Persist the authorization surface the kernel evaluates against.
// Dependencies: rusqlite, serde_json, warden-core
// ============================================================================

//! ## Overview
//! Capability definitions are immutable once registered (new behavior means a
//! new version). Grants are revoked in place, never deleted, and every
//! revocation writes an audit row. The invocation and call-path tables are
//! the append-only record of every authorizer evaluation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::Row;
use rusqlite::params;
use warden_core::AgentId;
use warden_core::AgentProfile;
use warden_core::AgentTier;
use warden_core::CapabilityDefinition;
use warden_core::CapabilityDomain;
use warden_core::CapabilityGrant;
use warden_core::CapabilityId;
use warden_core::CapabilityLevel;
use warden_core::EscalationId;
use warden_core::EscalationPolicy;
use warden_core::EscalationRequest;
use warden_core::EscalationStatus;
use warden_core::GrantId;
use warden_core::SessionId;
use warden_core::TaskId;
use warden_core::Timestamp;

use crate::repo::from_json_str;
use crate::repo::tasks::bad_column;
use crate::repo::to_json_string;
use crate::store::ControlStore;
use crate::store::SqliteStoreError;
use crate::store::classify_db_error;

// ============================================================================
// SECTION: Invocation Outcome
// ============================================================================

/// Audited outcome of one authorizer evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationOutcome {
    /// Call was allowed.
    Allowed,
    /// Call was denied.
    Denied,
    /// Call was escalated for review.
    Escalated,
}

impl InvocationOutcome {
    /// Returns the stable storage label for the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::Denied => "denied",
            Self::Escalated => "escalated",
        }
    }
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Maps one `capability_grants` row into a [`CapabilityGrant`].
fn map_grant_row(row: &Row<'_>) -> Result<CapabilityGrant, rusqlite::Error> {
    let grant_id: String = row.get(0)?;
    let agent_id: String = row.get(1)?;
    let capability_id: String = row.get(2)?;
    let scope: Option<String> = row.get(3)?;
    let granted_at: i64 = row.get(4)?;
    let expires_at: Option<i64> = row.get(5)?;
    let revoked_at: Option<i64> = row.get(6)?;
    Ok(CapabilityGrant {
        grant_id: GrantId::new(grant_id),
        agent_id: AgentId::new(agent_id),
        capability_id: CapabilityId::new(capability_id),
        scope,
        granted_at: Timestamp::from_unix_millis(granted_at),
        expires_at: expires_at.map(Timestamp::from_unix_millis),
        revoked_at: revoked_at.map(Timestamp::from_unix_millis),
    })
}

/// Maps one `escalation_requests` row into an [`EscalationRequest`].
fn map_escalation_row(row: &Row<'_>) -> Result<EscalationRequest, rusqlite::Error> {
    let escalation_id: String = row.get(0)?;
    let agent_id: String = row.get(1)?;
    let capability_id: String = row.get(2)?;
    let task_id: Option<String> = row.get(3)?;
    let status: String = row.get(4)?;
    let reason: String = row.get(5)?;
    let requested_at: i64 = row.get(6)?;
    let resolved_at: Option<i64> = row.get(7)?;
    let resolution_note: Option<String> = row.get(8)?;
    let status = EscalationStatus::parse(&status)
        .ok_or_else(|| bad_column(4, format!("unknown escalation status {status}")))?;
    Ok(EscalationRequest {
        escalation_id: EscalationId::new(escalation_id),
        agent_id: AgentId::new(agent_id),
        capability_id: CapabilityId::new(capability_id),
        task_id: task_id.map(TaskId::new),
        status,
        reason,
        requested_at: Timestamp::from_unix_millis(requested_at),
        resolved_at: resolved_at.map(Timestamp::from_unix_millis),
        resolution_note,
    })
}

// ============================================================================
// SECTION: Definition Operations
// ============================================================================

impl ControlStore {
    /// Registers a capability definition version.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Constraint`] when the version already
    /// exists (definitions are immutable).
    pub fn register_capability(
        &self,
        definition: &CapabilityDefinition,
    ) -> Result<(), SqliteStoreError> {
        self.with_write(|tx| {
            tx.execute(
                "INSERT INTO capability_definitions (capability_id, domain, level, version, \
                 registered_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    definition.capability_id.as_str(),
                    definition.domain.as_str(),
                    definition.level.as_str(),
                    definition.version,
                    definition.registered_at.as_unix_millis()
                ],
            )
            .map_err(|err| classify_db_error(&err))?;
            Ok(())
        })
    }

    /// Fetches the latest version of a capability definition.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::NotFound`] when the capability is not
    /// registered.
    pub fn fetch_capability(
        &self,
        capability_id: &CapabilityId,
    ) -> Result<CapabilityDefinition, SqliteStoreError> {
        self.with_read(|connection| {
            connection
                .query_row(
                    "SELECT capability_id, domain, level, version, registered_at \
                     FROM capability_definitions WHERE capability_id = ?1 \
                     ORDER BY version DESC LIMIT 1",
                    params![capability_id.as_str()],
                    |row| {
                        let capability_id: String = row.get(0)?;
                        let domain: String = row.get(1)?;
                        let level: String = row.get(2)?;
                        let version: i64 = row.get(3)?;
                        let registered_at: i64 = row.get(4)?;
                        let domain = CapabilityDomain::parse(&domain).ok_or_else(|| {
                            bad_column(1, format!("unknown capability domain {domain}"))
                        })?;
                        let level = CapabilityLevel::parse(&level).ok_or_else(|| {
                            bad_column(2, format!("unknown capability level {level}"))
                        })?;
                        let version = u32::try_from(version)
                            .map_err(|_| bad_column(3, format!("bad version {version}")))?;
                        Ok(CapabilityDefinition {
                            capability_id: CapabilityId::new(capability_id),
                            domain,
                            level,
                            version,
                            registered_at: Timestamp::from_unix_millis(registered_at),
                        })
                    },
                )
                .map_err(|err| match err {
                    rusqlite::Error::QueryReturnedNoRows => {
                        SqliteStoreError::NotFound(format!("capability {capability_id}"))
                    }
                    other => classify_db_error(&other),
                })
        })
    }

    /// Lists all registered capability definitions (latest versions).
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn list_capabilities(&self) -> Result<Vec<CapabilityDefinition>, SqliteStoreError> {
        self.with_read(|connection| {
            let mut stmt = connection
                .prepare(
                    "SELECT capability_id, domain, level, MAX(version), registered_at \
                     FROM capability_definitions GROUP BY capability_id ORDER BY capability_id",
                )
                .map_err(|err| classify_db_error(&err))?;
            let rows = stmt
                .query_map([], |row| {
                    let capability_id: String = row.get(0)?;
                    let domain: String = row.get(1)?;
                    let level: String = row.get(2)?;
                    let version: i64 = row.get(3)?;
                    let registered_at: i64 = row.get(4)?;
                    Ok((capability_id, domain, level, version, registered_at))
                })
                .map_err(|err| classify_db_error(&err))?;
            let mut results = Vec::new();
            for row in rows {
                let (capability_id, domain, level, version, registered_at) =
                    row.map_err(|err| classify_db_error(&err))?;
                let domain = CapabilityDomain::parse(&domain).ok_or_else(|| {
                    SqliteStoreError::Corrupt(format!("unknown capability domain {domain}"))
                })?;
                let level = CapabilityLevel::parse(&level).ok_or_else(|| {
                    SqliteStoreError::Corrupt(format!("unknown capability level {level}"))
                })?;
                let version = u32::try_from(version).map_err(|_| {
                    SqliteStoreError::Corrupt(format!("bad capability version {version}"))
                })?;
                results.push(CapabilityDefinition {
                    capability_id: CapabilityId::new(capability_id),
                    domain,
                    level,
                    version,
                    registered_at: Timestamp::from_unix_millis(registered_at),
                });
            }
            Ok(results)
        })
    }
}

// ============================================================================
// SECTION: Profile Operations
// ============================================================================

impl ControlStore {
    /// Registers or replaces an agent profile.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the write fails.
    pub fn upsert_agent_profile(&self, profile: &AgentProfile) -> Result<(), SqliteStoreError> {
        let allowed = to_json_string(&profile.allowed_capabilities)?;
        let forbidden = to_json_string(&profile.forbidden_capabilities)?;
        self.with_write(|tx| {
            tx.execute(
                "INSERT INTO agent_profiles (agent_id, tier, allowed_json, forbidden_json, \
                 escalation_policy, registered_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                 ON CONFLICT (agent_id) DO UPDATE SET tier = excluded.tier, \
                 allowed_json = excluded.allowed_json, forbidden_json = excluded.forbidden_json, \
                 escalation_policy = excluded.escalation_policy",
                params![
                    profile.agent_id.as_str(),
                    profile.tier.get(),
                    allowed,
                    forbidden,
                    profile.escalation_policy.as_str(),
                    profile.registered_at.as_unix_millis()
                ],
            )
            .map_err(|err| classify_db_error(&err))?;
            Ok(())
        })
    }

    /// Fetches an agent profile.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::NotFound`] when the agent is unknown.
    pub fn fetch_agent_profile(&self, agent_id: &AgentId) -> Result<AgentProfile, SqliteStoreError> {
        self.with_read(|connection| {
            let row: (i64, String, String, String, i64) = connection
                .query_row(
                    "SELECT tier, allowed_json, forbidden_json, escalation_policy, \
                     registered_at FROM agent_profiles WHERE agent_id = ?1",
                    params![agent_id.as_str()],
                    |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
                    },
                )
                .map_err(|err| match err {
                    rusqlite::Error::QueryReturnedNoRows => {
                        SqliteStoreError::NotFound(format!("agent profile {agent_id}"))
                    }
                    other => classify_db_error(&other),
                })?;
            let (tier, allowed_json, forbidden_json, escalation_policy, registered_at) = row;
            let tier = u8::try_from(tier)
                .ok()
                .and_then(AgentTier::from_raw)
                .ok_or_else(|| SqliteStoreError::Corrupt(format!("bad agent tier {tier}")))?;
            let escalation_policy =
                EscalationPolicy::parse(&escalation_policy).ok_or_else(|| {
                    SqliteStoreError::Corrupt(format!(
                        "unknown escalation policy {escalation_policy}"
                    ))
                })?;
            Ok(AgentProfile {
                agent_id: agent_id.clone(),
                tier,
                allowed_capabilities: from_json_str(&allowed_json)?,
                forbidden_capabilities: from_json_str(&forbidden_json)?,
                escalation_policy,
                registered_at: Timestamp::from_unix_millis(registered_at),
            })
        })
    }
}

// ============================================================================
// SECTION: Grant Operations
// ============================================================================

impl ControlStore {
    /// Inserts a capability grant.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the write fails.
    pub fn insert_grant(&self, grant: &CapabilityGrant) -> Result<(), SqliteStoreError> {
        self.with_write(|tx| {
            tx.execute(
                "INSERT INTO capability_grants (grant_id, agent_id, capability_id, scope, \
                 granted_at, expires_at, revoked_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    grant.grant_id.as_str(),
                    grant.agent_id.as_str(),
                    grant.capability_id.as_str(),
                    grant.scope,
                    grant.granted_at.as_unix_millis(),
                    grant.expires_at.map(Timestamp::as_unix_millis),
                    grant.revoked_at.map(Timestamp::as_unix_millis)
                ],
            )
            .map_err(|err| classify_db_error(&err))?;
            Ok(())
        })
    }

    /// Revokes a grant in place and writes the revocation audit row in the
    /// same transaction.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::NotFound`] when the grant does not exist
    /// or is already revoked.
    pub fn revoke_grant(
        &self,
        grant_id: &GrantId,
        revoked_by: &str,
        now: Timestamp,
    ) -> Result<(), SqliteStoreError> {
        self.with_write(|tx| {
            let updated = tx
                .execute(
                    "UPDATE capability_grants SET revoked_at = ?1 \
                     WHERE grant_id = ?2 AND revoked_at IS NULL",
                    params![now.as_unix_millis(), grant_id.as_str()],
                )
                .map_err(|err| classify_db_error(&err))?;
            if updated == 0 {
                return Err(SqliteStoreError::NotFound(format!(
                    "active grant {grant_id}"
                )));
            }
            let context = serde_json::json!({
                "grant_id": grant_id.as_str(),
                "revoked_by": revoked_by,
            });
            tx.execute(
                "INSERT INTO task_audits (task_id, severity, code, message, context_json, \
                 recorded_at) VALUES (NULL, 'info', 'GRANT_REVOKED', ?1, ?2, ?3)",
                params![
                    format!("capability grant {grant_id} revoked"),
                    context.to_string(),
                    now.as_unix_millis()
                ],
            )
            .map_err(|err| classify_db_error(&err))?;
            Ok(())
        })
    }

    /// Lists grants for an agent and capability (active and revoked).
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn list_grants_for(
        &self,
        agent_id: &AgentId,
        capability_id: &CapabilityId,
    ) -> Result<Vec<CapabilityGrant>, SqliteStoreError> {
        self.with_read(|connection| {
            let mut stmt = connection
                .prepare(
                    "SELECT grant_id, agent_id, capability_id, scope, granted_at, expires_at, \
                     revoked_at FROM capability_grants \
                     WHERE agent_id = ?1 AND capability_id = ?2 ORDER BY granted_at DESC",
                )
                .map_err(|err| classify_db_error(&err))?;
            let rows = stmt
                .query_map(params![agent_id.as_str(), capability_id.as_str()], map_grant_row)
                .map_err(|err| classify_db_error(&err))?;
            let mut results = Vec::new();
            for row in rows {
                results.push(row.map_err(|err| classify_db_error(&err))?);
            }
            Ok(results)
        })
    }
}

// ============================================================================
// SECTION: Escalation Operations
// ============================================================================

impl ControlStore {
    /// Inserts an escalation request.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the write fails.
    pub fn insert_escalation(&self, request: &EscalationRequest) -> Result<(), SqliteStoreError> {
        self.with_write(|tx| {
            tx.execute(
                "INSERT INTO escalation_requests (escalation_id, agent_id, capability_id, \
                 task_id, status, reason, requested_at, resolved_at, resolution_note) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    request.escalation_id.as_str(),
                    request.agent_id.as_str(),
                    request.capability_id.as_str(),
                    request.task_id.as_ref().map(TaskId::as_str),
                    request.status.as_str(),
                    request.reason,
                    request.requested_at.as_unix_millis(),
                    request.resolved_at.map(Timestamp::as_unix_millis),
                    request.resolution_note
                ],
            )
            .map_err(|err| classify_db_error(&err))?;
            Ok(())
        })
    }

    /// Fetches an escalation request.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::NotFound`] when it does not exist.
    pub fn fetch_escalation(
        &self,
        escalation_id: &EscalationId,
    ) -> Result<EscalationRequest, SqliteStoreError> {
        self.with_read(|connection| {
            connection
                .query_row(
                    "SELECT escalation_id, agent_id, capability_id, task_id, status, reason, \
                     requested_at, resolved_at, resolution_note FROM escalation_requests \
                     WHERE escalation_id = ?1",
                    params![escalation_id.as_str()],
                    map_escalation_row,
                )
                .map_err(|err| match err {
                    rusqlite::Error::QueryReturnedNoRows => {
                        SqliteStoreError::NotFound(format!("escalation {escalation_id}"))
                    }
                    other => classify_db_error(&other),
                })
        })
    }

    /// Lists escalation requests by status, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn list_escalations(
        &self,
        status: EscalationStatus,
    ) -> Result<Vec<EscalationRequest>, SqliteStoreError> {
        self.with_read(|connection| {
            let mut stmt = connection
                .prepare(
                    "SELECT escalation_id, agent_id, capability_id, task_id, status, reason, \
                     requested_at, resolved_at, resolution_note FROM escalation_requests \
                     WHERE status = ?1 ORDER BY requested_at ASC",
                )
                .map_err(|err| classify_db_error(&err))?;
            let rows = stmt
                .query_map(params![status.as_str()], map_escalation_row)
                .map_err(|err| classify_db_error(&err))?;
            let mut results = Vec::new();
            for row in rows {
                results.push(row.map_err(|err| classify_db_error(&err))?);
            }
            Ok(results)
        })
    }

    /// Resolves a pending escalation; approval mints the temporary grant in
    /// the same transaction.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::NotFound`] when the escalation is not
    /// pending.
    pub fn resolve_escalation(
        &self,
        escalation_id: &EscalationId,
        approve: bool,
        note: &str,
        temporary_grant: Option<&CapabilityGrant>,
        now: Timestamp,
    ) -> Result<(), SqliteStoreError> {
        let status = if approve {
            EscalationStatus::Approved
        } else {
            EscalationStatus::Rejected
        };
        self.with_write(|tx| {
            let updated = tx
                .execute(
                    "UPDATE escalation_requests SET status = ?1, resolved_at = ?2, \
                     resolution_note = ?3 WHERE escalation_id = ?4 AND status = 'pending'",
                    params![
                        status.as_str(),
                        now.as_unix_millis(),
                        note,
                        escalation_id.as_str()
                    ],
                )
                .map_err(|err| classify_db_error(&err))?;
            if updated == 0 {
                return Err(SqliteStoreError::NotFound(format!(
                    "pending escalation {escalation_id}"
                )));
            }
            if let Some(grant) = temporary_grant {
                tx.execute(
                    "INSERT INTO capability_grants (grant_id, agent_id, capability_id, scope, \
                     granted_at, expires_at, revoked_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL)",
                    params![
                        grant.grant_id.as_str(),
                        grant.agent_id.as_str(),
                        grant.capability_id.as_str(),
                        grant.scope,
                        grant.granted_at.as_unix_millis(),
                        grant.expires_at.map(Timestamp::as_unix_millis)
                    ],
                )
                .map_err(|err| classify_db_error(&err))?;
            }
            Ok(())
        })
    }
}

// ============================================================================
// SECTION: Invocation Audit Operations
// ============================================================================

impl ControlStore {
    /// Records one authorizer evaluation in the audit table.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the write fails.
    pub fn record_invocation(
        &self,
        agent_id: &AgentId,
        capability_id: &CapabilityId,
        task_id: Option<&TaskId>,
        outcome: InvocationOutcome,
        rationale: &str,
        now: Timestamp,
    ) -> Result<(), SqliteStoreError> {
        self.with_write(|tx| {
            tx.execute(
                "INSERT INTO capability_invocations (agent_id, capability_id, task_id, \
                 outcome, rationale, invoked_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    agent_id.as_str(),
                    capability_id.as_str(),
                    task_id.map(TaskId::as_str),
                    outcome.as_str(),
                    rationale,
                    now.as_unix_millis()
                ],
            )
            .map_err(|err| classify_db_error(&err))?;
            Ok(())
        })
    }

    /// Records one call-path validation outcome.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the write fails.
    pub fn record_call_path(
        &self,
        session_id: &SessionId,
        call_stack: &[String],
        path_valid: bool,
        now: Timestamp,
    ) -> Result<(), SqliteStoreError> {
        let stack = to_json_string(&call_stack)?;
        self.with_write(|tx| {
            tx.execute(
                "INSERT INTO capability_call_paths (session_id, call_stack_json, path_valid, \
                 recorded_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    session_id.as_str(),
                    stack,
                    i64::from(path_valid),
                    now.as_unix_millis()
                ],
            )
            .map_err(|err| classify_db_error(&err))?;
            Ok(())
        })
    }

    /// Counts audited invocations per outcome for an agent.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn count_invocations(
        &self,
        agent_id: &AgentId,
        outcome: InvocationOutcome,
    ) -> Result<u64, SqliteStoreError> {
        self.with_read(|connection| {
            let count: i64 = connection
                .query_row(
                    "SELECT COUNT(*) FROM capability_invocations \
                     WHERE agent_id = ?1 AND outcome = ?2",
                    params![agent_id.as_str(), outcome.as_str()],
                    |row| row.get(0),
                )
                .map_err(|err| classify_db_error(&err))?;
            u64::try_from(count)
                .map_err(|_| SqliteStoreError::Corrupt("negative count".to_string()))
        })
    }
}
