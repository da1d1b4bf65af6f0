// crates/warden-store-sqlite/src/repo/risk.rs
// ============================================================================
// Module: Risk and Trust Repository
// Description: Risk assessments, timeline, trust states and transitions.
// Purpose: Persist the append-only risk history and trust trajectory.
// Dependencies: rusqlite, serde_json, warden-core
// ============================================================================

//! ## Overview
//! Assessments and timeline rows are append-only and trigger-protected. The
//! trust transition write updates the current state row and appends the
//! transition record in one transaction; the database trigger rejects any
//! edge outside the fixed cycle, so an illegal transition can never commit.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::params;
use warden_core::ActionId;
use warden_core::AgentId;
use warden_core::CapabilityId;
use warden_core::ExtensionId;
use warden_core::RiskAssessment;
use warden_core::RiskLevel;
use warden_core::Timestamp;
use warden_core::TrustRecord;
use warden_core::TrustState;
use warden_core::TrustTransition;

use crate::repo::from_json_str;
use crate::repo::to_json_string;
use crate::store::ControlStore;
use crate::store::SqliteStoreError;
use crate::store::classify_db_error;

// ============================================================================
// SECTION: Risk Operations
// ============================================================================

impl ControlStore {
    /// Appends one immutable risk assessment and its timeline entry in one
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the write fails.
    pub fn record_risk_assessment(
        &self,
        assessment: &RiskAssessment,
        timeline_note: Option<&str>,
    ) -> Result<(), SqliteStoreError> {
        let dimensions = to_json_string(&assessment.dimensions)?;
        self.with_write(|tx| {
            tx.execute(
                "INSERT INTO risk_assessments (capability_id, agent_id, score, level, \
                 dimensions_json, assessed_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    assessment.capability_id.as_str(),
                    assessment.agent_id.as_str(),
                    assessment.score,
                    assessment.level.as_str(),
                    dimensions,
                    assessment.assessed_at.as_unix_millis()
                ],
            )
            .map_err(|err| classify_db_error(&err))?;
            tx.execute(
                "INSERT INTO risk_timeline (capability_id, agent_id, score, level, note, \
                 recorded_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    assessment.capability_id.as_str(),
                    assessment.agent_id.as_str(),
                    assessment.score,
                    assessment.level.as_str(),
                    timeline_note,
                    assessment.assessed_at.as_unix_millis()
                ],
            )
            .map_err(|err| classify_db_error(&err))?;
            Ok(())
        })
    }

    /// Lists risk assessments for an agent, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn list_risk_assessments(
        &self,
        agent_id: &AgentId,
        limit: usize,
    ) -> Result<Vec<RiskAssessment>, SqliteStoreError> {
        let limit = i64::try_from(limit)
            .map_err(|_| SqliteStoreError::Invalid("limit too large".to_string()))?;
        self.with_read(|connection| {
            let mut stmt = connection
                .prepare(
                    "SELECT capability_id, agent_id, score, level, dimensions_json, assessed_at \
                     FROM risk_assessments WHERE agent_id = ?1 \
                     ORDER BY assessed_at DESC, assessment_rowid DESC LIMIT ?2",
                )
                .map_err(|err| classify_db_error(&err))?;
            let rows = stmt
                .query_map(params![agent_id.as_str(), limit], |row| {
                    let capability_id: String = row.get(0)?;
                    let agent_id: String = row.get(1)?;
                    let score: f64 = row.get(2)?;
                    let level: String = row.get(3)?;
                    let dimensions_json: String = row.get(4)?;
                    let assessed_at: i64 = row.get(5)?;
                    Ok((capability_id, agent_id, score, level, dimensions_json, assessed_at))
                })
                .map_err(|err| classify_db_error(&err))?;
            let mut results = Vec::new();
            for row in rows {
                let (capability_id, agent_id, score, level, dimensions_json, assessed_at) =
                    row.map_err(|err| classify_db_error(&err))?;
                let level = RiskLevel::parse(&level).ok_or_else(|| {
                    SqliteStoreError::Corrupt(format!("unknown risk level {level}"))
                })?;
                results.push(RiskAssessment {
                    capability_id: CapabilityId::new(capability_id),
                    agent_id: AgentId::new(agent_id),
                    score,
                    level,
                    dimensions: from_json_str(&dimensions_json)?,
                    assessed_at: Timestamp::from_unix_millis(assessed_at),
                });
            }
            Ok(results)
        })
    }

    /// Counts risk timeline rows for an agent.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn count_risk_timeline(&self, agent_id: &AgentId) -> Result<u64, SqliteStoreError> {
        self.with_read(|connection| {
            let count: i64 = connection
                .query_row(
                    "SELECT COUNT(*) FROM risk_timeline WHERE agent_id = ?1",
                    params![agent_id.as_str()],
                    |row| row.get(0),
                )
                .map_err(|err| classify_db_error(&err))?;
            u64::try_from(count)
                .map_err(|_| SqliteStoreError::Corrupt("negative count".to_string()))
        })
    }
}

// ============================================================================
// SECTION: Trust State Operations
// ============================================================================

impl ControlStore {
    /// Inserts a trust record; new records must start in EARNING (the
    /// database trigger enforces this too).
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the write fails.
    pub fn insert_trust_record(
        &self,
        record: &TrustRecord,
        origin_marketplace: bool,
        inherited_tier: Option<&str>,
    ) -> Result<(), SqliteStoreError> {
        self.with_write(|tx| {
            tx.execute(
                "INSERT INTO trust_states (extension_id, action_id, state, \
                 consecutive_successes, policy_rejections, score, origin, inherited_tier, \
                 updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.extension_id.as_str(),
                    record.action_id.as_str(),
                    record.state.as_str(),
                    record.consecutive_successes,
                    record.policy_rejections,
                    record.score,
                    if origin_marketplace { "marketplace" } else { "native" },
                    inherited_tier,
                    record.updated_at.as_unix_millis()
                ],
            )
            .map_err(|err| classify_db_error(&err))?;
            Ok(())
        })
    }

    /// Fetches the trust record for an `(extension, action)` pair.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn fetch_trust_record(
        &self,
        extension_id: &ExtensionId,
        action_id: &ActionId,
    ) -> Result<Option<TrustRecord>, SqliteStoreError> {
        self.with_read(|connection| {
            connection
                .query_row(
                    "SELECT state, consecutive_successes, policy_rejections, score, updated_at \
                     FROM trust_states WHERE extension_id = ?1 AND action_id = ?2",
                    params![extension_id.as_str(), action_id.as_str()],
                    |row| {
                        let state: String = row.get(0)?;
                        let consecutive_successes: i64 = row.get(1)?;
                        let policy_rejections: i64 = row.get(2)?;
                        let score: f64 = row.get(3)?;
                        let updated_at: i64 = row.get(4)?;
                        Ok((state, consecutive_successes, policy_rejections, score, updated_at))
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
                .map(|(state, successes, rejections, score, updated_at)| {
                    let state = TrustState::parse(&state).ok_or_else(|| {
                        SqliteStoreError::Corrupt(format!("unknown trust state {state}"))
                    })?;
                    let consecutive_successes = u32::try_from(successes).map_err(|_| {
                        SqliteStoreError::Corrupt(format!("bad success count {successes}"))
                    })?;
                    let policy_rejections = u32::try_from(rejections).map_err(|_| {
                        SqliteStoreError::Corrupt(format!("bad rejection count {rejections}"))
                    })?;
                    Ok(TrustRecord {
                        extension_id: extension_id.clone(),
                        action_id: action_id.clone(),
                        state,
                        consecutive_successes,
                        policy_rejections,
                        score,
                        updated_at: Timestamp::from_unix_millis(updated_at),
                    })
                })
                .transpose()
        })
    }

    /// Updates the counters of a trust record without changing state.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::NotFound`] when the record is missing.
    pub fn update_trust_counters(
        &self,
        extension_id: &ExtensionId,
        action_id: &ActionId,
        consecutive_successes: u32,
        policy_rejections: u32,
        score: f64,
        now: Timestamp,
    ) -> Result<(), SqliteStoreError> {
        self.with_write(|tx| {
            let updated = tx
                .execute(
                    "UPDATE trust_states SET consecutive_successes = ?1, \
                     policy_rejections = ?2, score = ?3, updated_at = ?4 \
                     WHERE extension_id = ?5 AND action_id = ?6",
                    params![
                        consecutive_successes,
                        policy_rejections,
                        score,
                        now.as_unix_millis(),
                        extension_id.as_str(),
                        action_id.as_str()
                    ],
                )
                .map_err(|err| classify_db_error(&err))?;
            if updated == 0 {
                return Err(SqliteStoreError::NotFound(format!(
                    "trust record {extension_id}/{action_id}"
                )));
            }
            Ok(())
        })
    }

    /// Applies a trust transition: updates the state row and appends the
    /// transition record in one transaction. The cycle trigger rejects
    /// illegal edges.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Constraint`] for an illegal edge and
    /// other variants when the write fails.
    pub fn apply_trust_transition(
        &self,
        transition: &TrustTransition,
        reset_successes: u32,
        reset_rejections: u32,
    ) -> Result<(), SqliteStoreError> {
        let risk = to_json_string(&transition.risk_context)?;
        let policy = to_json_string(&transition.policy_context)?;
        self.with_write(|tx| {
            tx.execute(
                "INSERT INTO trust_transitions (extension_id, action_id, old_state, \
                 new_state, trigger_event, explain_text, risk_json, policy_json, \
                 transitioned_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    transition.extension_id.as_str(),
                    transition.action_id.as_str(),
                    transition.old_state.as_str(),
                    transition.new_state.as_str(),
                    transition.trigger_event,
                    transition.explain,
                    risk,
                    policy,
                    transition.transitioned_at.as_unix_millis()
                ],
            )
            .map_err(|err| classify_db_error(&err))?;
            let updated = tx
                .execute(
                    "UPDATE trust_states SET state = ?1, consecutive_successes = ?2, \
                     policy_rejections = ?3, updated_at = ?4 \
                     WHERE extension_id = ?5 AND action_id = ?6 AND state = ?7",
                    params![
                        transition.new_state.as_str(),
                        reset_successes,
                        reset_rejections,
                        transition.transitioned_at.as_unix_millis(),
                        transition.extension_id.as_str(),
                        transition.action_id.as_str(),
                        transition.old_state.as_str()
                    ],
                )
                .map_err(|err| classify_db_error(&err))?;
            if updated == 0 {
                return Err(SqliteStoreError::NotFound(format!(
                    "trust record {}/{} in state {}",
                    transition.extension_id, transition.action_id, transition.old_state.as_str()
                )));
            }
            Ok(())
        })
    }

    /// Lists transitions for an `(extension, action)` pair, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn list_trust_transitions(
        &self,
        extension_id: &ExtensionId,
        action_id: &ActionId,
    ) -> Result<Vec<TrustTransition>, SqliteStoreError> {
        self.with_read(|connection| {
            let mut stmt = connection
                .prepare(
                    "SELECT old_state, new_state, trigger_event, explain_text, risk_json, \
                     policy_json, transitioned_at FROM trust_transitions \
                     WHERE extension_id = ?1 AND action_id = ?2 ORDER BY transition_rowid ASC",
                )
                .map_err(|err| classify_db_error(&err))?;
            let rows = stmt
                .query_map(params![extension_id.as_str(), action_id.as_str()], |row| {
                    let old_state: String = row.get(0)?;
                    let new_state: String = row.get(1)?;
                    let trigger_event: String = row.get(2)?;
                    let explain: String = row.get(3)?;
                    let risk_json: String = row.get(4)?;
                    let policy_json: String = row.get(5)?;
                    let transitioned_at: i64 = row.get(6)?;
                    Ok((
                        old_state,
                        new_state,
                        trigger_event,
                        explain,
                        risk_json,
                        policy_json,
                        transitioned_at,
                    ))
                })
                .map_err(|err| classify_db_error(&err))?;
            let mut results = Vec::new();
            for row in rows {
                let (old_state, new_state, trigger_event, explain, risk_json, policy_json, at) =
                    row.map_err(|err| classify_db_error(&err))?;
                let old_state = TrustState::parse(&old_state).ok_or_else(|| {
                    SqliteStoreError::Corrupt(format!("unknown trust state {old_state}"))
                })?;
                let new_state = TrustState::parse(&new_state).ok_or_else(|| {
                    SqliteStoreError::Corrupt(format!("unknown trust state {new_state}"))
                })?;
                results.push(TrustTransition {
                    extension_id: extension_id.clone(),
                    action_id: action_id.clone(),
                    old_state,
                    new_state,
                    trigger_event,
                    explain,
                    risk_context: from_json_str(&risk_json)?,
                    policy_context: from_json_str(&policy_json)?,
                    transitioned_at: Timestamp::from_unix_millis(at),
                });
            }
            Ok(results)
        })
    }
}
