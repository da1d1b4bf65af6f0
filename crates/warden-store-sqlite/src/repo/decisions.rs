// crates/warden-store-sqlite/src/repo/decisions.rs
// ============================================================================
// Module: Decision Repository
// Description: Plans, freeze transitions, evaluations, selections.
// Purpose: Persist the decision pipeline with content-addressed freezing.
// Dependencies: rusqlite, serde_json, warden-core
// ============================================================================

//! ## Overview
//! Draft plans are mutable; the freeze operation hashes the canonical steps
//! and alternatives and flips `(status, plan_hash, frozen_at)` in one
//! transaction, together with the plan's lineage row. Once frozen, content
//! columns are locked by trigger and any drift between the stored hash and a
//! recomputation is surfaced as corruption.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::Row;
use rusqlite::params;
use warden_core::DEFAULT_HASH_ALGORITHM;
use warden_core::DecisionPlan;
use warden_core::Evaluation;
use warden_core::EvaluationId;
use warden_core::HashDigest;
use warden_core::OptionId;
use warden_core::PlanId;
use warden_core::PlanStatus;
use warden_core::RationaleExtension;
use warden_core::Selection;
use warden_core::TaskId;
use warden_core::Timestamp;
use warden_core::plan_content_hash;

use crate::repo::from_json_str;
use crate::repo::tasks::bad_column;
use crate::repo::to_json_string;
use crate::store::ControlStore;
use crate::store::SqliteStoreError;
use crate::store::classify_db_error;

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Maps one `decision_plans` row into a [`DecisionPlan`].
fn map_plan_row(row: &Row<'_>) -> Result<DecisionPlan, rusqlite::Error> {
    let plan_id: String = row.get(0)?;
    let task_id: String = row.get(1)?;
    let status: String = row.get(2)?;
    let steps_json: String = row.get(3)?;
    let alternatives_json: String = row.get(4)?;
    let plan_hash: Option<String> = row.get(5)?;
    let frozen_at: Option<i64> = row.get(6)?;
    let created_at: i64 = row.get(7)?;
    let status = PlanStatus::parse(&status)
        .ok_or_else(|| bad_column(2, format!("unknown plan status {status}")))?;
    let steps = serde_json::from_str(&steps_json)
        .map_err(|err| bad_column(3, format!("plan steps: {err}")))?;
    let alternatives = serde_json::from_str(&alternatives_json)
        .map_err(|err| bad_column(4, format!("plan alternatives: {err}")))?;
    let plan_hash = plan_hash
        .map(|raw| {
            HashDigest::parse(&raw).map_err(|err| bad_column(5, format!("plan hash: {err}")))
        })
        .transpose()?;
    Ok(DecisionPlan {
        plan_id: PlanId::new(plan_id),
        task_id: TaskId::new(task_id),
        status,
        steps,
        alternatives,
        plan_hash,
        frozen_at: frozen_at.map(Timestamp::from_unix_millis),
        created_at: Timestamp::from_unix_millis(created_at),
    })
}

/// Column list shared by plan queries.
const PLAN_COLUMNS: &str = "plan_id, task_id, status, steps_json, alternatives_json, plan_hash, \
     frozen_at, created_at";

// ============================================================================
// SECTION: Plan Operations
// ============================================================================

impl ControlStore {
    /// Inserts a draft plan.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when the plan is not a draft and
    /// other variants when the write fails.
    pub fn insert_plan(&self, plan: &DecisionPlan) -> Result<(), SqliteStoreError> {
        if plan.status != PlanStatus::Draft || plan.plan_hash.is_some() || plan.frozen_at.is_some()
        {
            return Err(SqliteStoreError::Invalid(
                "new plans must be drafts without hash or freeze time".to_string(),
            ));
        }
        let steps = to_json_string(&plan.steps)?;
        let alternatives = to_json_string(&plan.alternatives)?;
        self.with_write(|tx| {
            tx.execute(
                "INSERT INTO decision_plans (plan_id, task_id, status, steps_json, \
                 alternatives_json, plan_hash, frozen_at, created_at) \
                 VALUES (?1, ?2, 'draft', ?3, ?4, NULL, NULL, ?5)",
                params![
                    plan.plan_id.as_str(),
                    plan.task_id.as_str(),
                    steps,
                    alternatives,
                    plan.created_at.as_unix_millis()
                ],
            )
            .map_err(|err| classify_db_error(&err))?;
            Ok(())
        })
    }

    /// Fetches a plan by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::NotFound`] when the plan does not exist.
    pub fn fetch_plan(&self, plan_id: &PlanId) -> Result<DecisionPlan, SqliteStoreError> {
        self.with_read(|connection| {
            connection
                .query_row(
                    &format!("SELECT {PLAN_COLUMNS} FROM decision_plans WHERE plan_id = ?1"),
                    params![plan_id.as_str()],
                    map_plan_row,
                )
                .map_err(|err| match err {
                    rusqlite::Error::QueryReturnedNoRows => {
                        SqliteStoreError::NotFound(format!("plan {plan_id}"))
                    }
                    other => classify_db_error(&other),
                })
        })
    }

    /// Replaces the content of a draft plan.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::NotFound`] when the plan is missing or no
    /// longer a draft (frozen content is locked).
    pub fn update_draft_plan(
        &self,
        plan_id: &PlanId,
        steps: &[warden_core::PlanStep],
        alternatives: &[warden_core::PlanAlternative],
    ) -> Result<(), SqliteStoreError> {
        let steps_json = to_json_string(&steps)?;
        let alternatives_json = to_json_string(&alternatives)?;
        self.with_write(|tx| {
            let updated = tx
                .execute(
                    "UPDATE decision_plans SET steps_json = ?1, alternatives_json = ?2 \
                     WHERE plan_id = ?3 AND status = 'draft'",
                    params![steps_json, alternatives_json, plan_id.as_str()],
                )
                .map_err(|err| classify_db_error(&err))?;
            if updated == 0 {
                return Err(SqliteStoreError::NotFound(format!("draft plan {plan_id}")));
            }
            Ok(())
        })
    }

    /// Freezes a draft plan: computes the content hash and flips status,
    /// hash, freeze time, and the plan lineage row in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::NotFound`] when the plan is missing or
    /// already frozen, and [`SqliteStoreError::Invalid`] when hashing fails.
    pub fn freeze_plan(
        &self,
        plan_id: &PlanId,
        now: Timestamp,
    ) -> Result<HashDigest, SqliteStoreError> {
        self.with_write(|tx| {
            let (task_id, steps_json, alternatives_json): (String, String, String) = tx
                .query_row(
                    "SELECT task_id, steps_json, alternatives_json FROM decision_plans \
                     WHERE plan_id = ?1 AND status = 'draft'",
                    params![plan_id.as_str()],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .map_err(|err| match err {
                    rusqlite::Error::QueryReturnedNoRows => {
                        SqliteStoreError::NotFound(format!("draft plan {plan_id}"))
                    }
                    other => classify_db_error(&other),
                })?;
            let steps: Vec<warden_core::PlanStep> = from_json_str(&steps_json)?;
            let alternatives: Vec<warden_core::PlanAlternative> =
                from_json_str(&alternatives_json)?;
            let digest = plan_content_hash(DEFAULT_HASH_ALGORITHM, &steps, &alternatives)
                .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
            tx.execute(
                "UPDATE decision_plans SET status = 'frozen', plan_hash = ?1, frozen_at = ?2 \
                 WHERE plan_id = ?3 AND status = 'draft'",
                params![digest.to_string(), now.as_unix_millis(), plan_id.as_str()],
            )
            .map_err(|err| classify_db_error(&err))?;
            tx.execute(
                "INSERT OR IGNORE INTO task_lineage (task_id, kind, ref_id, recorded_at) \
                 VALUES (?1, 'plan', ?2, ?3)",
                params![task_id, plan_id.as_str(), now.as_unix_millis()],
            )
            .map_err(|err| classify_db_error(&err))?;
            Ok(digest)
        })
    }

    /// Verifies that a plan is frozen and its stored hash still matches a
    /// recomputation over the stored content.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when the plan is not frozen and
    /// [`SqliteStoreError::Corrupt`] when the hash no longer matches.
    pub fn verify_frozen_plan(&self, plan_id: &PlanId) -> Result<HashDigest, SqliteStoreError> {
        let plan = self.fetch_plan(plan_id)?;
        if plan.status != PlanStatus::Frozen {
            return Err(SqliteStoreError::Invalid(format!(
                "plan {plan_id} is {}, not frozen",
                plan.status.as_str()
            )));
        }
        let stored = plan.plan_hash.ok_or_else(|| {
            SqliteStoreError::Corrupt(format!("frozen plan {plan_id} has no hash"))
        })?;
        let recomputed =
            plan_content_hash(DEFAULT_HASH_ALGORITHM, &plan.steps, &plan.alternatives)
                .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        if recomputed != stored {
            return Err(SqliteStoreError::Corrupt(format!(
                "plan {plan_id} hash mismatch: stored {stored}, recomputed {recomputed}"
            )));
        }
        Ok(stored)
    }

    /// Moves a frozen plan to `archived` or `rolled_back`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] for illegal targets and
    /// [`SqliteStoreError::NotFound`] when the plan is not frozen.
    pub fn retire_plan(
        &self,
        plan_id: &PlanId,
        target: PlanStatus,
    ) -> Result<(), SqliteStoreError> {
        if !matches!(target, PlanStatus::Archived | PlanStatus::RolledBack) {
            return Err(SqliteStoreError::Invalid(format!(
                "plans retire to archived or rolled_back, not {}",
                target.as_str()
            )));
        }
        self.with_write(|tx| {
            let updated = tx
                .execute(
                    "UPDATE decision_plans SET status = ?1 \
                     WHERE plan_id = ?2 AND status = 'frozen'",
                    params![target.as_str(), plan_id.as_str()],
                )
                .map_err(|err| classify_db_error(&err))?;
            if updated == 0 {
                return Err(SqliteStoreError::NotFound(format!("frozen plan {plan_id}")));
            }
            Ok(())
        })
    }
}

// ============================================================================
// SECTION: Evaluation Operations
// ============================================================================

impl ControlStore {
    /// Inserts an evaluation of a plan's alternatives.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the write fails.
    pub fn insert_evaluation(&self, evaluation: &Evaluation) -> Result<(), SqliteStoreError> {
        let ranking = to_json_string(&evaluation.ranking)?;
        self.with_write(|tx| {
            tx.execute(
                "INSERT INTO plan_evaluations (evaluation_id, plan_id, ranking_json, \
                 recommendation, confidence, evaluated_by, evaluated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    evaluation.evaluation_id.as_str(),
                    evaluation.plan_id.as_str(),
                    ranking,
                    evaluation.recommendation.as_str(),
                    evaluation.confidence,
                    evaluation.evaluated_by,
                    evaluation.evaluated_at.as_unix_millis()
                ],
            )
            .map_err(|err| classify_db_error(&err))?;
            Ok(())
        })
    }

    /// Lists evaluations for a plan (supports shadow-evaluator comparison).
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn list_evaluations(&self, plan_id: &PlanId) -> Result<Vec<Evaluation>, SqliteStoreError> {
        self.with_read(|connection| {
            let mut stmt = connection
                .prepare(
                    "SELECT evaluation_id, plan_id, ranking_json, recommendation, confidence, \
                     evaluated_by, evaluated_at FROM plan_evaluations \
                     WHERE plan_id = ?1 ORDER BY evaluated_at ASC",
                )
                .map_err(|err| classify_db_error(&err))?;
            let rows = stmt
                .query_map(params![plan_id.as_str()], |row| {
                    let evaluation_id: String = row.get(0)?;
                    let plan_id: String = row.get(1)?;
                    let ranking_json: String = row.get(2)?;
                    let recommendation: String = row.get(3)?;
                    let confidence: i64 = row.get(4)?;
                    let evaluated_by: String = row.get(5)?;
                    let evaluated_at: i64 = row.get(6)?;
                    let ranking: Vec<OptionId> = serde_json::from_str(&ranking_json)
                        .map_err(|err| bad_column(2, format!("evaluation ranking: {err}")))?;
                    let confidence = u8::try_from(confidence)
                        .map_err(|_| bad_column(4, format!("bad confidence {confidence}")))?;
                    Ok(Evaluation {
                        evaluation_id: EvaluationId::new(evaluation_id),
                        plan_id: PlanId::new(plan_id),
                        ranking,
                        recommendation: OptionId::new(recommendation),
                        confidence,
                        evaluated_by,
                        evaluated_at: Timestamp::from_unix_millis(evaluated_at),
                    })
                })
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
// SECTION: Selection Operations
// ============================================================================

impl ControlStore {
    /// Inserts the selection for an evaluation.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when the rationale is empty and
    /// other variants when the write fails.
    pub fn insert_selection(&self, selection: &Selection) -> Result<(), SqliteStoreError> {
        if selection.rationale.trim().is_empty() {
            return Err(SqliteStoreError::Invalid(
                "selection rationale is mandatory".to_string(),
            ));
        }
        let rejected = to_json_string(&selection.rejected)?;
        self.with_write(|tx| {
            tx.execute(
                "INSERT INTO plan_selections (evaluation_id, selected_option, rationale, \
                 rejected_json, confidence, evidence_id, selected_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    selection.evaluation_id.as_str(),
                    selection.selected_option.as_str(),
                    selection.rationale,
                    rejected,
                    selection.confidence.as_str(),
                    selection.evidence_id.as_ref().map(warden_core::EvidenceId::as_str),
                    selection.selected_at.as_unix_millis()
                ],
            )
            .map_err(|err| classify_db_error(&err))?;
            Ok(())
        })
    }

    /// Fetches the selection for an evaluation, when recorded.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn fetch_selection(
        &self,
        evaluation_id: &EvaluationId,
    ) -> Result<Option<Selection>, SqliteStoreError> {
        self.with_read(|connection| {
            connection
                .query_row(
                    "SELECT evaluation_id, selected_option, rationale, rejected_json, \
                     confidence, evidence_id, selected_at FROM plan_selections \
                     WHERE evaluation_id = ?1",
                    params![evaluation_id.as_str()],
                    |row| {
                        let evaluation_id: String = row.get(0)?;
                        let selected_option: String = row.get(1)?;
                        let rationale: String = row.get(2)?;
                        let rejected_json: String = row.get(3)?;
                        let confidence: String = row.get(4)?;
                        let evidence_id: Option<String> = row.get(5)?;
                        let selected_at: i64 = row.get(6)?;
                        let rejected = serde_json::from_str(&rejected_json)
                            .map_err(|err| bad_column(3, format!("rejected options: {err}")))?;
                        let confidence = warden_core::ConfidenceBand::parse(&confidence)
                            .ok_or_else(|| {
                                bad_column(4, format!("unknown confidence band {confidence}"))
                            })?;
                        Ok(Selection {
                            evaluation_id: EvaluationId::new(evaluation_id),
                            selected_option: OptionId::new(selected_option),
                            rationale,
                            rejected,
                            confidence,
                            evidence_id: evidence_id.map(warden_core::EvidenceId::new),
                            selected_at: Timestamp::from_unix_millis(selected_at),
                        })
                    },
                )
                .map(Some)
                .or_else(|err| {
                    if matches!(err, rusqlite::Error::QueryReturnedNoRows) {
                        Ok(None)
                    } else {
                        Err(classify_db_error(&err))
                    }
                })
        })
    }

    /// Appends a rationale extension; originals are never replaced.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the write fails.
    pub fn append_rationale(
        &self,
        extension: &RationaleExtension,
    ) -> Result<(), SqliteStoreError> {
        let evidence = to_json_string(&extension.evidence_refs)?;
        self.with_write(|tx| {
            tx.execute(
                "INSERT INTO rationale_extensions (evaluation_id, text, evidence_json, \
                 appended_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    extension.evaluation_id.as_str(),
                    extension.text,
                    evidence,
                    extension.appended_at.as_unix_millis()
                ],
            )
            .map_err(|err| classify_db_error(&err))?;
            Ok(())
        })
    }
}
