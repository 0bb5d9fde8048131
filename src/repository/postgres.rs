//! PostgreSQL repository
//!
//! Durable implementation of the [`Repository`] contract over
//! deadpool-postgres. Vote commits and decision applications run inside a
//! transaction with a version-guarded UPDATE: the row only changes when the
//! caller-observed version still matches, so concurrent writers cannot lose
//! contributions and two deciders cannot both succeed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::engine::levels::AgendaLevel;
use crate::error::AppError;
use crate::repository::{Repository, VoiceFilter, VoiceUpdate};
use crate::voice::{
    DecisionRecord, DecisionType, ExpirationRecord, ExpirationResolution, TierRole, Voice,
    VoiceStatus, VoteStance, Vote,
};

pub struct PostgresRepository {
    pool: Pool,
}

impl PostgresRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    fn voice_from_row(row: &Row) -> Result<Voice, AppError> {
        let level: String = row.get("level");
        let status: String = row.get("status");
        let rescue: Option<String> = row.get("rescue_level");
        Ok(Voice {
            id: row.get("id"),
            author_id: row.get("author_id"),
            department: row.get("department"),
            facility: row.get("facility"),
            corporation: row.get("corporation"),
            category: row.get("category"),
            title: row.get("title"),
            body: row.get("body"),
            level: AgendaLevel::parse(&level)
                .ok_or_else(|| AppError::Internal(format!("Unknown stored level '{}'", level)))?,
            status: VoiceStatus::parse(&status)
                .ok_or_else(|| AppError::Internal(format!("Unknown stored status '{}'", status)))?,
            raw_score: row.get("raw_score"),
            score: row.get("score"),
            deadline: row.get("deadline"),
            rescue_level: match rescue {
                Some(r) => Some(TierRole::parse(&r).ok_or_else(|| {
                    AppError::Internal(format!("Unknown stored rescue level '{}'", r))
                })?),
                None => None,
            },
            version: Some(row.get("version")),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn vote_from_row(row: &Row) -> Result<Vote, AppError> {
        let stance: String = row.get("stance");
        Ok(Vote {
            id: row.get("id"),
            voice_id: row.get("voice_id"),
            voter_id: row.get("voter_id"),
            stance: VoteStance::parse(&stance)
                .ok_or_else(|| AppError::Internal(format!("Unknown stored stance '{}'", stance)))?,
            cast_at: row.get("cast_at"),
        })
    }

    fn decision_from_row(row: &Row) -> Result<DecisionRecord, AppError> {
        let decision: String = row.get("decision");
        let role: String = row.get("decider_role");
        Ok(DecisionRecord {
            id: row.get("id"),
            voice_id: row.get("voice_id"),
            decision: DecisionType::parse(&decision).ok_or_else(|| {
                AppError::Internal(format!("Unknown stored decision '{}'", decision))
            })?,
            decider_id: row.get("decider_id"),
            decider_role: TierRole::parse(&role)
                .ok_or_else(|| AppError::Internal(format!("Unknown stored role '{}'", role)))?,
            reason: row.get("reason"),
            committee_id: row.get("committee_id"),
            decided_at: row.get("decided_at"),
        })
    }

    fn expiration_from_row(row: &Row) -> Result<ExpirationRecord, AppError> {
        let level: String = row.get("level");
        let resolution: String = row.get("resolution");
        Ok(ExpirationRecord {
            id: row.get("id"),
            voice_id: row.get("voice_id"),
            decider_id: row.get("decider_id"),
            level: AgendaLevel::parse(&level)
                .ok_or_else(|| AppError::Internal(format!("Unknown stored level '{}'", level)))?,
            current_score: row.get("current_score"),
            target_score: row.get("target_score"),
            achievement_rate: row.get("achievement_rate"),
            days_overdue: row.get("days_overdue"),
            resolution: ExpirationResolution::parse(&resolution).ok_or_else(|| {
                AppError::Internal(format!("Unknown stored resolution '{}'", resolution))
            })?,
            reason: row.get("reason"),
            resolved_at: row.get("resolved_at"),
        })
    }
}

const VOICE_COLUMNS: &str = "id, author_id, department, facility, corporation, category, title, \
     body, level, status, raw_score, score, deadline, rescue_level, version, created_at, updated_at";

#[async_trait]
impl Repository for PostgresRepository {
    async fn create_voice(&self, voice: Voice) -> Result<Voice, AppError> {
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO voices (id, author_id, department, facility, corporation, category, \
                 title, body, level, status, raw_score, score, deadline, rescue_level, version, \
                 created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
                &[
                    &voice.id,
                    &voice.author_id,
                    &voice.department,
                    &voice.facility,
                    &voice.corporation,
                    &voice.category,
                    &voice.title,
                    &voice.body,
                    &voice.level.as_str(),
                    &voice.status.as_str(),
                    &voice.raw_score,
                    &voice.score,
                    &voice.deadline,
                    &voice.rescue_level.map(|r| r.as_str()),
                    &voice.version.unwrap_or(1),
                    &voice.created_at,
                    &voice.updated_at,
                ],
            )
            .await?;
        Ok(voice)
    }

    async fn get_voice(&self, id: Uuid) -> Result<Voice, AppError> {
        let client = self.pool.get().await?;
        let sql = format!("SELECT {} FROM voices WHERE id = $1", VOICE_COLUMNS);
        let row = client
            .query_opt(sql.as_str(), &[&id])
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Voice {} not found", id)))?;
        Self::voice_from_row(&row)
    }

    async fn list_voices(&self, filter: VoiceFilter) -> Result<Vec<Voice>, AppError> {
        let client = self.pool.get().await?;
        let sql = format!(
            "SELECT {} FROM voices \
             WHERE ($1::TEXT IS NULL OR department = $1) \
               AND ($2::TEXT IS NULL OR facility = $2) \
               AND ($3::TEXT IS NULL OR status = $3) \
               AND ($4::TEXT IS NULL OR level = $4) \
             ORDER BY created_at DESC",
            VOICE_COLUMNS
        );
        let rows = client
            .query(
                sql.as_str(),
                &[
                    &filter.department,
                    &filter.facility,
                    &filter.status.map(|s| s.as_str()),
                    &filter.level.map(|l| l.as_str()),
                ],
            )
            .await?;
        rows.iter().map(Self::voice_from_row).collect()
    }

    async fn list_votes(&self, voice_id: Uuid) -> Result<Vec<Vote>, AppError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT id, voice_id, voter_id, stance, cast_at FROM votes \
                 WHERE voice_id = $1 ORDER BY cast_at",
                &[&voice_id],
            )
            .await?;
        rows.iter().map(Self::vote_from_row).collect()
    }

    async fn commit_vote(
        &self,
        vote: Vote,
        new_raw_score: f64,
        new_score: f64,
        new_level: AgendaLevel,
        expected_version: i64,
    ) -> Result<Voice, AppError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        // Score and level change together or not at all; the version guard
        // rejects writers holding a stale read.
        let sql = format!(
            "UPDATE voices \
             SET raw_score = $1, score = $2, level = $3, version = version + 1, \
                 updated_at = $4 \
             WHERE id = $5 AND version = $6 \
             RETURNING {}",
            VOICE_COLUMNS
        );
        let row = tx
            .query_opt(
                sql.as_str(),
                &[
                    &new_raw_score,
                    &new_score,
                    &new_level.as_str(),
                    &Utc::now(),
                    &vote.voice_id,
                    &expected_version,
                ],
            )
            .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            // Distinguish a missing voice from a lost race
            return match self.get_voice(vote.voice_id).await {
                Ok(_) => Err(AppError::Conflict(format!(
                    "Voice {} was updated concurrently",
                    vote.voice_id
                ))),
                Err(e) => Err(e),
            };
        };

        tx.execute(
            "INSERT INTO votes (id, voice_id, voter_id, stance, cast_at) \
             VALUES ($1, $2, $3, $4, $5)",
            &[
                &vote.id,
                &vote.voice_id,
                &vote.voter_id,
                &vote.stance.as_str(),
                &vote.cast_at,
            ],
        )
        .await?;
        tx.commit().await?;
        Self::voice_from_row(&row)
    }

    async fn find_decision(&self, decision_id: Uuid) -> Result<Option<DecisionRecord>, AppError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT id, voice_id, decision, decider_id, decider_role, reason, committee_id, \
                 decided_at FROM decisions WHERE id = $1",
                &[&decision_id],
            )
            .await?;
        row.as_ref().map(Self::decision_from_row).transpose()
    }

    async fn apply_decision(
        &self,
        record: DecisionRecord,
        update: VoiceUpdate,
        expected_version: i64,
    ) -> Result<Voice, AppError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let sql = format!(
            "UPDATE voices \
             SET status = $1, level = $2, deadline = $3, rescue_level = $4, \
                 version = version + 1, updated_at = $5 \
             WHERE id = $6 AND version = $7 \
             RETURNING {}",
            VOICE_COLUMNS
        );
        let row = tx
            .query_opt(
                sql.as_str(),
                &[
                    &update.status.as_str(),
                    &update.level.as_str(),
                    &update.deadline,
                    &update.rescue_level.map(|r| r.as_str()),
                    &Utc::now(),
                    &record.voice_id,
                    &expected_version,
                ],
            )
            .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return match self.get_voice(record.voice_id).await {
                Ok(_) => Err(AppError::Conflict(format!(
                    "A concurrent decision was applied to voice {}",
                    record.voice_id
                ))),
                Err(e) => Err(e),
            };
        };

        tx.execute(
            "INSERT INTO decisions (id, voice_id, decision, decider_id, decider_role, reason, \
             committee_id, decided_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            &[
                &record.id,
                &record.voice_id,
                &record.decision.as_str(),
                &record.decider_id,
                &record.decider_role.as_str(),
                &record.reason,
                &record.committee_id,
                &record.decided_at,
            ],
        )
        .await?;
        tx.commit().await?;
        Self::voice_from_row(&row)
    }

    async fn decision_history(&self, voice_id: Uuid) -> Result<Vec<DecisionRecord>, AppError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT id, voice_id, decision, decider_id, decider_role, reason, committee_id, \
                 decided_at FROM decisions WHERE voice_id = $1 ORDER BY decided_at",
                &[&voice_id],
            )
            .await?;
        rows.iter().map(Self::decision_from_row).collect()
    }

    async fn apply_expiration(
        &self,
        record: ExpirationRecord,
        update: VoiceUpdate,
        expected_version: i64,
    ) -> Result<Voice, AppError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let sql = format!(
            "UPDATE voices \
             SET status = $1, level = $2, deadline = $3, rescue_level = $4, \
                 version = version + 1, updated_at = $5 \
             WHERE id = $6 AND version = $7 \
             RETURNING {}",
            VOICE_COLUMNS
        );
        let row = tx
            .query_opt(
                sql.as_str(),
                &[
                    &update.status.as_str(),
                    &update.level.as_str(),
                    &update.deadline,
                    &update.rescue_level.map(|r| r.as_str()),
                    &Utc::now(),
                    &record.voice_id,
                    &expected_version,
                ],
            )
            .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return match self.get_voice(record.voice_id).await {
                Ok(_) => Err(AppError::Conflict(format!(
                    "Voice {} was updated concurrently",
                    record.voice_id
                ))),
                Err(e) => Err(e),
            };
        };

        tx.execute(
            "INSERT INTO expiration_history (id, voice_id, decider_id, level, current_score, \
             target_score, achievement_rate, days_overdue, resolution, reason, resolved_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            &[
                &record.id,
                &record.voice_id,
                &record.decider_id,
                &record.level.as_str(),
                &record.current_score,
                &record.target_score,
                &record.achievement_rate,
                &record.days_overdue,
                &record.resolution.as_str(),
                &record.reason,
                &record.resolved_at,
            ],
        )
        .await?;
        tx.commit().await?;
        Self::voice_from_row(&row)
    }

    async fn expiration_history(&self, voice_id: Uuid) -> Result<Vec<ExpirationRecord>, AppError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT id, voice_id, decider_id, level, current_score, target_score, \
                 achievement_rate, days_overdue, resolution, reason, resolved_at \
                 FROM expiration_history WHERE voice_id = $1 ORDER BY resolved_at",
                &[&voice_id],
            )
            .await?;
        rows.iter().map(Self::expiration_from_row).collect()
    }

    async fn list_deadline_lapsed(&self, now: DateTime<Utc>) -> Result<Vec<Voice>, AppError> {
        let client = self.pool.get().await?;
        let sql = format!(
            "SELECT {} FROM voices \
             WHERE status IN ('in_review', 'accepted') AND deadline < $1 \
             ORDER BY deadline",
            VOICE_COLUMNS
        );
        let rows = client.query(sql.as_str(), &[&now]).await?;
        rows.iter().map(Self::voice_from_row).collect()
    }
}
