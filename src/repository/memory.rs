//! In-memory repository
//!
//! Version-checked `RwLock` implementation of the [`Repository`] contract.
//! Test double for the engine test-suite and local experimentation; the
//! production store is always Postgres.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::engine::levels::AgendaLevel;
use crate::error::AppError;
use crate::repository::{Repository, VoiceFilter, VoiceUpdate};
use crate::voice::{DecisionRecord, ExpirationRecord, Voice, VoiceStatus, Vote};

#[derive(Default)]
struct Tables {
    voices: HashMap<Uuid, Voice>,
    votes: Vec<Vote>,
    decisions: Vec<DecisionRecord>,
    expirations: Vec<ExpirationRecord>,
}

/// Thread-safe in-memory store with the same version-guard semantics as
/// the Postgres implementation
#[derive(Default)]
pub struct MemoryRepository {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_version(voice: &Voice, expected: i64) -> Result<(), AppError> {
        let current = voice.version.unwrap_or(1);
        if current != expected {
            return Err(AppError::Conflict(format!(
                "Voice {} was updated concurrently (version {} != expected {})",
                voice.id, current, expected
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn create_voice(&self, voice: Voice) -> Result<Voice, AppError> {
        let mut tables = self.tables.write().await;
        tables.voices.insert(voice.id, voice.clone());
        Ok(voice)
    }

    async fn get_voice(&self, id: Uuid) -> Result<Voice, AppError> {
        let tables = self.tables.read().await;
        tables
            .voices
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Voice {} not found", id)))
    }

    async fn list_voices(&self, filter: VoiceFilter) -> Result<Vec<Voice>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .voices
            .values()
            .filter(|v| {
                filter
                    .department
                    .as_ref()
                    .map_or(true, |d| &v.department == d)
                    && filter.facility.as_ref().map_or(true, |f| &v.facility == f)
                    && filter.status.map_or(true, |s| v.status == s)
                    && filter.level.map_or(true, |l| v.level == l)
            })
            .cloned()
            .collect())
    }

    async fn list_votes(&self, voice_id: Uuid) -> Result<Vec<Vote>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .votes
            .iter()
            .filter(|v| v.voice_id == voice_id)
            .cloned()
            .collect())
    }

    async fn commit_vote(
        &self,
        vote: Vote,
        new_raw_score: f64,
        new_score: f64,
        new_level: AgendaLevel,
        expected_version: i64,
    ) -> Result<Voice, AppError> {
        let mut tables = self.tables.write().await;
        let voice = tables
            .voices
            .get_mut(&vote.voice_id)
            .ok_or_else(|| AppError::NotFound(format!("Voice {} not found", vote.voice_id)))?;
        Self::check_version(voice, expected_version)?;

        voice.raw_score = new_raw_score;
        voice.score = new_score;
        voice.level = new_level;
        voice.version = Some(expected_version + 1);
        voice.updated_at = Utc::now();
        let updated = voice.clone();
        tables.votes.push(vote);
        Ok(updated)
    }

    async fn find_decision(&self, decision_id: Uuid) -> Result<Option<DecisionRecord>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .decisions
            .iter()
            .find(|d| d.id == decision_id)
            .cloned())
    }

    async fn apply_decision(
        &self,
        record: DecisionRecord,
        update: VoiceUpdate,
        expected_version: i64,
    ) -> Result<Voice, AppError> {
        let mut tables = self.tables.write().await;
        let voice = tables
            .voices
            .get_mut(&record.voice_id)
            .ok_or_else(|| AppError::NotFound(format!("Voice {} not found", record.voice_id)))?;
        Self::check_version(voice, expected_version)?;

        voice.status = update.status;
        voice.level = update.level;
        voice.deadline = update.deadline;
        voice.rescue_level = update.rescue_level;
        voice.version = Some(expected_version + 1);
        voice.updated_at = Utc::now();
        let updated = voice.clone();
        tables.decisions.push(record);
        Ok(updated)
    }

    async fn decision_history(&self, voice_id: Uuid) -> Result<Vec<DecisionRecord>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .decisions
            .iter()
            .filter(|d| d.voice_id == voice_id)
            .cloned()
            .collect())
    }

    async fn apply_expiration(
        &self,
        record: ExpirationRecord,
        update: VoiceUpdate,
        expected_version: i64,
    ) -> Result<Voice, AppError> {
        let mut tables = self.tables.write().await;
        let voice = tables
            .voices
            .get_mut(&record.voice_id)
            .ok_or_else(|| AppError::NotFound(format!("Voice {} not found", record.voice_id)))?;
        Self::check_version(voice, expected_version)?;

        voice.status = update.status;
        voice.level = update.level;
        voice.deadline = update.deadline;
        voice.rescue_level = update.rescue_level;
        voice.version = Some(expected_version + 1);
        voice.updated_at = Utc::now();
        let updated = voice.clone();
        tables.expirations.push(record);
        Ok(updated)
    }

    async fn expiration_history(&self, voice_id: Uuid) -> Result<Vec<ExpirationRecord>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .expirations
            .iter()
            .filter(|e| e.voice_id == voice_id)
            .cloned()
            .collect())
    }

    async fn list_deadline_lapsed(&self, now: DateTime<Utc>) -> Result<Vec<Voice>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .voices
            .values()
            .filter(|v| matches!(v.status, VoiceStatus::InReview | VoiceStatus::Accepted))
            .filter(|v| v.deadline < now)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::{TierRole, VoteStance};
    use chrono::Duration;

    fn sample_voice() -> Voice {
        Voice::new(
            Uuid::new_v4(),
            "nursing".to_string(),
            "east_clinic".to_string(),
            "meridian_health".to_string(),
            "general".to_string(),
            "Shared supply room".to_string(),
            "Pool consumable supplies across wards".to_string(),
            Utc::now() + Duration::days(30),
        )
    }

    #[tokio::test]
    async fn test_commit_vote_bumps_version() {
        let repo = MemoryRepository::new();
        let voice = repo.create_voice(sample_voice()).await.unwrap();
        let vote = Vote::new(voice.id, Uuid::new_v4(), VoteStance::Support);

        let updated = repo
            .commit_vote(vote, 10.0, 10.0, AgendaLevel::Pending, 1)
            .await
            .unwrap();
        assert_eq!(updated.version, Some(2));
        assert_eq!(updated.score, 10.0);
        assert_eq!(repo.list_votes(voice.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_version_conflicts_and_drops_vote() {
        let repo = MemoryRepository::new();
        let voice = repo.create_voice(sample_voice()).await.unwrap();

        let first = Vote::new(voice.id, Uuid::new_v4(), VoteStance::Support);
        repo.commit_vote(first, 10.0, 10.0, AgendaLevel::Pending, 1)
            .await
            .unwrap();

        // Second writer still holds version 1
        let second = Vote::new(voice.id, Uuid::new_v4(), VoteStance::Oppose);
        let result = repo
            .commit_vote(second, 5.0, 5.0, AgendaLevel::Pending, 1)
            .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(repo.list_votes(voice.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_racing_decisions_exactly_one_wins() {
        let repo = MemoryRepository::new();
        let voice = repo.create_voice(sample_voice()).await.unwrap();

        let update = VoiceUpdate {
            status: VoiceStatus::InReview,
            level: AgendaLevel::DeptReview,
            deadline: voice.deadline,
            rescue_level: None,
        };
        let record = |voice_id| DecisionRecord {
            id: Uuid::new_v4(),
            voice_id,
            decision: crate::voice::DecisionType::RecommendToManager,
            decider_id: Uuid::new_v4(),
            decider_role: TierRole::Supervisor,
            reason: "Worth the manager's attention".to_string(),
            committee_id: None,
            decided_at: Utc::now(),
        };

        // Both deciders observed version 1
        let first = repo
            .apply_decision(record(voice.id), update.clone(), 1)
            .await;
        let second = repo
            .apply_decision(record(voice.id), update.clone(), 1)
            .await;

        assert!(first.is_ok());
        assert!(matches!(second, Err(AppError::Conflict(_))));
        assert_eq!(repo.decision_history(voice.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_deadline_lapsed_listing_skips_settled_voices() {
        let repo = MemoryRepository::new();
        let mut expired = sample_voice();
        expired.deadline = Utc::now() - Duration::days(3);
        let expired = repo.create_voice(expired).await.unwrap();

        let mut rejected = sample_voice();
        rejected.deadline = Utc::now() - Duration::days(3);
        rejected.status = VoiceStatus::Rejected;
        repo.create_voice(rejected).await.unwrap();

        repo.create_voice(sample_voice()).await.unwrap();

        let lapsed = repo.list_deadline_lapsed(Utc::now()).await.unwrap();
        assert_eq!(lapsed.len(), 1);
        assert_eq!(lapsed[0].id, expired.id);
    }
}
