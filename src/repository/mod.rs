//! Repository contract
//!
//! The engine's only window onto durable state. Score/level writes and
//! decision applications are version-guarded so read-modify-write races
//! cannot lose contributions or let two deciders both succeed. Errors
//! distinguish not-found, conflict, and store-unavailable so callers know
//! what is retryable.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::engine::levels::AgendaLevel;
use crate::error::AppError;
use crate::voice::{DecisionRecord, ExpirationRecord, TierRole, Voice, VoiceStatus, Vote};

pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;

/// State written to a voice by a decision or expiration resolution.
/// Applied atomically together with the version bump.
#[derive(Debug, Clone)]
pub struct VoiceUpdate {
    pub status: VoiceStatus,
    pub level: AgendaLevel,
    pub deadline: DateTime<Utc>,
    pub rescue_level: Option<TierRole>,
}

/// Listing filter for voices
#[derive(Debug, Clone, Default)]
pub struct VoiceFilter {
    pub department: Option<String>,
    pub facility: Option<String>,
    pub status: Option<VoiceStatus>,
    pub level: Option<AgendaLevel>,
}

#[async_trait]
pub trait Repository: Send + Sync {
    async fn create_voice(&self, voice: Voice) -> Result<Voice, AppError>;

    async fn get_voice(&self, id: Uuid) -> Result<Voice, AppError>;

    async fn list_voices(&self, filter: VoiceFilter) -> Result<Vec<Voice>, AppError>;

    async fn list_votes(&self, voice_id: Uuid) -> Result<Vec<Vote>, AppError>;

    /// Append a vote and write the new score/level in one atomic step,
    /// guarded by the caller-observed version. Returns `Conflict` when the
    /// version no longer matches; the vote is then NOT recorded.
    async fn commit_vote(
        &self,
        vote: Vote,
        new_raw_score: f64,
        new_score: f64,
        new_level: AgendaLevel,
        expected_version: i64,
    ) -> Result<Voice, AppError>;

    /// Fetch a previously applied decision by its idempotency key
    async fn find_decision(&self, decision_id: Uuid) -> Result<Option<DecisionRecord>, AppError>;

    /// Record a decision and apply its state update atomically, guarded by
    /// the caller-observed version. Exactly one of two racing deciders
    /// succeeds; the other gets `Conflict` and the voice is unchanged.
    async fn apply_decision(
        &self,
        record: DecisionRecord,
        update: VoiceUpdate,
        expected_version: i64,
    ) -> Result<Voice, AppError>;

    async fn decision_history(&self, voice_id: Uuid) -> Result<Vec<DecisionRecord>, AppError>;

    /// Record an expiration resolution and apply its state update
    /// atomically, with the same version guard as decisions.
    async fn apply_expiration(
        &self,
        record: ExpirationRecord,
        update: VoiceUpdate,
        expected_version: i64,
    ) -> Result<Voice, AppError>;

    async fn expiration_history(&self, voice_id: Uuid) -> Result<Vec<ExpirationRecord>, AppError>;

    /// Active voices whose deadline lies strictly before `now`. The target
    /// comparison happens in the engine, which owns the config.
    async fn list_deadline_lapsed(&self, now: DateTime<Utc>) -> Result<Vec<Voice>, AppError>;
}
