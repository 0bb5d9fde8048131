//! Escalation service
//!
//! Orchestrates the engine parts against the repository, directory, and
//! notification collaborators. Vote commits run an optimistic-concurrency
//! retry loop; decision application is single-shot and surfaces `Conflict`
//! to the caller, who re-fetches. Decisions are idempotent per decision id.

use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::directory::OrgDirectory;
use crate::engine::config::ConfigStore;
use crate::engine::decision::{self, TransitionOutcome};
use crate::engine::expiration::{self, ExpirationSummary};
use crate::engine::levels::{self, AgendaLevel, NextLevelProgress};
use crate::engine::scoring::{self, ConsensusBreakdown};
use crate::engine::visibility::{self, Permissions};
use crate::error::AppError;
use crate::notify::NotificationDispatcher;
use crate::repository::{Repository, VoiceUpdate};
use crate::voice::{
    DecisionRecord, DecisionType, ExpirationRecord, ExpirationResolution, Voice, VoiceStatus, Vote,
    VoteStance,
};

/// Bounded retries for the vote commit loop; each attempt re-reads the
/// voice, so a loss here means heavy contention and the caller should back off.
const VOTE_COMMIT_ATTEMPTS: usize = 3;

/// A new voice submission
#[derive(Debug, Clone)]
pub struct NewVoice {
    pub author_id: Uuid,
    pub department: String,
    pub facility: String,
    pub corporation: String,
    pub category: String,
    pub title: String,
    pub body: String,
}

/// Result of one accepted vote
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteOutcome {
    pub voice: Voice,
    pub contribution: f64,
    pub previous_level: AgendaLevel,
    pub level_changed: bool,
    pub consensus: ConsensusBreakdown,
}

/// A decision command, carrying its idempotency key
#[derive(Debug, Clone)]
pub struct DecisionCommand {
    pub decision_id: Uuid,
    pub voice_id: Uuid,
    pub decision: DecisionType,
    pub decider_id: Uuid,
    pub reason: String,
    pub committee_id: Option<Uuid>,
}

/// Result of an applied (or already-applied) decision
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionOutcome {
    pub voice: Voice,
    pub message: String,
    pub notifications_sent: u32,
    pub notifications_failed: u32,
    /// False when the decision id had already been applied
    pub applied: bool,
}

/// Progress report for displays
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub voice_id: Uuid,
    pub level: AgendaLevel,
    pub status: VoiceStatus,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_level: Option<NextLevelProgress>,
    pub consensus: ConsensusBreakdown,
}

pub struct EscalationService {
    repository: Arc<dyn Repository>,
    directory: Arc<dyn OrgDirectory>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    config: Arc<ConfigStore>,
}

impl EscalationService {
    pub fn new(
        repository: Arc<dyn Repository>,
        directory: Arc<dyn OrgDirectory>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        config: Arc<ConfigStore>,
    ) -> Self {
        Self {
            repository,
            directory,
            dispatcher,
            config,
        }
    }

    /// Submit a new voice. It starts pending with score zero and a voting
    /// window taken from the active configuration.
    pub async fn submit_voice(&self, new_voice: NewVoice) -> Result<Voice, AppError> {
        if new_voice.title.trim().is_empty() {
            return Err(AppError::Validation("Voice title must not be empty".to_string()));
        }
        let config = self.config.current().await;
        let deadline = Utc::now() + Duration::days(config.voting_period_days);
        let voice = Voice::new(
            new_voice.author_id,
            new_voice.department,
            new_voice.facility,
            new_voice.corporation,
            new_voice.category,
            new_voice.title,
            new_voice.body,
            deadline,
        );
        let voice = self.repository.create_voice(voice).await?;
        info!(voice = %voice.id, department = %voice.department, "🗣️ Voice submitted");
        Ok(voice)
    }

    pub async fn get_voice(&self, voice_id: Uuid) -> Result<Voice, AppError> {
        self.repository.get_voice(voice_id).await
    }

    pub async fn list_voices(
        &self,
        filter: crate::repository::VoiceFilter,
    ) -> Result<Vec<Voice>, AppError> {
        self.repository.list_voices(filter).await
    }

    /// Record a vote: compute its contribution, then commit vote, score and
    /// level in one atomic step. Retries the commit when another vote wins
    /// the race, re-reading the voice each attempt.
    pub async fn cast_vote(
        &self,
        voice_id: Uuid,
        voter_id: Uuid,
        stance: VoteStance,
    ) -> Result<VoteOutcome, AppError> {
        let config = self.config.current().await;
        let profile = self.directory.voter_profile(voter_id).await?;

        let mut last_error = None;
        for _ in 0..VOTE_COMMIT_ATTEMPTS {
            let voice = self.repository.get_voice(voice_id).await?;
            if !voice.status.is_active() {
                return Err(AppError::InvalidTransition(format!(
                    "Voice {} is {} and no longer accepts votes",
                    voice.id,
                    voice.status.as_str()
                )));
            }

            let facts = self.directory.viewer_facts(voter_id, &voice).await?;
            let permissions = visibility::permissions(voice.level, facts);
            if !permissions.can_vote {
                return Err(AppError::Validation(
                    permissions
                        .restriction_reason
                        .unwrap_or_else(|| "Voting is not open to this viewer".to_string()),
                ));
            }

            let contribution =
                scoring::contribution(stance, &profile, &voice.category, &config)?;
            let headcount = self
                .directory
                .department_headcount(&voice.department)
                .await?;
            let new_raw = voice.raw_score + contribution;
            let new_score = scoring::effective_score(new_raw, headcount, &config);
            // Decision-set levels are never demoted by reclassification
            let classified = levels::classify(new_score, &voice.department, &config);
            let new_level = voice.level.max(classified);

            let vote = Vote::new(voice_id, voter_id, stance);
            let expected_version = voice.version.unwrap_or(1);
            match self
                .repository
                .commit_vote(vote, new_raw, new_score, new_level, expected_version)
                .await
            {
                Ok(updated) => {
                    if updated.level != voice.level {
                        info!(
                            voice = %updated.id,
                            from = voice.level.as_str(),
                            to = updated.level.as_str(),
                            score = updated.score,
                            "📈 Voice escalated by score"
                        );
                    }
                    let votes = self.repository.list_votes(voice_id).await?;
                    return Ok(VoteOutcome {
                        contribution,
                        previous_level: voice.level,
                        level_changed: updated.level != voice.level,
                        consensus: scoring::consensus_breakdown(&votes),
                        voice: updated,
                    });
                }
                Err(AppError::Conflict(msg)) => {
                    last_error = Some(AppError::Conflict(msg));
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            AppError::Conflict(format!("Vote on voice {} lost every commit attempt", voice_id))
        }))
    }

    /// Apply a tier decision. Idempotent per decision id; `Conflict` when a
    /// concurrent decision won the version race.
    pub async fn execute_decision(
        &self,
        command: DecisionCommand,
    ) -> Result<DecisionOutcome, AppError> {
        if command.reason.trim().is_empty() {
            return Err(AppError::Validation(
                "A decision requires a reason".to_string(),
            ));
        }

        // At-least-once delivery: a known id short-circuits to a no-op
        if let Some(existing) = self.repository.find_decision(command.decision_id).await? {
            let voice = self.repository.get_voice(existing.voice_id).await?;
            return Ok(DecisionOutcome {
                voice,
                message: format!(
                    "Decision '{}' was already applied",
                    existing.decision.as_str()
                ),
                notifications_sent: 0,
                notifications_failed: 0,
                applied: false,
            });
        }

        let voice = self.repository.get_voice(command.voice_id).await?;
        let role = self
            .directory
            .decider_role(command.decider_id)
            .await?
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "Decider {} holds no governance tier",
                    command.decider_id
                ))
            })?;

        let outcome: TransitionOutcome =
            decision::evaluate(&voice, role, command.decision, command.committee_id)?;

        let record = DecisionRecord {
            id: command.decision_id,
            voice_id: voice.id,
            decision: command.decision,
            decider_id: command.decider_id,
            decider_role: role,
            reason: command.reason,
            committee_id: command.committee_id,
            decided_at: Utc::now(),
        };
        let update = VoiceUpdate {
            status: outcome.status,
            level: outcome.level,
            deadline: outcome.deadline,
            rescue_level: outcome.rescue_level,
        };
        let expected_version = voice.version.unwrap_or(1);
        let updated = self
            .repository
            .apply_decision(record.clone(), update, expected_version)
            .await?;

        info!(
            voice = %updated.id,
            decision = command.decision.as_str(),
            role = role.as_str(),
            level = updated.level.as_str(),
            status = updated.status.as_str(),
            "⚖️ Decision applied"
        );

        // Fan-out is decoupled from the decision itself: failures are
        // reported, never rolled back.
        let notification = self
            .dispatcher
            .notify(outcome.audience, &updated, &record)
            .await;

        Ok(DecisionOutcome {
            message: format!(
                "Decision '{}' applied; voice is now {} at {}",
                command.decision.as_str(),
                updated.status.as_str(),
                updated.level.as_str()
            ),
            voice: updated,
            notifications_sent: notification.sent,
            notifications_failed: notification.failed,
            applied: true,
        })
    }

    /// Resolve a voice whose deadline lapsed below its target score
    pub async fn resolve_expiration(
        &self,
        voice_id: Uuid,
        resolution: ExpirationResolution,
        reason: &str,
        decider_id: Uuid,
    ) -> Result<ExpirationRecord, AppError> {
        let config = self.config.current().await;
        let voice = self.repository.get_voice(voice_id).await?;

        let role = self
            .directory
            .decider_role(decider_id)
            .await?
            .ok_or_else(|| {
                AppError::Validation(format!("Decider {} holds no governance tier", decider_id))
            })?;
        let required = decision::tier_for_level(voice.level);
        if role != required {
            return Err(AppError::InvalidTransition(format!(
                "Expired voice {} awaits the {} tier, not {}",
                voice.id,
                required.as_str(),
                role.as_str()
            )));
        }

        let outcome =
            expiration::resolve(&voice, resolution, reason, decider_id, Utc::now(), &config)?;
        let update = VoiceUpdate {
            status: outcome.status,
            level: outcome.level,
            // Resolution does not re-open voting
            deadline: voice.deadline,
            rescue_level: voice.rescue_level,
        };
        let expected_version = voice.version.unwrap_or(1);
        self.repository
            .apply_expiration(outcome.record.clone(), update, expected_version)
            .await?;

        info!(
            voice = %voice.id,
            resolution = resolution.as_str(),
            achievement = outcome.record.achievement_rate,
            "⏰ Expired voice resolved"
        );
        Ok(outcome.record)
    }

    /// Expired voices awaiting a forced decision, as of `now`. Driven by a
    /// periodic external scan; each entry is independent and restart-safe.
    pub async fn scan_expired(&self) -> Result<Vec<ExpirationSummary>, AppError> {
        let config = self.config.current().await;
        let now = Utc::now();
        let lapsed = self.repository.list_deadline_lapsed(now).await?;
        Ok(lapsed
            .iter()
            .filter_map(|voice| expiration::summarize(voice, now, &config))
            .collect())
    }

    /// Permissions for one viewer/voice pair. Recomputed on every call —
    /// never cached, because a score update can change every viewer's answer.
    pub async fn permissions_for(
        &self,
        voice_id: Uuid,
        viewer_id: Uuid,
    ) -> Result<Permissions, AppError> {
        let voice = self.repository.get_voice(voice_id).await?;
        let facts = self.directory.viewer_facts(viewer_id, &voice).await?;
        Ok(visibility::permissions(voice.level, facts))
    }

    pub async fn progress(&self, voice_id: Uuid) -> Result<ProgressReport, AppError> {
        let config = self.config.current().await;
        let voice = self.repository.get_voice(voice_id).await?;
        let votes = self.repository.list_votes(voice_id).await?;
        Ok(ProgressReport {
            voice_id: voice.id,
            level: voice.level,
            status: voice.status,
            score: voice.score,
            next_level: levels::points_to_next_level(voice.score, &voice.department, &config),
            consensus: scoring::consensus_breakdown(&votes),
        })
    }

    pub async fn decision_history(&self, voice_id: Uuid) -> Result<Vec<DecisionRecord>, AppError> {
        // Existence check keeps NotFound distinguishable from empty history
        self.repository.get_voice(voice_id).await?;
        self.repository.decision_history(voice_id).await
    }

    pub async fn expiration_history(
        &self,
        voice_id: Uuid,
    ) -> Result<Vec<ExpirationRecord>, AppError> {
        self.repository.get_voice(voice_id).await?;
        self.repository.expiration_history(voice_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{MemberRecord, StaticDirectory};
    use crate::engine::config::EngineConfig;
    use crate::notify::LoggingDispatcher;
    use crate::repository::MemoryRepository;
    use crate::voice::{TierRole, VoterProfile};
    use pretty_assertions::assert_eq;

    struct Fixture {
        service: EscalationService,
        repository: Arc<MemoryRepository>,
        directory: Arc<StaticDirectory>,
    }

    fn fixture() -> Fixture {
        // Flat department scaling keeps the score arithmetic of these tests
        // independent of seeded headcounts.
        let mut config = EngineConfig::default();
        config.department_size_bands.clear();

        let repository = Arc::new(MemoryRepository::new());
        let directory = Arc::new(StaticDirectory::new());
        let service = EscalationService::new(
            repository.clone(),
            directory.clone(),
            Arc::new(LoggingDispatcher::new()),
            Arc::new(ConfigStore::new(config)),
        );
        Fixture {
            service,
            repository,
            directory,
        }
    }

    async fn seed_member(
        directory: &StaticDirectory,
        tier: &str,
        department: &str,
        role: Option<TierRole>,
        is_manager: bool,
    ) -> Uuid {
        let user_id = Uuid::new_v4();
        directory
            .insert(MemberRecord {
                profile: VoterProfile {
                    user_id,
                    permission_tier: tier.to_string(),
                    profession: None,
                    years_of_experience: 0,
                    certifications: vec![],
                },
                department: department.to_string(),
                facility: "east_clinic".to_string(),
                corporation: "meridian_health".to_string(),
                role,
                is_manager,
            })
            .await;
        user_id
    }

    async fn seed_voice(fixture: &Fixture) -> Voice {
        let author = seed_member(&fixture.directory, "staff", "nursing", None, false).await;
        fixture
            .service
            .submit_voice(NewVoice {
                author_id: author,
                department: "nursing".to_string(),
                facility: "east_clinic".to_string(),
                corporation: "meridian_health".to_string(),
                category: "general".to_string(),
                title: "Quiet hours on recovery wards".to_string(),
                body: "Introduce protected quiet hours for patient recovery".to_string(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_vote_updates_score_and_consensus() {
        let fixture = fixture();
        let voice = seed_voice(&fixture).await;
        let voter = seed_member(&fixture.directory, "staff", "nursing", None, false).await;

        let outcome = fixture
            .service
            .cast_vote(voice.id, voter, VoteStance::StronglySupport)
            .await
            .unwrap();

        assert_eq!(outcome.contribution, 10.0);
        assert_eq!(outcome.voice.score, 10.0);
        assert_eq!(outcome.consensus.support, 1);
        assert!(!outcome.level_changed);
    }

    #[tokio::test]
    async fn test_score_crossing_band_reclassifies_without_decision() {
        let fixture = fixture();
        let voice = seed_voice(&fixture).await;

        // Walk the score to 45: DeptReview band (30-49)
        for _ in 0..4 {
            let voter = seed_member(&fixture.directory, "staff", "nursing", None, false).await;
            fixture
                .service
                .cast_vote(voice.id, voter, VoteStance::StronglySupport)
                .await
                .unwrap();
        }
        let voter = seed_member(&fixture.directory, "staff", "nursing", None, false).await;
        let outcome = fixture
            .service
            .cast_vote(voice.id, voter, VoteStance::Support)
            .await
            .unwrap();
        assert_eq!(outcome.voice.score, 45.0);
        assert_eq!(outcome.voice.level, AgendaLevel::DeptReview);

        // +10 crosses into the 50-99 band
        let voter = seed_member(&fixture.directory, "staff", "nursing", None, false).await;
        let outcome = fixture
            .service
            .cast_vote(voice.id, voter, VoteStance::StronglySupport)
            .await
            .unwrap();
        assert_eq!(outcome.voice.score, 55.0);
        assert_eq!(outcome.voice.level, AgendaLevel::DeptAgenda);
        assert!(outcome.level_changed);
    }

    #[tokio::test]
    async fn test_outside_department_vote_is_refused() {
        let fixture = fixture();
        let voice = seed_voice(&fixture).await;
        let outsider = seed_member(&fixture.directory, "staff", "pharmacy", None, false).await;

        let result = fixture
            .service
            .cast_vote(voice.id, outsider, VoteStance::Support)
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_decision_is_idempotent_per_id() {
        let fixture = fixture();
        let voice = seed_voice(&fixture).await;
        let supervisor = seed_member(
            &fixture.directory,
            "chief",
            "nursing",
            Some(TierRole::Supervisor),
            false,
        )
        .await;

        let command = DecisionCommand {
            decision_id: Uuid::new_v4(),
            voice_id: voice.id,
            decision: DecisionType::RecommendToManager,
            decider_id: supervisor,
            reason: "Worth the manager's attention".to_string(),
            committee_id: None,
        };

        let first = fixture.service.execute_decision(command.clone()).await.unwrap();
        assert!(first.applied);
        assert_eq!(first.voice.level, AgendaLevel::DeptReview);
        assert_eq!(first.notifications_sent, 1);

        let second = fixture.service.execute_decision(command).await.unwrap();
        assert!(!second.applied);
        assert_eq!(second.voice.level, AgendaLevel::DeptReview);
        assert_eq!(second.notifications_sent, 0);

        let history = fixture.service.decision_history(voice.id).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_decider_without_tier_is_refused() {
        let fixture = fixture();
        let voice = seed_voice(&fixture).await;
        let civilian = seed_member(&fixture.directory, "staff", "nursing", None, false).await;

        let result = fixture
            .service
            .execute_decision(DecisionCommand {
                decision_id: Uuid::new_v4(),
                voice_id: voice.id,
                decision: DecisionType::Reject,
                decider_id: civilian,
                reason: "I simply do not like it".to_string(),
                committee_id: None,
            })
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_rescue_journey_records_rescue_level() {
        let fixture = fixture();
        let voice = seed_voice(&fixture).await;
        let supervisor = seed_member(
            &fixture.directory,
            "chief",
            "nursing",
            Some(TierRole::Supervisor),
            false,
        )
        .await;
        let manager = seed_member(
            &fixture.directory,
            "manager",
            "nursing",
            Some(TierRole::Manager),
            true,
        )
        .await;
        let deputy = seed_member(
            &fixture.directory,
            "facility_director",
            "administration",
            Some(TierRole::DeputyDirector),
            true,
        )
        .await;

        let decide = |decision, decider| DecisionCommand {
            decision_id: Uuid::new_v4(),
            voice_id: voice.id,
            decision,
            decider_id: decider,
            reason: "Escalation path exercise".to_string(),
            committee_id: None,
        };

        // Supervisor -> manager escalates to facility -> deputy rejects
        fixture
            .service
            .execute_decision(decide(DecisionType::RecommendToManager, supervisor))
            .await
            .unwrap();
        fixture
            .service
            .execute_decision(decide(DecisionType::EscalateToFacility, manager))
            .await
            .unwrap();
        let rejected = fixture
            .service
            .execute_decision(decide(DecisionType::Reject, deputy))
            .await
            .unwrap();
        assert_eq!(
            rejected.voice.status,
            VoiceStatus::PendingRescueByManager
        );

        // The manager rescues it back onto the department agenda
        let rescued = fixture
            .service
            .execute_decision(decide(DecisionType::RescueAsDeptAgenda, manager))
            .await
            .unwrap();
        assert_eq!(rescued.voice.level, AgendaLevel::DeptAgenda);
        assert_eq!(rescued.voice.status, VoiceStatus::Accepted);
        assert_eq!(rescued.voice.rescue_level, Some(TierRole::Manager));
    }

    #[tokio::test]
    async fn test_expiration_downgrade_records_achievement() {
        let fixture = fixture();
        let voice = seed_voice(&fixture).await;
        let deputy = seed_member(
            &fixture.directory,
            "facility_director",
            "administration",
            Some(TierRole::DeputyDirector),
            true,
        )
        .await;

        // Force an expired facility-agenda voice at score 250 (target 300)
        {
            let mut stale = fixture.repository.get_voice(voice.id).await.unwrap();
            stale.level = AgendaLevel::FacilityAgenda;
            stale.raw_score = 250.0;
            stale.score = 250.0;
            stale.deadline = Utc::now() - Duration::days(7);
            fixture.repository.create_voice(stale).await.unwrap();
        }

        let summaries = fixture.service.scan_expired().await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].achievement_rate, 83.3);

        let record = fixture
            .service
            .resolve_expiration(
                voice.id,
                ExpirationResolution::Downgrade,
                "Support plateaued below the corporate threshold",
                deputy,
            )
            .await
            .unwrap();
        assert_eq!(record.achievement_rate, 83.3);
        assert_eq!(record.days_overdue, 7);

        let updated = fixture.service.get_voice(voice.id).await.unwrap();
        assert_eq!(updated.level, AgendaLevel::DeptAgenda);
        assert_eq!(updated.status, VoiceStatus::InReview);

        let history = fixture.service.expiration_history(voice.id).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_expiration_requires_the_level_tier() {
        let fixture = fixture();
        let voice = seed_voice(&fixture).await;
        let manager = seed_member(
            &fixture.directory,
            "manager",
            "nursing",
            Some(TierRole::Manager),
            true,
        )
        .await;

        {
            let mut stale = fixture.repository.get_voice(voice.id).await.unwrap();
            stale.level = AgendaLevel::FacilityAgenda;
            stale.score = 120.0;
            stale.raw_score = 120.0;
            stale.deadline = Utc::now() - Duration::days(2);
            fixture.repository.create_voice(stale).await.unwrap();
        }

        // Facility-agenda expirations belong to the deputy director
        let result = fixture
            .service
            .resolve_expiration(
                voice.id,
                ExpirationResolution::Reject,
                "Not my call but attempting anyway",
                manager,
            )
            .await;
        assert!(matches!(result, Err(AppError::InvalidTransition(_))));
    }
}
