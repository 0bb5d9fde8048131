//! Deadline expiration resolution
//!
//! A voice whose deadline lapses below its target score gets a forced human
//! decision from a constrained vocabulary: approve at the current level,
//! downgrade one level, or reject. The target is the next level's threshold;
//! the top level has no target and never expires.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::engine::config::EngineConfig;
use crate::engine::levels::{self, AgendaLevel};
use crate::error::AppError;
use crate::voice::{ExpirationRecord, ExpirationResolution, Voice, VoiceStatus};

/// Shortest reason accepted for an expiration decision. Callers validate
/// this up front; the resolver re-checks as a safety net.
pub const MIN_REASON_LEN: usize = 10;

/// Target score for a voice's current tier: the bound of the next level
pub fn target_score(voice: &Voice, config: &EngineConfig) -> Option<f64> {
    let next = voice.level.next()?;
    Some(levels::bound_for(next, &voice.department, config))
}

/// Whether the voice has expired below target as of `now`
pub fn is_expired(voice: &Voice, now: DateTime<Utc>, config: &EngineConfig) -> bool {
    if !voice.status.is_active() {
        return false;
    }
    let Some(target) = target_score(voice, config) else {
        return false;
    };
    now > voice.deadline && voice.score < target
}

/// current / target * 100, one decimal. Display only.
pub fn achievement_rate(current: f64, target: f64) -> f64 {
    if target <= 0.0 {
        return 0.0;
    }
    (current / target * 1000.0).round() / 10.0
}

/// Summary handed to the deciding role when a voice expires
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpirationSummary {
    pub voice_id: Uuid,
    pub level: AgendaLevel,
    pub current_score: f64,
    pub target_score: f64,
    pub achievement_rate: f64,
    pub days_overdue: i64,
    pub allowed_resolutions: [ExpirationResolution; 3],
}

pub fn summarize(voice: &Voice, now: DateTime<Utc>, config: &EngineConfig) -> Option<ExpirationSummary> {
    if !is_expired(voice, now, config) {
        return None;
    }
    let target = target_score(voice, config)?;
    Some(ExpirationSummary {
        voice_id: voice.id,
        level: voice.level,
        current_score: voice.score,
        target_score: target,
        achievement_rate: achievement_rate(voice.score, target),
        days_overdue: (now - voice.deadline).num_days(),
        allowed_resolutions: [
            ExpirationResolution::ApproveAtCurrentLevel,
            ExpirationResolution::Downgrade,
            ExpirationResolution::Reject,
        ],
    })
}

/// The state an expiration resolution produces, plus its history record
#[derive(Debug, Clone)]
pub struct ExpirationOutcome {
    pub status: VoiceStatus,
    pub level: AgendaLevel,
    pub record: ExpirationRecord,
}

/// Validate and compute an expiration resolution. Does not mutate the
/// voice and does not re-open voting; persistence is the caller's job.
pub fn resolve(
    voice: &Voice,
    resolution: ExpirationResolution,
    reason: &str,
    decider_id: Uuid,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> Result<ExpirationOutcome, AppError> {
    if reason.trim().chars().count() < MIN_REASON_LEN {
        return Err(AppError::Validation(format!(
            "Expiration reason must be at least {} characters",
            MIN_REASON_LEN
        )));
    }
    if !is_expired(voice, now, config) {
        return Err(AppError::InvalidTransition(format!(
            "Voice {} has not expired below its target",
            voice.id
        )));
    }
    // is_expired only passes for levels that have a next bound
    let target = target_score(voice, config).ok_or_else(|| {
        AppError::InvalidTransition(format!("Voice {} has no target score", voice.id))
    })?;

    let (status, level) = match resolution {
        ExpirationResolution::ApproveAtCurrentLevel => (VoiceStatus::Accepted, voice.level),
        ExpirationResolution::Downgrade => {
            let lower = voice.level.previous().ok_or_else(|| {
                AppError::InvalidTransition(
                    "A pending voice has no lower level to downgrade to".to_string(),
                )
            })?;
            (VoiceStatus::InReview, lower)
        }
        ExpirationResolution::Reject => (VoiceStatus::Rejected, voice.level),
    };

    let record = ExpirationRecord {
        id: Uuid::new_v4(),
        voice_id: voice.id,
        decider_id,
        level: voice.level,
        current_score: voice.score,
        target_score: target,
        achievement_rate: achievement_rate(voice.score, target),
        days_overdue: (now - voice.deadline).num_days(),
        resolution,
        reason: reason.to_string(),
        resolved_at: now,
    };

    Ok(ExpirationOutcome {
        status,
        level,
        record,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn expired_voice(level: AgendaLevel, score: f64) -> Voice {
        let mut voice = Voice::new(
            Uuid::new_v4(),
            "nursing".to_string(),
            "east_clinic".to_string(),
            "meridian_health".to_string(),
            "patient_safety".to_string(),
            "Night shift staffing review".to_string(),
            "Review staffing ratios for night shifts".to_string(),
            Utc::now() - Duration::days(14),
        );
        voice.level = level;
        voice.score = score;
        voice
    }

    #[test]
    fn test_targets_follow_next_level_bound() {
        let config = EngineConfig::default();
        let voice = expired_voice(AgendaLevel::DeptAgenda, 0.0);
        assert_eq!(target_score(&voice, &config), Some(100.0));
        let voice = expired_voice(AgendaLevel::FacilityAgenda, 0.0);
        assert_eq!(target_score(&voice, &config), Some(300.0));
        let voice = expired_voice(AgendaLevel::CorpReview, 0.0);
        assert_eq!(target_score(&voice, &config), Some(600.0));
        let voice = expired_voice(AgendaLevel::CorpAgenda, 0.0);
        assert_eq!(target_score(&voice, &config), None);
    }

    #[test]
    fn test_top_level_never_expires() {
        let config = EngineConfig::default();
        let voice = expired_voice(AgendaLevel::CorpAgenda, 100.0);
        assert!(!is_expired(&voice, Utc::now(), &config));
    }

    #[test]
    fn test_voice_at_target_does_not_expire() {
        let config = EngineConfig::default();
        let voice = expired_voice(AgendaLevel::FacilityAgenda, 300.0);
        assert!(!is_expired(&voice, Utc::now(), &config));
    }

    #[test]
    fn test_downgrade_from_facility_agenda() {
        // Facility-agenda voice, target 300, stalls at 250: 83.3%.
        let config = EngineConfig::default();
        let voice = expired_voice(AgendaLevel::FacilityAgenda, 250.0);
        let outcome = resolve(
            &voice,
            ExpirationResolution::Downgrade,
            "Support plateaued well below the corporate threshold",
            Uuid::new_v4(),
            Utc::now(),
            &config,
        )
        .unwrap();

        assert_eq!(outcome.level, AgendaLevel::DeptAgenda);
        assert_eq!(outcome.status, VoiceStatus::InReview);
        assert_eq!(outcome.record.achievement_rate, 83.3);
        assert_eq!(outcome.record.target_score, 300.0);
        assert_eq!(outcome.record.days_overdue, 14);
    }

    #[test]
    fn test_approve_at_current_level_keeps_level() {
        let config = EngineConfig::default();
        let voice = expired_voice(AgendaLevel::DeptAgenda, 60.0);
        let outcome = resolve(
            &voice,
            ExpirationResolution::ApproveAtCurrentLevel,
            "Strong departmental consensus despite the stall",
            Uuid::new_v4(),
            Utc::now(),
            &config,
        )
        .unwrap();
        assert_eq!(outcome.level, AgendaLevel::DeptAgenda);
        assert_eq!(outcome.status, VoiceStatus::Accepted);
    }

    #[test]
    fn test_reject_is_terminal() {
        let config = EngineConfig::default();
        let voice = expired_voice(AgendaLevel::CorpReview, 100.0);
        let outcome = resolve(
            &voice,
            ExpirationResolution::Reject,
            "No realistic path to the corporate agenda",
            Uuid::new_v4(),
            Utc::now(),
            &config,
        )
        .unwrap();
        assert_eq!(outcome.status, VoiceStatus::Rejected);
    }

    #[test]
    fn test_short_reason_rejected_as_safety_net() {
        let config = EngineConfig::default();
        let voice = expired_voice(AgendaLevel::FacilityAgenda, 250.0);
        let result = resolve(
            &voice,
            ExpirationResolution::Reject,
            "too slow",
            Uuid::new_v4(),
            Utc::now(),
            &config,
        );
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_unexpired_voice_cannot_be_resolved() {
        let config = EngineConfig::default();
        let mut voice = expired_voice(AgendaLevel::FacilityAgenda, 250.0);
        voice.deadline = Utc::now() + Duration::days(5);
        let result = resolve(
            &voice,
            ExpirationResolution::Reject,
            "Deadline has not actually lapsed yet",
            Uuid::new_v4(),
            Utc::now(),
            &config,
        );
        assert!(matches!(result, Err(AppError::InvalidTransition(_))));
    }

    #[test]
    fn test_achievement_rate_rounding() {
        assert_eq!(achievement_rate(250.0, 300.0), 83.3);
        assert_eq!(achievement_rate(100.0, 300.0), 33.3);
        assert_eq!(achievement_rate(300.0, 300.0), 100.0);
        assert_eq!(achievement_rate(50.0, 0.0), 0.0);
    }
}
