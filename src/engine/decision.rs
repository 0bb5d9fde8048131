//! Decision state machine
//!
//! Five governance tiers, each with its own decision vocabulary. The rule set
//! is a static table mapping (tier role, decision type) to a required prior
//! status and a resulting state, checked generically — no per-decision
//! branching. A rejection above the manager tier cascades into a
//! "pending rescue" sub-state naming the tier below, which may rescue the
//! voice (demote but keep alive) or pass it further down; the manager tier is
//! the floor and confirms rejections terminally.

use chrono::Duration;
use once_cell::sync::Lazy;

use crate::engine::levels::AgendaLevel;
use crate::error::AppError;
use crate::voice::{AudienceScope, DecisionType, TierRole, Voice, VoiceStatus};

/// Prior-status requirement of a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusRule {
    /// Voice must be actively decidable (in review or accepted)
    Active,
    /// Voice must sit in exactly this rescue-pending sub-state
    RescuePending(TierRole),
    /// Either actively decidable or pending rescue by this tier
    ActiveOrRescuePending(TierRole),
}

impl StatusRule {
    fn accepts(&self, status: VoiceStatus) -> bool {
        match self {
            StatusRule::Active => status.is_active(),
            StatusRule::RescuePending(role) => status.rescue_tier() == Some(*role),
            StatusRule::ActiveOrRescuePending(role) => {
                status.is_active() || status.rescue_tier() == Some(*role)
            }
        }
    }
}

/// One row of the transition table
#[derive(Debug, Clone, Copy)]
pub struct TransitionRule {
    pub role: TierRole,
    pub decision: DecisionType,
    pub requires: StatusRule,
    pub new_status: VoiceStatus,
    /// Level the decision sets; `None` leaves the level unchanged
    pub new_level: Option<AgendaLevel>,
    /// Days added to the current deadline
    pub extend_deadline_days: Option<i64>,
    /// Record the acting tier as the voice's rescue level
    pub records_rescue: bool,
    /// A target committee reference is mandatory
    pub requires_committee: bool,
}

static TRANSITIONS: Lazy<Vec<TransitionRule>> = Lazy::new(|| {
    use AgendaLevel::*;
    use DecisionType::*;
    use TierRole::*;
    use VoiceStatus::*;

    let rule = |role, decision, requires, new_status| TransitionRule {
        role,
        decision,
        requires,
        new_status,
        new_level: None,
        extend_deadline_days: None,
        records_rescue: false,
        requires_committee: false,
    };

    vec![
        // Supervisor: first gate out of pending
        TransitionRule {
            new_level: Some(DeptReview),
            ..rule(Supervisor, RecommendToManager, StatusRule::Active, InReview)
        },
        rule(Supervisor, Reject, StatusRule::Active, Rejected),
        // Manager: owns the department agenda and the rescue floor
        TransitionRule {
            new_level: Some(DeptAgenda),
            ..rule(Manager, ApproveAsDeptAgenda, StatusRule::Active, Accepted)
        },
        TransitionRule {
            new_level: Some(FacilityAgenda),
            extend_deadline_days: Some(60),
            ..rule(Manager, EscalateToFacility, StatusRule::Active, InReview)
        },
        rule(Manager, Reject, StatusRule::Active, Rejected),
        TransitionRule {
            new_level: Some(DeptAgenda),
            records_rescue: true,
            ..rule(
                Manager,
                RescueAsDeptAgenda,
                StatusRule::RescuePending(Manager),
                Accepted,
            )
        },
        rule(
            Manager,
            CompleteRejection,
            StatusRule::RescuePending(Manager),
            Rejected,
        ),
        // Deputy director: facility tier
        TransitionRule {
            new_level: Some(FacilityAgenda),
            requires_committee: true,
            ..rule(
                DeputyDirector,
                ApproveForCommittee,
                StatusRule::ActiveOrRescuePending(DeputyDirector),
                CommitteeBound,
            )
        },
        TransitionRule {
            new_level: Some(CorpReview),
            extend_deadline_days: Some(90),
            ..rule(
                DeputyDirector,
                EscalateToCorpReview,
                StatusRule::Active,
                InReview,
            )
        },
        rule(
            DeputyDirector,
            Reject,
            StatusRule::ActiveOrRescuePending(DeputyDirector),
            PendingRescueByManager,
        ),
        // General affairs: corporate review tier
        TransitionRule {
            new_level: Some(CorpAgenda),
            ..rule(
                GeneralAffairs,
                ApproveAsCorpAgenda,
                StatusRule::Active,
                Accepted,
            )
        },
        TransitionRule {
            new_level: Some(CorpAgenda),
            extend_deadline_days: Some(120),
            ..rule(
                GeneralAffairs,
                EscalateToCorpAgenda,
                StatusRule::Active,
                InReview,
            )
        },
        rule(
            GeneralAffairs,
            Reject,
            StatusRule::ActiveOrRescuePending(GeneralAffairs),
            PendingRescueByDeputyDirector,
        ),
        TransitionRule {
            new_level: Some(FacilityAgenda),
            records_rescue: true,
            ..rule(
                GeneralAffairs,
                RescueAsFacilityAgenda,
                StatusRule::RescuePending(GeneralAffairs),
                Accepted,
            )
        },
        // General affairs director: the corporate agenda itself
        TransitionRule {
            new_level: Some(CorpAgenda),
            ..rule(
                GeneralAffairsDirector,
                ApproveForCorpMeeting,
                StatusRule::Active,
                BoardBound,
            )
        },
        rule(
            GeneralAffairsDirector,
            Reject,
            StatusRule::Active,
            PendingRescueByGeneralAffairs,
        ),
    ]
});

/// Tier that holds decision authority over a level
pub fn tier_for_level(level: AgendaLevel) -> TierRole {
    match level {
        AgendaLevel::Pending => TierRole::Supervisor,
        AgendaLevel::DeptReview | AgendaLevel::DeptAgenda => TierRole::Manager,
        AgendaLevel::FacilityAgenda => TierRole::DeputyDirector,
        AgendaLevel::CorpReview => TierRole::GeneralAffairs,
        AgendaLevel::CorpAgenda => TierRole::GeneralAffairsDirector,
    }
}

/// Tier currently authorized to act on a voice. Rescue sub-states name
/// their tier explicitly and override the level mapping.
pub fn current_tier(voice: &Voice) -> TierRole {
    voice
        .status
        .rescue_tier()
        .unwrap_or_else(|| tier_for_level(voice.level))
}

/// Notification audience implied by an agenda level
pub fn audience_for_level(level: AgendaLevel) -> AudienceScope {
    match level {
        AgendaLevel::Pending | AgendaLevel::DeptReview | AgendaLevel::DeptAgenda => {
            AudienceScope::Department
        }
        AgendaLevel::FacilityAgenda => AudienceScope::Facility,
        AgendaLevel::CorpReview | AgendaLevel::CorpAgenda => AudienceScope::Corporation,
    }
}

/// The state a valid transition produces
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    pub status: VoiceStatus,
    pub level: AgendaLevel,
    pub deadline: chrono::DateTime<chrono::Utc>,
    pub rescue_level: Option<TierRole>,
    pub audience: AudienceScope,
}

/// Validate a decision against the voice's current tier and status and
/// compute the resulting state. The voice itself is not mutated here;
/// applying the outcome atomically is the repository's job.
pub fn evaluate(
    voice: &Voice,
    acting_role: TierRole,
    decision: DecisionType,
    committee_id: Option<uuid::Uuid>,
) -> Result<TransitionOutcome, AppError> {
    if voice.status.is_terminal() {
        return Err(AppError::InvalidTransition(format!(
            "Voice {} is terminally rejected",
            voice.id
        )));
    }

    let rule = TRANSITIONS
        .iter()
        .find(|r| r.role == acting_role && r.decision == decision)
        .ok_or_else(|| {
            AppError::InvalidTransition(format!(
                "Decision '{}' is not in the {} vocabulary",
                decision.as_str(),
                acting_role.as_str()
            ))
        })?;

    let authorized = current_tier(voice);
    if authorized != acting_role {
        return Err(AppError::InvalidTransition(format!(
            "Voice {} currently awaits the {} tier, not {}",
            voice.id,
            authorized.as_str(),
            acting_role.as_str()
        )));
    }

    if !rule.requires.accepts(voice.status) {
        return Err(AppError::InvalidTransition(format!(
            "Decision '{}' does not apply while the voice is {}",
            decision.as_str(),
            voice.status.as_str()
        )));
    }

    if rule.requires_committee && committee_id.is_none() {
        return Err(AppError::Validation(format!(
            "Decision '{}' requires a target committee",
            decision.as_str()
        )));
    }

    let level = rule.new_level.unwrap_or(voice.level);
    let deadline = match rule.extend_deadline_days {
        // Extension adds to the window the voice already had
        Some(days) => voice.deadline + Duration::days(days),
        None => voice.deadline,
    };
    let rescue_level = if rule.records_rescue {
        Some(acting_role)
    } else {
        voice.rescue_level
    };

    Ok(TransitionOutcome {
        status: rule.new_status,
        level,
        deadline,
        rescue_level,
        audience: audience_for_level(level),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn voice_at(level: AgendaLevel, status: VoiceStatus) -> Voice {
        let mut voice = Voice::new(
            Uuid::new_v4(),
            "nursing".to_string(),
            "east_clinic".to_string(),
            "meridian_health".to_string(),
            "patient_safety".to_string(),
            "Bedside handover checklist".to_string(),
            "Standardize the handover checklist across wards".to_string(),
            Utc::now() + Duration::days(30),
        );
        voice.level = level;
        voice.status = status;
        voice
    }

    #[test]
    fn test_supervisor_recommendation_advances_to_manager_tier() {
        let voice = voice_at(AgendaLevel::Pending, VoiceStatus::InReview);
        let outcome = evaluate(
            &voice,
            TierRole::Supervisor,
            DecisionType::RecommendToManager,
            None,
        )
        .unwrap();
        assert_eq!(outcome.level, AgendaLevel::DeptReview);
        assert_eq!(outcome.status, VoiceStatus::InReview);
        assert_eq!(tier_for_level(outcome.level), TierRole::Manager);
    }

    #[test]
    fn test_role_must_match_current_tier() {
        let voice = voice_at(AgendaLevel::Pending, VoiceStatus::InReview);
        let result = evaluate(
            &voice,
            TierRole::Manager,
            DecisionType::ApproveAsDeptAgenda,
            None,
        );
        assert!(matches!(result, Err(AppError::InvalidTransition(_))));
    }

    #[test]
    fn test_unknown_vocabulary_is_invalid() {
        let voice = voice_at(AgendaLevel::Pending, VoiceStatus::InReview);
        // Supervisors have no escalation decision
        let result = evaluate(
            &voice,
            TierRole::Supervisor,
            DecisionType::EscalateToFacility,
            None,
        );
        assert!(matches!(result, Err(AppError::InvalidTransition(_))));
    }

    #[test]
    fn test_manager_escalation_extends_deadline() {
        let voice = voice_at(AgendaLevel::DeptAgenda, VoiceStatus::Accepted);
        let outcome = evaluate(
            &voice,
            TierRole::Manager,
            DecisionType::EscalateToFacility,
            None,
        )
        .unwrap();
        assert_eq!(outcome.level, AgendaLevel::FacilityAgenda);
        assert_eq!(outcome.deadline, voice.deadline + Duration::days(60));
        assert_eq!(outcome.audience, AudienceScope::Facility);
    }

    #[test]
    fn test_terminal_voices_accept_nothing() {
        let voice = voice_at(AgendaLevel::DeptReview, VoiceStatus::Rejected);
        let result = evaluate(&voice, TierRole::Manager, DecisionType::Reject, None);
        assert!(matches!(result, Err(AppError::InvalidTransition(_))));
    }

    #[test]
    fn test_rejection_cascade_walks_down_the_tiers() {
        // GA director rejects a corp-agenda voice
        let voice = voice_at(AgendaLevel::CorpAgenda, VoiceStatus::InReview);
        let outcome = evaluate(
            &voice,
            TierRole::GeneralAffairsDirector,
            DecisionType::Reject,
            None,
        )
        .unwrap();
        assert_eq!(outcome.status, VoiceStatus::PendingRescueByGeneralAffairs);

        // General affairs passes it further down
        let mut voice = voice_at(AgendaLevel::CorpAgenda, outcome.status);
        let outcome = evaluate(&voice, TierRole::GeneralAffairs, DecisionType::Reject, None)
            .unwrap();
        assert_eq!(outcome.status, VoiceStatus::PendingRescueByDeputyDirector);

        // Deputy director passes it to the manager floor
        voice.status = outcome.status;
        let outcome = evaluate(&voice, TierRole::DeputyDirector, DecisionType::Reject, None)
            .unwrap();
        assert_eq!(outcome.status, VoiceStatus::PendingRescueByManager);
    }

    #[test]
    fn test_rescue_requires_matching_substate() {
        // A manager cannot rescue a voice that is merely in review
        let voice = voice_at(AgendaLevel::DeptAgenda, VoiceStatus::InReview);
        let result = evaluate(
            &voice,
            TierRole::Manager,
            DecisionType::RescueAsDeptAgenda,
            None,
        );
        assert!(matches!(result, Err(AppError::InvalidTransition(_))));

        // Nor one pending rescue by a different tier
        let voice = voice_at(
            AgendaLevel::CorpAgenda,
            VoiceStatus::PendingRescueByGeneralAffairs,
        );
        let result = evaluate(
            &voice,
            TierRole::Manager,
            DecisionType::RescueAsDeptAgenda,
            None,
        );
        assert!(matches!(result, Err(AppError::InvalidTransition(_))));
    }

    #[test]
    fn test_manager_rescue_records_rescue_level() {
        // Previously escalated, rejected at the deputy-director tier, now
        // pending rescue by the manager.
        let voice = voice_at(
            AgendaLevel::DeptAgenda,
            VoiceStatus::PendingRescueByManager,
        );
        let outcome = evaluate(
            &voice,
            TierRole::Manager,
            DecisionType::RescueAsDeptAgenda,
            None,
        )
        .unwrap();
        assert_eq!(outcome.level, AgendaLevel::DeptAgenda);
        assert_eq!(outcome.status, VoiceStatus::Accepted);
        assert_eq!(outcome.rescue_level, Some(TierRole::Manager));
    }

    #[test]
    fn test_manager_confirms_terminal_rejection() {
        let voice = voice_at(
            AgendaLevel::DeptAgenda,
            VoiceStatus::PendingRescueByManager,
        );
        let outcome = evaluate(
            &voice,
            TierRole::Manager,
            DecisionType::CompleteRejection,
            None,
        )
        .unwrap();
        assert_eq!(outcome.status, VoiceStatus::Rejected);
    }

    #[test]
    fn test_general_affairs_rescue_into_facility_agenda() {
        let voice = voice_at(
            AgendaLevel::CorpAgenda,
            VoiceStatus::PendingRescueByGeneralAffairs,
        );
        let outcome = evaluate(
            &voice,
            TierRole::GeneralAffairs,
            DecisionType::RescueAsFacilityAgenda,
            None,
        )
        .unwrap();
        assert_eq!(outcome.level, AgendaLevel::FacilityAgenda);
        assert_eq!(outcome.status, VoiceStatus::Accepted);
        assert_eq!(outcome.rescue_level, Some(TierRole::GeneralAffairs));
    }

    #[test]
    fn test_committee_approval_requires_committee() {
        let voice = voice_at(AgendaLevel::FacilityAgenda, VoiceStatus::InReview);
        let result = evaluate(
            &voice,
            TierRole::DeputyDirector,
            DecisionType::ApproveForCommittee,
            None,
        );
        assert!(matches!(result, Err(AppError::Validation(_))));

        let outcome = evaluate(
            &voice,
            TierRole::DeputyDirector,
            DecisionType::ApproveForCommittee,
            Some(Uuid::new_v4()),
        )
        .unwrap();
        assert_eq!(outcome.status, VoiceStatus::CommitteeBound);
    }

    #[test]
    fn test_board_approval_committee_is_optional() {
        let voice = voice_at(AgendaLevel::CorpAgenda, VoiceStatus::InReview);
        let outcome = evaluate(
            &voice,
            TierRole::GeneralAffairsDirector,
            DecisionType::ApproveForCorpMeeting,
            None,
        )
        .unwrap();
        assert_eq!(outcome.status, VoiceStatus::BoardBound);
        assert_eq!(outcome.level, AgendaLevel::CorpAgenda);
    }

    #[test]
    fn test_audience_matches_resulting_level() {
        let voice = voice_at(AgendaLevel::CorpReview, VoiceStatus::InReview);
        let outcome = evaluate(
            &voice,
            TierRole::GeneralAffairs,
            DecisionType::ApproveAsCorpAgenda,
            None,
        )
        .unwrap();
        assert_eq!(outcome.audience, AudienceScope::Corporation);
    }
}
