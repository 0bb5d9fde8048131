//! Voice data models
//!
//! Defines the proposal ("voice"), its votes, and the append-only decision
//! and expiration records that form the audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::levels::AgendaLevel;

/// Voice status in the escalation workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceStatus {
    /// Collecting votes / awaiting a decision at the current tier
    InReview,
    /// Approved as an agenda item at its current level
    Accepted,
    /// Approved and assigned to a facility committee
    CommitteeBound,
    /// Approved for the corporate board meeting
    BoardBound,
    /// Rejected above; the manager tier may rescue or confirm
    PendingRescueByManager,
    /// Rejected above; the deputy-director tier may rescue or pass down
    PendingRescueByDeputyDirector,
    /// Rejected above; the general-affairs tier may rescue or pass down
    PendingRescueByGeneralAffairs,
    /// Terminal rejection
    Rejected,
}

impl VoiceStatus {
    /// Statuses a tier may still act on through the normal (non-rescue) vocabulary
    pub fn is_active(&self) -> bool {
        matches!(self, VoiceStatus::InReview | VoiceStatus::Accepted)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, VoiceStatus::Rejected)
    }

    /// The tier named by a rescue-pending sub-state, if any
    pub fn rescue_tier(&self) -> Option<TierRole> {
        match self {
            VoiceStatus::PendingRescueByManager => Some(TierRole::Manager),
            VoiceStatus::PendingRescueByDeputyDirector => Some(TierRole::DeputyDirector),
            VoiceStatus::PendingRescueByGeneralAffairs => Some(TierRole::GeneralAffairs),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VoiceStatus::InReview => "in_review",
            VoiceStatus::Accepted => "accepted",
            VoiceStatus::CommitteeBound => "committee_bound",
            VoiceStatus::BoardBound => "board_bound",
            VoiceStatus::PendingRescueByManager => "pending_rescue_by_manager",
            VoiceStatus::PendingRescueByDeputyDirector => "pending_rescue_by_deputy_director",
            VoiceStatus::PendingRescueByGeneralAffairs => "pending_rescue_by_general_affairs",
            VoiceStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_review" => Some(VoiceStatus::InReview),
            "accepted" => Some(VoiceStatus::Accepted),
            "committee_bound" => Some(VoiceStatus::CommitteeBound),
            "board_bound" => Some(VoiceStatus::BoardBound),
            "pending_rescue_by_manager" => Some(VoiceStatus::PendingRescueByManager),
            "pending_rescue_by_deputy_director" => Some(VoiceStatus::PendingRescueByDeputyDirector),
            "pending_rescue_by_general_affairs" => Some(VoiceStatus::PendingRescueByGeneralAffairs),
            "rejected" => Some(VoiceStatus::Rejected),
            _ => None,
        }
    }
}

impl Default for VoiceStatus {
    fn default() -> Self {
        VoiceStatus::InReview
    }
}

/// An employee proposal moving through the escalation hierarchy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Voice {
    pub id: Uuid,
    /// User who submitted the voice
    pub author_id: Uuid,
    pub department: String,
    pub facility: String,
    pub corporation: String,
    /// Proposal category (feeds the category multiplier table)
    pub category: String,
    pub title: String,
    pub body: String,
    /// Current agenda level
    pub level: AgendaLevel,
    /// Current decision status
    pub status: VoiceStatus,
    /// Running signed sum of vote contributions (pre-clamp, pre-scaling)
    pub raw_score: f64,
    /// Effective score: clamped at zero and department-scaled
    pub score: f64,
    /// Voting deadline for the current tier
    pub deadline: DateTime<Utc>,
    /// Tier that rescued a higher-tier rejection, if any
    pub rescue_level: Option<TierRole>,
    /// Optimistic-concurrency token; bumped on every mutation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Voice {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        author_id: Uuid,
        department: String,
        facility: String,
        corporation: String,
        category: String,
        title: String,
        body: String,
        deadline: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            author_id,
            department,
            facility,
            corporation,
            category,
            title,
            body,
            level: AgendaLevel::Pending,
            status: VoiceStatus::InReview,
            raw_score: 0.0,
            score: 0.0,
            deadline,
            rescue_level: None,
            version: Some(1),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Five ordered vote stances
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteStance {
    StronglyOppose,
    Oppose,
    Neutral,
    Support,
    StronglySupport,
}

impl VoteStance {
    /// Signed base value fed into the contribution formula
    pub fn base_value(&self) -> f64 {
        match self {
            VoteStance::StronglyOppose => -10.0,
            VoteStance::Oppose => -5.0,
            VoteStance::Neutral => 0.0,
            VoteStance::Support => 5.0,
            VoteStance::StronglySupport => 10.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VoteStance::StronglyOppose => "strongly_oppose",
            VoteStance::Oppose => "oppose",
            VoteStance::Neutral => "neutral",
            VoteStance::Support => "support",
            VoteStance::StronglySupport => "strongly_support",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "strongly_oppose" => Some(VoteStance::StronglyOppose),
            "oppose" => Some(VoteStance::Oppose),
            "neutral" => Some(VoteStance::Neutral),
            "support" => Some(VoteStance::Support),
            "strongly_support" => Some(VoteStance::StronglySupport),
            _ => None,
        }
    }
}

/// A single recorded vote. Append-only; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub id: Uuid,
    pub voice_id: Uuid,
    pub voter_id: Uuid,
    pub stance: VoteStance,
    pub cast_at: DateTime<Utc>,
}

impl Vote {
    pub fn new(voice_id: Uuid, voter_id: Uuid, stance: VoteStance) -> Self {
        Self {
            id: Uuid::new_v4(),
            voice_id,
            voter_id,
            stance,
            cast_at: Utc::now(),
        }
    }
}

/// Voter attributes consumed by scoring. Owned by the organization
/// directory, supplied at vote time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterProfile {
    pub user_id: Uuid,
    /// Key into the configured permission-weight table. Unknown keys are a
    /// hard validation error, never a default.
    pub permission_tier: String,
    pub profession: Option<String>,
    pub years_of_experience: u32,
    pub certifications: Vec<String>,
}

/// The five governance tiers that hold decision authority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierRole {
    Supervisor,
    Manager,
    DeputyDirector,
    GeneralAffairs,
    GeneralAffairsDirector,
}

impl TierRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierRole::Supervisor => "supervisor",
            TierRole::Manager => "manager",
            TierRole::DeputyDirector => "deputy_director",
            TierRole::GeneralAffairs => "general_affairs",
            TierRole::GeneralAffairsDirector => "general_affairs_director",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "supervisor" => Some(TierRole::Supervisor),
            "manager" => Some(TierRole::Manager),
            "deputy_director" => Some(TierRole::DeputyDirector),
            "general_affairs" => Some(TierRole::GeneralAffairs),
            "general_affairs_director" => Some(TierRole::GeneralAffairsDirector),
            _ => None,
        }
    }
}

/// Decision vocabulary across all five tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    RecommendToManager,
    ApproveAsDeptAgenda,
    EscalateToFacility,
    RescueAsDeptAgenda,
    CompleteRejection,
    ApproveForCommittee,
    EscalateToCorpReview,
    ApproveAsCorpAgenda,
    EscalateToCorpAgenda,
    RescueAsFacilityAgenda,
    ApproveForCorpMeeting,
    Reject,
}

impl DecisionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionType::RecommendToManager => "recommend_to_manager",
            DecisionType::ApproveAsDeptAgenda => "approve_as_dept_agenda",
            DecisionType::EscalateToFacility => "escalate_to_facility",
            DecisionType::RescueAsDeptAgenda => "rescue_as_dept_agenda",
            DecisionType::CompleteRejection => "complete_rejection",
            DecisionType::ApproveForCommittee => "approve_for_committee",
            DecisionType::EscalateToCorpReview => "escalate_to_corp_review",
            DecisionType::ApproveAsCorpAgenda => "approve_as_corp_agenda",
            DecisionType::EscalateToCorpAgenda => "escalate_to_corp_agenda",
            DecisionType::RescueAsFacilityAgenda => "rescue_as_facility_agenda",
            DecisionType::ApproveForCorpMeeting => "approve_for_corp_meeting",
            DecisionType::Reject => "reject",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "recommend_to_manager" => Some(DecisionType::RecommendToManager),
            "approve_as_dept_agenda" => Some(DecisionType::ApproveAsDeptAgenda),
            "escalate_to_facility" => Some(DecisionType::EscalateToFacility),
            "rescue_as_dept_agenda" => Some(DecisionType::RescueAsDeptAgenda),
            "complete_rejection" => Some(DecisionType::CompleteRejection),
            "approve_for_committee" => Some(DecisionType::ApproveForCommittee),
            "escalate_to_corp_review" => Some(DecisionType::EscalateToCorpReview),
            "approve_as_corp_agenda" => Some(DecisionType::ApproveAsCorpAgenda),
            "escalate_to_corp_agenda" => Some(DecisionType::EscalateToCorpAgenda),
            "rescue_as_facility_agenda" => Some(DecisionType::RescueAsFacilityAgenda),
            "approve_for_corp_meeting" => Some(DecisionType::ApproveForCorpMeeting),
            "reject" => Some(DecisionType::Reject),
            _ => None,
        }
    }
}

/// Immutable record of an applied decision. The id doubles as the
/// idempotency key for at-least-once delivery of decision requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRecord {
    pub id: Uuid,
    pub voice_id: Uuid,
    pub decision: DecisionType,
    pub decider_id: Uuid,
    pub decider_role: TierRole,
    pub reason: String,
    /// Target committee for committee-bound decisions
    pub committee_id: Option<Uuid>,
    pub decided_at: DateTime<Utc>,
}

/// How an expired voice was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpirationResolution {
    ApproveAtCurrentLevel,
    Downgrade,
    Reject,
}

impl ExpirationResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpirationResolution::ApproveAtCurrentLevel => "approve_at_current_level",
            ExpirationResolution::Downgrade => "downgrade",
            ExpirationResolution::Reject => "reject",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approve_at_current_level" => Some(ExpirationResolution::ApproveAtCurrentLevel),
            "downgrade" => Some(ExpirationResolution::Downgrade),
            "reject" => Some(ExpirationResolution::Reject),
            _ => None,
        }
    }
}

/// History entry written when a deadline lapse is resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpirationRecord {
    pub id: Uuid,
    pub voice_id: Uuid,
    pub decider_id: Uuid,
    /// Agenda level at the time of expiration
    pub level: AgendaLevel,
    pub current_score: f64,
    pub target_score: f64,
    /// current / target * 100, one decimal. Display only.
    pub achievement_rate: f64,
    pub days_overdue: i64,
    pub resolution: ExpirationResolution,
    pub reason: String,
    pub resolved_at: DateTime<Utc>,
}

/// Audience a decision notification fans out to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudienceScope {
    Department,
    Facility,
    Corporation,
}

impl AudienceScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudienceScope::Department => "department",
            AudienceScope::Facility => "facility",
            AudienceScope::Corporation => "corporation",
        }
    }
}
