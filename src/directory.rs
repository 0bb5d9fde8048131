//! Organization directory
//!
//! Supplies the identity facts the engine consumes but does not own: voter
//! profiles for scoring, decider roles for authorization, relationship facts
//! for visibility, and department headcounts for score scaling. Facility
//! topology is data behind this seam, never code.

use async_trait::async_trait;
use deadpool_postgres::Pool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::engine::visibility::ViewerFacts;
use crate::error::AppError;
use crate::voice::{TierRole, Voice, VoterProfile};

/// Directory entry for one organization member
#[derive(Debug, Clone)]
pub struct MemberRecord {
    pub profile: VoterProfile,
    pub department: String,
    pub facility: String,
    pub corporation: String,
    /// Governance tier held by this member, if any
    pub role: Option<TierRole>,
    /// Manager-or-above organizational tier (drives view-only visibility)
    pub is_manager: bool,
}

#[async_trait]
pub trait OrgDirectory: Send + Sync {
    /// Scoring attributes for a voter. Missing voters are `NotFound`.
    async fn voter_profile(&self, user_id: Uuid) -> Result<VoterProfile, AppError>;

    /// Governance tier held by a decider; `None` when they hold none
    async fn decider_role(&self, user_id: Uuid) -> Result<Option<TierRole>, AppError>;

    /// Relationship facts between a viewer and a voice
    async fn viewer_facts(&self, viewer_id: Uuid, voice: &Voice) -> Result<ViewerFacts, AppError>;

    async fn department_headcount(&self, department: &str) -> Result<u32, AppError>;
}

// =============================================================================
// POSTGRES DIRECTORY
// =============================================================================

pub struct PostgresDirectory {
    pool: Pool,
}

impl PostgresDirectory {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrgDirectory for PostgresDirectory {
    async fn voter_profile(&self, user_id: Uuid) -> Result<VoterProfile, AppError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT id, permission_tier, profession, years_of_experience, certifications \
                 FROM org_members WHERE id = $1",
                &[&user_id],
            )
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Member {} not found", user_id)))?;

        let years: i32 = row.get("years_of_experience");
        Ok(VoterProfile {
            user_id: row.get("id"),
            permission_tier: row.get("permission_tier"),
            profession: row.get("profession"),
            years_of_experience: years.max(0) as u32,
            certifications: row.get("certifications"),
        })
    }

    async fn decider_role(&self, user_id: Uuid) -> Result<Option<TierRole>, AppError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt("SELECT role FROM org_members WHERE id = $1", &[&user_id])
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Member {} not found", user_id)))?;
        let role: Option<String> = row.get("role");
        Ok(role.as_deref().and_then(TierRole::parse))
    }

    async fn viewer_facts(&self, viewer_id: Uuid, voice: &Voice) -> Result<ViewerFacts, AppError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT department, facility, corporation, is_manager \
                 FROM org_members WHERE id = $1",
                &[&viewer_id],
            )
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Member {} not found", viewer_id)))?;

        let department: String = row.get("department");
        let facility: String = row.get("facility");
        let corporation: String = row.get("corporation");
        Ok(ViewerFacts {
            same_department: department == voice.department && facility == voice.facility,
            same_facility: facility == voice.facility,
            same_corporation: corporation == voice.corporation,
            is_manager: row.get("is_manager"),
        })
    }

    async fn department_headcount(&self, department: &str) -> Result<u32, AppError> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT COUNT(*) AS headcount FROM org_members WHERE department = $1",
                &[&department],
            )
            .await?;
        let headcount: i64 = row.get("headcount");
        Ok(headcount.max(0) as u32)
    }
}

// =============================================================================
// STATIC DIRECTORY (seedable; tests and local experimentation)
// =============================================================================

#[derive(Default)]
pub struct StaticDirectory {
    members: Arc<RwLock<HashMap<Uuid, MemberRecord>>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, record: MemberRecord) {
        let mut members = self.members.write().await;
        members.insert(record.profile.user_id, record);
    }
}

#[async_trait]
impl OrgDirectory for StaticDirectory {
    async fn voter_profile(&self, user_id: Uuid) -> Result<VoterProfile, AppError> {
        let members = self.members.read().await;
        members
            .get(&user_id)
            .map(|m| m.profile.clone())
            .ok_or_else(|| AppError::NotFound(format!("Member {} not found", user_id)))
    }

    async fn decider_role(&self, user_id: Uuid) -> Result<Option<TierRole>, AppError> {
        let members = self.members.read().await;
        members
            .get(&user_id)
            .map(|m| m.role)
            .ok_or_else(|| AppError::NotFound(format!("Member {} not found", user_id)))
    }

    async fn viewer_facts(&self, viewer_id: Uuid, voice: &Voice) -> Result<ViewerFacts, AppError> {
        let members = self.members.read().await;
        let member = members
            .get(&viewer_id)
            .ok_or_else(|| AppError::NotFound(format!("Member {} not found", viewer_id)))?;
        Ok(ViewerFacts {
            same_department: member.department == voice.department
                && member.facility == voice.facility,
            same_facility: member.facility == voice.facility,
            same_corporation: member.corporation == voice.corporation,
            is_manager: member.is_manager,
        })
    }

    async fn department_headcount(&self, department: &str) -> Result<u32, AppError> {
        let members = self.members.read().await;
        Ok(members
            .values()
            .filter(|m| m.department == department)
            .count() as u32)
    }
}
