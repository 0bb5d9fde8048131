//! Voice route handlers
//!
//! Submission, retrieval, voting, progress, and per-viewer permissions.

use crate::engine::service::{NewVoice, ProgressReport, VoteOutcome};
use crate::engine::visibility::Permissions;
use crate::error::{validation_error, ApiResult, AppError};
use crate::models::SuccessResponse;
use crate::state::SharedState;
use crate::voice::{Voice, VoteStance};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

// =============================================================================
// REQUEST/RESPONSE TYPES
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateVoiceRequest {
    pub author_id: Uuid,
    #[validate(length(min = 1))]
    pub department: String,
    #[validate(length(min = 1))]
    pub facility: String,
    #[validate(length(min = 1))]
    pub corporation: String,
    #[validate(length(min = 1))]
    pub category: String,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub body: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastVoteRequest {
    pub voter_id: Uuid,
    /// One of: strongly_oppose, oppose, neutral, support, strongly_support
    pub stance: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionsQuery {
    pub viewer_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceListQuery {
    pub department: Option<String>,
    pub facility: Option<String>,
    pub status: Option<String>,
    pub level: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceResponse {
    pub voice: Voice,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceListResponse {
    pub voices: Vec<Voice>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteResponse {
    #[serde(flatten)]
    pub outcome: VoteOutcome,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionsResponse {
    pub permissions: Permissions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponse {
    pub progress: ProgressReport,
}

// =============================================================================
// HANDLERS
// =============================================================================

/// Submit a new voice
pub async fn create_voice(
    State(state): State<SharedState>,
    Json(payload): Json<CreateVoiceRequest>,
) -> ApiResult<(StatusCode, Json<SuccessResponse<VoiceResponse>>)> {
    payload
        .validate()
        .map_err(|e| validation_error(e.to_string()))?;

    let voice = state
        .service
        .submit_voice(NewVoice {
            author_id: payload.author_id,
            department: payload.department,
            facility: payload.facility,
            corporation: payload.corporation,
            category: payload.category,
            title: payload.title,
            body: payload.body,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SuccessResponse::with_data(
            "Voice submitted",
            VoiceResponse { voice },
        )),
    ))
}

/// Fetch a single voice
pub async fn get_voice(
    State(state): State<SharedState>,
    Path(voice_id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<VoiceResponse>>> {
    let voice = state.service.get_voice(voice_id).await?;
    Ok(Json(SuccessResponse::with_data(
        "Voice found",
        VoiceResponse { voice },
    )))
}

/// List voices with optional filters
pub async fn list_voices(
    State(state): State<SharedState>,
    Query(query): Query<VoiceListQuery>,
) -> ApiResult<Json<SuccessResponse<VoiceListResponse>>> {
    use crate::engine::levels::AgendaLevel;
    use crate::repository::VoiceFilter;
    use crate::voice::VoiceStatus;

    let status = match query.status.as_deref() {
        Some(s) => Some(
            VoiceStatus::parse(s)
                .ok_or_else(|| AppError::Validation(format!("Unknown status '{}'", s)))?,
        ),
        None => None,
    };
    let level = match query.level.as_deref() {
        Some(l) => Some(
            AgendaLevel::parse(l)
                .ok_or_else(|| AppError::Validation(format!("Unknown level '{}'", l)))?,
        ),
        None => None,
    };

    let voices = state
        .service
        .list_voices(VoiceFilter {
            department: query.department,
            facility: query.facility,
            status,
            level,
        })
        .await?;
    Ok(Json(SuccessResponse::with_data(
        format!("{} voice(s)", voices.len()),
        VoiceListResponse { voices },
    )))
}

/// Cast a vote on a voice
pub async fn cast_vote(
    State(state): State<SharedState>,
    Path(voice_id): Path<Uuid>,
    Json(payload): Json<CastVoteRequest>,
) -> ApiResult<(StatusCode, Json<SuccessResponse<VoteResponse>>)> {
    // Malformed stances are hard validation failures, never defaults
    let stance = VoteStance::parse(&payload.stance)
        .ok_or_else(|| AppError::Validation(format!("Unknown vote stance '{}'", payload.stance)))?;

    let outcome = state
        .service
        .cast_vote(voice_id, payload.voter_id, stance)
        .await?;

    let message = if outcome.level_changed {
        format!(
            "Vote recorded; voice escalated to {}",
            outcome.voice.level.as_str()
        )
    } else {
        "Vote recorded".to_string()
    };
    Ok((
        StatusCode::CREATED,
        Json(SuccessResponse::with_data(message, VoteResponse { outcome })),
    ))
}

/// Permissions for one viewer against one voice. Recomputed per request.
pub async fn get_permissions(
    State(state): State<SharedState>,
    Path(voice_id): Path<Uuid>,
    Query(query): Query<PermissionsQuery>,
) -> ApiResult<Json<SuccessResponse<PermissionsResponse>>> {
    let permissions = state
        .service
        .permissions_for(voice_id, query.viewer_id)
        .await?;
    Ok(Json(SuccessResponse::with_data(
        "Permissions computed",
        PermissionsResponse { permissions },
    )))
}

/// Score progress and consensus breakdown
pub async fn get_progress(
    State(state): State<SharedState>,
    Path(voice_id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<ProgressResponse>>> {
    let progress = state.service.progress(voice_id).await?;
    Ok(Json(SuccessResponse::with_data(
        "Progress computed",
        ProgressResponse { progress },
    )))
}
