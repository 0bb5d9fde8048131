//! Expiration route handlers
//!
//! Periodic-scan surface plus the constrained resolveExpiration decision.
//! The scan is driven by an external scheduler; each listed voice is
//! evaluated independently.

use crate::engine::expiration::ExpirationSummary;
use crate::error::{validation_error, ApiResult, AppError};
use crate::models::SuccessResponse;
use crate::state::SharedState;
use crate::voice::{ExpirationRecord, ExpirationResolution};
use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResolveExpirationRequest {
    /// One of: approve_at_current_level, downgrade, reject
    pub resolution: String,
    #[validate(length(min = 10))]
    pub reason: String,
    pub decider_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpirationScanResponse {
    pub expired: Vec<ExpirationSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpirationRecordResponse {
    pub record: ExpirationRecord,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpirationHistoryResponse {
    pub history: Vec<ExpirationRecord>,
}

/// List voices whose deadline lapsed below target
pub async fn scan_expired(
    State(state): State<SharedState>,
) -> ApiResult<Json<SuccessResponse<ExpirationScanResponse>>> {
    let expired = state.service.scan_expired().await?;
    Ok(Json(SuccessResponse::with_data(
        format!("{} expired voice(s)", expired.len()),
        ExpirationScanResponse { expired },
    )))
}

/// Resolve one expired voice
pub async fn resolve_expiration(
    State(state): State<SharedState>,
    Path(voice_id): Path<Uuid>,
    Json(payload): Json<ResolveExpirationRequest>,
) -> ApiResult<Json<SuccessResponse<ExpirationRecordResponse>>> {
    payload
        .validate()
        .map_err(|e| validation_error(e.to_string()))?;

    let resolution = ExpirationResolution::parse(&payload.resolution).ok_or_else(|| {
        AppError::Validation(format!(
            "Unknown expiration resolution '{}'",
            payload.resolution
        ))
    })?;

    let record = state
        .service
        .resolve_expiration(voice_id, resolution, &payload.reason, payload.decider_id)
        .await?;
    Ok(Json(SuccessResponse::with_data(
        "Expiration resolved",
        ExpirationRecordResponse { record },
    )))
}

/// Expiration history of a voice, oldest first
pub async fn expiration_history(
    State(state): State<SharedState>,
    Path(voice_id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<ExpirationHistoryResponse>>> {
    let history = state.service.expiration_history(voice_id).await?;
    Ok(Json(SuccessResponse::with_data(
        format!("{} record(s)", history.len()),
        ExpirationHistoryResponse { history },
    )))
}
