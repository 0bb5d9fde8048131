//! Admin route handlers
//!
//! Versioned engine-configuration surface. Every update is validated,
//! checksummed, and recorded as a revision; classification of in-flight
//! voices follows the active revision immediately.

use crate::engine::config::{ConfigRevision, EngineConfig};
use crate::error::ApiResult;
use crate::models::SuccessResponse;
use crate::state::SharedState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEngineConfigRequest {
    pub config: EngineConfig,
    /// Actor recorded in the revision audit entry
    pub updated_by: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfigResponse {
    pub version: u32,
    pub config: EngineConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionResponse {
    pub revision: ConfigRevision,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionListResponse {
    pub revisions: Vec<ConfigRevision>,
}

/// Active engine configuration and its version
pub async fn get_engine_config(
    State(state): State<SharedState>,
) -> ApiResult<Json<SuccessResponse<EngineConfigResponse>>> {
    let config = state.engine_config.current().await;
    let version = state.engine_config.current_version().await;
    Ok(Json(SuccessResponse::with_data(
        "Engine configuration",
        EngineConfigResponse {
            version,
            config: (*config).clone(),
        },
    )))
}

/// Replace the engine configuration, recording a revision
pub async fn update_engine_config(
    State(state): State<SharedState>,
    Json(payload): Json<UpdateEngineConfigRequest>,
) -> ApiResult<Json<SuccessResponse<RevisionResponse>>> {
    let revision = state
        .engine_config
        .update(payload.config, payload.updated_by)
        .await?;
    Ok(Json(SuccessResponse::with_data(
        format!("Engine configuration updated to version {}", revision.version),
        RevisionResponse { revision },
    )))
}

/// Revision audit trail, oldest first
pub async fn list_config_revisions(
    State(state): State<SharedState>,
) -> ApiResult<Json<SuccessResponse<RevisionListResponse>>> {
    let revisions = state.engine_config.revisions().await;
    Ok(Json(SuccessResponse::with_data(
        format!("{} revision(s)", revisions.len()),
        RevisionListResponse { revisions },
    )))
}
