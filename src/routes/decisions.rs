//! Decision route handlers
//!
//! The executeDecision surface and the append-only decision history.

use crate::engine::service::{DecisionCommand, DecisionOutcome};
use crate::error::{validation_error, ApiResult, AppError};
use crate::models::SuccessResponse;
use crate::state::SharedState;
use crate::voice::{DecisionRecord, DecisionType};
use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteDecisionRequest {
    /// Idempotency key; retried deliveries must reuse the same id.
    /// Generated server-side when absent.
    pub decision_id: Option<Uuid>,
    /// One of the tier vocabulary, e.g. "approve_as_dept_agenda"
    pub decision: String,
    pub decider_id: Uuid,
    #[validate(length(min = 1))]
    pub reason: String,
    pub committee_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionResponse {
    #[serde(flatten)]
    pub outcome: DecisionOutcome,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionHistoryResponse {
    pub decisions: Vec<DecisionRecord>,
}

/// Apply a tier decision to a voice
pub async fn execute_decision(
    State(state): State<SharedState>,
    Path(voice_id): Path<Uuid>,
    Json(payload): Json<ExecuteDecisionRequest>,
) -> ApiResult<Json<SuccessResponse<DecisionResponse>>> {
    payload
        .validate()
        .map_err(|e| validation_error(e.to_string()))?;

    let decision = DecisionType::parse(&payload.decision).ok_or_else(|| {
        AppError::Validation(format!("Unknown decision type '{}'", payload.decision))
    })?;

    let outcome = state
        .service
        .execute_decision(DecisionCommand {
            decision_id: payload.decision_id.unwrap_or_else(Uuid::new_v4),
            voice_id,
            decision,
            decider_id: payload.decider_id,
            reason: payload.reason,
            committee_id: payload.committee_id,
        })
        .await?;

    let message = outcome.message.clone();
    Ok(Json(SuccessResponse::with_data(
        message,
        DecisionResponse { outcome },
    )))
}

/// Full decision history of a voice, oldest first
pub async fn decision_history(
    State(state): State<SharedState>,
    Path(voice_id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<DecisionHistoryResponse>>> {
    let decisions = state.service.decision_history(voice_id).await?;
    Ok(Json(SuccessResponse::with_data(
        format!("{} decision(s)", decisions.len()),
        DecisionHistoryResponse { decisions },
    )))
}
