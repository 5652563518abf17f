//! /api/stats and /api/feedback — the JSON-file collaborators.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use cairn_hub::feedback::FeedbackError;
use cairn_hub::stats::StatsSnapshot;

use super::ApiState;

pub async fn handle_stats(State(state): State<ApiState>) -> Json<StatsSnapshot> {
    Json(state.hub.stats.snapshot())
}

#[derive(Deserialize)]
pub struct FeedbackRequest {
    pub rating: u8,
    #[serde(default)]
    pub feedback: String,
}

#[derive(Serialize)]
pub struct FeedbackResponse {
    pub recorded: bool,
}

pub async fn handle_feedback(
    State(state): State<ApiState>,
    Json(request): Json<FeedbackRequest>,
) -> Result<Json<FeedbackResponse>, (StatusCode, String)> {
    match state.hub.feedback.record(request.rating, &request.feedback).await {
        Ok(()) => Ok(Json(FeedbackResponse { recorded: true })),
        Err(e @ FeedbackError::InvalidRating(_)) => Err((StatusCode::BAD_REQUEST, e.to_string())),
        Err(e) => {
            tracing::error!(error = %e, "feedback write failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, "feedback write failed".to_string()))
        }
    }
}
