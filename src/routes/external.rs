use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;

use crate::error::AppResult;
use crate::external::ComplaintRequest;
use crate::extractors::CurrentUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/external/submit-complaint", post(submit_complaint))
}

/// POST /external/submit-complaint — authenticated proxy to the triage
/// service. Upstream failures surface as 502 without touching local state.
pub async fn submit_complaint(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<ComplaintRequest>,
) -> AppResult<Response> {
    tracing::info!(user_id = %user.id, "forwarding complaint to triage service");
    let data = state.triage.submit_complaint(&req).await?;
    Ok(Json(json!({ "success": true, "data": data })).into_response())
}
