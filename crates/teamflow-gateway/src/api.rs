use crate::error::ApiError;
use crate::server::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use teamflow_core::TaskState;
use teamflow_orchestrator::{FeedbackMode, SubmitRequest};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Only tasks submitted by this user.
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackBody {
    /// Also accepted as `instruction_text` or `feedback`.
    #[serde(alias = "instruction_text", alias = "feedback")]
    pub instruction: String,
}

fn clean(state: &AppState, field: &str, text: &str) -> Result<String, ApiError> {
    state
        .sanitizer
        .sanitize(text)
        .into_result()
        .map_err(|reason| ApiError::bad_request(format!("{field}: {reason}")))
}

/// `POST /api/tasks`: 202 with a fresh submission, 200 for a duplicate.
pub async fn submit_task(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(mut submit) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    submit.request = clean(&state, "request", &submit.request)?;
    submit.user_id = clean(&state, "user_id", &submit.user_id)?;

    let submission = state.orchestrator.submit(submit).await?;
    info!(
        task_id = %submission.task_id,
        team = %submission.team,
        duplicate = submission.duplicate,
        "Task submitted"
    );
    let status = if submission.duplicate {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };
    Ok((status, Json(submission)))
}

/// `GET /api/tasks/{id}`: the full task snapshot.
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskState>, ApiError> {
    Ok(Json(state.orchestrator.status(&task_id)?))
}

/// `GET /api/tasks?user_id=`
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let tasks = state
        .orchestrator
        .registry()
        .list(query.user_id.as_deref());
    Json(serde_json::json!({ "count": tasks.len(), "tasks": tasks }))
}

/// `POST /api/tasks/{id}/feedback`
///
/// 200 for an applied targeted update, 202 when a rewrite task was started,
/// 422 when the update failed and the artifact was kept.
pub async fn submit_feedback(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
    body: Result<Json<FeedbackBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let instruction = clean(&state, "instruction", &body.instruction)?;

    let response = state
        .orchestrator
        .apply_feedback(&task_id, &instruction)
        .await?;
    let status = match (response.success, response.mode) {
        (false, _) => StatusCode::UNPROCESSABLE_ENTITY,
        (true, FeedbackMode::FullRewrite) => StatusCode::ACCEPTED,
        (true, FeedbackMode::Targeted) => StatusCode::OK,
    };
    Ok((status, Json(response)))
}

/// `GET /api/teams`
pub async fn list_teams(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let router = state.orchestrator.teams();
    let teams: Vec<_> = router.teams().iter().map(|t| t.summary()).collect();
    Json(serde_json::json!({ "default": router.default_team(), "teams": teams }))
}

/// `GET /api/stats`
pub async fn stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "tasks": state.orchestrator.registry().stats(),
        "dedup_entries": state.orchestrator.dedup().len(),
        "open_streams": state.connections.connection_count().await,
    }))
}
