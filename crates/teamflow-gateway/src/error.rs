use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use teamflow_core::TeamflowError;
use tracing::{error, warn};

/// A failure rendered to clients as `{"error": code, "message": ...}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request",
            message: message.into(),
        }
    }
}

impl From<TeamflowError> for ApiError {
    fn from(err: TeamflowError) -> Self {
        let status = match &err {
            TeamflowError::TaskNotFound(_) => StatusCode::NOT_FOUND,
            TeamflowError::InvalidState(_) | TeamflowError::DuplicateSubmission(_) => {
                StatusCode::CONFLICT
            }
            TeamflowError::TargetedUpdate(_) => StatusCode::UNPROCESSABLE_ENTITY,
            TeamflowError::StepFailed { .. } | TeamflowError::Http(_) => StatusCode::BAD_GATEWAY,
            TeamflowError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            TeamflowError::Json(_) => StatusCode::BAD_REQUEST,
            TeamflowError::Config(_) | TeamflowError::Gateway(_) | TeamflowError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(code = self.code, message = %self.message, "Request failed");
        } else {
            warn!(code = self.code, message = %self.message, "Request rejected");
        }
        let body = serde_json::json!({ "error": self.code, "message": self.message });
        (self.status, Json(body)).into_response()
    }
}
