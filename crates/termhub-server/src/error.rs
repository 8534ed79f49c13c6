use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use termhub_pty::SessionError;

/// Handler error, rendered as `{error, code, status}`.
#[derive(Debug)]
pub struct ApiError(pub SessionError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            SessionError::NotFound(_) => StatusCode::NOT_FOUND,
            SessionError::NotAlive(_) => StatusCode::BAD_REQUEST,
            SessionError::ResourceLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            SessionError::InvalidDimensions { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            SessionError::Spawn(_) | SessionError::Pty { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable error name.
    pub fn code(&self) -> &'static str {
        match &self.0 {
            SessionError::NotFound(_) => "not_found",
            SessionError::NotAlive(_) => "not_alive",
            SessionError::ResourceLimitExceeded { .. } => "resource_limit_exceeded",
            SessionError::InvalidDimensions { .. } => "invalid_dimensions",
            SessionError::Spawn(_) => "spawn_failed",
            SessionError::Pty { .. } => "pty_error",
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("request failed: {}", self.0);
        }

        let body = Json(serde_json::json!({
            "error": self.0.to_string(),
            "code": self.code(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
