use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Errors raised by the intake layer before a job reaches the runner.
///
/// Job failures are not `AppError`s: they travel back as a
/// [`JobResult::Error`](scail_core::job::JobResult::Error) body with
/// status 200.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The request body could not be read as JSON.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The worker is draining and accepts no new jobs.
    #[error("Worker is shutting down")]
    ShuttingDown,
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AppError::ShuttingDown => (StatusCode::SERVICE_UNAVAILABLE, "SHUTTING_DOWN"),
        };

        let body = json!({
            "error": self.to_string(),
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
