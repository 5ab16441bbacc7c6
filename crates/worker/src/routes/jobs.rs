use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::{routing::post, Json, Router};
use scail_core::job::JobResult;
use serde_json::{Map, Value};
use tracing::Instrument;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// POST /run -- execute one job and return its result.
///
/// The body is `{"input": {...}}`. Jobs run one at a time; a request
/// arriving while another job runs waits for the lock. Job failures are
/// reported as `{"error": "..."}` with status 200.
async fn run_job(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> AppResult<Json<JobResult>> {
    let Json(body) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let input = body
        .get("input")
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()));

    let _guard = state.job_lock.lock().await;
    if state.shutdown.is_cancelled() {
        return Err(AppError::ShuttingDown);
    }

    let job_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("job", %job_id);
    let result = state
        .runner
        .handle(&input, &state.shutdown)
        .instrument(span)
        .await;

    Ok(Json(result))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/run", post(run_job))
}
