use axum::Json;
use axum::extract::State;

use crate::error::{AppError, ErrorBody};
use crate::models::health::HealthResponse;
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/healthz",
    tag = "Health",
    operation_id = "healthz",
    summary = "Liveness and database connectivity check",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse),
        (status = 500, description = "Database unreachable", body = ErrorBody),
    ),
)]
pub async fn healthz(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    state
        .db
        .ping()
        .await
        .map_err(|e| AppError::Internal(format!("database ping failed: {e}")))?;

    Ok(Json(HealthResponse { status: "ok" }))
}
