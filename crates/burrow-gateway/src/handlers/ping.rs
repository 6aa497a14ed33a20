use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::warn;

use crate::model::HealthResponse;
use crate::state::AppState;

pub async fn ping_handler(State(state): State<AppState>) -> Response {
    match state.store().liveness().await {
        Ok(()) => Json(HealthResponse {
            status: "ok".to_string(),
        })
        .into_response(),
        Err(err) => {
            warn!(backend = %state.store().backend(), error = %err, "liveness check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(HealthResponse {
                    status: "unavailable".to_string(),
                }),
            )
                .into_response()
        }
    }
}
