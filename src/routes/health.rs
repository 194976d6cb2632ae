use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::AppState;

/// Liveness probe; reports whether the database pool currently holds connections.
#[axum::debug_handler]
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let body = json!({
        "status": "ok",
        "db_connections": state.pool.size(),
    });
    (StatusCode::OK, Json(body))
}
