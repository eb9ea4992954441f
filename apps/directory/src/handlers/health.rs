use axum::response::IntoResponse;
use axum::Json;

/// GET /health/live. Always 200.
pub async fn liveness() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
