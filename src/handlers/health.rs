use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::json;

use crate::handlers::AppState;

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is alive")),
    tag = "health"
)]
pub async fn liveness() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

#[utoipa::path(
    get,
    path = "/health/ready",
    responses(
        (status = 200, description = "Store and cache reachable"),
        (status = 503, description = "A dependency is down")
    ),
    tag = "health"
)]
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let store_status = match state.store.ping().await {
        Ok(()) => "healthy",
        Err(e) => {
            tracing::warn!("Store readiness check failed: {}", e);
            "unhealthy"
        }
    };

    let redis_status = match &state.redis {
        Some(redis) => match redis.ping().await {
            Ok(()) => "healthy",
            Err(e) => {
                tracing::warn!("Redis readiness check failed: {}", e);
                "unhealthy"
            }
        },
        None => "disabled",
    };

    let ready = store_status == "healthy" && redis_status != "unhealthy";
    let (status, label) = if ready {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not_ready")
    };

    (
        status,
        Json(json!({
            "status": label,
            "checks": {
                "store": store_status,
                "redis": redis_status
            },
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
    )
}
