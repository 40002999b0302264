use axum::{
    extract::{Path, State},
    response::Json,
};
use std::time::Duration;

use crate::{
    errors::{AppError, Result},
    handlers::AppState,
    middleware::auth::AuthenticatedUser,
    models::{EntitlementResponse, PurchaseStatusResponse},
    services::reconciler::{await_purchase, PollPolicy},
};

#[utoipa::path(
    get,
    path = "/api/v1/entitlement",
    responses(
        (status = 200, description = "Current entitlement", body = EntitlementResponse),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer" = [])),
    tag = "entitlement"
)]
pub async fn get_entitlement(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<EntitlementResponse>> {
    let record = state.quota.entitlement(&user.user_id).await?;
    Ok(Json(record.into()))
}

#[utoipa::path(
    post,
    path = "/api/v1/entitlement/unsubscribe",
    responses(
        (status = 200, description = "Subscription cancelled", body = EntitlementResponse),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer" = [])),
    tag = "entitlement"
)]
pub async fn unsubscribe(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<EntitlementResponse>> {
    let record = state.quota.unsubscribe(&user.user_id).await?;
    Ok(Json(record.into()))
}

/// Called by the client after returning from checkout. Waits a bounded time
/// for the payment webhook to land.
#[utoipa::path(
    get,
    path = "/api/v1/entitlement/purchases/{purchase_id}",
    params(("purchase_id" = String, Path, description = "Checkout session id")),
    responses(
        (status = 200, description = "Confirmation state and latest entitlement", body = PurchaseStatusResponse),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer" = [])),
    tag = "entitlement"
)]
pub async fn purchase_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(purchase_id): Path<String>,
) -> Result<Json<PurchaseStatusResponse>> {
    if purchase_id.trim().is_empty() {
        return Err(AppError::Validation("purchase_id is required".to_string()));
    }

    let policy = PollPolicy {
        attempts: state.config.purchase_poll_attempts,
        interval: Duration::from_millis(state.config.purchase_poll_interval_ms),
    };
    let confirmation =
        await_purchase(state.store.as_ref(), &user.user_id, &purchase_id, policy).await?;

    Ok(Json(PurchaseStatusResponse {
        purchase_id,
        confirmed: confirmation.confirmed,
        entitlement: confirmation.record.into(),
    }))
}
