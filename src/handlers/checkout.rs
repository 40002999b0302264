use axum::{
    extract::State,
    http::{header::ORIGIN, HeaderMap},
    response::Json,
};

use crate::{
    errors::Result,
    handlers::AppState,
    middleware::auth::AuthenticatedUser,
    models::{CheckoutRequest, CheckoutResponse},
};

#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Checkout session created", body = CheckoutResponse),
        (status = 400, description = "Unknown plan type"),
        (status = 401, description = "Missing or invalid token"),
        (status = 502, description = "Payment processor unavailable")
    ),
    security(("bearer" = [])),
    tag = "payments"
)]
pub async fn create_checkout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>> {
    let origin = headers.get(ORIGIN).and_then(|value| value.to_str().ok());

    let created = state
        .checkout
        .start(&user.user_id, &request.plan_type, request.email, origin)
        .await?;

    Ok(Json(CheckoutResponse {
        session_id: created.session_id,
        url: created.url,
    }))
}
