use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::Json,
};
use serde_json::{json, Value};

use crate::{
    errors::Result,
    handlers::AppState,
    services::{purchase_processor::SIGNATURE_HEADER, WebhookOutcome},
};

/// Payment processor callback. Anything but an error is acknowledged so the
/// processor stops redelivering.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    responses(
        (status = 200, description = "Event acknowledged"),
        (status = 400, description = "Bad signature"),
        (status = 500, description = "Transient failure; redeliver")
    ),
    tag = "payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = state
        .purchases
        .handle(signature, &body)
        .await
        .map_err(|e| {
            if e.is_transient() {
                tracing::error!("Webhook processing failed, awaiting redelivery: {}", e);
            }
            e
        })?;

    let result = match outcome {
        WebhookOutcome::Applied(_) => "applied",
        WebhookOutcome::Duplicate(_) => "duplicate",
        WebhookOutcome::Ignored { .. } => "ignored",
        WebhookOutcome::Dropped { .. } => "dropped",
    };

    Ok(Json(json!({ "received": true, "result": result })))
}
