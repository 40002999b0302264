use axum::{extract::State, response::Json};

use crate::{
    errors::Result,
    handlers::AppState,
    middleware::auth::AuthenticatedUser,
    models::{GenerateRequest, GenerateResponse},
};

#[utoipa::path(
    post,
    path = "/api/v1/generate",
    request_body = GenerateRequest,
    responses(
        (status = 200, description = "Idea generated and one credit spent", body = GenerateResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 402, description = "No generations remaining"),
        (status = 429, description = "Too many requests"),
        (status = 502, description = "Generator failed; nothing was spent"),
        (status = 503, description = "Usage could not be recorded; retry")
    ),
    security(("bearer" = [])),
    tag = "generate"
)]
pub async fn generate_idea(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    body: Option<Json<GenerateRequest>>,
) -> Result<Json<GenerateResponse>> {
    let prompt = body.as_ref().and_then(|Json(req)| req.prompt.as_deref());
    let result = state.quota.generate(&user.user_id, prompt).await?;

    Ok(Json(GenerateResponse {
        idea: result.idea,
        entitlement: result.record.into(),
        reconciled: result.reconciled,
    }))
}
