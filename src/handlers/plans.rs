use axum::{extract::State, response::Json};

use crate::{handlers::AppState, models::PlanResponse};

#[utoipa::path(
    get,
    path = "/api/v1/plans",
    responses((status = 200, description = "Purchasable plans", body = [PlanResponse])),
    tag = "plans"
)]
pub async fn list_plans(State(state): State<AppState>) -> Json<Vec<PlanResponse>> {
    Json(state.catalog.describe())
}
