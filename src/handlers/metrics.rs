use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
};

use crate::handlers::AppState;

pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics_handle.render(),
    )
}
