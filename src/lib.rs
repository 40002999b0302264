pub mod auth;
pub mod config;
pub mod database;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod storage;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use handlers::{checkout, docs, entitlement, generate, health, metrics, plans, webhook, AppState};

pub fn create_app(state: AppState) -> Router {
    let api = Router::new()
        .route("/plans", get(plans::list_plans))
        .route("/entitlement", get(entitlement::get_entitlement))
        .route("/entitlement/unsubscribe", post(entitlement::unsubscribe))
        .route(
            "/entitlement/purchases/:purchase_id",
            get(entitlement::purchase_status),
        )
        .route("/generate", post(generate::generate_idea))
        .route("/checkout", post(checkout::create_checkout))
        .route("/payments/webhook", post(webhook::payment_webhook));

    Router::new()
        .route("/health", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/metrics", get(metrics::metrics_handler))
        .nest("/api/v1", api)
        .merge(docs::create_docs_router())
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::metrics::metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
