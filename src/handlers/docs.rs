use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::health::liveness,
        crate::handlers::health::readiness,
        crate::handlers::plans::list_plans,
        crate::handlers::entitlement::get_entitlement,
        crate::handlers::entitlement::unsubscribe,
        crate::handlers::entitlement::purchase_status,
        crate::handlers::generate::generate_idea,
        crate::handlers::checkout::create_checkout,
        crate::handlers::webhook::payment_webhook,
    ),
    components(
        schemas(
            crate::models::EntitlementRecord,
            crate::models::SubscriptionTier,
            crate::models::SubscriptionStatus,
            crate::models::EntitlementResponse,
            crate::models::GeneratedIdea,
            crate::models::GenerateRequest,
            crate::models::GenerateResponse,
            crate::models::PurchaseStatusResponse,
            crate::models::PlanResponse,
            crate::models::CheckoutRequest,
            crate::models::CheckoutResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "entitlement", description = "Subscription and credit state"),
        (name = "generate", description = "Quota-gated idea generation"),
        (name = "plans", description = "Plan catalog"),
        (name = "payments", description = "Checkout and payment processor callbacks"),
        (name = "health", description = "Health check endpoints")
    ),
    info(
        title = "Game Ideas Universe Entitlement API",
        version = "0.1.0",
        description = "Subscription entitlements and generation quota for AI game ideas"
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub fn create_docs_router() -> Router<AppState> {
    Router::new().merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
