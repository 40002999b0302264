use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    models::{EntitlementRecord, GeneratedIdea},
    services::entitlement_engine,
};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EntitlementResponse {
    pub entitlement: EntitlementRecord,
    /// `None` when the plan is unlimited.
    pub remaining_credits: Option<u32>,
    pub unlimited: bool,
    pub can_generate: bool,
    pub level: u64,
    pub level_title: String,
}

impl From<EntitlementRecord> for EntitlementResponse {
    fn from(record: EntitlementRecord) -> Self {
        let credits = entitlement_engine::remaining_credits(&record);
        let level = entitlement_engine::level(record.total_generations);
        Self {
            remaining_credits: credits.limited(),
            unlimited: credits.is_unlimited(),
            can_generate: credits.is_available(),
            level,
            level_title: entitlement_engine::level_title(level).to_string(),
            entitlement: record,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GenerateResponse {
    pub idea: GeneratedIdea,
    pub entitlement: EntitlementResponse,
    /// True when the stored record differs from the locally predicted one,
    /// e.g. a purchase landed while the idea was being generated.
    pub reconciled: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PurchaseStatusResponse {
    pub purchase_id: String,
    pub confirmed: bool,
    pub entitlement: EntitlementResponse,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PlanResponse {
    pub plan_type: String,
    pub name: String,
    pub price_cents: u32,
    pub price: String,
    /// `None` when the plan is unlimited.
    pub generations: Option<u32>,
    pub unlimited: bool,
    pub interval: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    /// Poll `/api/v1/entitlement/purchases/{session_id}` with this after
    /// the buyer returns.
    pub session_id: String,
    pub url: Option<String>,
}
