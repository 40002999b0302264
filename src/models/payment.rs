use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, str::FromStr};
use utoipa::ToSchema;

use crate::{errors::AppError, models::SubscriptionTier};

/// Purchasable plans. `free` is not for sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum PlanType {
    #[serde(rename = "one-shot", alias = "one_shot")]
    OneShot,
    #[serde(rename = "spark")]
    Spark,
    #[serde(rename = "creator")]
    Creator,
    #[serde(rename = "universe")]
    Universe,
}

impl PlanType {
    pub const ALL: [PlanType; 4] = [
        PlanType::OneShot,
        PlanType::Spark,
        PlanType::Creator,
        PlanType::Universe,
    ];

    pub fn tier(&self) -> SubscriptionTier {
        match self {
            PlanType::OneShot => SubscriptionTier::OneShot,
            PlanType::Spark => SubscriptionTier::Spark,
            PlanType::Creator => SubscriptionTier::Creator,
            PlanType::Universe => SubscriptionTier::Universe,
        }
    }

    /// Recurring plans replace the allotment; one-shot purchases top it up.
    pub fn is_recurring(&self) -> bool {
        !matches!(self, PlanType::OneShot)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::OneShot => "one-shot",
            PlanType::Spark => "spark",
            PlanType::Creator => "creator",
            PlanType::Universe => "universe",
        }
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "one-shot" | "one_shot" => Ok(PlanType::OneShot),
            "spark" => Ok(PlanType::Spark),
            "creator" => Ok(PlanType::Creator),
            "universe" => Ok(PlanType::Universe),
            other => Err(AppError::Validation(format!("Invalid plan type: {}", other))),
        }
    }
}

/// A completed purchase, normalized from the processor's webhook payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub purchase_id: String,
    pub user_id: String,
    pub plan_type: PlanType,
    /// Explicit grant carried in the checkout metadata, if any.
    pub generations_granted: Option<u32>,
}

/// Body of `POST /api/v1/checkout`. The buyer is the authenticated user.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    #[schema(example = "spark")]
    pub plan_type: String,
    pub email: Option<String>,
}

/// Processor event envelope. Only the fields this service reads.
#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub object: CheckoutSession,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}
