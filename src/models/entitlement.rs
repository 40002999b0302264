use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use utoipa::ToSchema;

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    Free,
    OneShot,
    Spark,
    Creator,
    Universe,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::OneShot => "one_shot",
            Self::Spark => "spark",
            Self::Creator => "creator",
            Self::Universe => "universe",
        }
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionTier {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Self::Free),
            "one_shot" | "one-shot" => Ok(Self::OneShot),
            "spark" => Ok(Self::Spark),
            "creator" => Ok(Self::Creator),
            "universe" => Ok(Self::Universe),
            other => Err(AppError::Validation(format!("Unknown subscription tier: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Inactive,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "expired" => Ok(Self::Expired),
            other => Err(AppError::Validation(format!("Unknown subscription status: {}", other))),
        }
    }
}

/// Largest `generations_remaining` any store can hold (the Postgres column is
/// an `INTEGER`).
pub const MAX_GENERATIONS: u32 = i32::MAX as u32;

/// Remaining generation allowance as computed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "count")]
pub enum Credits {
    Limited(u32),
    Unlimited,
}

impl Credits {
    pub fn is_available(&self) -> bool {
        match self {
            Credits::Limited(n) => *n > 0,
            Credits::Unlimited => true,
        }
    }

    pub fn limited(&self) -> Option<u32> {
        match self {
            Credits::Limited(n) => Some(*n),
            Credits::Unlimited => None,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, Credits::Unlimited)
    }
}

impl fmt::Display for Credits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credits::Limited(n) => write!(f, "{}", n),
            Credits::Unlimited => f.write_str("unlimited"),
        }
    }
}

/// Per-user entitlement state. One record per user, never hard-deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EntitlementRecord {
    pub user_id: String,
    pub subscription_tier: SubscriptionTier,
    pub subscription_status: SubscriptionStatus,
    pub has_used_free_generation: bool,
    /// Finite bucket for one_shot, spark and creator. Ignored for the other tiers.
    pub generations_remaining: u32,
    /// Lifetime count of consumed generations. Never decremented.
    pub total_generations: u64,
    pub subscription_start_date: Option<DateTime<Utc>>,
    pub subscription_end_date: Option<DateTime<Utc>>,
    pub last_generation_date: Option<DateTime<Utc>>,
    pub last_payment_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EntitlementRecord {
    /// Record written on a user's first authenticated access.
    ///
    /// `generations_remaining` starts at 1 as a marker only; free-tier
    /// capacity is derived from `has_used_free_generation`.
    pub fn new_free(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            subscription_tier: SubscriptionTier::Free,
            subscription_status: SubscriptionStatus::Inactive,
            has_used_free_generation: false,
            generations_remaining: 1,
            total_generations: 0,
            subscription_start_date: None,
            subscription_end_date: None,
            last_generation_date: None,
            last_payment_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.subscription_status == SubscriptionStatus::Active
    }
}
