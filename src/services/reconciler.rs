//! Optimistic entitlement display with eventual server truth.
//!
//! The interactive path predicts the effect of a generation locally so it can
//! answer immediately, then swaps in whatever the store confirms. Purchases
//! arrive out of band through the webhook, so after checkout the client polls
//! [`await_purchase`] rather than assuming the grant is already visible.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::{
    errors::Result,
    models::EntitlementRecord,
    services::entitlement_engine,
    storage::EntitlementStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewPhase {
    Predicted,
    Confirmed,
}

#[derive(Debug, Clone)]
pub struct EntitlementView {
    confirmed: EntitlementRecord,
    predicted: Option<EntitlementRecord>,
}

impl EntitlementView {
    pub fn new(confirmed: EntitlementRecord) -> Self {
        Self {
            confirmed,
            predicted: None,
        }
    }

    /// The record to show right now.
    pub fn current(&self) -> &EntitlementRecord {
        self.predicted.as_ref().unwrap_or(&self.confirmed)
    }

    pub fn phase(&self) -> ViewPhase {
        if self.predicted.is_some() {
            ViewPhase::Predicted
        } else {
            ViewPhase::Confirmed
        }
    }

    pub fn predict_consume(&mut self, now: DateTime<Utc>) -> &EntitlementRecord {
        let next = entitlement_engine::consume_generation(self.current(), now);
        self.predicted.insert(next)
    }

    /// Replace any prediction with the stored record. Returns true when the
    /// prediction disagreed on anything quota-relevant.
    pub fn reconcile(&mut self, confirmed: EntitlementRecord) -> bool {
        let diverged = match self.predicted.take() {
            Some(predicted) => !same_quota_state(&predicted, &confirmed),
            None => false,
        };
        if diverged {
            tracing::debug!(
                user_id = %confirmed.user_id,
                "Predicted entitlement replaced by stored record"
            );
        }
        self.confirmed = confirmed;
        diverged
    }

    pub fn into_confirmed(self) -> EntitlementRecord {
        self.confirmed
    }
}

// Timestamps are ignored: prediction and store read the clock separately.
fn same_quota_state(a: &EntitlementRecord, b: &EntitlementRecord) -> bool {
    a.subscription_tier == b.subscription_tier
        && a.subscription_status == b.subscription_status
        && a.has_used_free_generation == b.has_used_free_generation
        && a.generations_remaining == b.generations_remaining
        && a.total_generations == b.total_generations
        && entitlement_engine::remaining_credits(a) == entitlement_engine::remaining_credits(b)
}

#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

#[derive(Debug, Clone)]
pub struct PurchaseConfirmation {
    pub confirmed: bool,
    pub record: EntitlementRecord,
}

/// Poll the store until `purchase_id` has been applied for `user_id` or the
/// attempts run out. Always returns the freshest record.
pub async fn await_purchase(
    store: &dyn EntitlementStore,
    user_id: &str,
    purchase_id: &str,
    policy: PollPolicy,
) -> Result<PurchaseConfirmation> {
    let attempts = policy.attempts.max(1);

    for attempt in 1..=attempts {
        if store.purchase_applied(user_id, purchase_id).await? {
            let record = store.get_or_create(user_id, Utc::now()).await?;
            tracing::info!(user_id, purchase_id, attempt, "Purchase confirmed");
            return Ok(PurchaseConfirmation {
                confirmed: true,
                record,
            });
        }

        if attempt < attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    tracing::warn!(user_id, purchase_id, attempts, "Purchase not confirmed yet");
    let record = store.get_or_create(user_id, Utc::now()).await?;
    Ok(PurchaseConfirmation {
        confirmed: false,
        record,
    })
}
