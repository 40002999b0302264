use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::{collections::HashMap, sync::Arc};

use crate::{
    config::Config,
    errors::{AppError, Result},
    models::{Credits, EntitlementRecord, PaymentEvent, PlanType, WebhookEnvelope, MAX_GENERATIONS},
    services::{metrics::MetricsService, plan_catalog::PlanCatalog},
    storage::{EntitlementStore, PurchaseOutcome},
};

pub const SIGNATURE_HEADER: &str = "stripe-signature";
pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

type HmacSha256 = Hmac<Sha256>;

/// What happened to a delivered webhook. Every variant is acknowledged with
/// a 2xx; only errors make the processor redeliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied(EntitlementRecord),
    Duplicate(EntitlementRecord),
    Ignored { event_type: String },
    Dropped { reason: String },
}

/// Compute the `v1` signature for a payload.
pub fn sign_payload(secret: &str, timestamp: i64, body: &[u8]) -> Result<String> {
    let mut mac = new_mac(secret)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn new_mac(secret: &str) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid webhook secret: {}", e)))
}

/// Verify a `t=<unix>,v1=<hex>` signature header over `"{t}.{body}"`.
pub fn verify_signature(
    header: &str,
    body: &[u8],
    secret: &str,
    tolerance_secs: i64,
    now: DateTime<Utc>,
) -> Result<()> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(AppError::InvalidSignature)?;
    if signatures.is_empty() {
        return Err(AppError::InvalidSignature);
    }
    if now.timestamp().abs_diff(timestamp) > tolerance_secs.max(0) as u64 {
        tracing::warn!(timestamp, "Webhook timestamp outside tolerance");
        return Err(AppError::InvalidSignature);
    }

    let matched = signatures.iter().any(|candidate| {
        let Ok(expected) = hex::decode(candidate) else {
            return false;
        };
        let Ok(mut mac) = new_mac(secret) else {
            return false;
        };
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        mac.verify_slice(&expected).is_ok()
    });

    if matched {
        Ok(())
    } else {
        Err(AppError::InvalidSignature)
    }
}

/// Normalize checkout metadata into a [`PaymentEvent`]. Errors here are
/// permanent: redelivering the same payload cannot fix them.
pub fn event_from_metadata(
    purchase_id: &str,
    metadata: &HashMap<String, String>,
) -> Result<PaymentEvent> {
    let user_id = metadata
        .get("userId")
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Validation("missing userId metadata".to_string()))?;

    let plan_type: PlanType = metadata
        .get("planType")
        .ok_or_else(|| AppError::Validation("missing planType metadata".to_string()))?
        .parse()?;

    let generations_granted = match metadata.get("generations") {
        Some(raw) => match raw.trim().parse::<u32>() {
            Ok(n) if n <= MAX_GENERATIONS => Some(n),
            _ => {
                tracing::warn!(purchase_id, raw = %raw, "Unreadable generations metadata; using plan default");
                None
            }
        },
        None => None,
    };

    Ok(PaymentEvent {
        purchase_id: purchase_id.to_string(),
        user_id: user_id.to_string(),
        plan_type,
        generations_granted,
    })
}

/// Credits granted by a purchase. Universe is always unlimited; otherwise an
/// explicit metadata grant wins over the catalog.
pub fn resolve_grant(event: &PaymentEvent, catalog: &PlanCatalog) -> Credits {
    match (event.plan_type, event.generations_granted) {
        (PlanType::Universe, _) => Credits::Unlimited,
        (_, Some(n)) => Credits::Limited(n),
        (plan, None) => catalog.grant_for(plan),
    }
}

#[derive(Clone)]
pub struct PurchaseProcessor {
    store: Arc<dyn EntitlementStore>,
    catalog: PlanCatalog,
    metrics: MetricsService,
    secret: String,
    tolerance_secs: i64,
}

impl PurchaseProcessor {
    pub fn new(
        store: Arc<dyn EntitlementStore>,
        catalog: PlanCatalog,
        metrics: MetricsService,
        config: &Config,
    ) -> Self {
        Self {
            store,
            catalog,
            metrics,
            secret: config.webhook_secret.clone(),
            tolerance_secs: config.webhook_tolerance_secs,
        }
    }

    pub async fn handle(&self, signature: Option<&str>, body: &[u8]) -> Result<WebhookOutcome> {
        let now = Utc::now();
        let signature = signature.ok_or(AppError::InvalidSignature)?;
        verify_signature(signature, body, &self.secret, self.tolerance_secs, now)?;

        let envelope: WebhookEnvelope = match serde_json::from_slice(body) {
            Ok(envelope) => envelope,
            Err(e) => return Ok(self.drop_event(format!("unparseable event: {}", e))),
        };

        if envelope.event_type != CHECKOUT_COMPLETED {
            tracing::debug!(event_type = %envelope.event_type, "Ignoring webhook event");
            return Ok(WebhookOutcome::Ignored {
                event_type: envelope.event_type,
            });
        }

        let session = envelope.data.object;
        let event = match event_from_metadata(&session.id, &session.metadata) {
            Ok(event) => event,
            Err(e) => {
                return Ok(self.drop_event(format!("session {}: {}", session.id, e)));
            }
        };

        let granted = resolve_grant(&event, &self.catalog);
        match self.store.apply_purchase_once(&event, granted, now).await? {
            PurchaseOutcome::Applied(record) => {
                self.metrics.record_purchase_applied(event.plan_type.as_str());
                tracing::info!(
                    user_id = %event.user_id,
                    purchase_id = %event.purchase_id,
                    plan = %event.plan_type,
                    granted = %granted,
                    "Purchase applied"
                );
                Ok(WebhookOutcome::Applied(record))
            }
            PurchaseOutcome::AlreadyApplied(record) => {
                self.metrics.record_duplicate_purchase();
                tracing::info!(purchase_id = %event.purchase_id, "Duplicate purchase delivery");
                Ok(WebhookOutcome::Duplicate(record))
            }
        }
    }

    fn drop_event(&self, reason: String) -> WebhookOutcome {
        tracing::warn!(reason = %reason, "Dropping webhook event");
        self.metrics.record_error("webhook_dropped");
        WebhookOutcome::Dropped { reason }
    }
}
