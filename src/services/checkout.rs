use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::{collections::HashMap, sync::Arc, time::Duration};

use crate::{
    config::Config,
    errors::{AppError, Result},
    models::{Credits, PlanType},
    services::{metrics::MetricsService, plan_catalog::PlanCatalog},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutMode {
    Payment,
    Subscription,
}

impl CheckoutMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutMode::Payment => "payment",
            CheckoutMode::Subscription => "subscription",
        }
    }
}

/// Everything the processor needs to open a hosted checkout page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionRequest {
    pub mode: CheckoutMode,
    pub product_name: String,
    pub product_description: String,
    pub unit_amount_cents: u32,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: Option<String>,
    /// Read back by the webhook when the checkout completes.
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedCheckout {
    #[serde(rename = "id")]
    pub session_id: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CheckoutProvider: Send + Sync {
    async fn create_session(&self, request: &CheckoutSessionRequest) -> Result<CreatedCheckout>;
}

/// Build the session for `plan`. One-shot purchases carry their grant in
/// the metadata; recurring plans are resolved against the catalog when the
/// webhook arrives.
pub fn session_request(
    catalog: &PlanCatalog,
    plan: PlanType,
    user_id: &str,
    customer_email: Option<String>,
    origin: &str,
) -> CheckoutSessionRequest {
    let details = catalog.details(plan);
    let origin = origin.trim_end_matches('/');

    let mut metadata = HashMap::from([
        ("userId".to_string(), user_id.to_string()),
        ("planType".to_string(), plan.as_str().to_string()),
    ]);

    let (mode, product_description) = if plan.is_recurring() {
        let allotment = match details.generations {
            Credits::Unlimited => "Unlimited".to_string(),
            Credits::Limited(n) => n.to_string(),
        };
        (
            CheckoutMode::Subscription,
            format!("{} AI-powered game idea generations per month", allotment),
        )
    } else {
        if let Some(n) = details.generations.limited() {
            metadata.insert("generations".to_string(), n.to_string());
        }
        (
            CheckoutMode::Payment,
            "Single AI-powered game idea generation".to_string(),
        )
    };

    CheckoutSessionRequest {
        mode,
        product_name: details.name.to_string(),
        product_description,
        unit_amount_cents: details.price_cents,
        success_url: format!("{}?payment=success&session_id={{CHECKOUT_SESSION_ID}}", origin),
        cancel_url: format!("{}?payment=cancelled", origin),
        customer_email,
        metadata,
    }
}

pub struct StripeCheckoutProvider {
    client: Client,
    api_base: String,
    secret_key: Option<String>,
}

impl StripeCheckoutProvider {
    pub fn new(
        api_base: impl Into<String>,
        secret_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.stripe_api_base.clone(),
            config.stripe_secret_key.clone(),
            Duration::from_secs(10),
        )
    }

    pub fn is_configured(&self) -> bool {
        self.secret_key.as_deref().is_some_and(|key| !key.is_empty())
    }
}

fn form_params(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
    let item = "line_items[0]";
    let mut params = vec![
        ("mode".to_string(), request.mode.as_str().to_string()),
        ("payment_method_types[0]".to_string(), "card".to_string()),
        (format!("{}[quantity]", item), "1".to_string()),
        (format!("{}[price_data][currency]", item), "usd".to_string()),
        (
            format!("{}[price_data][unit_amount]", item),
            request.unit_amount_cents.to_string(),
        ),
        (
            format!("{}[price_data][product_data][name]", item),
            request.product_name.clone(),
        ),
        (
            format!("{}[price_data][product_data][description]", item),
            request.product_description.clone(),
        ),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
    ];

    if request.mode == CheckoutMode::Subscription {
        params.push((
            format!("{}[price_data][recurring][interval]", item),
            "month".to_string(),
        ));
    }
    if let Some(email) = &request.customer_email {
        params.push(("customer_email".to_string(), email.clone()));
    }

    let mut metadata: Vec<_> = request.metadata.iter().collect();
    metadata.sort();
    for (key, value) in metadata {
        params.push((format!("metadata[{}]", key), value.clone()));
        if request.mode == CheckoutMode::Subscription {
            params.push((format!("subscription_data[metadata][{}]", key), value.clone()));
        }
    }

    params
}

#[async_trait]
impl CheckoutProvider for StripeCheckoutProvider {
    async fn create_session(&self, request: &CheckoutSessionRequest) -> Result<CreatedCheckout> {
        let secret_key = match self.secret_key.as_deref() {
            Some(key) if !key.is_empty() => key,
            _ => return Err(AppError::Checkout("payment processor not configured".to_string())),
        };

        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(secret_key)
            .form(&form_params(request))
            .send()
            .await
            .map_err(|e| AppError::Checkout(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            tracing::error!("Payment processor returned error: {}", response.status());
            return Err(AppError::Checkout(format!(
                "processor returned {}",
                response.status()
            )));
        }

        response
            .json::<CreatedCheckout>()
            .await
            .map_err(|e| AppError::Checkout(format!("unreadable response: {}", e)))
    }
}

#[derive(Clone)]
pub struct CheckoutService {
    provider: Arc<dyn CheckoutProvider>,
    catalog: PlanCatalog,
    metrics: MetricsService,
    default_origin: String,
}

impl CheckoutService {
    pub fn new(
        provider: Arc<dyn CheckoutProvider>,
        catalog: PlanCatalog,
        metrics: MetricsService,
        config: &Config,
    ) -> Self {
        Self {
            provider,
            catalog,
            metrics,
            default_origin: config.app_base_url.clone(),
        }
    }

    pub async fn start(
        &self,
        user_id: &str,
        plan_type: &str,
        customer_email: Option<String>,
        origin: Option<&str>,
    ) -> Result<CreatedCheckout> {
        let plan: PlanType = plan_type.parse()?;
        let email = customer_email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());
        let origin = origin
            .filter(|o| !o.is_empty())
            .unwrap_or(self.default_origin.as_str());

        let request = session_request(&self.catalog, plan, user_id, email, origin);
        let created = self.provider.create_session(&request).await?;

        self.metrics.record_checkout_started(plan.as_str());
        tracing::info!(
            user_id,
            plan = %plan,
            session_id = %created.session_id,
            "Checkout session created"
        );
        Ok(created)
    }
}
