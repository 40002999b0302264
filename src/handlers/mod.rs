use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::{
    config::Config,
    services::{
        CheckoutProvider, CheckoutService, IdeaGenerator, MetricsService, PlanCatalog,
        PurchaseProcessor, QuotaManager, RateLimiter, RedisService,
    },
    storage::EntitlementStore,
};

pub mod checkout;
pub mod docs;
pub mod entitlement;
pub mod generate;
pub mod health;
pub mod metrics;
pub mod plans;
pub mod webhook;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EntitlementStore>,
    pub redis: Option<RedisService>,
    pub quota: QuotaManager,
    pub purchases: PurchaseProcessor,
    pub checkout: CheckoutService,
    pub catalog: PlanCatalog,
    pub config: Config,
    pub metrics: MetricsService,
    pub metrics_handle: PrometheusHandle,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn EntitlementStore>,
        generator: Arc<dyn IdeaGenerator>,
        checkout_provider: Arc<dyn CheckoutProvider>,
        redis: Option<RedisService>,
        metrics_handle: PrometheusHandle,
    ) -> Self {
        let metrics = MetricsService::new();
        let catalog = PlanCatalog::from_config(&config);
        let rate_limiter = redis.clone().map(|redis| {
            RateLimiter::new(redis, config.rate_limit_requests, config.rate_limit_window)
        });

        let quota = QuotaManager::new(
            Arc::clone(&store),
            generator,
            rate_limiter,
            metrics.clone(),
            &config,
        );
        let purchases =
            PurchaseProcessor::new(Arc::clone(&store), catalog.clone(), metrics.clone(), &config);
        let checkout =
            CheckoutService::new(checkout_provider, catalog.clone(), metrics.clone(), &config);

        Self {
            store,
            redis,
            quota,
            purchases,
            checkout,
            catalog,
            config,
            metrics,
            metrics_handle,
        }
    }
}
