use metrics::{counter, histogram};
use std::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct MetricsService;

impl MetricsService {
    pub fn new() -> Self {
        Self
    }

    pub fn record_generation(&self, tier: &str) {
        counter!("generations_total", "tier" => tier.to_string()).increment(1);
    }

    pub fn record_generation_denied(&self, reason: &str) {
        counter!("generation_denied_total", "reason" => reason.to_string()).increment(1);
    }

    pub fn record_checkout_started(&self, plan: &str) {
        counter!("checkouts_started_total", "plan" => plan.to_string()).increment(1);
    }

    pub fn record_purchase_applied(&self, plan: &str) {
        counter!("purchases_applied_total", "plan" => plan.to_string()).increment(1);
    }

    pub fn record_duplicate_purchase(&self) {
        counter!("purchases_duplicate_total").increment(1);
    }

    pub fn record_error(&self, error_type: &str) {
        counter!("errors_total", "type" => error_type.to_string()).increment(1);
    }
}

pub struct RequestTimer {
    start: Instant,
    endpoint: String,
}

impl RequestTimer {
    pub fn new(endpoint: String) -> Self {
        Self {
            start: Instant::now(),
            endpoint,
        }
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        histogram!("request_duration_seconds", "endpoint" => self.endpoint.clone())
            .record(self.start.elapsed().as_secs_f64());
    }
}
