use chrono::Utc;
use std::{sync::Arc, time::Duration};

use crate::{
    config::Config,
    errors::{AppError, Result},
    models::{EntitlementRecord, GeneratedIdea},
    services::{
        entitlement_engine,
        idea_generator::{effective_prompt, IdeaGenerator},
        metrics::MetricsService,
        rate_limiter::RateLimiter,
        reconciler::EntitlementView,
    },
    storage::{ConsumeOutcome, EntitlementStore},
};

const GENERATE_ACTION: &str = "generate";

/// Gates idea generation on the caller's entitlement.
///
/// A credit is only spent after the generator has produced an idea, and the
/// spend itself is the store's atomic conditional consume. The up-front
/// `can_generate` check exists so users without credits never wait on the
/// generator.
#[derive(Clone)]
pub struct QuotaManager {
    store: Arc<dyn EntitlementStore>,
    generator: Arc<dyn IdeaGenerator>,
    rate_limiter: Option<RateLimiter>,
    metrics: MetricsService,
    generation_timeout: Duration,
    persist_retry_attempts: u32,
}

#[derive(Debug)]
pub struct GenerationResult {
    pub idea: GeneratedIdea,
    pub record: EntitlementRecord,
    /// True when the stored record disagrees with the locally predicted one.
    pub reconciled: bool,
}

impl QuotaManager {
    pub fn new(
        store: Arc<dyn EntitlementStore>,
        generator: Arc<dyn IdeaGenerator>,
        rate_limiter: Option<RateLimiter>,
        metrics: MetricsService,
        config: &Config,
    ) -> Self {
        Self {
            store,
            generator,
            rate_limiter,
            metrics,
            generation_timeout: Duration::from_secs(config.generation_timeout_secs),
            persist_retry_attempts: config.persist_retry_attempts,
        }
    }

    pub async fn entitlement(&self, user_id: &str) -> Result<EntitlementRecord> {
        self.store.get_or_create(user_id, Utc::now()).await
    }

    pub async fn unsubscribe(&self, user_id: &str) -> Result<EntitlementRecord> {
        let record = self
            .store
            .update(user_id, Utc::now(), entitlement_engine::unsubscribe)
            .await?;
        tracing::info!(user_id, "Subscription cancelled");
        Ok(record)
    }

    pub async fn generate(&self, user_id: &str, prompt: Option<&str>) -> Result<GenerationResult> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.enforce(user_id, GENERATE_ACTION).await?;
        }

        let record = self.store.get_or_create(user_id, Utc::now()).await?;
        if !entitlement_engine::can_generate(&record) {
            tracing::info!(user_id, tier = %record.subscription_tier, "Generation denied: no credits");
            self.metrics.record_generation_denied("no_credits");
            return Err(AppError::NoCreditsRemaining);
        }

        let mut view = EntitlementView::new(record);
        let prompt = effective_prompt(prompt);

        let idea = match tokio::time::timeout(self.generation_timeout, self.generator.generate(prompt)).await {
            Ok(Ok(idea)) => idea,
            Ok(Err(err)) => {
                self.metrics.record_error("generation");
                return Err(match err {
                    AppError::Generation(_) => err,
                    other => AppError::Generation(other.to_string()),
                });
            }
            Err(_) => {
                self.metrics.record_error("generation_timeout");
                return Err(AppError::Generation(format!(
                    "timed out after {}s",
                    self.generation_timeout.as_secs()
                )));
            }
        };

        let now = Utc::now();
        view.predict_consume(now);

        let confirmed = match self.consume_with_retry(user_id).await? {
            ConsumeOutcome::Consumed(record) => record,
            ConsumeOutcome::Denied(_) => {
                // Another request spent the last credit while this idea was
                // being generated.
                tracing::warn!(user_id, "Credit spent concurrently; discarding generated idea");
                self.metrics.record_generation_denied("lost_race");
                return Err(AppError::NoCreditsRemaining);
            }
        };

        let reconciled = view.reconcile(confirmed);
        let record = view.into_confirmed();

        self.metrics.record_generation(record.subscription_tier.as_str());
        tracing::info!(
            user_id,
            tier = %record.subscription_tier,
            total = record.total_generations,
            "Generation recorded"
        );

        Ok(GenerationResult {
            idea,
            record,
            reconciled,
        })
    }

    async fn consume_with_retry(&self, user_id: &str) -> Result<ConsumeOutcome> {
        let attempts = self.persist_retry_attempts.saturating_add(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.store.consume_if_available(user_id, Utc::now()).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) => {
                    tracing::warn!(user_id, attempt, error = %err, "Failed to record generation");
                    last_error = Some(err);
                }
            }
        }

        self.metrics.record_error("persistence");
        Err(AppError::PersistenceFailed(
            last_error.map(|e| e.to_string()).unwrap_or_default(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{Credits, PaymentEvent, PlanType, SubscriptionTier},
        services::idea_generator::{MockIdeaGenerator, DEFAULT_PROMPT},
        storage::{memory::InMemoryEntitlementStore, PurchaseOutcome, Transition},
    };
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn idea() -> GeneratedIdea {
        GeneratedIdea {
            title: "Orbit Garden".into(),
            description: "Grow plants on a tiny planet.".into(),
            category: "Mobile Game".into(),
            genre: "Simulation".into(),
            viability: 8,
            originality: 9,
            market_appeal: 7,
        }
    }

    fn manager(store: Arc<dyn EntitlementStore>, generator: MockIdeaGenerator) -> QuotaManager {
        QuotaManager {
            store,
            generator: Arc::new(generator),
            rate_limiter: None,
            metrics: MetricsService::new(),
            generation_timeout: Duration::from_secs(5),
            persist_retry_attempts: 1,
        }
    }

    #[tokio::test]
    async fn test_free_user_gets_exactly_one_generation() {
        let mut generator = MockIdeaGenerator::new();
        generator
            .expect_generate()
            .withf(|prompt| prompt.to_string() == DEFAULT_PROMPT)
            .times(1)
            .returning(|_| Ok(idea()));

        let store = Arc::new(InMemoryEntitlementStore::new());
        let manager = manager(store.clone(), generator);

        let result = manager.generate("u1", None).await.unwrap();
        assert_eq!(result.idea.title, "Orbit Garden");
        assert!(result.record.has_used_free_generation);
        assert!(!result.reconciled);

        // The generator must not be called again.
        assert!(matches!(
            manager.generate("u1", Some("pirates")).await,
            Err(AppError::NoCreditsRemaining)
        ));
    }

    #[tokio::test]
    async fn test_generator_failure_spends_nothing() {
        let mut generator = MockIdeaGenerator::new();
        generator
            .expect_generate()
            .returning(|_| Err(AppError::Generation("upstream 500".into())));

        let store = Arc::new(InMemoryEntitlementStore::new());
        let manager = manager(store.clone(), generator);

        assert!(matches!(
            manager.generate("u1", Some("x")).await,
            Err(AppError::Generation(_))
        ));
        let record = store.get("u1").await.unwrap().unwrap();
        assert!(!record.has_used_free_generation);
        assert_eq!(record.total_generations, 0);
    }

    #[tokio::test]
    async fn test_unlimited_plan_keeps_generating() {
        let mut generator = MockIdeaGenerator::new();
        generator.expect_generate().times(3).returning(|_| Ok(idea()));

        let store = Arc::new(InMemoryEntitlementStore::new());
        store
            .apply_purchase_once(
                &PaymentEvent {
                    purchase_id: "cs_u".into(),
                    user_id: "u1".into(),
                    plan_type: PlanType::Universe,
                    generations_granted: None,
                },
                Credits::Unlimited,
                Utc::now(),
            )
            .await
            .unwrap();
        let manager = manager(store, generator);

        for _ in 0..3 {
            let result = manager.generate("u1", Some("space")).await.unwrap();
            assert_eq!(result.record.subscription_tier, SubscriptionTier::Universe);
        }
    }

    #[tokio::test]
    async fn test_unsubscribe_reverts_to_free() {
        let store = Arc::new(InMemoryEntitlementStore::new());
        let manager = manager(store, MockIdeaGenerator::new());
        let record = manager.unsubscribe("u1").await.unwrap();
        assert_eq!(record.subscription_tier, SubscriptionTier::Free);
    }

    /// Store whose consume fails a configurable number of times.
    struct FlakyStore {
        inner: InMemoryEntitlementStore,
        failures: AtomicU32,
    }

    #[async_trait]
    impl EntitlementStore for FlakyStore {
        async fn get(&self, user_id: &str) -> Result<Option<EntitlementRecord>> {
            self.inner.get(user_id).await
        }
        async fn put(&self, record: &EntitlementRecord) -> Result<()> {
            self.inner.put(record).await
        }
        async fn get_or_create(&self, user_id: &str, now: DateTime<Utc>) -> Result<EntitlementRecord> {
            self.inner.get_or_create(user_id, now).await
        }
        async fn consume_if_available(&self, user_id: &str, now: DateTime<Utc>) -> Result<ConsumeOutcome> {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(AppError::Internal(anyhow::anyhow!("store offline")));
            }
            self.inner.consume_if_available(user_id, now).await
        }
        async fn apply_purchase_once(
            &self,
            event: &PaymentEvent,
            granted: Credits,
            now: DateTime<Utc>,
        ) -> Result<PurchaseOutcome> {
            self.inner.apply_purchase_once(event, granted, now).await
        }
        async fn update(
            &self,
            user_id: &str,
            now: DateTime<Utc>,
            transition: Transition,
        ) -> Result<EntitlementRecord> {
            self.inner.update(user_id, now, transition).await
        }
        async fn purchase_applied(&self, user_id: &str, purchase_id: &str) -> Result<bool> {
            self.inner.purchase_applied(user_id, purchase_id).await
        }
        async fn ping(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_single_store_failure_is_retried() {
        let mut generator = MockIdeaGenerator::new();
        generator.expect_generate().returning(|_| Ok(idea()));
        let store = Arc::new(FlakyStore {
            inner: InMemoryEntitlementStore::new(),
            failures: AtomicU32::new(1),
        });

        let result = manager(store, generator).generate("u1", None).await.unwrap();
        assert_eq!(result.record.total_generations, 1);
    }

    #[tokio::test]
    async fn test_persistent_store_failure_withholds_idea() {
        let mut generator = MockIdeaGenerator::new();
        generator.expect_generate().returning(|_| Ok(idea()));
        let store = Arc::new(FlakyStore {
            inner: InMemoryEntitlementStore::new(),
            failures: AtomicU32::new(2),
        });

        assert!(matches!(
            manager(store.clone(), generator).generate("u1", None).await,
            Err(AppError::PersistenceFailed(_))
        ));
        let record = store.get("u1").await.unwrap().unwrap();
        assert!(!record.has_used_free_generation);
    }

    /// Generator that lets a purchase land mid-generation.
    struct PurchaseDuringGeneration {
        store: Arc<InMemoryEntitlementStore>,
    }

    #[async_trait]
    impl IdeaGenerator for PurchaseDuringGeneration {
        async fn generate(&self, _prompt: &str) -> Result<GeneratedIdea> {
            let event = PaymentEvent {
                purchase_id: "cs_mid".into(),
                user_id: "u1".into(),
                plan_type: PlanType::Creator,
                generations_granted: None,
            };
            self.store
                .apply_purchase_once(&event, Credits::Limited(10), Utc::now())
                .await?;
            Ok(idea())
        }
    }

    #[tokio::test]
    async fn test_purchase_during_generation_is_reconciled() {
        let store = Arc::new(InMemoryEntitlementStore::new());
        let manager = QuotaManager {
            store: store.clone(),
            generator: Arc::new(PurchaseDuringGeneration { store: store.clone() }),
            rate_limiter: None,
            metrics: MetricsService::new(),
            generation_timeout: Duration::from_secs(5),
            persist_retry_attempts: 0,
        };

        let result = manager.generate("u1", None).await.unwrap();
        assert!(result.reconciled);
        assert_eq!(result.record.subscription_tier, SubscriptionTier::Creator);
        assert_eq!(result.record.generations_remaining, 10);
        assert!(!result.record.has_used_free_generation);
    }

    /// Generator that spends the caller's last credit while it runs, as a
    /// concurrent request would.
    struct CreditSpentDuringGeneration {
        store: Arc<InMemoryEntitlementStore>,
    }

    #[async_trait]
    impl IdeaGenerator for CreditSpentDuringGeneration {
        async fn generate(&self, _prompt: &str) -> Result<GeneratedIdea> {
            self.store.consume_if_available("u1", Utc::now()).await?;
            Ok(idea())
        }
    }

    #[tokio::test]
    async fn test_credit_spent_during_generation_discards_idea() {
        let store = Arc::new(InMemoryEntitlementStore::new());
        let manager = QuotaManager {
            store: store.clone(),
            generator: Arc::new(CreditSpentDuringGeneration { store: store.clone() }),
            rate_limiter: None,
            metrics: MetricsService::new(),
            generation_timeout: Duration::from_secs(5),
            persist_retry_attempts: 1,
        };

        assert!(matches!(
            manager.generate("u1", None).await,
            Err(AppError::NoCreditsRemaining)
        ));

        let record = store.get("u1").await.unwrap().unwrap();
        assert_eq!(record.total_generations, 1);
        assert!(record.has_used_free_generation);
    }
}
