use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use crate::{
    errors::Result,
    models::{Credits, EntitlementRecord, PaymentEvent},
    services::entitlement_engine,
    storage::{ConsumeOutcome, EntitlementStore, PurchaseOutcome, Transition},
};

#[derive(Default)]
struct State {
    records: HashMap<String, EntitlementRecord>,
    // (user_id, purchase_id)
    applied: HashSet<(String, String)>,
    applied_ids: HashSet<String>,
}

/// Process-local store. Every operation holds one write lock, which gives
/// the same per-user atomicity as the Postgres row lock.
#[derive(Default)]
pub struct InMemoryEntitlementStore {
    state: RwLock<State>,
}

impl InMemoryEntitlementStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntitlementStore for InMemoryEntitlementStore {
    async fn get(&self, user_id: &str) -> Result<Option<EntitlementRecord>> {
        Ok(self.state.read().await.records.get(user_id).cloned())
    }

    async fn put(&self, record: &EntitlementRecord) -> Result<()> {
        self.state
            .write()
            .await
            .records
            .insert(record.user_id.clone(), record.clone());
        Ok(())
    }

    async fn get_or_create(&self, user_id: &str, now: DateTime<Utc>) -> Result<EntitlementRecord> {
        let mut state = self.state.write().await;
        let record = state
            .records
            .entry(user_id.to_string())
            .or_insert_with(|| EntitlementRecord::new_free(user_id, now));
        Ok(record.clone())
    }

    async fn consume_if_available(&self, user_id: &str, now: DateTime<Utc>) -> Result<ConsumeOutcome> {
        let mut state = self.state.write().await;
        let record = state
            .records
            .entry(user_id.to_string())
            .or_insert_with(|| EntitlementRecord::new_free(user_id, now));

        if !entitlement_engine::can_generate(record) {
            return Ok(ConsumeOutcome::Denied(record.clone()));
        }

        *record = entitlement_engine::consume_generation(record, now);
        Ok(ConsumeOutcome::Consumed(record.clone()))
    }

    async fn apply_purchase_once(
        &self,
        event: &PaymentEvent,
        granted: Credits,
        now: DateTime<Utc>,
    ) -> Result<PurchaseOutcome> {
        let mut state = self.state.write().await;

        if !state.applied_ids.insert(event.purchase_id.clone()) {
            let record = state
                .records
                .get(&event.user_id)
                .cloned()
                .unwrap_or_else(|| EntitlementRecord::new_free(&event.user_id, now));
            return Ok(PurchaseOutcome::AlreadyApplied(record));
        }
        state
            .applied
            .insert((event.user_id.clone(), event.purchase_id.clone()));

        let record = state
            .records
            .entry(event.user_id.clone())
            .or_insert_with(|| EntitlementRecord::new_free(&event.user_id, now));
        *record = entitlement_engine::apply_purchase(record, event.plan_type, granted, now);
        Ok(PurchaseOutcome::Applied(record.clone()))
    }

    async fn update(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        transition: Transition,
    ) -> Result<EntitlementRecord> {
        let mut state = self.state.write().await;
        let record = state
            .records
            .entry(user_id.to_string())
            .or_insert_with(|| EntitlementRecord::new_free(user_id, now));
        *record = transition(record, now);
        Ok(record.clone())
    }

    async fn purchase_applied(&self, user_id: &str, purchase_id: &str) -> Result<bool> {
        Ok(self
            .state
            .read()
            .await
            .applied
            .contains(&(user_id.to_string(), purchase_id.to_string())))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PlanType, SubscriptionStatus, SubscriptionTier};
    use std::sync::Arc;

    fn event(purchase_id: &str, plan_type: PlanType) -> PaymentEvent {
        PaymentEvent {
            purchase_id: purchase_id.to_string(),
            user_id: "user-1".to_string(),
            plan_type,
            generations_granted: None,
        }
    }

    #[tokio::test]
    async fn test_get_or_create_is_stable() {
        let store = InMemoryEntitlementStore::new();
        let first = store.get_or_create("user-1", Utc::now()).await.unwrap();
        let second = store.get_or_create("user-1", Utc::now()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.subscription_tier, SubscriptionTier::Free);
    }

    #[tokio::test]
    async fn test_duplicate_purchase_is_applied_once() {
        let store = InMemoryEntitlementStore::new();
        let now = Utc::now();
        let purchase = event("cs_1", PlanType::OneShot);

        let once = store
            .apply_purchase_once(&purchase, Credits::Limited(5), now)
            .await
            .unwrap();
        assert!(matches!(once, PurchaseOutcome::Applied(_)));

        let twice = store
            .apply_purchase_once(&purchase, Credits::Limited(5), now)
            .await
            .unwrap();
        assert!(matches!(twice, PurchaseOutcome::AlreadyApplied(_)));
        assert_eq!(once.record(), twice.record());
        assert_eq!(twice.record().generations_remaining, 5);
        assert!(store.purchase_applied("user-1", "cs_1").await.unwrap());
        assert!(!store.purchase_applied("user-2", "cs_1").await.unwrap());
    }

    #[tokio::test]
    async fn test_replayed_purchase_for_other_user_creates_nothing() {
        let store = InMemoryEntitlementStore::new();
        let now = Utc::now();
        store
            .apply_purchase_once(&event("cs_1", PlanType::Spark), Credits::Limited(4), now)
            .await
            .unwrap();

        let mut replay = event("cs_1", PlanType::Spark);
        replay.user_id = "user-2".to_string();
        let outcome = store
            .apply_purchase_once(&replay, Credits::Limited(4), now)
            .await
            .unwrap();

        assert!(matches!(outcome, PurchaseOutcome::AlreadyApplied(_)));
        assert_eq!(outcome.record().subscription_tier, SubscriptionTier::Free);
        assert_eq!(store.get("user-2").await.unwrap(), None);
        assert!(!store.purchase_applied("user-2", "cs_1").await.unwrap());
    }

    #[tokio::test]
    async fn test_distinct_purchases_stack() {
        let store = InMemoryEntitlementStore::new();
        let now = Utc::now();
        store
            .apply_purchase_once(&event("cs_1", PlanType::OneShot), Credits::Limited(1), now)
            .await
            .unwrap();
        let outcome = store
            .apply_purchase_once(&event("cs_2", PlanType::OneShot), Credits::Limited(1), now)
            .await
            .unwrap();
        assert_eq!(outcome.record().generations_remaining, 2);
        assert_eq!(outcome.record().subscription_status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn test_update_applies_transition() {
        let store = InMemoryEntitlementStore::new();
        let now = Utc::now();
        store
            .apply_purchase_once(&event("cs_1", PlanType::Creator), Credits::Limited(10), now)
            .await
            .unwrap();

        let record = store
            .update("user-1", now, entitlement_engine::unsubscribe)
            .await
            .unwrap();
        assert_eq!(record.subscription_tier, SubscriptionTier::Free);
        assert_eq!(record.subscription_status, SubscriptionStatus::Inactive);
        assert_eq!(store.get("user-1").await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_consume_denies_when_exhausted() {
        let store = InMemoryEntitlementStore::new();
        let now = Utc::now();

        let first = store.consume_if_available("user-1", now).await.unwrap();
        assert!(matches!(first, ConsumeOutcome::Consumed(ref r) if r.has_used_free_generation));

        let second = store.consume_if_available("user-1", now).await.unwrap();
        match second {
            ConsumeOutcome::Denied(record) => assert_eq!(record.total_generations, 1),
            other => panic!("expected denial, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_concurrent_consumers_never_overspend() {
        let store = Arc::new(InMemoryEntitlementStore::new());
        let now = Utc::now();
        store
            .apply_purchase_once(&event("cs_1", PlanType::OneShot), Credits::Limited(3), now)
            .await
            .unwrap();

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.consume_if_available("user-1", Utc::now()).await })
            })
            .collect();

        let mut consumed = 0;
        for handle in handles {
            if let ConsumeOutcome::Consumed(_) = handle.await.unwrap().unwrap() {
                consumed += 1;
            }
        }

        let record = store.get("user-1").await.unwrap().unwrap();
        assert_eq!(consumed, 3);
        assert_eq!(record.generations_remaining, 0);
        assert_eq!(record.total_generations, 3);
    }
}
