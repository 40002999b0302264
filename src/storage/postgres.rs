use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    database::{
        queries::{EntitlementQueries, PurchaseQueries},
        Database,
    },
    errors::{AppError, Result},
    models::{Credits, EntitlementRecord, PaymentEvent},
    services::entitlement_engine,
    storage::{ConsumeOutcome, EntitlementStore, PurchaseOutcome, Transition},
};

pub struct PgEntitlementStore {
    database: Database,
}

impl PgEntitlementStore {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

fn missing_after_insert(user_id: &str) -> AppError {
    AppError::Internal(anyhow::anyhow!(
        "entitlement for user {} missing after insert",
        user_id
    ))
}

#[async_trait]
impl EntitlementStore for PgEntitlementStore {
    async fn get(&self, user_id: &str) -> Result<Option<EntitlementRecord>> {
        EntitlementQueries::find_by_user(self.database.pool(), user_id).await
    }

    async fn put(&self, record: &EntitlementRecord) -> Result<()> {
        EntitlementQueries::upsert(self.database.pool(), record).await
    }

    async fn get_or_create(&self, user_id: &str, now: DateTime<Utc>) -> Result<EntitlementRecord> {
        if let Some(record) = EntitlementQueries::find_by_user(self.database.pool(), user_id).await? {
            return Ok(record);
        }

        EntitlementQueries::insert_default(
            self.database.pool(),
            &EntitlementRecord::new_free(user_id, now),
        )
        .await?;
        tracing::info!(user_id, "Created free entitlement record");

        EntitlementQueries::find_by_user(self.database.pool(), user_id)
            .await?
            .ok_or_else(|| missing_after_insert(user_id))
    }

    async fn consume_if_available(&self, user_id: &str, now: DateTime<Utc>) -> Result<ConsumeOutcome> {
        let mut tx = self.database.pool().begin().await?;

        EntitlementQueries::insert_default(&mut *tx, &EntitlementRecord::new_free(user_id, now))
            .await?;
        let current = EntitlementQueries::find_for_update(&mut *tx, user_id)
            .await?
            .ok_or_else(|| missing_after_insert(user_id))?;

        if !entitlement_engine::can_generate(&current) {
            tx.rollback().await?;
            return Ok(ConsumeOutcome::Denied(current));
        }

        let next = entitlement_engine::consume_generation(&current, now);
        EntitlementQueries::upsert(&mut *tx, &next).await?;
        tx.commit().await?;

        Ok(ConsumeOutcome::Consumed(next))
    }

    async fn apply_purchase_once(
        &self,
        event: &PaymentEvent,
        granted: Credits,
        now: DateTime<Utc>,
    ) -> Result<PurchaseOutcome> {
        let mut tx = self.database.pool().begin().await?;

        // A concurrent delivery of the same id blocks here until this
        // transaction ends.
        if !PurchaseQueries::claim(&mut *tx, event, now).await? {
            let current = EntitlementQueries::find_by_user(&mut *tx, &event.user_id)
                .await?
                .unwrap_or_else(|| EntitlementRecord::new_free(&event.user_id, now));
            tx.commit().await?;
            return Ok(PurchaseOutcome::AlreadyApplied(current));
        }

        EntitlementQueries::insert_default(
            &mut *tx,
            &EntitlementRecord::new_free(&event.user_id, now),
        )
        .await?;
        let current = EntitlementQueries::find_for_update(&mut *tx, &event.user_id)
            .await?
            .ok_or_else(|| missing_after_insert(&event.user_id))?;

        let next = entitlement_engine::apply_purchase(&current, event.plan_type, granted, now);
        EntitlementQueries::upsert(&mut *tx, &next).await?;
        tx.commit().await?;

        Ok(PurchaseOutcome::Applied(next))
    }

    async fn update(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        transition: Transition,
    ) -> Result<EntitlementRecord> {
        let mut tx = self.database.pool().begin().await?;

        EntitlementQueries::insert_default(&mut *tx, &EntitlementRecord::new_free(user_id, now))
            .await?;
        let current = EntitlementQueries::find_for_update(&mut *tx, user_id)
            .await?
            .ok_or_else(|| missing_after_insert(user_id))?;

        let next = transition(&current, now);
        EntitlementQueries::upsert(&mut *tx, &next).await?;
        tx.commit().await?;

        Ok(next)
    }

    async fn purchase_applied(&self, user_id: &str, purchase_id: &str) -> Result<bool> {
        PurchaseQueries::exists(self.database.pool(), user_id, purchase_id).await
    }

    async fn ping(&self) -> Result<()> {
        self.database.ping().await
    }
}
