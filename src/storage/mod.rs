use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::{
    config::{Config, StoreBackend},
    database::Database,
    errors::Result,
    models::{Credits, EntitlementRecord, PaymentEvent},
};

pub mod memory;
pub mod postgres;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// A credit was available and has been spent.
    Consumed(EntitlementRecord),
    /// Nothing left to spend. Carries the unchanged record.
    Denied(EntitlementRecord),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseOutcome {
    Applied(EntitlementRecord),
    /// The purchase id was seen before. Carries the delivering user's current
    /// record untouched, or an unsaved default when that user has none.
    AlreadyApplied(EntitlementRecord),
}

/// A pure record transition, applied by [`EntitlementStore::update`].
pub type Transition = fn(&EntitlementRecord, DateTime<Utc>) -> EntitlementRecord;

impl PurchaseOutcome {
    pub fn record(&self) -> &EntitlementRecord {
        match self {
            PurchaseOutcome::Applied(record) | PurchaseOutcome::AlreadyApplied(record) => record,
        }
    }
}

/// Persistence boundary for entitlement records.
///
/// `consume_if_available` and `apply_purchase_once` are atomic with respect
/// to every other write on the same user. Both paths mutate the same record
/// without any coordination above this layer.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<EntitlementRecord>>;

    async fn put(&self, record: &EntitlementRecord) -> Result<()>;

    async fn get_or_create(&self, user_id: &str, now: DateTime<Utc>) -> Result<EntitlementRecord>;

    async fn consume_if_available(&self, user_id: &str, now: DateTime<Utc>) -> Result<ConsumeOutcome>;

    async fn apply_purchase_once(
        &self,
        event: &PaymentEvent,
        granted: Credits,
        now: DateTime<Utc>,
    ) -> Result<PurchaseOutcome>;

    /// Run `transition` against the user's record under the same per-user
    /// lock as consume and purchase, creating the default record if absent.
    async fn update(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        transition: Transition,
    ) -> Result<EntitlementRecord>;

    async fn purchase_applied(&self, user_id: &str, purchase_id: &str) -> Result<bool>;

    async fn ping(&self) -> Result<()>;
}

pub async fn create_store(config: &Config) -> Result<Arc<dyn EntitlementStore>> {
    match config.store_backend {
        StoreBackend::Postgres => {
            let database = Database::new(&config.database_url).await?;
            database.migrate().await?;
            Ok(Arc::new(postgres::PgEntitlementStore::new(database)))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory entitlement store; state is lost on restart");
            Ok(Arc::new(memory::InMemoryEntitlementStore::new()))
        }
    }
}
