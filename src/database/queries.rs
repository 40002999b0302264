use anyhow::anyhow;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgExecutor};

use crate::{
    errors::{AppError, Result},
    models::{EntitlementRecord, PaymentEvent},
};

const ENTITLEMENT_COLUMNS: &str = "user_id, subscription_tier, subscription_status, \
    has_used_free_generation, generations_remaining, total_generations, \
    subscription_start_date, subscription_end_date, last_generation_date, \
    last_payment_date, created_at, updated_at";

#[derive(Debug, FromRow)]
struct EntitlementRow {
    user_id: String,
    subscription_tier: String,
    subscription_status: String,
    has_used_free_generation: bool,
    generations_remaining: i32,
    total_generations: i64,
    subscription_start_date: Option<DateTime<Utc>>,
    subscription_end_date: Option<DateTime<Utc>>,
    last_generation_date: Option<DateTime<Utc>>,
    last_payment_date: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EntitlementRow> for EntitlementRecord {
    type Error = AppError;

    fn try_from(row: EntitlementRow) -> Result<Self> {
        Ok(EntitlementRecord {
            subscription_tier: row.subscription_tier.parse()?,
            subscription_status: row.subscription_status.parse()?,
            has_used_free_generation: row.has_used_free_generation,
            generations_remaining: u32::try_from(row.generations_remaining).map_err(|_| {
                AppError::Internal(anyhow!(
                    "negative generations_remaining for user {}",
                    row.user_id
                ))
            })?,
            total_generations: u64::try_from(row.total_generations).map_err(|_| {
                AppError::Internal(anyhow!("negative total_generations for user {}", row.user_id))
            })?,
            subscription_start_date: row.subscription_start_date,
            subscription_end_date: row.subscription_end_date,
            last_generation_date: row.last_generation_date,
            last_payment_date: row.last_payment_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
            user_id: row.user_id,
        })
    }
}

pub struct EntitlementQueries;

impl EntitlementQueries {
    pub async fn find_by_user<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: &str,
    ) -> Result<Option<EntitlementRecord>> {
        let row = sqlx::query_as::<_, EntitlementRow>(&format!(
            "SELECT {} FROM entitlements WHERE user_id = $1",
            ENTITLEMENT_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(executor)
        .await?;

        row.map(EntitlementRecord::try_from).transpose()
    }

    /// Row-locks the record for the rest of the enclosing transaction.
    pub async fn find_for_update<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: &str,
    ) -> Result<Option<EntitlementRecord>> {
        let row = sqlx::query_as::<_, EntitlementRow>(&format!(
            "SELECT {} FROM entitlements WHERE user_id = $1 FOR UPDATE",
            ENTITLEMENT_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(executor)
        .await?;

        row.map(EntitlementRecord::try_from).transpose()
    }

    /// Inserts the default free record unless one already exists.
    pub async fn insert_default<'e, E: PgExecutor<'e>>(
        executor: E,
        record: &EntitlementRecord,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO entitlements (user_id, subscription_tier, subscription_status,
                has_used_free_generation, generations_remaining, total_generations,
                created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(&record.user_id)
        .bind(record.subscription_tier.as_str())
        .bind(record.subscription_status.as_str())
        .bind(record.has_used_free_generation)
        .bind(to_i32(record.generations_remaining)?)
        .bind(to_i64(record.total_generations))
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(executor)
        .await?;

        Ok(())
    }

    pub async fn upsert<'e, E: PgExecutor<'e>>(executor: E, record: &EntitlementRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO entitlements (user_id, subscription_tier, subscription_status,
                has_used_free_generation, generations_remaining, total_generations,
                subscription_start_date, subscription_end_date, last_generation_date,
                last_payment_date, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (user_id) DO UPDATE SET
                subscription_tier = EXCLUDED.subscription_tier,
                subscription_status = EXCLUDED.subscription_status,
                has_used_free_generation = EXCLUDED.has_used_free_generation,
                generations_remaining = EXCLUDED.generations_remaining,
                total_generations = GREATEST(entitlements.total_generations, EXCLUDED.total_generations),
                subscription_start_date = EXCLUDED.subscription_start_date,
                subscription_end_date = EXCLUDED.subscription_end_date,
                last_generation_date = EXCLUDED.last_generation_date,
                last_payment_date = EXCLUDED.last_payment_date,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&record.user_id)
        .bind(record.subscription_tier.as_str())
        .bind(record.subscription_status.as_str())
        .bind(record.has_used_free_generation)
        .bind(to_i32(record.generations_remaining)?)
        .bind(to_i64(record.total_generations))
        .bind(record.subscription_start_date)
        .bind(record.subscription_end_date)
        .bind(record.last_generation_date)
        .bind(record.last_payment_date)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(executor)
        .await?;

        Ok(())
    }
}

pub struct PurchaseQueries;

impl PurchaseQueries {
    /// Claims the purchase id. Returns false when it was already claimed.
    pub async fn claim<'e, E: PgExecutor<'e>>(
        executor: E,
        event: &PaymentEvent,
        applied_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO applied_purchases (purchase_id, user_id, plan_type, generations_granted, applied_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (purchase_id) DO NOTHING
            "#,
        )
        .bind(&event.purchase_id)
        .bind(&event.user_id)
        .bind(event.plan_type.as_str())
        .bind(event.generations_granted.map(to_i32).transpose()?)
        .bind(applied_at)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn exists<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: &str,
        purchase_id: &str,
    ) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM applied_purchases WHERE purchase_id = $1 AND user_id = $2)",
        )
        .bind(purchase_id)
        .bind(user_id)
        .fetch_one(executor)
        .await?;

        Ok(exists)
    }
}

fn to_i32(value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|_| {
        AppError::Validation(format!("generation count {} exceeds storable range", value))
    })
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
