//! Quota rules for AI generations.
//!
//! Everything here is a pure transformation of an [`EntitlementRecord`]:
//! no I/O, no clock reads. Callers fetch the record, call into this module,
//! and persist the returned record through an
//! [`EntitlementStore`](crate::storage::EntitlementStore).

use chrono::{DateTime, Duration, Months, Utc};

use crate::models::{
    Credits, EntitlementRecord, PlanType, SubscriptionStatus, SubscriptionTier, MAX_GENERATIONS,
};

/// Which quota rule governs a record. Derived from tier and status only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaRule {
    /// Active universe plan.
    Unlimited,
    /// Active one_shot, spark or creator plan, bounded by `generations_remaining`.
    Bucket,
    /// Free tier, or any tier whose status is not active: one lifetime generation.
    FreeTrial,
}

pub fn quota_rule(record: &EntitlementRecord) -> QuotaRule {
    if record.subscription_status != SubscriptionStatus::Active {
        return QuotaRule::FreeTrial;
    }

    match record.subscription_tier {
        SubscriptionTier::Universe => QuotaRule::Unlimited,
        SubscriptionTier::Creator | SubscriptionTier::Spark | SubscriptionTier::OneShot => {
            QuotaRule::Bucket
        }
        SubscriptionTier::Free => QuotaRule::FreeTrial,
    }
}

pub fn remaining_credits(record: &EntitlementRecord) -> Credits {
    match quota_rule(record) {
        QuotaRule::Unlimited => Credits::Unlimited,
        QuotaRule::Bucket => Credits::Limited(record.generations_remaining),
        QuotaRule::FreeTrial => {
            if record.has_used_free_generation {
                Credits::Limited(0)
            } else {
                Credits::Limited(1)
            }
        }
    }
}

pub fn can_generate(record: &EntitlementRecord) -> bool {
    remaining_credits(record).is_available()
}

/// Record one successful generation.
///
/// Does not re-check [`can_generate`]; callers authorize first. Only the
/// one_shot bucket is metered here. Spark and creator allotments are reset
/// by the next renewal purchase instead.
pub fn consume_generation(record: &EntitlementRecord, now: DateTime<Utc>) -> EntitlementRecord {
    let mut next = record.clone();

    match quota_rule(record) {
        QuotaRule::FreeTrial => next.has_used_free_generation = true,
        QuotaRule::Bucket if record.subscription_tier == SubscriptionTier::OneShot => {
            next.generations_remaining = record.generations_remaining.saturating_sub(1);
        }
        QuotaRule::Bucket | QuotaRule::Unlimited => {}
    }

    next.total_generations = record.total_generations.saturating_add(1);
    next.last_generation_date = Some(now);
    next.updated_at = now;
    next
}

/// Apply a completed purchase.
///
/// One-shot purchases top up the current balance. Recurring plans switch
/// the tier and replace the balance with the plan's allotment. Idempotency
/// per purchase id is the store's job, see
/// [`EntitlementStore::apply_purchase_once`](crate::storage::EntitlementStore::apply_purchase_once).
pub fn apply_purchase(
    record: &EntitlementRecord,
    plan: PlanType,
    granted: Credits,
    now: DateTime<Utc>,
) -> EntitlementRecord {
    let mut next = record.clone();

    match plan {
        PlanType::OneShot => {
            // One-shot grants are always finite.
            let grant = granted.limited().unwrap_or(0);
            let top_up = |base: u32| base.saturating_add(grant).min(MAX_GENERATIONS);

            if record.is_active() {
                next.generations_remaining = top_up(record.generations_remaining);
            } else {
                // Without an active plan the bucket would never be read, so
                // the top-up activates the one_shot tier. The free tier's
                // stored balance is only a marker and is not carried over.
                let base = match record.subscription_tier {
                    SubscriptionTier::Free => 0,
                    _ => record.generations_remaining,
                };
                next.subscription_tier = SubscriptionTier::OneShot;
                next.subscription_status = SubscriptionStatus::Active;
                next.subscription_start_date = Some(now);
                next.subscription_end_date = None;
                next.generations_remaining = top_up(base);
            }
        }
        PlanType::Spark | PlanType::Creator | PlanType::Universe => {
            next.subscription_tier = plan.tier();
            next.subscription_status = SubscriptionStatus::Active;
            next.subscription_start_date = Some(now);
            // Universe ignores the bucket, so an unlimited grant stores zero.
            next.generations_remaining = granted.limited().unwrap_or(0).min(MAX_GENERATIONS);
            next.subscription_end_date = match plan {
                PlanType::Universe => None,
                _ => Some(one_month_after(now)),
            };
        }
    }

    next.last_payment_date = Some(now);
    next.updated_at = now;
    next
}

/// Cancel the recurring plan. Balance and lifetime counter are kept.
pub fn unsubscribe(record: &EntitlementRecord, now: DateTime<Utc>) -> EntitlementRecord {
    let mut next = record.clone();
    next.subscription_tier = SubscriptionTier::Free;
    next.subscription_status = SubscriptionStatus::Inactive;
    next.updated_at = now;
    next
}

/// Display level derived from lifetime generations: one level per ten.
pub fn level(total_generations: u64) -> u64 {
    total_generations / 10 + 1
}

pub fn level_title(level: u64) -> &'static str {
    match level {
        0..=2 => "Novice Creator",
        3..=5 => "Idea Explorer",
        6..=10 => "Creative Visionary",
        11..=20 => "Innovation Master",
        _ => "Legendary Ideator",
    }
}

fn one_month_after(now: DateTime<Utc>) -> DateTime<Utc> {
    now.checked_add_months(Months::new(1))
        .unwrap_or_else(|| now + Duration::days(30))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tier: SubscriptionTier, status: SubscriptionStatus) -> EntitlementRecord {
        let mut record = EntitlementRecord::new_free("user-1", Utc::now());
        record.subscription_tier = tier;
        record.subscription_status = status;
        record
    }

    #[test]
    fn test_free_tier_allows_exactly_one_generation() {
        let fresh = EntitlementRecord::new_free("user-1", Utc::now());
        assert!(can_generate(&fresh));
        assert_eq!(remaining_credits(&fresh), Credits::Limited(1));

        let used = consume_generation(&fresh, Utc::now());
        assert!(used.has_used_free_generation);
        assert!(!can_generate(&used));

        // A second consumption without a re-check must not undo the flag.
        let again = consume_generation(&used, Utc::now());
        assert!(again.has_used_free_generation);
        assert_eq!(remaining_credits(&again), Credits::Limited(0));
        assert_eq!(again.generations_remaining, fresh.generations_remaining);
        assert_eq!(again.total_generations, 2);
    }

    #[test]
    fn test_one_shot_bucket_drains_to_zero_and_stays_there() {
        let mut current = record(SubscriptionTier::OneShot, SubscriptionStatus::Active);
        current.generations_remaining = 3;
        assert_eq!(remaining_credits(&current), Credits::Limited(3));

        for _ in 0..3 {
            assert!(can_generate(&current));
            current = consume_generation(&current, Utc::now());
        }
        assert_eq!(remaining_credits(&current), Credits::Limited(0));

        let fourth = consume_generation(&current, Utc::now());
        assert_eq!(fourth.generations_remaining, 0);
        assert_eq!(fourth.total_generations, 4);
    }

    #[test]
    fn test_universe_is_always_unlimited() {
        for stored in [0, 1, 57] {
            let mut current = record(SubscriptionTier::Universe, SubscriptionStatus::Active);
            current.generations_remaining = stored;
            assert_eq!(remaining_credits(&current), Credits::Unlimited);

            for _ in 0..25 {
                current = consume_generation(&current, Utc::now());
            }
            assert_eq!(remaining_credits(&current), Credits::Unlimited);
            assert_eq!(current.generations_remaining, stored);
        }
    }

    #[test]
    fn test_spark_consumption_is_not_metered() {
        let mut current = record(SubscriptionTier::Spark, SubscriptionStatus::Active);
        current.generations_remaining = 4;
        current.total_generations = 10;

        let now = Utc::now();
        let next = consume_generation(&current, now);
        assert_eq!(next.generations_remaining, 4);
        assert_eq!(next.total_generations, 11);
        assert_eq!(next.last_generation_date, Some(now));
    }

    #[test]
    fn test_inactive_subscription_falls_back_to_free_rule() {
        let mut current = record(SubscriptionTier::Creator, SubscriptionStatus::Inactive);
        current.generations_remaining = 9;
        current.has_used_free_generation = true;
        assert_eq!(remaining_credits(&current), Credits::Limited(0));
        assert!(!can_generate(&current));

        current.has_used_free_generation = false;
        assert_eq!(remaining_credits(&current), Credits::Limited(1));
    }

    #[test]
    fn test_expired_behaves_like_inactive() {
        let mut current = record(SubscriptionTier::Universe, SubscriptionStatus::Expired);
        assert_eq!(remaining_credits(&current), Credits::Limited(1));

        current = consume_generation(&current, Utc::now());
        assert!(current.has_used_free_generation);
        assert!(!can_generate(&current));
    }

    #[test]
    fn test_remaining_credits_is_a_pure_read() {
        let current = record(SubscriptionTier::Creator, SubscriptionStatus::Active);
        let before = current.clone();
        let first = remaining_credits(&current);
        let second = remaining_credits(&current);
        assert_eq!(first, second);
        assert_eq!(current, before);
    }

    #[test]
    fn test_one_shot_purchase_tops_up_active_plan() {
        let mut current = record(SubscriptionTier::OneShot, SubscriptionStatus::Active);
        current.generations_remaining = 2;

        let next = apply_purchase(&current, PlanType::OneShot, Credits::Limited(5), Utc::now());
        assert_eq!(next.generations_remaining, 7);
        assert_eq!(next.subscription_tier, SubscriptionTier::OneShot);
        assert_eq!(next.subscription_status, SubscriptionStatus::Active);
        assert_eq!(next.total_generations, current.total_generations);
    }

    #[test]
    fn test_one_shot_purchase_keeps_recurring_tier() {
        let mut current = record(SubscriptionTier::Spark, SubscriptionStatus::Active);
        current.generations_remaining = 2;
        let end = Some(Utc::now());
        current.subscription_end_date = end;

        let next = apply_purchase(&current, PlanType::OneShot, Credits::Limited(5), Utc::now());
        assert_eq!(next.generations_remaining, 7);
        assert_eq!(next.subscription_tier, SubscriptionTier::Spark);
        assert_eq!(next.subscription_status, SubscriptionStatus::Active);
        assert_eq!(next.subscription_end_date, end);
    }

    #[test]
    fn test_one_shot_purchase_activates_free_record() {
        let current = EntitlementRecord::new_free("user-1", Utc::now());
        let next = apply_purchase(&current, PlanType::OneShot, Credits::Limited(1), Utc::now());

        assert_eq!(next.subscription_tier, SubscriptionTier::OneShot);
        assert_eq!(next.subscription_status, SubscriptionStatus::Active);
        assert_eq!(next.generations_remaining, 1);
        assert!(next.subscription_end_date.is_none());
        assert_eq!(remaining_credits(&next), Credits::Limited(1));
    }

    #[test]
    fn test_levels_advance_every_ten_generations() {
        assert_eq!(level(0), 1);
        assert_eq!(level(9), 1);
        assert_eq!(level(10), 2);
        assert_eq!(level_title(level(19)), "Novice Creator");
        assert_eq!(level_title(level(20)), "Idea Explorer");
        assert_eq!(level_title(10), "Creative Visionary");
        assert_eq!(level_title(20), "Innovation Master");
        assert_eq!(level_title(level(u64::MAX)), "Legendary Ideator");
    }

    #[test]
    fn test_stacked_top_ups_stay_within_storable_range() {
        let mut current = record(SubscriptionTier::OneShot, SubscriptionStatus::Active);
        current.generations_remaining = MAX_GENERATIONS - 1;

        let next = apply_purchase(&current, PlanType::OneShot, Credits::Limited(5), Utc::now());
        assert_eq!(next.generations_remaining, MAX_GENERATIONS);

        let next = apply_purchase(&next, PlanType::Creator, Credits::Limited(u32::MAX), Utc::now());
        assert_eq!(next.generations_remaining, MAX_GENERATIONS);
    }

    #[test]
    fn test_recurring_purchase_replaces_balance() {
        let mut current = record(SubscriptionTier::Spark, SubscriptionStatus::Inactive);
        current.generations_remaining = 3;
        current.total_generations = 12;

        let now = Utc::now();
        let next = apply_purchase(&current, PlanType::Creator, Credits::Limited(10), now);
        assert_eq!(next.subscription_tier, SubscriptionTier::Creator);
        assert_eq!(next.subscription_status, SubscriptionStatus::Active);
        assert_eq!(next.generations_remaining, 10);
        assert_eq!(next.total_generations, 12);
        assert_eq!(next.subscription_start_date, Some(now));

        let end = next.subscription_end_date.expect("creator plans have an end date");
        let days = (end - now).num_days();
        assert!((28..=31).contains(&days), "end date {} days out", days);
    }

    #[test]
    fn test_universe_purchase_has_no_end_date() {
        let current = EntitlementRecord::new_free("user-1", Utc::now());
        let next = apply_purchase(&current, PlanType::Universe, Credits::Unlimited, Utc::now());
        assert_eq!(next.subscription_tier, SubscriptionTier::Universe);
        assert!(next.subscription_end_date.is_none());
        assert_eq!(remaining_credits(&next), Credits::Unlimited);
    }

    #[test]
    fn test_unsubscribe_preserves_balance_and_reverts_to_free_rule() {
        let mut current = record(SubscriptionTier::Creator, SubscriptionStatus::Active);
        current.generations_remaining = 6;
        current.total_generations = 20;
        current.has_used_free_generation = true;

        let next = unsubscribe(&current, Utc::now());
        assert_eq!(next.subscription_tier, SubscriptionTier::Free);
        assert_eq!(next.subscription_status, SubscriptionStatus::Inactive);
        assert_eq!(next.generations_remaining, 6);
        assert_eq!(next.total_generations, 20);
        assert_eq!(remaining_credits(&next), Credits::Limited(0));
    }
}
