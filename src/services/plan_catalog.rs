use crate::{
    config::Config,
    models::{Credits, PlanResponse, PlanType},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingInterval {
    Month,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanDetails {
    pub name: &'static str,
    pub price_cents: u32,
    pub generations: Credits,
    pub interval: Option<BillingInterval>,
}

/// Price and allotment of every purchasable plan.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    one_shot: PlanDetails,
    spark: PlanDetails,
    creator: PlanDetails,
    universe: PlanDetails,
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self::with_grants(1, 4, 10)
    }
}

impl PlanCatalog {
    pub fn from_config(config: &Config) -> Self {
        Self::with_grants(
            config.one_shot_generations,
            config.spark_generations,
            config.creator_generations,
        )
    }

    pub fn with_grants(one_shot: u32, spark: u32, creator: u32) -> Self {
        Self {
            one_shot: PlanDetails {
                name: "One Generation",
                price_cents: 100,
                generations: Credits::Limited(one_shot),
                interval: None,
            },
            spark: PlanDetails {
                name: "Spark Plan",
                price_cents: 200,
                generations: Credits::Limited(spark),
                interval: Some(BillingInterval::Month),
            },
            creator: PlanDetails {
                name: "Creator Plan",
                price_cents: 500,
                generations: Credits::Limited(creator),
                interval: Some(BillingInterval::Month),
            },
            universe: PlanDetails {
                name: "Universe Plan",
                price_cents: 1100,
                generations: Credits::Unlimited,
                interval: Some(BillingInterval::Month),
            },
        }
    }

    pub fn details(&self, plan: PlanType) -> &PlanDetails {
        match plan {
            PlanType::OneShot => &self.one_shot,
            PlanType::Spark => &self.spark,
            PlanType::Creator => &self.creator,
            PlanType::Universe => &self.universe,
        }
    }

    pub fn grant_for(&self, plan: PlanType) -> Credits {
        self.details(plan).generations
    }

    pub fn describe(&self) -> Vec<PlanResponse> {
        PlanType::ALL
            .iter()
            .map(|plan| {
                let details = self.details(*plan);
                PlanResponse {
                    plan_type: plan.to_string(),
                    name: details.name.to_string(),
                    price_cents: details.price_cents,
                    price: format_price(details.price_cents),
                    generations: details.generations.limited(),
                    unlimited: details.generations.is_unlimited(),
                    interval: details.interval.map(|_| "month".to_string()),
                }
            })
            .collect()
    }
}

pub fn format_price(price_cents: u32) -> String {
    format!("${}.{:02}", price_cents / 100, price_cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_grants() {
        let catalog = PlanCatalog::default();
        assert_eq!(catalog.grant_for(PlanType::OneShot), Credits::Limited(1));
        assert_eq!(catalog.grant_for(PlanType::Spark), Credits::Limited(4));
        assert_eq!(catalog.grant_for(PlanType::Creator), Credits::Limited(10));
        assert_eq!(catalog.grant_for(PlanType::Universe), Credits::Unlimited);
        assert!(catalog.details(PlanType::OneShot).interval.is_none());
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(100), "$1.00");
        assert_eq!(format_price(1100), "$11.00");
        assert_eq!(format_price(205), "$2.05");
    }

    #[test]
    fn test_describe_lists_every_plan() {
        let plans = PlanCatalog::default().describe();
        assert_eq!(plans.len(), 4);
        assert_eq!(plans[0].plan_type, "one-shot");
        assert!(plans[3].unlimited);
        assert_eq!(plans[3].generations, None);
        assert_eq!(plans[1].interval.as_deref(), Some("month"));
    }
}
