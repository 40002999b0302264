pub mod checkout;
pub mod entitlement_engine;
pub mod idea_generator;
pub mod metrics;
pub mod plan_catalog;
pub mod purchase_processor;
pub mod quota_manager;
pub mod rate_limiter;
pub mod reconciler;
pub mod redis;

pub use checkout::{CheckoutProvider, CheckoutService, StripeCheckoutProvider};
pub use idea_generator::{GeminiIdeaGenerator, IdeaGenerator};
pub use self::metrics::*;
pub use plan_catalog::*;
pub use purchase_processor::{PurchaseProcessor, WebhookOutcome};
pub use quota_manager::*;
pub use rate_limiter::*;
pub use self::redis::*;
