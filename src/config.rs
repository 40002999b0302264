use anyhow::{bail, Result};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub store_backend: StoreBackend,
    pub redis_url: Option<String>,
    pub port: u16,
    pub jwt_secret: String,
    pub webhook_secret: String,
    pub webhook_tolerance_secs: i64,
    pub stripe_secret_key: Option<String>,
    pub stripe_api_base: String,
    pub app_base_url: String,
    pub rate_limit_requests: u32,
    pub rate_limit_window: u64,
    pub generation_timeout_secs: u64,
    pub persist_retry_attempts: u32,
    pub purchase_poll_attempts: u32,
    pub purchase_poll_interval_ms: u64,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub one_shot_generations: u32,
    pub spark_generations: u32,
    pub creator_generations: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let store_backend = match env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .to_lowercase()
            .as_str()
        {
            "postgres" => StoreBackend::Postgres,
            "memory" => StoreBackend::Memory,
            other => bail!("Unsupported STORE_BACKEND: {}", other),
        };

        Ok(Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/game_ideas".to_string()),
            store_backend,
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| "your-secret-key".to_string()),
            webhook_secret: env::var("WEBHOOK_SECRET")
                .unwrap_or_else(|_| "whsec_local".to_string()),
            webhook_tolerance_secs: env::var("WEBHOOK_TOLERANCE_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()?,
            stripe_secret_key: env::var("STRIPE_SECRET_KEY").ok().filter(|key| !key.is_empty()),
            stripe_api_base: env::var("STRIPE_API_BASE")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            app_base_url: env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            rate_limit_requests: env::var("RATE_LIMIT_REQUESTS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()?,
            rate_limit_window: env::var("RATE_LIMIT_WINDOW")
                .unwrap_or_else(|_| "60".to_string()) // 1 minute
                .parse()?,
            generation_timeout_secs: env::var("GENERATION_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
            persist_retry_attempts: env::var("PERSIST_RETRY_ATTEMPTS")
                .unwrap_or_else(|_| "1".to_string())
                .parse()?,
            purchase_poll_attempts: env::var("PURCHASE_POLL_ATTEMPTS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
            purchase_poll_interval_ms: env::var("PURCHASE_POLL_INTERVAL_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,
            gemini_api_key: env::var("GEMINI_API_KEY").ok().filter(|key| !key.is_empty()),
            gemini_model: env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-1.5-flash".to_string()),
            gemini_base_url: env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string()),
            one_shot_generations: env::var("ONE_SHOT_GENERATIONS")
                .unwrap_or_else(|_| "1".to_string())
                .parse()?,
            spark_generations: env::var("SPARK_GENERATIONS")
                .unwrap_or_else(|_| "4".to_string())
                .parse()?,
            creator_generations: env::var("CREATOR_GENERATIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
        })
    }
}
