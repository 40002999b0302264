use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::{net::SocketAddr, sync::Arc};
use tracing_subscriber::{fmt, EnvFilter};

use entitlement_service::{
    config::Config,
    create_app,
    handlers::AppState,
    services::{GeminiIdeaGenerator, RedisService, StripeCheckoutProvider},
    storage::create_store,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("entitlement_service=debug,tower_http=info")),
        )
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    let store = create_store(&config)
        .await
        .context("Failed to initialise entitlement store")?;

    let redis = match config.redis_url.as_deref() {
        Some(url) => Some(
            RedisService::new(url)
                .await
                .context("Failed to connect to Redis")?,
        ),
        None => {
            tracing::warn!("REDIS_URL not set; generation rate limiting disabled");
            None
        }
    };

    let generator = GeminiIdeaGenerator::from_config(&config)?;
    if !generator.is_configured() {
        tracing::warn!("GEMINI_API_KEY not set; generation requests will fail");
    }

    let checkout = StripeCheckoutProvider::from_config(&config)?;
    if !checkout.is_configured() {
        tracing::warn!("STRIPE_SECRET_KEY not set; checkout requests will fail");
    }

    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install metrics recorder")?;

    let port = config.port;
    let state = AppState::new(
        config,
        store,
        Arc::new(generator),
        Arc::new(checkout),
        redis,
        metrics_handle,
    );
    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Entitlement service listening");
    axum::serve(listener, app).await?;

    Ok(())
}
