//! Flower-shop order service

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flowershop_orders::api::{self, AppState};
use flowershop_orders::proof::LocalProofStore;
use flowershop_orders::publisher::EventPublisher;
use flowershop_orders::store::PgStore;
use flowershop_orders::Config;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let store = PgStore::connect(&config.database_url, config.max_connections).await.context("connecting to database")?;
    store.migrate().await.context("running migrations")?;

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, %url, "NATS unavailable, order events will not be published");
                None
            }
        },
        None => None,
    };

    let publisher = EventPublisher::new(nats);
    tracing::info!(events = publisher.is_enabled(), proof_dir = %config.proof_dir.display(), "services configured");

    let state = AppState::new(
        Arc::new(store),
        Arc::new(LocalProofStore::new(&config.proof_dir)),
        publisher,
        config.discount_cache_ttl,
    );
    let app = api::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("flowershop-orders listening on {addr}");
    axum::serve(tokio::net::TcpListener::bind(&addr).await?, app).await?;
    Ok(())
}
