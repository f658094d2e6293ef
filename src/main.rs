//! Thali Orders - order lifecycle and rating aggregation service

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use thali_orders::{
    catalog::PgCatalog,
    config::Config,
    http::{router, AppState},
    identity::PgIdentityGate,
    ledger::OrderLedger,
    publisher::{EventPublisher, NatsPublisher, NoopPublisher},
    reviews::ReviewAggregator,
    storage::PgStore,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = Config::from_env()?;
    let db = PgPoolOptions::new().max_connections(config.database_max_connections).connect(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let events: Arc<dyn EventPublisher> = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Arc::new(NatsPublisher::new(client)),
            Err(e) => { tracing::warn!(error = %e, "NATS unavailable, domain events disabled"); Arc::new(NoopPublisher) }
        },
        None => Arc::new(NoopPublisher),
    };

    let store = Arc::new(PgStore::new(db.clone()));
    let catalog = Arc::new(PgCatalog::new(db.clone()));
    let ledger = Arc::new(OrderLedger::new(store.clone(), catalog.clone(), events.clone(), config.pricing, config.delivery_lead_time));
    let reviews = Arc::new(ReviewAggregator::new(store, catalog, events));

    if config.rating_reconcile_secs > 0 {
        let reviews = reviews.clone();
        let period = Duration::from_secs(config.rating_reconcile_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match reviews.reconcile().await {
                    Ok(n) => tracing::debug!(products = n, "rating summaries reconciled"),
                    Err(e) => tracing::warn!(error = %e, "rating reconciliation failed"),
                }
            }
        });
    }

    let state = AppState { ledger, reviews, identity: Arc::new(PgIdentityGate::new(db)) };
    let app = router(state);

    tracing::info!("🚀 Thali Orders listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}
