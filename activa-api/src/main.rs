use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use activa_api::{app, state::AppState, worker};
use activa_core::SystemClock;
use activa_store::app_config::Config;
use activa_store::{DbClient, RedisClient, StoreActivityRepository, StoreBookingRepository, SupabaseAuthGateway};
use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "activa_api=debug,activa_core=debug,activa_store=debug,tower_http=debug,axum::rejection=trace".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Activa API on port {}", config.server.port);

    // Postgres
    let db = DbClient::new(&config.database)
        .await
        .context("Failed to connect to Postgres")?;
    if config.database.run_migrations {
        db.migrate().await.context("Failed to run migrations")?;
        tracing::info!("Migrations applied");
    }

    let activities = Arc::new(StoreActivityRepository::new(db.pool.clone()));
    let bookings = Arc::new(StoreBookingRepository::new(db.pool.clone()));
    let auth = Arc::new(SupabaseAuthGateway::new(&config.auth));

    let mut app_state = AppState::new(activities, bookings, auth, Arc::new(SystemClock))
        .context("Failed to register metrics")?
        .with_listing((&config.listing).into());

    // Redis is optional; without it requests are not rate limited
    if let Some(url) = config.redis.url.as_deref() {
        let redis = RedisClient::new(url)
            .await
            .context("Failed to connect to Redis")?;
        app_state = app_state.with_rate_limit(Arc::new(redis), config.rate_limit.clone());
        tracing::info!(
            "Rate limiting at {} requests per {}s",
            config.rate_limit.requests,
            config.rate_limit.window_seconds
        );
    }

    if config.reconciliation.enabled {
        tokio::spawn(worker::start_reconciliation_worker(
            app_state.catalog.clone(),
            app_state.metrics.clone(),
            Duration::from_secs(config.reconciliation.interval_seconds.max(1)),
        ));
    }

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
