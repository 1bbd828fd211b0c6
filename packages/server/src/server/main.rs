// Main entry point for the booking engine

use std::sync::Arc;

use anyhow::{Context, Result};
use booking_core::kernel::{
    start_scheduler, BookingStore, DeferredPaymentGateway, MemoryBookingStore, PgBookingStore,
    ServerDeps, StreamHub, SystemClock,
};
use booking_core::Config;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,booking_core=debug,sqlx=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    tracing::info!("Starting coaching session booking engine");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        credits_per_currency_unit = %config.policy.credits_per_currency_unit,
        store_timeout_ms = config.policy.store_timeout.as_millis() as u64,
        occ_max_retries = config.policy.occ_max_retries,
        "Configuration loaded"
    );

    let store: Arc<dyn BookingStore> = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .acquire_timeout(config.policy.store_timeout)
                .connect(database_url)
                .await
                .context("Failed to connect to database")?;
            tracing::info!("Database connected");

            tracing::info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run migrations")?;
            tracing::info!("Migrations complete");

            Arc::new(PgBookingStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store (state is lost on exit)");
            Arc::new(MemoryBookingStore::new())
        }
    };

    let deps = ServerDeps::new(
        store,
        Arc::new(StreamHub::new()),
        Arc::new(DeferredPaymentGateway),
        Arc::new(SystemClock),
        config.policy.clone(),
    );

    let mut scheduler = start_scheduler(deps, &config.reschedule_sweep_cron)
        .await
        .context("Failed to start scheduled tasks")?;

    tracing::info!("Booking engine running, press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    tracing::info!("Shutting down");
    scheduler
        .shutdown()
        .await
        .context("Failed to stop scheduled tasks")?;

    Ok(())
}
