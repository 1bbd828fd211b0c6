//! Postgres harness backed by testcontainers.
//!
//! One container is started for the whole test binary and migrated once.
//! Every test gets its own pool; tests stay isolated by using fresh ids.

use std::sync::Arc;

use anyhow::{Context, Result};
use booking_core::kernel::{FixedClock, MockPaymentGateway, PgBookingStore, ServerDeps, TestNotifier};
use booking_core::BookingPolicy;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct SharedDatabase {
    db_url: String,
    // Keep the container alive for the entire test run
    _postgres: ContainerAsync<Postgres>,
}

static SHARED_DATABASE: OnceCell<SharedDatabase> = OnceCell::const_new();

impl SharedDatabase {
    async fn init() -> Result<Self> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let postgres = Postgres::default()
            .with_tag("16")
            .with_cmd(["-c", "max_connections=200"])
            .start()
            .await
            .context("Failed to start Postgres container")?;

        let host = postgres.get_host().await?;
        let port = postgres.get_host_port_ipv4(5432).await?;
        let db_url = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

        let pool = PgPool::connect(&db_url)
            .await
            .context("Failed to connect to Postgres for migrations")?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            db_url,
            _postgres: postgres,
        })
    }

    async fn get() -> &'static Self {
        SHARED_DATABASE
            .get_or_init(|| async {
                Self::init()
                    .await
                    .expect("Failed to initialize shared Postgres container")
            })
            .await
    }
}

/// `ServerDeps` over a real Postgres store; the other collaborators are the
/// same doubles the in-memory harness uses.
pub struct PgHarness {
    pub deps: ServerDeps,
    pub store: Arc<PgBookingStore>,
    pub notifier: Arc<TestNotifier>,
}

impl AsyncTestContext for PgHarness {
    async fn setup() -> Self {
        Self::new().await.expect("Failed to create Postgres harness")
    }

    async fn teardown(self) {
        self.store.pool().close().await;
    }
}

impl PgHarness {
    pub async fn new() -> Result<Self> {
        let shared = SharedDatabase::get().await;
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&shared.db_url)
            .await
            .context("Failed to connect to test database")?;

        let store = Arc::new(PgBookingStore::new(pool));
        let notifier = Arc::new(TestNotifier::new());
        let policy = BookingPolicy {
            occ_max_retries: 20,
            ..BookingPolicy::default()
        };

        let deps = ServerDeps::new(
            store.clone(),
            notifier.clone(),
            Arc::new(MockPaymentGateway::new()),
            Arc::new(FixedClock::default()),
            policy,
        );

        Ok(Self {
            deps,
            store,
            notifier,
        })
    }
}
