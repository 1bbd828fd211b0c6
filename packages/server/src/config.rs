use anyhow::{Context, Result};
use dotenvy::dotenv;
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::domains::sessions::pricing::to_credits;

/// Every five minutes, on the minute.
pub const DEFAULT_SWEEP_CRON: &str = "0 */5 * * * *";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string. Without one the server runs on the
    /// in-memory store, which loses everything on exit.
    pub database_url: Option<String>,
    pub policy: BookingPolicy,
    /// Cron expression (with seconds) for the expired-reschedule sweep.
    pub reschedule_sweep_cron: String,
}

/// The knobs every activity needs, carried on `ServerDeps`.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingPolicy {
    /// Fixed exchange rate from list price to wallet credits.
    pub credits_per_currency_unit: Decimal,
    /// Upper bound on any single store call.
    pub store_timeout: Duration,
    /// How many times an operation re-reads and retries after losing an
    /// optimistic-concurrency race before giving up.
    pub occ_max_retries: u32,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            credits_per_currency_unit: Decimal::ONE,
            store_timeout: Duration::from_millis(5000),
            occ_max_retries: 5,
        }
    }
}

impl BookingPolicy {
    /// A list price in wallet credits at the configured exchange rate.
    pub fn credits_for(&self, price: Decimal) -> Decimal {
        to_credits(price, self.credits_per_currency_unit)
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let defaults = BookingPolicy::default();

        let credits_per_currency_unit = match env::var("CREDITS_PER_CURRENCY_UNIT") {
            Ok(raw) => Decimal::from_str(raw.trim())
                .context("CREDITS_PER_CURRENCY_UNIT must be a decimal number")?,
            Err(_) => defaults.credits_per_currency_unit,
        };
        if credits_per_currency_unit <= Decimal::ZERO {
            anyhow::bail!("CREDITS_PER_CURRENCY_UNIT must be positive");
        }

        let store_timeout_ms: u64 = env::var("STORE_TIMEOUT_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .context("STORE_TIMEOUT_MS must be a whole number of milliseconds")?;

        let occ_max_retries: u32 = env::var("OCC_MAX_RETRIES")
            .unwrap_or_else(|_| defaults.occ_max_retries.to_string())
            .parse()
            .context("OCC_MAX_RETRIES must be a valid number")?;

        Ok(Self {
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            policy: BookingPolicy {
                credits_per_currency_unit,
                store_timeout: Duration::from_millis(store_timeout_ms),
                occ_max_retries,
            },
            reschedule_sweep_cron: env::var("RESCHEDULE_SWEEP_CRON")
                .unwrap_or_else(|_| DEFAULT_SWEEP_CRON.to_string()),
        })
    }
}
