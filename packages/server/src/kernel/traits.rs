// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Booking rules live in domain activities that call through these traits.
//
// Naming convention: Base* for trait names (e.g., BaseClock, BasePaymentGateway)

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domains::notifications::models::Notification;

// =============================================================================
// Notification Trait (Infrastructure - fire-and-forget delivery)
// =============================================================================

#[async_trait]
pub trait BaseNotificationService: Send + Sync {
    /// Deliver one notification to its target user.
    ///
    /// Errors are reported to the caller for logging only; they never undo
    /// the state change that produced the notification.
    async fn send(&self, notification: &Notification) -> Result<()>;
}

// =============================================================================
// Payment Gateway Trait (Infrastructure - outgoing transfers)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
}

/// What the gateway reports back for a transfer request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub reference: String,
    pub status: PaymentStatus,
}

#[async_trait]
pub trait BasePaymentGateway: Send + Sync {
    /// Send `amount` credits worth of money to an external destination
    /// (bank account, card token).
    async fn transfer(&self, amount: Decimal, destination: &str) -> Result<PaymentReceipt>;
}

// =============================================================================
// Clock Trait (Infrastructure - injectable time source)
// =============================================================================

pub trait BaseClock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock used outside of tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl BaseClock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
