//! Server dependencies for activities (using traits for testability)
//!
//! This module provides the central dependency container used by every
//! booking, reschedule, lifecycle and ledger activity. All external services
//! sit behind trait objects so tests can swap in fakes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::config::BookingPolicy;
use crate::kernel::{BaseClock, BaseNotificationService, BasePaymentGateway, BookingStore};

/// Server dependencies accessible to activities (using traits for testability)
#[derive(Clone)]
pub struct ServerDeps {
    pub store: Arc<dyn BookingStore>,
    pub notifier: Arc<dyn BaseNotificationService>,
    pub payments: Arc<dyn BasePaymentGateway>,
    pub clock: Arc<dyn BaseClock>,
    pub policy: BookingPolicy,
}

impl ServerDeps {
    pub fn new(
        store: Arc<dyn BookingStore>,
        notifier: Arc<dyn BaseNotificationService>,
        payments: Arc<dyn BasePaymentGateway>,
        clock: Arc<dyn BaseClock>,
        policy: BookingPolicy,
    ) -> Self {
        Self {
            store,
            notifier,
            payments,
            clock,
            policy,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn credits_for(&self, price: Decimal) -> Decimal {
        self.policy.credits_for(price)
    }
}
