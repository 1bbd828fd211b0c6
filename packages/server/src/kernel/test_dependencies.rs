// TestDependencies - mock implementations for testing
//
// Provides fakes for every collaborator behind ServerDeps, plus a builder
// that wires them over an in-memory store.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::{
    BaseClock, BaseNotificationService, BasePaymentGateway, MemoryBookingStore, PaymentReceipt,
    PaymentStatus, ServerDeps,
};
use crate::common::UserId;
use crate::config::BookingPolicy;
use crate::domains::notifications::models::Notification;

// =============================================================================
// Test Notifier
// =============================================================================

/// Records every notification it is asked to deliver.
pub struct TestNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
    failing: bool,
}

impl TestNotifier {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            failing: false,
        }
    }

    /// Notifier whose every delivery fails (after recording the attempt).
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::new()
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn sent_to(&self, user_id: UserId) -> Vec<Notification> {
        self.sent()
            .into_iter()
            .filter(|n| n.user_id == user_id)
            .collect()
    }

    /// Kinds of everything sent, in order.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.sent().iter().map(|n| n.kind()).collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl Default for TestNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseNotificationService for TestNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notification.clone());
        if self.failing {
            anyhow::bail!("notification transport unavailable");
        }
        Ok(())
    }
}

// =============================================================================
// Mock Payment Gateway
// =============================================================================

/// Arguments captured from a transfer call
#[derive(Debug, Clone, PartialEq)]
pub struct TransferCall {
    pub amount: Decimal,
    pub destination: String,
}

pub struct MockPaymentGateway {
    receipts: Arc<Mutex<VecDeque<Result<PaymentReceipt, String>>>>,
    calls: Arc<Mutex<Vec<TransferCall>>>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self {
            receipts: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue the receipt for the next transfer.
    pub fn with_receipt(self, reference: impl Into<String>, status: PaymentStatus) -> Self {
        self.receipts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(PaymentReceipt {
                reference: reference.into(),
                status,
            }));
        self
    }

    /// Make the next transfer fail outright.
    pub fn with_error(self, message: impl Into<String>) -> Self {
        self.receipts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(message.into()));
        self
    }

    pub fn calls(&self) -> Vec<TransferCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Default for MockPaymentGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BasePaymentGateway for MockPaymentGateway {
    async fn transfer(&self, amount: Decimal, destination: &str) -> Result<PaymentReceipt> {
        let call_number = {
            let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
            calls.push(TransferCall {
                amount,
                destination: destination.to_string(),
            });
            calls.len()
        };

        let queued = self
            .receipts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match queued {
            Some(Ok(receipt)) => Ok(receipt),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            // Fall back to a pending transfer with a predictable reference
            None => Ok(PaymentReceipt {
                reference: format!("mock_xfer_{}", call_number),
                status: PaymentStatus::Pending,
            }),
        }
    }
}

// =============================================================================
// Fixed Clock
// =============================================================================

/// A clock that only moves when told to.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Default for FixedClock {
    /// 2030-01-01T08:00:00Z, comfortably before any fixture session.
    fn default() -> Self {
        Self::at(Utc.with_ymd_and_hms(2030, 1, 1, 8, 0, 0).single().unwrap_or_else(Utc::now))
    }
}

impl BaseClock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// =============================================================================
// TestDependencies - Builder for test dependencies
// =============================================================================

#[derive(Clone)]
pub struct TestDependencies {
    pub store: Arc<MemoryBookingStore>,
    pub notifier: Arc<TestNotifier>,
    pub payments: Arc<MockPaymentGateway>,
    pub clock: Arc<FixedClock>,
    pub policy: BookingPolicy,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryBookingStore::new()),
            notifier: Arc::new(TestNotifier::new()),
            payments: Arc::new(MockPaymentGateway::new()),
            clock: Arc::new(FixedClock::default()),
            policy: BookingPolicy::default(),
        }
    }

    /// Set a test notifier
    pub fn notifier(mut self, notifier: TestNotifier) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }

    /// Set a mock payment gateway
    pub fn payments(mut self, gateway: MockPaymentGateway) -> Self {
        self.payments = Arc::new(gateway);
        self
    }

    pub fn clock(mut self, clock: FixedClock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn policy(mut self, policy: BookingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Build ServerDeps sharing these mocks, which stay reachable through `self`.
    pub fn server_deps(&self) -> ServerDeps {
        ServerDeps::new(
            self.store.clone(),
            self.notifier.clone(),
            self.payments.clone(),
            self.clock.clone(),
            self.policy.clone(),
        )
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
