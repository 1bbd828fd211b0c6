use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::kernel::{BasePaymentGateway, PaymentReceipt, PaymentStatus};

/// Gateway stand-in for deployments without a payment provider.
///
/// Accepts every transfer as `pending` under a fresh reference; settlement
/// arrives later through `ledger::reconcile`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeferredPaymentGateway;

#[async_trait]
impl BasePaymentGateway for DeferredPaymentGateway {
    async fn transfer(&self, amount: Decimal, destination: &str) -> Result<PaymentReceipt> {
        if destination.trim().is_empty() {
            anyhow::bail!("transfer destination is empty");
        }
        let reference = format!("xfer_{}", Uuid::now_v7().simple());
        info!(%amount, destination, reference = %reference, "Queued outgoing transfer");
        Ok(PaymentReceipt {
            reference,
            status: PaymentStatus::Pending,
        })
    }
}
