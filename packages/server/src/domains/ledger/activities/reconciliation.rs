use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::common::{BookingError, UserId, WalletId};
use crate::domains::ledger::entries::{completed_total, pending_withdrawals};
use crate::kernel::occ::guarded;
use crate::kernel::ServerDeps;

/// Balance against the sum of completed transactions for one wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub user_id: UserId,
    pub wallet_id: WalletId,
    pub balance: Decimal,
    pub completed_total: Decimal,
    pub pending_withdrawals: Decimal,
    pub transaction_count: usize,
}

impl ReconciliationReport {
    pub fn is_consistent(&self) -> bool {
        self.balance == self.completed_total && self.balance >= Decimal::ZERO
    }

    /// Balance minus what the history says it should be.
    pub fn discrepancy(&self) -> Decimal {
        self.balance - self.completed_total
    }
}

/// Recomputes a wallet's balance from its history. Read-only.
pub async fn verify_reconciliation(
    deps: &ServerDeps,
    user_id: UserId,
) -> Result<ReconciliationReport, BookingError> {
    let wallet = guarded(deps, deps.store.find_wallet(user_id))
        .await?
        .ok_or_else(|| BookingError::not_found("wallet", user_id))?;
    let transactions = guarded(deps, deps.store.find_transactions(wallet.id)).await?;

    let report = ReconciliationReport {
        user_id,
        wallet_id: wallet.id,
        balance: wallet.balance,
        completed_total: completed_total(&transactions),
        pending_withdrawals: pending_withdrawals(&transactions),
        transaction_count: transactions.len(),
    };

    if !report.is_consistent() {
        error!(
            user_id = %user_id,
            wallet_id = %wallet.id,
            balance = %report.balance,
            completed_total = %report.completed_total,
            "Wallet balance does not match its ledger"
        );
    }
    Ok(report)
}
