//! Wallet access: lazy creation, balances and history.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::common::{BookingError, UserId};
use crate::domains::ledger::entries::pending_withdrawals;
use crate::domains::ledger::models::{Transaction, Wallet};
use crate::kernel::occ::{commit, guarded, with_occ_retry, AttemptError};
use crate::kernel::{Changeset, ServerDeps};

/// What a user can see about their credits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletBalance {
    pub balance: Decimal,
    /// Outgoing transfers requested but not yet settled.
    pub pending_withdrawals: Decimal,
    /// Balance minus pending withdrawals; what bookings and new withdrawals may spend.
    pub available: Decimal,
}

/// Returns the user's wallet, creating an empty one on first access.
pub async fn wallet_for(deps: &ServerDeps, user_id: UserId) -> Result<Wallet, BookingError> {
    with_occ_retry(deps, "wallet_for", || wallet_attempt(deps, user_id)).await
}

/// One attempt at [`wallet_for`]. A concurrent creator wins the unique key
/// and this attempt reports a conflict, so the retry reads their wallet.
pub(crate) async fn wallet_attempt(
    deps: &ServerDeps,
    user_id: UserId,
) -> Result<Wallet, AttemptError> {
    if let Some(wallet) = guarded(deps, deps.store.find_wallet(user_id)).await? {
        return Ok(wallet);
    }

    let wallet = Wallet::empty(user_id, deps.now());
    let mut changes = Changeset::new();
    changes.insert_wallet(wallet.clone());
    commit(deps, changes).await?;

    info!(user_id = %user_id, wallet_id = %wallet.id, "Created wallet");
    Ok(wallet)
}

/// Wallet plus the credits it may spend right now.
pub(crate) async fn spendable_attempt(
    deps: &ServerDeps,
    user_id: UserId,
) -> Result<(Wallet, Decimal), AttemptError> {
    let wallet = wallet_attempt(deps, user_id).await?;
    let transactions = guarded(deps, deps.store.find_transactions(wallet.id)).await?;
    let available = wallet.balance - pending_withdrawals(&transactions);
    Ok((wallet, available))
}

pub async fn balance(deps: &ServerDeps, user_id: UserId) -> Result<WalletBalance, BookingError> {
    let wallet = wallet_for(deps, user_id).await?;
    let transactions = guarded(deps, deps.store.find_transactions(wallet.id)).await?;
    let pending = pending_withdrawals(&transactions);

    Ok(WalletBalance {
        balance: wallet.balance,
        pending_withdrawals: pending,
        available: wallet.balance - pending,
    })
}

/// Ledger history, oldest first.
pub async fn history(deps: &ServerDeps, user_id: UserId) -> Result<Vec<Transaction>, BookingError> {
    let wallet = wallet_for(deps, user_id).await?;
    guarded(deps, deps.store.find_transactions(wallet.id)).await
}

/// Fails with `InsufficientFunds` unless `available` covers `required`.
pub(crate) fn ensure_funds(required: Decimal, available: Decimal) -> Result<(), BookingError> {
    if required > available {
        return Err(BookingError::InsufficientFunds {
            required,
            available,
        });
    }
    Ok(())
}
