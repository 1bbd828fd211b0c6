//! Outgoing transfers and their settlement.
//!
//! A withdrawal is recorded `pending` before the gateway is called and only
//! touches the balance once it completes. If the gateway call itself fails
//! the pending entry is marked `failed` as a compensating step, since the
//! gateway and the store cannot share a transaction.

use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::common::{BookingError, UserId};
use crate::domains::ledger::activities::wallets::{ensure_funds, spendable_attempt};
use crate::domains::ledger::models::{Transaction, TransactionKind, TransactionStatus};
use crate::kernel::occ::{commit, guarded, with_occ_retry, AttemptError};
use crate::kernel::{Changeset, PaymentStatus, ServerDeps};

/// Requests a transfer of `amount` credits to `destination`.
///
/// Returns the withdrawal transaction in whatever state the gateway left it:
/// `pending` while the transfer is in flight, `completed` if the gateway
/// settled it synchronously, `failed` if it was refused.
pub async fn request_withdrawal(
    deps: &ServerDeps,
    user_id: UserId,
    amount: Decimal,
    destination: &str,
) -> Result<Transaction, BookingError> {
    if amount <= Decimal::ZERO {
        return Err(BookingError::validation(format!(
            "withdrawal amount must be positive, got {}",
            amount
        )));
    }
    if destination.trim().is_empty() {
        return Err(BookingError::validation("withdrawal destination is required"));
    }

    let pending = with_occ_retry(deps, "request_withdrawal", || {
        reserve_attempt(deps, user_id, amount, destination)
    })
    .await?;

    match deps.payments.transfer(amount, destination).await {
        Ok(receipt) => {
            let status = match receipt.status {
                PaymentStatus::Pending => TransactionStatus::Pending,
                PaymentStatus::Succeeded => TransactionStatus::Completed,
                PaymentStatus::Failed => TransactionStatus::Failed,
            };
            info!(
                user_id = %user_id,
                %amount,
                reference = %receipt.reference,
                status = ?receipt.status,
                "Gateway accepted withdrawal"
            );
            settle(deps, pending, Some(receipt.reference), status).await
        }
        Err(e) => {
            error!(
                user_id = %user_id,
                transaction_id = %pending.id,
                %amount,
                error = %e,
                "Gateway transfer failed, marking withdrawal failed"
            );
            settle(deps, pending, None, TransactionStatus::Failed).await
        }
    }
}

async fn reserve_attempt(
    deps: &ServerDeps,
    user_id: UserId,
    amount: Decimal,
    destination: &str,
) -> Result<Transaction, AttemptError> {
    let (wallet, available) = spendable_attempt(deps, user_id).await?;
    ensure_funds(amount, available)?;

    let transaction = Transaction::new(
        wallet.id,
        -amount,
        TransactionKind::Withdrawal,
        format!("Withdrawal to {}", destination),
        TransactionStatus::Pending,
        None,
    );

    // Balance is unchanged, but bumping the version serialises this
    // reservation against concurrent spends from the same wallet.
    let mut changes = Changeset::new();
    changes.insert_transaction(transaction.clone());
    changes.update_wallet(wallet);
    commit(deps, changes).await?;

    Ok(transaction)
}

/// Applies a gateway settlement report to the transaction holding
/// `external_reference`.
///
/// `completed` applies the amount to the balance, `failed` leaves it alone.
/// Settling an already settled transaction is a no-op that returns it as is.
pub async fn reconcile(
    deps: &ServerDeps,
    external_reference: &str,
    status: TransactionStatus,
) -> Result<Transaction, BookingError> {
    if !status.is_settled() {
        return Err(BookingError::validation(
            "reconcile expects a completed or failed status",
        ));
    }

    let transaction = guarded(deps, deps.store.find_transaction_by_reference(external_reference))
        .await?
        .ok_or_else(|| BookingError::not_found("transaction", external_reference))?;

    if transaction.status.is_settled() {
        info!(
            reference = external_reference,
            status = ?transaction.status,
            "Transaction already settled"
        );
        return Ok(transaction);
    }

    settle(deps, transaction, None, status).await
}

/// Moves a pending transaction to `status`, attaching `reference` if given.
async fn settle(
    deps: &ServerDeps,
    pending: Transaction,
    reference: Option<String>,
    status: TransactionStatus,
) -> Result<Transaction, BookingError> {
    with_occ_retry(deps, "settle_transaction", || {
        settle_attempt(deps, &pending, reference.clone(), status)
    })
    .await
}

async fn settle_attempt(
    deps: &ServerDeps,
    pending: &Transaction,
    reference: Option<String>,
    status: TransactionStatus,
) -> Result<Transaction, AttemptError> {
    let current = guarded(deps, deps.store.find_transaction(pending.id))
        .await?
        .ok_or_else(|| BookingError::not_found("transaction", pending.id))?;
    if current.status.is_settled() {
        return Ok(current);
    }

    let mut settled = current.clone();
    settled.status = status;
    if reference.is_some() {
        settled.external_reference = reference;
    }

    let mut changes = Changeset::new();
    if status == TransactionStatus::Completed {
        let wallet = guarded(deps, deps.store.find_wallet_by_id(current.wallet_id))
            .await?
            .ok_or_else(|| BookingError::not_found("wallet", current.wallet_id))?;

        let mut updated = wallet.clone();
        updated.balance += current.amount;
        if updated.balance < Decimal::ZERO {
            warn!(
                wallet_id = %wallet.id,
                transaction_id = %current.id,
                "Settlement would overdraw wallet"
            );
            return Err(BookingError::InsufficientFunds {
                required: -current.amount,
                available: wallet.balance,
            }
            .into());
        }
        changes.update_wallet(updated);
    }
    changes.settle_transaction(settled.clone(), TransactionStatus::Pending);
    commit(deps, changes).await?;

    info!(
        transaction_id = %settled.id,
        status = ?settled.status,
        reference = ?settled.external_reference,
        "Transaction settled"
    );
    Ok(settled)
}
