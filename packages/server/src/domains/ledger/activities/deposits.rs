use rust_decimal::Decimal;
use tracing::info;

use crate::common::{BookingError, UserId};
use crate::domains::ledger::activities::wallets::wallet_attempt;
use crate::domains::ledger::entries::credit;
use crate::domains::ledger::models::Transaction;
use crate::kernel::occ::{commit, guarded, with_occ_retry, AttemptError};
use crate::kernel::{Changeset, ServerDeps};

/// Result of a top-up.
#[derive(Debug, Clone, PartialEq)]
pub struct DepositOutcome {
    pub transaction: Transaction,
    /// The reference had already been recorded; nothing new was credited.
    pub replayed: bool,
}

/// Records a completed top-up confirmed by the payment gateway.
///
/// Idempotent on `external_reference`: replaying the same confirmation
/// returns the original transaction without crediting twice.
pub async fn deposit(
    deps: &ServerDeps,
    user_id: UserId,
    amount: Decimal,
    external_reference: &str,
) -> Result<DepositOutcome, BookingError> {
    let reference = external_reference.trim();
    if reference.is_empty() {
        return Err(BookingError::validation("deposit requires an external reference"));
    }
    if amount <= Decimal::ZERO {
        return Err(BookingError::validation(format!(
            "deposit amount must be positive, got {}",
            amount
        )));
    }

    with_occ_retry(deps, "deposit", || deposit_attempt(deps, user_id, amount, reference)).await
}

async fn deposit_attempt(
    deps: &ServerDeps,
    user_id: UserId,
    amount: Decimal,
    reference: &str,
) -> Result<DepositOutcome, AttemptError> {
    let wallet = wallet_attempt(deps, user_id).await?;

    if let Some(existing) = guarded(deps, deps.store.find_transaction_by_reference(reference)).await? {
        if existing.wallet_id != wallet.id {
            return Err(BookingError::validation(format!(
                "reference {} belongs to another wallet",
                reference
            ))
            .into());
        }
        info!(user_id = %user_id, reference, "Deposit already recorded");
        return Ok(DepositOutcome {
            transaction: existing,
            replayed: true,
        });
    }

    let entry = credit(&wallet, amount, "Wallet top-up", Some(reference.to_string()))?;
    let transaction = entry.transaction.clone();

    let mut changes = Changeset::new();
    changes.apply_ledger(entry);
    commit(deps, changes).await?;

    info!(user_id = %user_id, %amount, reference, "Deposit recorded");
    Ok(DepositOutcome {
        transaction,
        replayed: false,
    })
}
