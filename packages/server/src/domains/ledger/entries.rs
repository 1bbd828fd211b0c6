//! Pure ledger primitives.
//!
//! Each primitive takes the wallet as read and returns the wallet as it
//! should be written together with the transaction that explains the change.
//! Nothing here touches storage; callers put the entry in a changeset.

use rust_decimal::Decimal;

use super::models::{Transaction, TransactionKind, TransactionStatus, Wallet};
use crate::common::BookingError;

/// A balance change and the transaction recording it.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub wallet: Wallet,
    pub transaction: Transaction,
}

/// Takes `amount` credits from the wallet, refusing to go negative.
pub fn debit(
    wallet: &Wallet,
    amount: Decimal,
    description: impl Into<String>,
) -> Result<LedgerEntry, BookingError> {
    ensure_positive(amount)?;
    if wallet.balance < amount {
        return Err(BookingError::InsufficientFunds {
            required: amount,
            available: wallet.balance,
        });
    }

    let mut updated = wallet.clone();
    updated.balance -= amount;

    Ok(LedgerEntry {
        transaction: Transaction::new(
            wallet.id,
            -amount,
            TransactionKind::Withdrawal,
            description,
            TransactionStatus::Completed,
            None,
        ),
        wallet: updated,
    })
}

/// Adds `amount` credits to the wallet.
pub fn credit(
    wallet: &Wallet,
    amount: Decimal,
    description: impl Into<String>,
    external_reference: Option<String>,
) -> Result<LedgerEntry, BookingError> {
    ensure_positive(amount)?;

    let mut updated = wallet.clone();
    updated.balance += amount;

    Ok(LedgerEntry {
        transaction: Transaction::new(
            wallet.id,
            amount,
            TransactionKind::Deposit,
            description,
            TransactionStatus::Completed,
            external_reference,
        ),
        wallet: updated,
    })
}

/// Sum of completed transaction amounts; must equal the wallet balance.
pub fn completed_total(transactions: &[Transaction]) -> Decimal {
    transactions
        .iter()
        .filter(|txn| txn.is_completed())
        .map(|txn| txn.amount)
        .sum()
}

/// Credits already promised to outgoing transfers that have not settled.
pub fn pending_withdrawals(transactions: &[Transaction]) -> Decimal {
    transactions
        .iter()
        .filter(|txn| txn.is_pending_withdrawal())
        .map(|txn| -txn.amount)
        .sum()
}

fn ensure_positive(amount: Decimal) -> Result<(), BookingError> {
    if amount <= Decimal::ZERO {
        return Err(BookingError::validation(format!(
            "ledger amount must be positive, got {}",
            amount
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::UserId;
    use chrono::Utc;

    fn wallet_with(balance: i64) -> Wallet {
        let mut wallet = Wallet::empty(UserId::new(), Utc::now());
        wallet.balance = Decimal::from(balance);
        wallet
    }

    #[test]
    fn debit_records_negative_withdrawal() {
        let wallet = wallet_with(50);
        let entry = debit(&wallet, Decimal::from(40), "Booking").unwrap();

        assert_eq!(entry.wallet.balance, Decimal::from(10));
        assert_eq!(entry.transaction.amount, Decimal::from(-40));
        assert_eq!(entry.transaction.kind, TransactionKind::Withdrawal);
        assert_eq!(entry.transaction.status, TransactionStatus::Completed);
        assert_eq!(entry.transaction.wallet_id, wallet.id);
        // version is bumped by the changeset, not here
        assert_eq!(entry.wallet.version, wallet.version);
    }

    #[test]
    fn debit_refuses_to_overdraw() {
        let wallet = wallet_with(30);
        assert_eq!(
            debit(&wallet, Decimal::from(40), "Booking"),
            Err(BookingError::InsufficientFunds {
                required: Decimal::from(40),
                available: Decimal::from(30),
            })
        );
    }

    #[test]
    fn debit_of_entire_balance_is_allowed() {
        let entry = debit(&wallet_with(40), Decimal::from(40), "Booking").unwrap();
        assert_eq!(entry.wallet.balance, Decimal::ZERO);
    }

    #[test]
    fn credit_carries_reference() {
        let entry = credit(
            &wallet_with(0),
            Decimal::from(25),
            "Top-up",
            Some("pay_123".into()),
        )
        .unwrap();
        assert_eq!(entry.wallet.balance, Decimal::from(25));
        assert_eq!(entry.transaction.external_reference.as_deref(), Some("pay_123"));
        assert_eq!(entry.transaction.kind, TransactionKind::Deposit);
    }

    #[test]
    fn zero_and_negative_amounts_are_rejected() {
        let wallet = wallet_with(10);
        assert!(debit(&wallet, Decimal::ZERO, "x").is_err());
        assert!(credit(&wallet, Decimal::from(-5), "x", None).is_err());
    }

    #[test]
    fn completed_total_ignores_pending_and_failed() {
        let wallet = wallet_with(0);
        let mut pending = Transaction::new(
            wallet.id,
            Decimal::from(-20),
            TransactionKind::Withdrawal,
            "Cash out",
            TransactionStatus::Pending,
            None,
        );
        let failed = Transaction {
            status: TransactionStatus::Failed,
            ..pending.clone()
        };
        let deposit = credit(&wallet, Decimal::from(50), "Top-up", None)
            .unwrap()
            .transaction;

        let txns = vec![deposit.clone(), pending.clone(), failed];
        assert_eq!(completed_total(&txns), Decimal::from(50));
        assert_eq!(pending_withdrawals(&txns), Decimal::from(20));

        pending.status = TransactionStatus::Completed;
        assert_eq!(completed_total(&[deposit, pending]), Decimal::from(30));
    }
}
