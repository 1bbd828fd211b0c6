pub mod deposits;
pub mod reconciliation;
pub mod wallets;
pub mod withdrawals;

pub use deposits::{deposit, DepositOutcome};
pub use reconciliation::{verify_reconciliation, ReconciliationReport};
pub use wallets::{balance, history, wallet_for, WalletBalance};
pub use withdrawals::{reconcile, request_withdrawal};
