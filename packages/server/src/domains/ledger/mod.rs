//! Ledger domain - wallets, transactions and credit movements
//!
//! Every balance change is paired with a transaction row in the same commit,
//! so a wallet's balance always equals the sum of its completed transactions.

pub mod activities;
pub mod entries;
pub mod models;

pub use activities::*;
pub use entries::{credit, debit, LedgerEntry};
pub use models::{Transaction, TransactionKind, TransactionStatus, Wallet};
