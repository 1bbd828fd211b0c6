pub mod transaction;
pub mod wallet;

pub use transaction::{Transaction, TransactionKind, TransactionStatus};
pub use wallet::Wallet;
