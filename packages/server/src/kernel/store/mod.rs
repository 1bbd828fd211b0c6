//! Durable store abstraction for sessions and the ledger.
//!
//! Reads are plain lookups. Every mutation goes through [`BookingStore::commit`],
//! which applies a whole [`Changeset`] atomically: either every change lands or
//! none do.
//!
//! ## Optimistic concurrency
//!
//! Occurrences, enrollments and wallets carry a `version`. An update records
//! the version it was computed from; the store rejects the entire changeset
//! with [`StoreError::VersionConflict`] if any row has moved on since. Callers
//! re-read, re-validate and try again (see `kernel::occ`).

mod memory;
mod postgres;

pub use memory::MemoryBookingStore;
pub use postgres::PgBookingStore;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use crate::common::{EnrollmentId, OccurrenceId, SessionGroupId, TransactionId, UserId, WalletId};
use crate::domains::ledger::entries::LedgerEntry;
use crate::domains::ledger::models::{Transaction, TransactionStatus, Wallet};
use crate::domains::sessions::models::{Enrollment, Occurrence, OccurrenceStatus};

/// Errors raised by a store backend.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// Another writer updated the row after it was read.
    #[error("version conflict on {entity} {id}: expected version {expected}")]
    VersionConflict {
        entity: &'static str,
        id: String,
        expected: i64,
    },

    /// A unique key (enrollment per student, wallet per user, transaction
    /// reference) is already taken.
    #[error("duplicate {entity}: {key}")]
    Duplicate { entity: &'static str, key: String },

    /// The backend could not be reached in time.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Lost a race with a concurrent writer; re-reading may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::VersionConflict { .. } | StoreError::Duplicate { .. }
        )
    }
}

/// One row-level mutation inside a changeset.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    InsertOccurrence(Occurrence),
    UpdateOccurrence {
        occurrence: Occurrence,
        expected_version: i64,
    },
    /// Fails the commit unless the occurrence is still at `version`.
    GuardOccurrence { id: OccurrenceId, version: i64 },
    InsertEnrollment(Enrollment),
    UpdateEnrollment {
        enrollment: Enrollment,
        expected_version: i64,
    },
    InsertWallet(Wallet),
    UpdateWallet {
        wallet: Wallet,
        expected_version: i64,
    },
    InsertTransaction(Transaction),
    SettleTransaction {
        transaction: Transaction,
        expected_status: TransactionStatus,
    },
}

/// An ordered set of changes committed as one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changeset {
    changes: Vec<Change>,
}

impl Changeset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_occurrence(&mut self, occurrence: Occurrence) {
        self.changes.push(Change::InsertOccurrence(occurrence));
    }

    /// Stages an update conditional on `occurrence.version`, then advances
    /// the caller's copy to match the row as it will be stored.
    pub fn update_occurrence(&mut self, occurrence: &mut Occurrence) {
        let expected_version = occurrence.version;
        occurrence.version += 1;
        occurrence.updated_at = Utc::now();
        self.changes.push(Change::UpdateOccurrence {
            occurrence: occurrence.clone(),
            expected_version,
        });
    }

    /// Asserts an occurrence that was read (but not written) is unchanged at commit.
    pub fn guard_occurrence(&mut self, occurrence: &Occurrence) {
        self.changes.push(Change::GuardOccurrence {
            id: occurrence.id,
            version: occurrence.version,
        });
    }

    pub fn insert_enrollment(&mut self, enrollment: Enrollment) {
        self.changes.push(Change::InsertEnrollment(enrollment));
    }

    pub fn update_enrollment(&mut self, enrollment: &mut Enrollment) {
        let expected_version = enrollment.version;
        enrollment.version += 1;
        enrollment.updated_at = Utc::now();
        self.changes.push(Change::UpdateEnrollment {
            enrollment: enrollment.clone(),
            expected_version,
        });
    }

    pub fn insert_wallet(&mut self, wallet: Wallet) {
        self.changes.push(Change::InsertWallet(wallet));
    }

    /// Stages a balance change together with the transaction recording it.
    pub fn apply_ledger(&mut self, entry: LedgerEntry) {
        self.update_wallet(entry.wallet);
        self.changes.push(Change::InsertTransaction(entry.transaction));
    }

    pub fn update_wallet(&mut self, mut wallet: Wallet) {
        let expected_version = wallet.version;
        wallet.version += 1;
        wallet.updated_at = Utc::now();
        self.changes.push(Change::UpdateWallet {
            wallet,
            expected_version,
        });
    }

    pub fn insert_transaction(&mut self, transaction: Transaction) {
        self.changes.push(Change::InsertTransaction(transaction));
    }

    pub fn settle_transaction(&mut self, mut transaction: Transaction, expected_status: TransactionStatus) {
        transaction.updated_at = Utc::now();
        self.changes.push(Change::SettleTransaction {
            transaction,
            expected_status,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn into_changes(self) -> Vec<Change> {
        self.changes
    }
}

/// Persistent store of sessions, enrollments, wallets and transactions.
///
/// Implementations must be `Send + Sync` so a single handle can be shared
/// across concurrent requests through `ServerDeps`.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn find_occurrence(&self, id: OccurrenceId) -> Result<Option<Occurrence>, StoreError>;

    /// Every occurrence of a recurring series, ordered by date and time.
    async fn find_group_occurrences(
        &self,
        session_group_id: SessionGroupId,
    ) -> Result<Vec<Occurrence>, StoreError>;

    /// All of a coach's occurrences on one date, whatever their status.
    async fn find_coach_occurrences_on(
        &self,
        coach_id: UserId,
        date: NaiveDate,
    ) -> Result<Vec<Occurrence>, StoreError>;

    async fn find_occurrences_by_status(
        &self,
        status: OccurrenceStatus,
    ) -> Result<Vec<Occurrence>, StoreError>;

    async fn find_enrollment(&self, id: EnrollmentId) -> Result<Option<Enrollment>, StoreError>;

    async fn find_student_enrollment(
        &self,
        occurrence_id: OccurrenceId,
        student_id: UserId,
    ) -> Result<Option<Enrollment>, StoreError>;

    async fn find_enrollments(&self, occurrence_id: OccurrenceId)
        -> Result<Vec<Enrollment>, StoreError>;

    async fn find_wallet(&self, user_id: UserId) -> Result<Option<Wallet>, StoreError>;

    async fn find_wallet_by_id(&self, wallet_id: WalletId) -> Result<Option<Wallet>, StoreError>;

    async fn find_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError>;

    /// Ledger history of a wallet, oldest first.
    async fn find_transactions(&self, wallet_id: WalletId) -> Result<Vec<Transaction>, StoreError>;

    async fn find_transaction_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Transaction>, StoreError>;

    /// Applies every change atomically, or none of them.
    async fn commit(&self, changeset: Changeset) -> Result<(), StoreError>;
}
