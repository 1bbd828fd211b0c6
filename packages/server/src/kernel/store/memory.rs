//! In-process store for tests and database-less local runs.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::{BookingStore, Change, Changeset, StoreError};
use crate::common::{
    EnrollmentId, OccurrenceId, SessionGroupId, TransactionId, UserId, WalletId,
};
use crate::domains::ledger::models::{Transaction, Wallet};
use crate::domains::sessions::models::{Enrollment, Occurrence, OccurrenceStatus};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    occurrences: HashMap<OccurrenceId, Occurrence>,
    enrollments: HashMap<EnrollmentId, Enrollment>,
    wallets: HashMap<UserId, Wallet>,
    transactions: Vec<Transaction>,
}

impl MemoryState {
    fn apply(&mut self, change: Change) -> Result<(), StoreError> {
        match change {
            Change::InsertOccurrence(occurrence) => {
                if self.occurrences.contains_key(&occurrence.id) {
                    return Err(duplicate("occurrence", occurrence.id));
                }
                self.occurrences.insert(occurrence.id, occurrence);
            }
            Change::UpdateOccurrence {
                occurrence,
                expected_version,
            } => {
                self.check_occurrence_version(occurrence.id, expected_version)?;
                self.occurrences.insert(occurrence.id, occurrence);
            }
            Change::GuardOccurrence { id, version } => {
                self.check_occurrence_version(id, version)?;
            }
            Change::InsertEnrollment(enrollment) => {
                let taken = self.enrollments.values().any(|existing| {
                    existing.occurrence_id == enrollment.occurrence_id
                        && existing.student_id == enrollment.student_id
                });
                if taken || self.enrollments.contains_key(&enrollment.id) {
                    return Err(duplicate(
                        "enrollment",
                        format!("{}/{}", enrollment.occurrence_id, enrollment.student_id),
                    ));
                }
                self.enrollments.insert(enrollment.id, enrollment);
            }
            Change::UpdateEnrollment {
                enrollment,
                expected_version,
            } => {
                let current = self.enrollments.get(&enrollment.id).map(|e| e.version);
                if current != Some(expected_version) {
                    return Err(conflict("enrollment", enrollment.id, expected_version));
                }
                self.enrollments.insert(enrollment.id, enrollment);
            }
            Change::InsertWallet(wallet) => {
                if self.wallets.contains_key(&wallet.user_id) {
                    return Err(duplicate("wallet", wallet.user_id));
                }
                self.wallets.insert(wallet.user_id, wallet);
            }
            Change::UpdateWallet {
                wallet,
                expected_version,
            } => {
                let current = self.wallets.get(&wallet.user_id).map(|w| w.version);
                if current != Some(expected_version) {
                    return Err(conflict("wallet", wallet.id, expected_version));
                }
                self.wallets.insert(wallet.user_id, wallet);
            }
            Change::InsertTransaction(transaction) => {
                if let Some(reference) = &transaction.external_reference {
                    let taken = self
                        .transactions
                        .iter()
                        .any(|txn| txn.external_reference.as_ref() == Some(reference));
                    if taken {
                        return Err(duplicate("transaction reference", reference));
                    }
                }
                self.transactions.push(transaction);
            }
            Change::SettleTransaction {
                transaction,
                expected_status,
            } => {
                let slot = self
                    .transactions
                    .iter_mut()
                    .find(|txn| txn.id == transaction.id)
                    .filter(|txn| txn.status == expected_status)
                    .ok_or_else(|| StoreError::VersionConflict {
                        entity: "transaction",
                        id: transaction.id.to_string(),
                        expected: 0,
                    })?;
                slot.status = transaction.status;
                slot.external_reference = transaction.external_reference;
                slot.updated_at = transaction.updated_at;
            }
        }
        Ok(())
    }

    fn check_occurrence_version(&self, id: OccurrenceId, expected: i64) -> Result<(), StoreError> {
        let current = self.occurrences.get(&id).map(|o| o.version);
        if current != Some(expected) {
            return Err(conflict("occurrence", id, expected));
        }
        Ok(())
    }
}

fn conflict(entity: &'static str, id: impl ToString, expected: i64) -> StoreError {
    StoreError::VersionConflict {
        entity,
        id: id.to_string(),
        expected,
    }
}

fn duplicate(entity: &'static str, key: impl ToString) -> StoreError {
    StoreError::Duplicate {
        entity,
        key: key.to_string(),
    }
}

/// Store backed by in-process maps behind a mutex.
///
/// Commits apply to a copy of the state which replaces the original only if
/// every change succeeds, matching the all-or-nothing contract of the
/// Postgres store.
#[derive(Default)]
pub struct MemoryBookingStore {
    state: Mutex<MemoryState>,
    offline: AtomicBool,
}

impl MemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates an unreachable backend: every call fails with
    /// `StoreError::Unavailable` until switched back on.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Every transaction across all wallets, in insertion order.
    pub fn all_transactions(&self) -> Vec<Transaction> {
        self.lock().transactions.clone()
    }

    pub fn all_enrollments(&self) -> Vec<Enrollment> {
        self.lock().enrollments.values().cloned().collect()
    }

    pub fn all_wallets(&self) -> Vec<Wallet> {
        self.lock().wallets.values().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read<T>(&self, f: impl FnOnce(&MemoryState) -> T) -> Result<T, StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".into()));
        }
        Ok(f(&self.lock()))
    }
}

fn sorted_by_slot(mut occurrences: Vec<Occurrence>) -> Vec<Occurrence> {
    occurrences.sort_by_key(|o| (o.date, o.start_time));
    occurrences
}

#[async_trait]
impl BookingStore for MemoryBookingStore {
    async fn find_occurrence(&self, id: OccurrenceId) -> Result<Option<Occurrence>, StoreError> {
        self.read(|state| state.occurrences.get(&id).cloned())
    }

    async fn find_group_occurrences(
        &self,
        session_group_id: SessionGroupId,
    ) -> Result<Vec<Occurrence>, StoreError> {
        self.read(|state| {
            sorted_by_slot(
                state
                    .occurrences
                    .values()
                    .filter(|o| o.session_group_id == session_group_id)
                    .cloned()
                    .collect(),
            )
        })
    }

    async fn find_coach_occurrences_on(
        &self,
        coach_id: UserId,
        date: NaiveDate,
    ) -> Result<Vec<Occurrence>, StoreError> {
        self.read(|state| {
            sorted_by_slot(
                state
                    .occurrences
                    .values()
                    .filter(|o| o.coach_id == coach_id && o.date == date)
                    .cloned()
                    .collect(),
            )
        })
    }

    async fn find_occurrences_by_status(
        &self,
        status: OccurrenceStatus,
    ) -> Result<Vec<Occurrence>, StoreError> {
        self.read(|state| {
            sorted_by_slot(
                state
                    .occurrences
                    .values()
                    .filter(|o| o.status == status)
                    .cloned()
                    .collect(),
            )
        })
    }

    async fn find_enrollment(&self, id: EnrollmentId) -> Result<Option<Enrollment>, StoreError> {
        self.read(|state| state.enrollments.get(&id).cloned())
    }

    async fn find_student_enrollment(
        &self,
        occurrence_id: OccurrenceId,
        student_id: UserId,
    ) -> Result<Option<Enrollment>, StoreError> {
        self.read(|state| {
            state
                .enrollments
                .values()
                .find(|e| e.occurrence_id == occurrence_id && e.student_id == student_id)
                .cloned()
        })
    }

    async fn find_enrollments(
        &self,
        occurrence_id: OccurrenceId,
    ) -> Result<Vec<Enrollment>, StoreError> {
        self.read(|state| {
            let mut enrollments: Vec<Enrollment> = state
                .enrollments
                .values()
                .filter(|e| e.occurrence_id == occurrence_id)
                .cloned()
                .collect();
            enrollments.sort_by_key(|e| (e.created_at, e.id));
            enrollments
        })
    }

    async fn find_wallet(&self, user_id: UserId) -> Result<Option<Wallet>, StoreError> {
        self.read(|state| state.wallets.get(&user_id).cloned())
    }

    async fn find_wallet_by_id(&self, wallet_id: WalletId) -> Result<Option<Wallet>, StoreError> {
        self.read(|state| state.wallets.values().find(|w| w.id == wallet_id).cloned())
    }

    async fn find_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError> {
        self.read(|state| state.transactions.iter().find(|txn| txn.id == id).cloned())
    }

    async fn find_transactions(&self, wallet_id: WalletId) -> Result<Vec<Transaction>, StoreError> {
        self.read(|state| {
            state
                .transactions
                .iter()
                .filter(|txn| txn.wallet_id == wallet_id)
                .cloned()
                .collect()
        })
    }

    async fn find_transaction_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Transaction>, StoreError> {
        self.read(|state| {
            state
                .transactions
                .iter()
                .find(|txn| txn.external_reference.as_deref() == Some(reference))
                .cloned()
        })
    }

    async fn commit(&self, changeset: Changeset) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".into()));
        }

        let mut state = self.lock();
        let mut staged = state.clone();
        for change in changeset.into_changes() {
            staged.apply(change)?;
        }
        *state = staged;
        Ok(())
    }
}
