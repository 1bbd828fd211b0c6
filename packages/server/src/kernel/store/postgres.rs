use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;

use super::{BookingStore, Change, Changeset, StoreError};
use crate::common::{EnrollmentId, OccurrenceId, SessionGroupId, TransactionId, UserId, WalletId};
use crate::domains::ledger::models::{Transaction, Wallet};
use crate::domains::sessions::models::{Enrollment, Occurrence, OccurrenceStatus};

/// Postgres-backed store. Each commit runs in one database transaction;
/// versioned updates that match zero rows roll the whole thing back.
#[derive(Clone)]
pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// SQLSTATEs Postgres uses when it aborts a transaction that lost a race:
/// `serialization_failure` and `deadlock_detected`.
const RACE_LOST_CODES: [&str; 2] = ["40001", "40P01"];

fn is_race_lost(code: &str) -> bool {
    RACE_LOST_CODES.contains(&code)
}

fn map_sqlx(error: sqlx::Error) -> StoreError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate {
            entity: "row",
            key: db.constraint().unwrap_or("unique").to_string(),
        },
        // Lock waits between concurrent commits (e.g. two reschedules guarding
        // each other's rows) end in a deadlock abort; the loser re-reads.
        sqlx::Error::Database(db) if db.code().is_some_and(|code| is_race_lost(&code)) => {
            StoreError::VersionConflict {
                entity: "commit",
                id: db.code().map(|code| code.into_owned()).unwrap_or_default(),
                expected: 0,
            }
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(error.to_string())
        }
        _ => StoreError::Backend(error.to_string()),
    }
}

fn require(applied: bool, entity: &'static str, id: impl ToString, expected: i64) -> Result<(), StoreError> {
    if applied {
        Ok(())
    } else {
        Err(StoreError::VersionConflict {
            entity,
            id: id.to_string(),
            expected,
        })
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn find_occurrence(&self, id: OccurrenceId) -> Result<Option<Occurrence>, StoreError> {
        Occurrence::find_by_id(id, &self.pool).await.map_err(map_sqlx)
    }

    async fn find_group_occurrences(
        &self,
        session_group_id: SessionGroupId,
    ) -> Result<Vec<Occurrence>, StoreError> {
        Occurrence::find_by_group(session_group_id, &self.pool)
            .await
            .map_err(map_sqlx)
    }

    async fn find_coach_occurrences_on(
        &self,
        coach_id: UserId,
        date: NaiveDate,
    ) -> Result<Vec<Occurrence>, StoreError> {
        Occurrence::find_for_coach_on(coach_id, date, &self.pool)
            .await
            .map_err(map_sqlx)
    }

    async fn find_occurrences_by_status(
        &self,
        status: OccurrenceStatus,
    ) -> Result<Vec<Occurrence>, StoreError> {
        Occurrence::find_by_status(status, &self.pool)
            .await
            .map_err(map_sqlx)
    }

    async fn find_enrollment(&self, id: EnrollmentId) -> Result<Option<Enrollment>, StoreError> {
        Enrollment::find_by_id(id, &self.pool).await.map_err(map_sqlx)
    }

    async fn find_student_enrollment(
        &self,
        occurrence_id: OccurrenceId,
        student_id: UserId,
    ) -> Result<Option<Enrollment>, StoreError> {
        Enrollment::find_for_student(occurrence_id, student_id, &self.pool)
            .await
            .map_err(map_sqlx)
    }

    async fn find_enrollments(
        &self,
        occurrence_id: OccurrenceId,
    ) -> Result<Vec<Enrollment>, StoreError> {
        Enrollment::find_for_occurrence(occurrence_id, &self.pool)
            .await
            .map_err(map_sqlx)
    }

    async fn find_wallet(&self, user_id: UserId) -> Result<Option<Wallet>, StoreError> {
        Wallet::find_by_user(user_id, &self.pool).await.map_err(map_sqlx)
    }

    async fn find_wallet_by_id(&self, wallet_id: WalletId) -> Result<Option<Wallet>, StoreError> {
        Wallet::find_by_id(wallet_id, &self.pool).await.map_err(map_sqlx)
    }

    async fn find_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError> {
        Transaction::find_by_id(id, &self.pool).await.map_err(map_sqlx)
    }

    async fn find_transactions(&self, wallet_id: WalletId) -> Result<Vec<Transaction>, StoreError> {
        Transaction::find_for_wallet(wallet_id, &self.pool)
            .await
            .map_err(map_sqlx)
    }

    async fn find_transaction_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Transaction>, StoreError> {
        Transaction::find_by_reference(reference, &self.pool)
            .await
            .map_err(map_sqlx)
    }

    async fn commit(&self, changeset: Changeset) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        for change in changeset.into_changes() {
            match change {
                Change::InsertOccurrence(occurrence) => {
                    occurrence.insert(&mut tx).await.map_err(map_sqlx)?;
                }
                Change::UpdateOccurrence {
                    occurrence,
                    expected_version,
                } => {
                    let applied = occurrence
                        .update_versioned(expected_version, &mut tx)
                        .await
                        .map_err(map_sqlx)?;
                    require(applied, "occurrence", occurrence.id, expected_version)?;
                }
                Change::GuardOccurrence { id, version } => {
                    let held = Occurrence::lock_at_version(id, version, &mut tx)
                        .await
                        .map_err(map_sqlx)?;
                    require(held, "occurrence", id, version)?;
                }
                Change::InsertEnrollment(enrollment) => {
                    enrollment.insert(&mut tx).await.map_err(map_sqlx)?;
                }
                Change::UpdateEnrollment {
                    enrollment,
                    expected_version,
                } => {
                    let applied = enrollment
                        .update_versioned(expected_version, &mut tx)
                        .await
                        .map_err(map_sqlx)?;
                    require(applied, "enrollment", enrollment.id, expected_version)?;
                }
                Change::InsertWallet(wallet) => {
                    wallet.insert(&mut tx).await.map_err(map_sqlx)?;
                }
                Change::UpdateWallet {
                    wallet,
                    expected_version,
                } => {
                    let applied = wallet
                        .update_versioned(expected_version, &mut tx)
                        .await
                        .map_err(map_sqlx)?;
                    require(applied, "wallet", wallet.id, expected_version)?;
                }
                Change::InsertTransaction(transaction) => {
                    transaction.insert(&mut tx).await.map_err(map_sqlx)?;
                }
                Change::SettleTransaction {
                    transaction,
                    expected_status,
                } => {
                    let applied = transaction
                        .update_settlement(expected_status, &mut tx)
                        .await
                        .map_err(map_sqlx)?;
                    require(applied, "transaction", transaction.id, 0)?;
                }
            }
        }

        // Dropping `tx` on an early return rolls back.
        tx.commit().await.map_err(map_sqlx)
    }
}
