use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use std::fmt;

use crate::common::{BookingError, EnrollmentId, OccurrenceId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "enrollment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    /// Seat reserved without payment (later weeks of a partially paid package).
    Unpaid,
    Paid,
    Attended,
    Absent,
    /// Student withdrew.
    Cancelled,
    /// Coach cancelled, or the student declined a reschedule.
    CoachCancelled,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Unpaid => "unpaid",
            EnrollmentStatus::Paid => "paid",
            EnrollmentStatus::Attended => "attended",
            EnrollmentStatus::Absent => "absent",
            EnrollmentStatus::Cancelled => "cancelled",
            EnrollmentStatus::CoachCancelled => "coach_cancelled",
        }
    }

    /// Still holding a seat that has not been settled by attendance or cancellation.
    pub fn is_active(&self) -> bool {
        matches!(self, EnrollmentStatus::Paid | EnrollmentStatus::Unpaid)
    }

    pub fn is_withdrawn(&self) -> bool {
        matches!(
            self,
            EnrollmentStatus::Cancelled | EnrollmentStatus::CoachCancelled
        )
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps an external attendance code onto an enrollment status.
///
/// `present` and `late` count as attended; anything unrecognised leaves the
/// enrollment `unpaid` so the coach can settle it by hand.
pub fn attendance_status(code: &str) -> EnrollmentStatus {
    match code.trim().to_ascii_lowercase().as_str() {
        "present" | "late" => EnrollmentStatus::Attended,
        "absent" => EnrollmentStatus::Absent,
        _ => EnrollmentStatus::Unpaid,
    }
}

/// A student's binding to one occurrence. Unique per (occurrence, student).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub occurrence_id: OccurrenceId,
    pub student_id: UserId,
    pub status: EnrollmentStatus,
    /// Credits actually debited for this seat; refunds return exactly this.
    pub amount_paid: Decimal,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Enrollment {
    pub fn paid(
        occurrence_id: OccurrenceId,
        student_id: UserId,
        amount_paid: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(occurrence_id, student_id, EnrollmentStatus::Paid, amount_paid, now)
    }

    pub fn unpaid(occurrence_id: OccurrenceId, student_id: UserId, now: DateTime<Utc>) -> Self {
        Self::new(
            occurrence_id,
            student_id,
            EnrollmentStatus::Unpaid,
            Decimal::ZERO,
            now,
        )
    }

    fn new(
        occurrence_id: OccurrenceId,
        student_id: UserId,
        status: EnrollmentStatus,
        amount_paid: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EnrollmentId::new(),
            occurrence_id,
            student_id,
            status,
            amount_paid,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn ensure_student(&self, caller: UserId) -> Result<(), BookingError> {
        if self.student_id != caller {
            return Err(BookingError::Forbidden(format!(
                "enrollment {} belongs to another student",
                self.id
            )));
        }
        Ok(())
    }

    /// Whether credits were ever debited for this seat. Attendance may move
    /// a paid seat back to `unpaid`; the debit still stands.
    pub fn is_paid_for(&self) -> bool {
        self.amount_paid > Decimal::ZERO
    }

    /// Credits owed back if this seat is cancelled now.
    pub fn refundable_amount(&self) -> Decimal {
        if self.status.is_active() {
            self.amount_paid
        } else {
            Decimal::ZERO
        }
    }
}

// =============================================================================
// SQL persistence
// =============================================================================

impl Enrollment {
    pub async fn find_by_id(id: EnrollmentId, pool: &PgPool) -> sqlx::Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM enrollments WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_for_student(
        occurrence_id: OccurrenceId,
        student_id: UserId,
        pool: &PgPool,
    ) -> sqlx::Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM enrollments WHERE occurrence_id = $1 AND student_id = $2",
        )
        .bind(occurrence_id)
        .bind(student_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_for_occurrence(
        occurrence_id: OccurrenceId,
        pool: &PgPool,
    ) -> sqlx::Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM enrollments WHERE occurrence_id = $1 ORDER BY created_at ASC",
        )
        .bind(occurrence_id)
        .fetch_all(pool)
        .await
    }

    pub async fn insert(&self, conn: &mut PgConnection) -> sqlx::Result<()> {
        sqlx::query(
            "INSERT INTO enrollments (
                id, occurrence_id, student_id, status, amount_paid, version, created_at, updated_at
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(self.id)
        .bind(self.occurrence_id)
        .bind(self.student_id)
        .bind(self.status)
        .bind(self.amount_paid)
        .bind(self.version)
        .bind(self.created_at)
        .bind(self.updated_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn update_versioned(
        &self,
        expected_version: i64,
        conn: &mut PgConnection,
    ) -> sqlx::Result<bool> {
        let result = sqlx::query(
            "UPDATE enrollments
             SET status = $3, amount_paid = $4, version = $5, updated_at = $6
             WHERE id = $1 AND version = $2",
        )
        .bind(self.id)
        .bind(expected_version)
        .bind(self.status)
        .bind(self.amount_paid)
        .bind(self.version)
        .bind(self.updated_at)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attendance_codes_map_onto_statuses() {
        assert_eq!(attendance_status("present"), EnrollmentStatus::Attended);
        assert_eq!(attendance_status("late"), EnrollmentStatus::Attended);
        assert_eq!(attendance_status(" Absent "), EnrollmentStatus::Absent);
        assert_eq!(attendance_status("excused"), EnrollmentStatus::Unpaid);
        assert_eq!(attendance_status(""), EnrollmentStatus::Unpaid);
    }

    #[test]
    fn only_debited_seats_are_refundable() {
        let now = Utc::now();
        let paid = Enrollment::paid(OccurrenceId::new(), UserId::new(), Decimal::from(40), now);
        assert_eq!(paid.refundable_amount(), Decimal::from(40));

        let unpaid = Enrollment::unpaid(OccurrenceId::new(), UserId::new(), now);
        assert!(!unpaid.is_paid_for());
        assert_eq!(unpaid.refundable_amount(), Decimal::ZERO);

        // Marked with an unknown attendance code after paying.
        let mut excused = paid.clone();
        excused.status = EnrollmentStatus::Unpaid;
        assert!(excused.is_paid_for());
        assert_eq!(excused.refundable_amount(), Decimal::from(40));

        let mut attended = paid.clone();
        attended.status = EnrollmentStatus::Attended;
        assert_eq!(attended.refundable_amount(), Decimal::ZERO);
    }

    #[test]
    fn active_statuses_are_paid_and_unpaid() {
        assert!(EnrollmentStatus::Paid.is_active());
        assert!(EnrollmentStatus::Unpaid.is_active());
        assert!(!EnrollmentStatus::Attended.is_active());
        assert!(!EnrollmentStatus::CoachCancelled.is_active());
    }
}
