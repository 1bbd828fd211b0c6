//! Coach-side cancellation, shared by `lifecycle::cancel`, reschedule
//! rejection and deadline expiry.
//!
//! The occurrence becomes `cancelled`, every active enrollment becomes
//! `coach_cancelled`, and every seat that was paid for is refunded the
//! occurrence price (in credits) as a `deposit`. Everything is staged into
//! one changeset.

use rust_decimal::Decimal;

use super::models::{Enrollment, EnrollmentStatus, Occurrence, OccurrenceStatus};
use crate::common::{BookingError, EnrollmentId, UserId};
use crate::domains::ledger::entries::credit;
use crate::kernel::occ::{guarded, AttemptError};
use crate::kernel::{Changeset, ServerDeps};

/// Why an occurrence is being cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    /// The coach called the class off.
    Coach,
    /// The student turned down a reschedule.
    Declined,
    /// Nobody answered a reschedule before its deadline.
    Expired,
}

impl CancelCause {
    fn reason(&self) -> &'static str {
        match self {
            CancelCause::Coach => "class cancelled",
            CancelCause::Declined => "reschedule declined",
            CancelCause::Expired => "reschedule expired",
        }
    }
}

/// Credits returned to one student.
#[derive(Debug, Clone, PartialEq)]
pub struct Refund {
    pub student_id: UserId,
    pub enrollment_id: EnrollmentId,
    pub amount: Decimal,
}

#[derive(Debug, Clone)]
pub struct CancellationPlan {
    pub changes: Changeset,
    pub occurrence: Occurrence,
    /// Students whose enrollment was active, refunded or not.
    pub affected: Vec<UserId>,
    pub refunds: Vec<Refund>,
    /// The enrollments as they will be stored, now `coach_cancelled`.
    pub enrollments: Vec<Enrollment>,
}

impl CancellationPlan {
    pub fn refunded_to(&self, student_id: UserId) -> Decimal {
        self.refunds
            .iter()
            .filter(|refund| refund.student_id == student_id)
            .map(|refund| refund.amount)
            .sum()
    }

    pub fn enrollment(&self, enrollment_id: EnrollmentId) -> Option<&Enrollment> {
        self.enrollments.iter().find(|e| e.id == enrollment_id)
    }

    pub fn total_refunded(&self) -> Decimal {
        self.refunds.iter().map(|refund| refund.amount).sum()
    }
}

/// Stages cancellation of `occurrence` with `enrollments` as read in the
/// current attempt.
///
/// An expired reschedule keeps its `response_deadline` so a late answer can
/// still be told which deadline it missed; any other cause clears it.
pub(crate) async fn plan_cancellation(
    deps: &ServerDeps,
    occurrence: &Occurrence,
    enrollments: &[Enrollment],
    cause: CancelCause,
) -> Result<CancellationPlan, AttemptError> {
    let refund_amount = deps.credits_for(occurrence.price);
    let mut changes = Changeset::new();
    let mut affected = Vec::new();
    let mut refunds = Vec::new();
    let mut cancelled_enrollments = Vec::new();

    for enrollment in enrollments.iter().filter(|e| e.status.is_active()) {
        let amount = if enrollment.is_paid_for() {
            refund_amount
        } else {
            Decimal::ZERO
        };
        affected.push(enrollment.student_id);

        if amount > Decimal::ZERO {
            let wallet = guarded(deps, deps.store.find_wallet(enrollment.student_id))
                .await?
                .ok_or_else(|| BookingError::not_found("wallet", enrollment.student_id))?;
            let entry = credit(
                &wallet,
                amount,
                format!("Refund: {} ({})", cause.reason(), occurrence.activity),
                None,
            )?;
            changes.apply_ledger(entry);
            refunds.push(Refund {
                student_id: enrollment.student_id,
                enrollment_id: enrollment.id,
                amount,
            });
        }

        let mut cancelled = enrollment.clone();
        cancelled.status = EnrollmentStatus::CoachCancelled;
        changes.update_enrollment(&mut cancelled);
        cancelled_enrollments.push(cancelled);
    }

    let mut cancelled = occurrence.clone();
    cancelled.status = OccurrenceStatus::Cancelled;
    if cause != CancelCause::Expired {
        cancelled.response_deadline = None;
    }
    changes.update_occurrence(&mut cancelled);

    Ok(CancellationPlan {
        changes,
        occurrence: cancelled,
        affected,
        refunds,
        enrollments: cancelled_enrollments,
    })
}
