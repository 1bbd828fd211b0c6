//! Student-side follow-ups on an existing enrollment.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::common::{BookingError, EnrollmentId, UserId};
use crate::domains::ledger::activities::wallets::{ensure_funds, spendable_attempt};
use crate::domains::ledger::entries::{credit, debit};
use crate::domains::ledger::models::Transaction;
use crate::domains::notifications::{dispatch, Notification, NotificationPayload};
use crate::domains::sessions::{Enrollment, EnrollmentStatus, Occurrence, OccurrenceStatus};
use crate::kernel::occ::{commit, guarded, with_occ_retry, AttemptError};
use crate::kernel::{Changeset, ServerDeps};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementResult {
    pub enrollment: Enrollment,
    pub transaction: Option<Transaction>,
    pub balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentCancellation {
    pub enrollment: Enrollment,
    pub occurrence: Occurrence,
    pub refunded: Decimal,
}

/// Pays for an `unpaid` seat held through a partially paid package.
pub async fn settle_enrollment(
    deps: &ServerDeps,
    enrollment_id: EnrollmentId,
    student_id: UserId,
) -> Result<SettlementResult, BookingError> {
    let result = with_occ_retry(deps, "settle_enrollment", || {
        settle_attempt(deps, enrollment_id, student_id)
    })
    .await?;

    info!(
        enrollment_id = %enrollment_id,
        student_id = %student_id,
        amount = %result.enrollment.amount_paid,
        "Settled enrollment"
    );
    Ok(result)
}

async fn settle_attempt(
    deps: &ServerDeps,
    enrollment_id: EnrollmentId,
    student_id: UserId,
) -> Result<SettlementResult, AttemptError> {
    let enrollment = load_enrollment(deps, enrollment_id).await?;
    enrollment.ensure_student(student_id)?;
    if enrollment.status != EnrollmentStatus::Unpaid {
        return Err(BookingError::validation(format!(
            "only unpaid enrollments can be settled, this one is {}",
            enrollment.status
        ))
        .into());
    }
    if enrollment.is_paid_for() {
        return Err(BookingError::validation(format!(
            "enrollment {} was already paid {}",
            enrollment_id, enrollment.amount_paid
        ))
        .into());
    }

    let occurrence = load_occurrence(deps, &enrollment).await?;
    if !occurrence.status.is_live() {
        return Err(BookingError::NotAvailable {
            status: occurrence.status,
        }
        .into());
    }

    let price = deps.credits_for(occurrence.price);
    let (wallet, available) = spendable_attempt(deps, student_id).await?;
    ensure_funds(price, available)?;

    let mut changes = Changeset::new();
    // Price may move with a reschedule; pin the version we charged against.
    changes.guard_occurrence(&occurrence);

    let mut paid = enrollment.clone();
    paid.status = EnrollmentStatus::Paid;
    paid.amount_paid = price;
    changes.update_enrollment(&mut paid);

    let (transaction, balance) = if price > Decimal::ZERO {
        let entry = debit(
            &wallet,
            price,
            format!("Booking: {} on {}", occurrence.activity, occurrence.date),
        )?;
        let staged = (Some(entry.transaction.clone()), entry.wallet.balance);
        changes.apply_ledger(entry);
        staged
    } else {
        (None, wallet.balance)
    };

    commit(deps, changes).await?;

    Ok(SettlementResult {
        enrollment: paid,
        transaction,
        balance,
    })
}

/// Student withdraws before the class starts. Paid seats are refunded in
/// full and the seat goes back on sale.
pub async fn cancel_enrollment(
    deps: &ServerDeps,
    enrollment_id: EnrollmentId,
    student_id: UserId,
) -> Result<EnrollmentCancellation, BookingError> {
    let result = with_occ_retry(deps, "cancel_enrollment", || {
        cancel_attempt(deps, enrollment_id, student_id)
    })
    .await?;

    info!(
        enrollment_id = %enrollment_id,
        student_id = %student_id,
        refunded = %result.refunded,
        occurrence_status = %result.occurrence.status,
        "Student cancelled enrollment"
    );

    dispatch(
        deps,
        vec![Notification::new(
            result.occurrence.coach_id,
            NotificationPayload::EnrollmentCancelled {
                occurrence_id: result.occurrence.id,
                student_id,
            },
            deps.now(),
        )],
    )
    .await;

    Ok(result)
}

async fn cancel_attempt(
    deps: &ServerDeps,
    enrollment_id: EnrollmentId,
    student_id: UserId,
) -> Result<EnrollmentCancellation, AttemptError> {
    let enrollment = load_enrollment(deps, enrollment_id).await?;
    enrollment.ensure_student(student_id)?;
    if !enrollment.status.is_active() {
        return Err(BookingError::validation(format!(
            "enrollment is already {}",
            enrollment.status
        ))
        .into());
    }

    let occurrence = load_occurrence(deps, &enrollment).await?;
    occurrence.ensure_status(
        "cancel enrollment",
        &[
            OccurrenceStatus::Published,
            OccurrenceStatus::Pubcon,
            OccurrenceStatus::Confirmed,
        ],
    )?;

    let mut changes = Changeset::new();
    let refunded = enrollment.refundable_amount();
    if refunded > Decimal::ZERO {
        let wallet = guarded(deps, deps.store.find_wallet(student_id))
            .await?
            .ok_or_else(|| BookingError::not_found("wallet", student_id))?;
        let entry = credit(
            &wallet,
            refunded,
            format!("Refund: cancelled booking ({})", occurrence.activity),
            None,
        )?;
        changes.apply_ledger(entry);
    }

    let mut cancelled = enrollment.clone();
    cancelled.status = EnrollmentStatus::Cancelled;
    changes.update_enrollment(&mut cancelled);

    let mut released = occurrence.clone();
    released.release_seat();
    changes.update_occurrence(&mut released);

    commit(deps, changes).await?;

    Ok(EnrollmentCancellation {
        enrollment: cancelled,
        occurrence: released,
        refunded,
    })
}

async fn load_enrollment(
    deps: &ServerDeps,
    enrollment_id: EnrollmentId,
) -> Result<Enrollment, BookingError> {
    guarded(deps, deps.store.find_enrollment(enrollment_id))
        .await?
        .ok_or_else(|| BookingError::not_found("enrollment", enrollment_id))
}

async fn load_occurrence(deps: &ServerDeps, enrollment: &Enrollment) -> Result<Occurrence, BookingError> {
    guarded(deps, deps.store.find_occurrence(enrollment.occurrence_id))
        .await?
        .ok_or_else(|| BookingError::not_found("occurrence", enrollment.occurrence_id))
}
