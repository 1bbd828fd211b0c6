//! Single-occurrence booking.
//!
//! Seat, enrollment and debit are staged together and committed once. The
//! commit carries the occurrence and wallet versions that were read, so two
//! students racing for the last seat cannot both win: the loser re-reads a
//! full occurrence and gets `CapacityExceeded`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::common::{BookingError, OccurrenceId, UserId};
use crate::domains::ledger::activities::wallets::{ensure_funds, spendable_attempt};
use crate::domains::ledger::entries::debit;
use crate::domains::ledger::models::Transaction;
use crate::domains::notifications::{dispatch, Notification, NotificationPayload};
use crate::domains::sessions::{Enrollment, Occurrence};
use crate::kernel::occ::{commit, guarded, with_occ_retry, AttemptError};
use crate::kernel::{Changeset, ServerDeps};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingResult {
    pub occurrence: Occurrence,
    pub enrollment: Enrollment,
    /// The debit, absent for free sessions.
    pub transaction: Option<Transaction>,
    /// Student's balance after the debit.
    pub balance: Decimal,
}

pub async fn book(
    deps: &ServerDeps,
    occurrence_id: OccurrenceId,
    student_id: UserId,
) -> Result<BookingResult, BookingError> {
    let result = with_occ_retry(deps, "book", || book_attempt(deps, occurrence_id, student_id)).await?;

    info!(
        occurrence_id = %occurrence_id,
        student_id = %student_id,
        amount = %result.enrollment.amount_paid,
        status = %result.occurrence.status,
        students_attending = result.occurrence.students_attending,
        "Booked occurrence"
    );

    dispatch(
        deps,
        vec![Notification::new(
            student_id,
            NotificationPayload::BookingConfirmed {
                occurrence_id,
                enrollment_id: result.enrollment.id,
                amount_paid: result.enrollment.amount_paid,
            },
            deps.now(),
        )],
    )
    .await;

    Ok(result)
}

async fn book_attempt(
    deps: &ServerDeps,
    occurrence_id: OccurrenceId,
    student_id: UserId,
) -> Result<BookingResult, AttemptError> {
    let occurrence = guarded(deps, deps.store.find_occurrence(occurrence_id))
        .await?
        .ok_or_else(|| BookingError::not_found("occurrence", occurrence_id))?;

    let existing = guarded(
        deps,
        deps.store.find_student_enrollment(occurrence_id, student_id),
    )
    .await?;
    ensure_not_booked(existing.as_ref())?;
    occurrence.ensure_open_seat()?;

    let price = deps.credits_for(occurrence.price);
    let (wallet, available) = spendable_attempt(deps, student_id).await?;
    ensure_funds(price, available)?;

    let mut changes = Changeset::new();

    let mut seated = occurrence.clone();
    seated.take_seat()?;
    changes.update_occurrence(&mut seated);

    let enrollment = stage_enrollment(
        &mut changes,
        existing,
        Enrollment::paid(occurrence_id, student_id, price, deps.now()),
    );

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

    Ok(BookingResult {
        occurrence: seated,
        enrollment,
        transaction,
        balance,
    })
}

/// A student may book again only after withdrawing their earlier enrollment.
pub(crate) fn ensure_not_booked(existing: Option<&Enrollment>) -> Result<(), BookingError> {
    match existing {
        Some(enrollment) if !enrollment.status.is_withdrawn() => Err(BookingError::AlreadyBooked),
        _ => Ok(()),
    }
}

/// Inserts `fresh`, or reuses the row of a withdrawn enrollment so the
/// (occurrence, student) key stays unique. Returns the enrollment as stored.
pub(crate) fn stage_enrollment(
    changes: &mut Changeset,
    existing: Option<Enrollment>,
    fresh: Enrollment,
) -> Enrollment {
    match existing {
        Some(previous) => {
            let mut reopened = previous;
            reopened.status = fresh.status;
            reopened.amount_paid = fresh.amount_paid;
            changes.update_enrollment(&mut reopened);
            reopened
        }
        None => {
            changes.insert_enrollment(fresh.clone());
            fresh
        }
    }
}
