//! Booking every live occurrence of a recurring series at once.

use chrono::Days;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::book::{ensure_not_booked, stage_enrollment};
use crate::common::{BookingError, SessionGroupId, UserId};
use crate::domains::ledger::activities::wallets::{ensure_funds, spendable_attempt};
use crate::domains::ledger::entries::debit;
use crate::domains::ledger::models::Transaction;
use crate::domains::notifications::{dispatch, Notification, NotificationPayload};
use crate::domains::sessions::{Enrollment, EnrollmentStatus, Occurrence, Recurrence};
use crate::kernel::occ::{commit, guarded, with_occ_retry, AttemptError};
use crate::kernel::{Changeset, ServerDeps};

/// How much of a package is paid up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackagePayment {
    /// Every occurrence is paid now.
    Full,
    /// Weekly series only: pay for the first seven days, reserve the rest
    /// as `unpaid` to be settled later.
    FirstWeek,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageBookingResult {
    pub session_group_id: SessionGroupId,
    pub occurrences: Vec<Occurrence>,
    pub enrollments: Vec<Enrollment>,
    /// One aggregate debit for everything paid now.
    pub transaction: Option<Transaction>,
    pub total_charged: Decimal,
    pub balance: Decimal,
}

impl PackageBookingResult {
    pub fn unpaid_count(&self) -> usize {
        self.enrollments
            .iter()
            .filter(|e| e.status == EnrollmentStatus::Unpaid)
            .count()
    }
}

pub async fn book_package(
    deps: &ServerDeps,
    session_group_id: SessionGroupId,
    student_id: UserId,
    payment: PackagePayment,
) -> Result<PackageBookingResult, BookingError> {
    let result = with_occ_retry(deps, "book_package", || {
        package_attempt(deps, session_group_id, student_id, payment)
    })
    .await?;

    info!(
        session_group_id = %session_group_id,
        student_id = %student_id,
        occurrences = result.enrollments.len(),
        unpaid = result.unpaid_count(),
        total_charged = %result.total_charged,
        "Booked package"
    );

    let now = deps.now();
    let notifications = result
        .enrollments
        .iter()
        .map(|enrollment| {
            Notification::new(
                student_id,
                NotificationPayload::BookingConfirmed {
                    occurrence_id: enrollment.occurrence_id,
                    enrollment_id: enrollment.id,
                    amount_paid: enrollment.amount_paid,
                },
                now,
            )
        })
        .collect();
    dispatch(deps, notifications).await;

    Ok(result)
}

async fn package_attempt(
    deps: &ServerDeps,
    session_group_id: SessionGroupId,
    student_id: UserId,
    payment: PackagePayment,
) -> Result<PackageBookingResult, AttemptError> {
    let occurrences: Vec<Occurrence> =
        guarded(deps, deps.store.find_group_occurrences(session_group_id))
            .await?
            .into_iter()
            .filter(|o| o.status.is_live())
            .collect();

    let first = occurrences
        .first()
        .ok_or_else(|| BookingError::not_found("session group", session_group_id))?;

    let paid_until = match payment {
        PackagePayment::Full => None,
        PackagePayment::FirstWeek => {
            if first.recurrence != Recurrence::Weekly {
                return Err(BookingError::validation(
                    "first-week payment is only offered for weekly series",
                )
                .into());
            }
            first.date.checked_add_days(Days::new(7))
        }
    };

    // Validate the whole batch before staging anything.
    let mut existing = Vec::with_capacity(occurrences.len());
    for occurrence in &occurrences {
        let enrollment = guarded(
            deps,
            deps.store.find_student_enrollment(occurrence.id, student_id),
        )
        .await?;
        ensure_not_booked(enrollment.as_ref())?;
        occurrence.ensure_open_seat()?;
        existing.push(enrollment);
    }

    let pays_now = |occurrence: &Occurrence| paid_until.map_or(true, |cutoff| occurrence.date < cutoff);
    let total: Decimal = occurrences
        .iter()
        .filter(|o| pays_now(*o))
        .map(|o| deps.credits_for(o.price))
        .sum();

    let (wallet, available) = spendable_attempt(deps, student_id).await?;
    ensure_funds(total, available)?;

    let now = deps.now();
    let mut changes = Changeset::new();
    let mut seated = Vec::with_capacity(occurrences.len());
    let mut enrollments = Vec::with_capacity(occurrences.len());

    for (occurrence, previous) in occurrences.iter().zip(existing) {
        let mut updated = occurrence.clone();
        updated.take_seat()?;
        changes.update_occurrence(&mut updated);

        let fresh = if pays_now(occurrence) {
            Enrollment::paid(occurrence.id, student_id, deps.credits_for(occurrence.price), now)
        } else {
            Enrollment::unpaid(occurrence.id, student_id, now)
        };
        enrollments.push(stage_enrollment(&mut changes, previous, fresh));
        seated.push(updated);
    }

    let (transaction, balance) = if total > Decimal::ZERO {
        let entry = debit(
            &wallet,
            total,
            format!("Package: {} ({} sessions)", first.activity, occurrences.len()),
        )?;
        let staged = (Some(entry.transaction.clone()), entry.wallet.balance);
        changes.apply_ledger(entry);
        staged
    } else {
        (None, wallet.balance)
    };

    commit(deps, changes).await?;

    Ok(PackageBookingResult {
        session_group_id,
        occurrences: seated,
        enrollments,
        transaction,
        total_charged: total,
        balance,
    })
}
