//! Resolving reschedules nobody answered in time.
//!
//! An unanswered proposal counts as a rejection once its deadline passes.
//! `respond` applies this lazily; [`expire_overdue`] is the periodic sweep.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::common::{BookingError, OccurrenceId, UserId};
use crate::domains::notifications::{dispatch, Notification, NotificationPayload};
use crate::domains::sessions::cancellation::{plan_cancellation, CancelCause, Refund};
use crate::domains::sessions::{Occurrence, OccurrenceStatus};
use crate::kernel::occ::{commit, guarded, with_occ_retry, AttemptError};
use crate::kernel::ServerDeps;

/// A reschedule cancelled because its deadline passed.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpiredReschedule {
    pub occurrence: Occurrence,
    /// The deadline that was missed.
    pub deadline: NaiveDateTime,
    pub affected: Vec<UserId>,
    pub refunds: Vec<Refund>,
}

impl ExpiredReschedule {
    pub(super) fn notifications(&self, deps: &ServerDeps) -> Vec<Notification> {
        let now = deps.now();
        let occurrence_id = self.occurrence.id;
        let refunded_to = |student_id: UserId| -> Decimal {
            self.refunds
                .iter()
                .filter(|r| r.student_id == student_id)
                .map(|r| r.amount)
                .sum()
        };

        let mut notifications: Vec<Notification> = self
            .affected
            .iter()
            .map(|student_id| {
                Notification::new(
                    *student_id,
                    NotificationPayload::RescheduleExpired {
                        occurrence_id,
                        refunded: refunded_to(*student_id),
                    },
                    now,
                )
            })
            .collect();
        notifications.push(Notification::new(
            self.occurrence.coach_id,
            NotificationPayload::RescheduleExpired {
                occurrence_id,
                refunded: self.refunds.iter().map(|r| r.amount).sum(),
            },
            now,
        ));
        notifications
    }
}

/// The deadline an already-expired reschedule missed. Expiry is the only
/// cancellation that keeps `response_deadline`.
pub(super) fn missed_deadline(occurrence: &Occurrence) -> Option<NaiveDateTime> {
    match occurrence.status {
        OccurrenceStatus::Cancelled => occurrence.response_deadline,
        _ => None,
    }
}

pub(super) fn is_overdue(deps: &ServerDeps, occurrence: &Occurrence) -> bool {
    occurrence.status == OccurrenceStatus::Rescheduled
        && deps.now().naive_utc() > occurrence.reschedule_deadline()
}

/// Cancels `occurrence` (read in the current attempt) and refunds its students.
pub(super) async fn expire_attempt(
    deps: &ServerDeps,
    occurrence: &Occurrence,
) -> Result<ExpiredReschedule, AttemptError> {
    let deadline = occurrence.reschedule_deadline();
    let enrollments = guarded(deps, deps.store.find_enrollments(occurrence.id)).await?;
    let plan = plan_cancellation(deps, occurrence, &enrollments, CancelCause::Expired).await?;
    commit(deps, plan.changes).await?;

    Ok(ExpiredReschedule {
        occurrence: plan.occurrence,
        deadline,
        affected: plan.affected,
        refunds: plan.refunds,
    })
}

/// Cancels every `rescheduled` occurrence whose deadline has passed.
/// Returns how many were resolved by this sweep.
pub async fn expire_overdue(deps: &ServerDeps) -> Result<usize, BookingError> {
    let candidates: Vec<OccurrenceId> = guarded(
        deps,
        deps.store
            .find_occurrences_by_status(OccurrenceStatus::Rescheduled),
    )
    .await?
    .into_iter()
    .filter(|o| is_overdue(deps, o))
    .map(|o| o.id)
    .collect();

    let mut expired = 0;
    for occurrence_id in candidates {
        match with_occ_retry(deps, "expire_reschedule", || {
            sweep_attempt(deps, occurrence_id)
        })
        .await
        {
            Ok(Some(resolved)) => {
                info!(
                    occurrence_id = %occurrence_id,
                    students = resolved.affected.len(),
                    "Expired unanswered reschedule"
                );
                dispatch(deps, resolved.notifications(deps)).await;
                expired += 1;
            }
            // Answered or already resolved since the listing.
            Ok(None) => {}
            Err(e) => warn!(
                occurrence_id = %occurrence_id,
                error = %e,
                "Failed to expire reschedule"
            ),
        }
    }

    Ok(expired)
}

async fn sweep_attempt(
    deps: &ServerDeps,
    occurrence_id: OccurrenceId,
) -> Result<Option<ExpiredReschedule>, AttemptError> {
    let occurrence = guarded(deps, deps.store.find_occurrence(occurrence_id)).await?;
    match occurrence {
        Some(occurrence) if is_overdue(deps, &occurrence) => {
            expire_attempt(deps, &occurrence).await.map(Some)
        }
        _ => Ok(None),
    }
}
