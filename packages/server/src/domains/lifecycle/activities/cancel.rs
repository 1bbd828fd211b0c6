//! Coach cancels a class.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::transitions::load_owned;
use crate::common::{BookingError, OccurrenceId, UserId};
use crate::domains::notifications::{dispatch, Notification, NotificationPayload};
use crate::domains::sessions::cancellation::{plan_cancellation, CancelCause};
use crate::domains::sessions::Occurrence;
use crate::kernel::occ::{commit, guarded, with_occ_retry, AttemptError};
use crate::kernel::ServerDeps;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassCancellation {
    pub occurrence: Occurrence,
    /// Each affected student with the credits returned to them.
    pub refunds: Vec<(UserId, Decimal)>,
}

impl ClassCancellation {
    pub fn total_refunded(&self) -> Decimal {
        self.refunds.iter().map(|(_, amount)| *amount).sum()
    }
}

pub async fn cancel(
    deps: &ServerDeps,
    occurrence_id: OccurrenceId,
    coach_id: UserId,
) -> Result<ClassCancellation, BookingError> {
    let cancellation = with_occ_retry(deps, "cancel_class", || {
        cancel_attempt(deps, occurrence_id, coach_id)
    })
    .await?;

    info!(
        occurrence_id = %occurrence_id,
        coach_id = %coach_id,
        students = cancellation.refunds.len(),
        refunded = %cancellation.total_refunded(),
        "Class cancelled"
    );

    let now = deps.now();
    let notifications = cancellation
        .refunds
        .iter()
        .map(|(student_id, refunded)| {
            Notification::new(
                *student_id,
                NotificationPayload::ClassCancelled {
                    occurrence_id,
                    refunded: *refunded,
                },
                now,
            )
        })
        .collect();
    dispatch(deps, notifications).await;

    Ok(cancellation)
}

async fn cancel_attempt(
    deps: &ServerDeps,
    occurrence_id: OccurrenceId,
    coach_id: UserId,
) -> Result<ClassCancellation, AttemptError> {
    let occurrence = load_owned(deps, occurrence_id, coach_id).await?;
    if occurrence.status.is_terminal() {
        return Err(BookingError::InvalidTransition {
            operation: "cancel",
            status: occurrence.status,
        }
        .into());
    }

    let enrollments = guarded(deps, deps.store.find_enrollments(occurrence_id)).await?;
    let plan = plan_cancellation(deps, &occurrence, &enrollments, CancelCause::Coach).await?;
    let refunds = plan
        .affected
        .iter()
        .map(|student_id| (*student_id, plan.refunded_to(*student_id)))
        .collect();
    let occurrence = plan.occurrence.clone();

    commit(deps, plan.changes).await?;

    Ok(ClassCancellation { occurrence, refunds })
}
