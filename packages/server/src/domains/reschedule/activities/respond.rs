//! Student answers a proposed reschedule.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::expire::{expire_attempt, is_overdue, missed_deadline, ExpiredReschedule};
use crate::common::{BookingError, EnrollmentId, OccurrenceId, UserId};
use crate::domains::notifications::{dispatch, Notification, NotificationPayload};
use crate::domains::reschedule::models::ResponseDecision;
use crate::domains::sessions::cancellation::{plan_cancellation, CancelCause};
use crate::domains::sessions::{Enrollment, Occurrence, OccurrenceStatus};
use crate::kernel::occ::{commit, guarded, with_occ_retry, AttemptError};
use crate::kernel::{Changeset, ServerDeps};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RescheduleResponse {
    pub decision: ResponseDecision,
    pub occurrence: Occurrence,
    pub enrollment: Enrollment,
    /// Credits returned to the student; zero on acceptance.
    pub refunded: Decimal,
}

enum Outcome {
    Answered(RescheduleResponse),
    Expired(ExpiredReschedule),
}

pub async fn respond(
    deps: &ServerDeps,
    occurrence_id: OccurrenceId,
    enrollment_id: EnrollmentId,
    student_id: UserId,
    decision: ResponseDecision,
) -> Result<RescheduleResponse, BookingError> {
    let outcome = with_occ_retry(deps, "respond_reschedule", || {
        respond_attempt(deps, occurrence_id, enrollment_id, student_id, decision)
    })
    .await?;

    let response = match outcome {
        Outcome::Answered(response) => response,
        Outcome::Expired(expired) => {
            let deadline = expired.deadline;
            info!(
                occurrence_id = %occurrence_id,
                student_id = %student_id,
                deadline = %deadline,
                "Reschedule answered after deadline, cancelled"
            );
            dispatch(deps, expired.notifications(deps)).await;
            return Err(BookingError::DeadlineExpired { deadline });
        }
    };

    info!(
        occurrence_id = %occurrence_id,
        student_id = %student_id,
        decision = ?decision,
        refunded = %response.refunded,
        "Reschedule answered"
    );

    let payload = match decision {
        ResponseDecision::Accept => NotificationPayload::RescheduleAccepted {
            occurrence_id,
            student_id,
        },
        ResponseDecision::Reject => NotificationPayload::RescheduleRejected {
            occurrence_id,
            student_id,
            refunded: response.refunded,
        },
    };
    dispatch(
        deps,
        vec![Notification::new(response.occurrence.coach_id, payload, deps.now())],
    )
    .await;

    Ok(response)
}

async fn respond_attempt(
    deps: &ServerDeps,
    occurrence_id: OccurrenceId,
    enrollment_id: EnrollmentId,
    student_id: UserId,
    decision: ResponseDecision,
) -> Result<Outcome, AttemptError> {
    let occurrence = guarded(deps, deps.store.find_occurrence(occurrence_id))
        .await?
        .ok_or_else(|| BookingError::not_found("occurrence", occurrence_id))?;
    let enrollment = guarded(deps, deps.store.find_enrollment(enrollment_id))
        .await?
        .ok_or_else(|| BookingError::not_found("enrollment", enrollment_id))?;

    enrollment.ensure_student(student_id)?;
    if enrollment.occurrence_id != occurrence_id {
        return Err(BookingError::validation(format!(
            "enrollment {} is not for occurrence {}",
            enrollment_id, occurrence_id
        ))
        .into());
    }
    // Already resolved by the sweep; refunds went out then.
    if let Some(deadline) = missed_deadline(&occurrence) {
        return Err(BookingError::DeadlineExpired { deadline }.into());
    }
    occurrence.ensure_status("respond to reschedule", &[OccurrenceStatus::Rescheduled])?;
    if !enrollment.status.is_active() {
        return Err(BookingError::validation(format!(
            "enrollment is already {}",
            enrollment.status
        ))
        .into());
    }

    if is_overdue(deps, &occurrence) {
        return expire_attempt(deps, &occurrence).await.map(Outcome::Expired);
    }

    match decision {
        ResponseDecision::Accept => {
            let mut confirmed = occurrence;
            confirmed.status = OccurrenceStatus::Confirmed;
            confirmed.response_deadline = None;

            let mut changes = Changeset::new();
            changes.update_occurrence(&mut confirmed);
            commit(deps, changes).await?;

            Ok(Outcome::Answered(RescheduleResponse {
                decision,
                occurrence: confirmed,
                enrollment,
                refunded: Decimal::ZERO,
            }))
        }
        ResponseDecision::Reject => {
            let enrollments = guarded(deps, deps.store.find_enrollments(occurrence_id)).await?;
            let plan =
                plan_cancellation(deps, &occurrence, &enrollments, CancelCause::Declined).await?;
            let refunded = plan.refunded_to(student_id);
            let occurrence = plan.occurrence.clone();
            let declined = plan.enrollment(enrollment_id).cloned().unwrap_or(enrollment);
            commit(deps, plan.changes).await?;

            Ok(Outcome::Answered(RescheduleResponse {
                decision,
                occurrence,
                enrollment: declined,
                refunded,
            }))
        }
    }
}
