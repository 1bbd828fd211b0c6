//! Starting and ending a confirmed class.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::common::{BookingError, OccurrenceId, UserId};
use crate::config::BookingPolicy;
use crate::domains::notifications::{dispatch, Notification, NotificationPayload};
use crate::domains::sessions::{Enrollment, EnrollmentStatus, Occurrence, OccurrenceStatus};
use crate::kernel::occ::{commit, guarded, with_occ_retry, AttemptError};
use crate::kernel::{Changeset, ServerDeps};

/// What the coach earned from one completed occurrence, in credits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Earnings {
    pub occurrence_id: OccurrenceId,
    pub attended: i32,
    pub price: Decimal,
    pub amount: Decimal,
}

/// Earnings from the enrollments as they stand: attended seats times the
/// occurrence price in credits.
pub fn earnings_for(
    occurrence: &Occurrence,
    enrollments: &[Enrollment],
    policy: &BookingPolicy,
) -> Earnings {
    let attended = enrollments
        .iter()
        .filter(|e| e.status == EnrollmentStatus::Attended)
        .count() as i32;
    let price = policy.credits_for(occurrence.price);

    Earnings {
        occurrence_id: occurrence.id,
        attended,
        price,
        amount: price * Decimal::from(attended),
    }
}

pub async fn start(
    deps: &ServerDeps,
    occurrence_id: OccurrenceId,
    coach_id: UserId,
) -> Result<Occurrence, BookingError> {
    let (occurrence, students) = with_occ_retry(deps, "start_class", || {
        start_attempt(deps, occurrence_id, coach_id)
    })
    .await?;

    info!(
        occurrence_id = %occurrence_id,
        coach_id = %coach_id,
        students = students.len(),
        "Class started"
    );

    let now = deps.now();
    let notifications = students
        .into_iter()
        .map(|student_id| {
            Notification::new(
                student_id,
                NotificationPayload::ClassStarted { occurrence_id },
                now,
            )
        })
        .collect();
    dispatch(deps, notifications).await;

    Ok(occurrence)
}

async fn start_attempt(
    deps: &ServerDeps,
    occurrence_id: OccurrenceId,
    coach_id: UserId,
) -> Result<(Occurrence, Vec<UserId>), AttemptError> {
    let occurrence = load_owned(deps, occurrence_id, coach_id).await?;
    occurrence.ensure_status("start", &[OccurrenceStatus::Confirmed])?;

    let students = guarded(deps, deps.store.find_enrollments(occurrence_id))
        .await?
        .into_iter()
        .filter(|e| e.status.is_active())
        .map(|e| e.student_id)
        .collect();

    let mut started = occurrence;
    started.status = OccurrenceStatus::InProgress;

    let mut changes = Changeset::new();
    changes.update_occurrence(&mut started);
    commit(deps, changes).await?;

    Ok((started, students))
}

/// Completes the class. Every seat still held counts as attended unless
/// attendance already said otherwise.
pub async fn end(
    deps: &ServerDeps,
    occurrence_id: OccurrenceId,
    coach_id: UserId,
) -> Result<Earnings, BookingError> {
    let earnings = with_occ_retry(deps, "end_class", || end_attempt(deps, occurrence_id, coach_id)).await?;

    info!(
        occurrence_id = %occurrence_id,
        coach_id = %coach_id,
        attended = earnings.attended,
        amount = %earnings.amount,
        "Class completed"
    );
    Ok(earnings)
}

async fn end_attempt(
    deps: &ServerDeps,
    occurrence_id: OccurrenceId,
    coach_id: UserId,
) -> Result<Earnings, AttemptError> {
    let occurrence = load_owned(deps, occurrence_id, coach_id).await?;
    occurrence.ensure_status("end", &[OccurrenceStatus::InProgress])?;

    let mut changes = Changeset::new();
    let enrollments: Vec<Enrollment> = guarded(deps, deps.store.find_enrollments(occurrence_id))
        .await?
        .into_iter()
        .map(|enrollment| {
            if !enrollment.status.is_active() {
                return enrollment;
            }
            let mut attended = enrollment;
            attended.status = EnrollmentStatus::Attended;
            changes.update_enrollment(&mut attended);
            attended
        })
        .collect();

    let mut completed = occurrence;
    completed.status = OccurrenceStatus::Completed;
    changes.update_occurrence(&mut completed);

    commit(deps, changes).await?;

    Ok(earnings_for(&completed, &enrollments, &deps.policy))
}

/// Loads an occurrence and checks the caller is its coach.
pub(super) async fn load_owned(
    deps: &ServerDeps,
    occurrence_id: OccurrenceId,
    coach_id: UserId,
) -> Result<Occurrence, BookingError> {
    let occurrence = guarded(deps, deps.store.find_occurrence(occurrence_id))
        .await?
        .ok_or_else(|| BookingError::not_found("occurrence", occurrence_id))?;
    occurrence.ensure_coach(coach_id)?;
    Ok(occurrence)
}
