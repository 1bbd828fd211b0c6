//! Coach proposes a new slot for a booked individual session.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::common::{BookingError, OccurrenceId, UserId};
use crate::domains::notifications::{dispatch, Notification, NotificationPayload};
use crate::domains::reschedule::models::RescheduleProposal;
use crate::domains::sessions::{find_conflict, ClassKind, Occurrence, OccurrenceStatus, TimeWindow};
use crate::kernel::occ::{commit, guarded, with_occ_retry, AttemptError};
use crate::kernel::{Changeset, ServerDeps};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedReschedule {
    pub occurrence: Occurrence,
    pub previous_window: TimeWindow,
    /// Students asked to respond.
    pub notified: Vec<UserId>,
}

pub async fn propose(
    deps: &ServerDeps,
    occurrence_id: OccurrenceId,
    coach_id: UserId,
    proposal: RescheduleProposal,
) -> Result<ProposedReschedule, BookingError> {
    let window = proposal.window()?;

    let result = with_occ_retry(deps, "propose_reschedule", || {
        propose_attempt(deps, occurrence_id, coach_id, &proposal, window)
    })
    .await?;

    let occurrence = &result.occurrence;
    let respond_by = occurrence.reschedule_deadline();
    info!(
        occurrence_id = %occurrence_id,
        coach_id = %coach_id,
        from = %result.previous_window.starts_at(),
        to = %window.starts_at(),
        respond_by = %respond_by,
        "Proposed reschedule"
    );

    let now = deps.now();
    let notifications = result
        .notified
        .iter()
        .map(|student_id| {
            Notification::new(
                *student_id,
                NotificationPayload::RescheduleProposed {
                    occurrence_id,
                    date: occurrence.date,
                    start_time: occurrence.start_time,
                    end_time: occurrence.end_time,
                    respond_by,
                },
                now,
            )
        })
        .collect();
    dispatch(deps, notifications).await;

    Ok(result)
}

async fn propose_attempt(
    deps: &ServerDeps,
    occurrence_id: OccurrenceId,
    coach_id: UserId,
    proposal: &RescheduleProposal,
    window: TimeWindow,
) -> Result<ProposedReschedule, AttemptError> {
    let occurrence = guarded(deps, deps.store.find_occurrence(occurrence_id))
        .await?
        .ok_or_else(|| BookingError::not_found("occurrence", occurrence_id))?;
    occurrence.ensure_coach(coach_id)?;
    occurrence.ensure_status(
        "reschedule",
        &[OccurrenceStatus::Confirmed, OccurrenceStatus::Pubcon],
    )?;
    if occurrence.kind != ClassKind::Individual {
        return Err(BookingError::InvalidTransition {
            operation: "reschedule a group session",
            status: occurrence.status,
        }
        .into());
    }
    if window.starts_at() <= deps.now().naive_utc() {
        return Err(BookingError::validation(
            "rescheduled session must start in the future",
        )
        .into());
    }

    let mut changes = Changeset::new();

    let same_day = guarded(
        deps,
        deps.store.find_coach_occurrences_on(coach_id, window.date),
    )
    .await?;
    if let Some(conflict) = find_conflict(&window, &same_day, Some(occurrence_id)) {
        return Err(BookingError::ScheduleConflict {
            kind: conflict.kind,
            conflicting: conflict.occurrence_id,
        }
        .into());
    }
    // A concurrent publish or reschedule onto the same day must lose.
    for other in same_day
        .iter()
        .filter(|o| o.id != occurrence_id && o.status.is_live())
    {
        changes.guard_occurrence(other);
    }

    let notified = guarded(deps, deps.store.find_enrollments(occurrence_id))
        .await?
        .into_iter()
        .filter(|e| e.status.is_active())
        .map(|e| e.student_id)
        .collect();

    let previous_window = occurrence.window();
    let mut moved = occurrence;
    moved.move_to(window, proposal.price, proposal.venue.clone());
    moved.status = OccurrenceStatus::Rescheduled;
    moved.response_deadline = Some(window.ends_at());
    changes.update_occurrence(&mut moved);

    commit(deps, changes).await?;

    Ok(ProposedReschedule {
        occurrence: moved,
        previous_window,
        notified,
    })
}
