//! Recording who showed up.

use std::collections::HashSet;

use tracing::info;

use super::transitions::load_owned;
use crate::common::{BookingError, OccurrenceId, UserId};
use crate::domains::sessions::{attendance_status, Enrollment, OccurrenceStatus};
use crate::kernel::occ::{commit, guarded, with_occ_retry, AttemptError};
use crate::kernel::{Changeset, ServerDeps};

/// Applies attendance codes (`present`, `late`, `absent`, ...) to the
/// listed students' enrollments and returns them as stored.
pub async fn submit_attendance(
    deps: &ServerDeps,
    occurrence_id: OccurrenceId,
    coach_id: UserId,
    records: &[(UserId, String)],
) -> Result<Vec<Enrollment>, BookingError> {
    let mut seen = HashSet::new();
    if let Some((student_id, _)) = records.iter().find(|(student_id, _)| !seen.insert(*student_id)) {
        return Err(BookingError::validation(format!(
            "attendance for student {} submitted twice",
            student_id
        )));
    }

    let enrollments = with_occ_retry(deps, "submit_attendance", || {
        attendance_attempt(deps, occurrence_id, coach_id, records)
    })
    .await?;

    info!(
        occurrence_id = %occurrence_id,
        coach_id = %coach_id,
        records = enrollments.len(),
        "Attendance recorded"
    );
    Ok(enrollments)
}

async fn attendance_attempt(
    deps: &ServerDeps,
    occurrence_id: OccurrenceId,
    coach_id: UserId,
    records: &[(UserId, String)],
) -> Result<Vec<Enrollment>, AttemptError> {
    let occurrence = load_owned(deps, occurrence_id, coach_id).await?;
    occurrence.ensure_status(
        "submit attendance",
        &[
            OccurrenceStatus::Confirmed,
            OccurrenceStatus::InProgress,
            OccurrenceStatus::Completed,
        ],
    )?;

    let mut changes = Changeset::new();
    changes.guard_occurrence(&occurrence);

    let mut updated = Vec::with_capacity(records.len());
    for (student_id, code) in records {
        let enrollment = guarded(
            deps,
            deps.store.find_student_enrollment(occurrence_id, *student_id),
        )
        .await?
        .ok_or_else(|| BookingError::not_found("enrollment", student_id))?;
        if enrollment.status.is_withdrawn() {
            return Err(BookingError::validation(format!(
                "student {} withdrew from this occurrence",
                student_id
            ))
            .into());
        }

        let mut marked = enrollment;
        marked.status = attendance_status(code);
        changes.update_enrollment(&mut marked);
        updated.push(marked);
    }

    commit(deps, changes).await?;
    Ok(updated)
}
