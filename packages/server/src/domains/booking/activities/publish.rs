//! Coach publishes a bookable slot, or a recurring series of them.

use chrono::{Days, Months, NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use typed_builder::TypedBuilder;

use crate::common::{BookingError, SessionGroupId, UserId};
use crate::domains::sessions::{
    find_conflict, ClassKind, Occurrence, OccurrenceTemplate, Recurrence, TimeWindow, Venue,
};
use crate::kernel::occ::{commit, guarded, with_occ_retry, AttemptError};
use crate::kernel::{Changeset, ServerDeps};

/// Longest series a single publish may create.
pub const MAX_SERIES_LENGTH: u32 = 52;

/// What a coach fills in to publish a session.
#[derive(Debug, Clone, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct PublishSession {
    pub activity: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub venue: Venue,
    pub kind: ClassKind,
    #[builder(default = 1)]
    pub max_students: i32,
    /// List price of each occurrence.
    pub price: Decimal,
    #[builder(default)]
    pub description: String,
    #[builder(default)]
    pub recurrence: Recurrence,
    /// Number of occurrences in the series, including the first.
    #[builder(default = 1)]
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedSession {
    pub session_group_id: SessionGroupId,
    pub occurrences: Vec<Occurrence>,
}

pub async fn publish(
    deps: &ServerDeps,
    coach_id: UserId,
    request: PublishSession,
) -> Result<PublishedSession, BookingError> {
    let first = TimeWindow::new(request.date, request.start_time, request.end_time)?;
    if first.starts_at() <= deps.now().naive_utc() {
        return Err(BookingError::validation("session must start in the future"));
    }
    validate(&request)?;

    let windows = series_windows(first, request.recurrence, request.count)?;
    let template = OccurrenceTemplate {
        session_group_id: SessionGroupId::new(),
        coach_id,
        activity: request.activity.trim().to_string(),
        venue: request.venue,
        kind: request.kind,
        recurrence: request.recurrence,
        max_students: request.max_students,
        price: request.price,
        description: request.description,
    };

    let published = with_occ_retry(deps, "publish", || {
        publish_attempt(deps, &template, &windows)
    })
    .await?;

    info!(
        coach_id = %coach_id,
        session_group_id = %published.session_group_id,
        occurrences = published.occurrences.len(),
        kind = ?template.kind,
        "Published session"
    );
    Ok(published)
}

fn validate(request: &PublishSession) -> Result<(), BookingError> {
    if request.activity.trim().is_empty() {
        return Err(BookingError::validation("activity is required"));
    }
    if request.price < Decimal::ZERO {
        return Err(BookingError::validation("price cannot be negative"));
    }
    match request.kind {
        ClassKind::Individual if request.max_students != 1 => {
            return Err(BookingError::validation(
                "individual sessions take exactly one student",
            ));
        }
        ClassKind::Group if request.max_students < 1 => {
            return Err(BookingError::validation(
                "group sessions need at least one seat",
            ));
        }
        _ => {}
    }
    if request.count == 0 || request.count > MAX_SERIES_LENGTH {
        return Err(BookingError::validation(format!(
            "a series holds between 1 and {} occurrences",
            MAX_SERIES_LENGTH
        )));
    }
    if request.recurrence == Recurrence::Once && request.count != 1 {
        return Err(BookingError::validation(
            "a one-off session cannot have more than one occurrence",
        ));
    }
    Ok(())
}

/// Windows for every occurrence of the series: same times, shifted by a
/// week or a calendar month.
pub fn series_windows(
    first: TimeWindow,
    recurrence: Recurrence,
    count: u32,
) -> Result<Vec<TimeWindow>, BookingError> {
    (0..count)
        .map(|i| {
            let date = match recurrence {
                Recurrence::Once => Some(first.date),
                Recurrence::Weekly => first.date.checked_add_days(Days::new(7 * u64::from(i))),
                Recurrence::Monthly => first.date.checked_add_months(Months::new(i)),
            };
            date.map(|date| first.on(date))
                .ok_or_else(|| BookingError::validation("series runs past the supported calendar"))
        })
        .collect()
}

async fn publish_attempt(
    deps: &ServerDeps,
    template: &OccurrenceTemplate,
    windows: &[TimeWindow],
) -> Result<PublishedSession, AttemptError> {
    let now = deps.now();
    let mut changes = Changeset::new();
    let mut occurrences = Vec::with_capacity(windows.len());

    for window in windows {
        let existing = guarded(
            deps,
            deps.store.find_coach_occurrences_on(template.coach_id, window.date),
        )
        .await?;

        if let Some(conflict) = find_conflict(window, &existing, None) {
            return Err(BookingError::ScheduleConflict {
                kind: conflict.kind,
                conflicting: conflict.occurrence_id,
            }
            .into());
        }
        for other in existing.iter().filter(|o| o.status.is_live()) {
            changes.guard_occurrence(other);
        }

        let occurrence = Occurrence::published(template, *window, now);
        changes.insert_occurrence(occurrence.clone());
        occurrences.push(occurrence);
    }

    commit(deps, changes).await?;

    Ok(PublishedSession {
        session_group_id: template.session_group_id,
        occurrences,
    })
}
