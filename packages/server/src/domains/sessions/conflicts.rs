//! Time-overlap detection for a coach's calendar.
//!
//! Two windows `[s1,e1)` and `[s2,e2)` on the same date overlap iff
//! `s1 < e2 && s2 < e1`. Back-to-back sessions (`e1 == s2`) are allowed.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::models::Occurrence;
use super::window::TimeWindow;
use crate::common::OccurrenceId;

/// How a candidate window sits relative to an existing one. Diagnostic only;
/// the accept/reject decision is [`has_overlap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapKind {
    None,
    Identical,
    /// The candidate covers the whole existing window.
    Contains,
    /// The candidate lies entirely inside the existing window.
    ContainedBy,
    /// The candidate starts before the existing window and ends inside it.
    OverlapsStart,
    /// The candidate starts inside the existing window and ends after it.
    OverlapsEnd,
}

impl fmt::Display for OverlapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OverlapKind::None => "none",
            OverlapKind::Identical => "identical",
            OverlapKind::Contains => "contains",
            OverlapKind::ContainedBy => "contained_by",
            OverlapKind::OverlapsStart => "overlaps_start",
            OverlapKind::OverlapsEnd => "overlaps_end",
        };
        f.write_str(label)
    }
}

/// A live occurrence that the candidate window collides with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub occurrence_id: OccurrenceId,
    pub kind: OverlapKind,
    pub window: TimeWindow,
}

pub fn has_overlap(candidate: &TimeWindow, existing: &[TimeWindow]) -> bool {
    existing.iter().any(|window| candidate.overlaps(window))
}

/// Classifies the candidate against the first window it overlaps.
pub fn classify(candidate: &TimeWindow, existing: &[TimeWindow]) -> OverlapKind {
    existing
        .iter()
        .map(|window| classify_pair(candidate, window))
        .find(|kind| *kind != OverlapKind::None)
        .unwrap_or(OverlapKind::None)
}

fn classify_pair(candidate: &TimeWindow, existing: &TimeWindow) -> OverlapKind {
    if !candidate.overlaps(existing) {
        return OverlapKind::None;
    }
    if candidate.start == existing.start && candidate.end == existing.end {
        OverlapKind::Identical
    } else if candidate.start <= existing.start && candidate.end >= existing.end {
        OverlapKind::Contains
    } else if candidate.start >= existing.start && candidate.end <= existing.end {
        OverlapKind::ContainedBy
    } else if candidate.start < existing.start {
        OverlapKind::OverlapsStart
    } else {
        OverlapKind::OverlapsEnd
    }
}

/// Finds the first live occurrence the candidate collides with.
///
/// `exclude` skips the occurrence being moved so a reschedule never
/// conflicts with its own current slot.
pub fn find_conflict<'a, I>(
    candidate: &TimeWindow,
    occurrences: I,
    exclude: Option<OccurrenceId>,
) -> Option<Conflict>
where
    I: IntoIterator<Item = &'a Occurrence>,
{
    occurrences
        .into_iter()
        .filter(|occurrence| occurrence.status.is_live())
        .filter(|occurrence| Some(occurrence.id) != exclude)
        .find_map(|occurrence| {
            let window = occurrence.window();
            match classify_pair(candidate, &window) {
                OverlapKind::None => None,
                kind => Some(Conflict {
                    occurrence_id: occurrence.id,
                    kind,
                    window,
                }),
            }
        })
}
