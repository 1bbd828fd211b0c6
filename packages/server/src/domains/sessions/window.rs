use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::common::BookingError;

/// A same-day, half-open time window `[start, end)` on a calendar date.
///
/// Occurrence times are wall-clock times in UTC; a window never crosses
/// midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    /// Builds a window, rejecting empty or inverted ranges.
    pub fn new(date: NaiveDate, start: NaiveTime, end: NaiveTime) -> Result<Self, BookingError> {
        if end <= start {
            return Err(BookingError::validation(format!(
                "end time {} must be after start time {}",
                end, start
            )));
        }
        Ok(Self { date, start, end })
    }

    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start)
    }

    pub fn ends_at(&self) -> NaiveDateTime {
        self.date.and_time(self.end)
    }

    /// Same-date half-open overlap. Windows that only touch at a boundary
    /// do not overlap.
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.date == other.date && self.start < other.end && other.start < self.end
    }

    /// The same times of day moved to another date.
    pub fn on(&self, date: NaiveDate) -> Self {
        Self { date, ..*self }
    }
}
