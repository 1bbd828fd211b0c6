use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::common::BookingError;
use crate::domains::sessions::{TimeWindow, Venue};

/// A coach's new slot for a confirmed occurrence. Price and venue stay as
/// they were when left out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RescheduleProposal {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub venue: Option<Venue>,
}

impl RescheduleProposal {
    pub fn new(date: NaiveDate, start_time: NaiveTime, end_time: NaiveTime) -> Self {
        Self {
            date,
            start_time,
            end_time,
            price: None,
            venue: None,
        }
    }

    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_venue(mut self, venue: Venue) -> Self {
        self.venue = Some(venue);
        self
    }

    pub fn window(&self) -> Result<TimeWindow, BookingError> {
        if matches!(self.price, Some(price) if price < Decimal::ZERO) {
            return Err(BookingError::validation("price cannot be negative"));
        }
        TimeWindow::new(self.date, self.start_time, self.end_time)
    }
}

/// A student's answer to a proposed reschedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseDecision {
    Accept,
    Reject,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_price_is_rejected() {
        let proposal = RescheduleProposal::new(
            NaiveDate::from_ymd_opt(2030, 5, 1).unwrap(),
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        )
        .with_price(Decimal::from(-5));

        assert!(matches!(
            proposal.window(),
            Err(BookingError::ValidationError(_))
        ));
    }

    #[test]
    fn decision_uses_snake_case() {
        assert_eq!(
            serde_json::to_string(&ResponseDecision::Reject).unwrap(),
            "\"reject\""
        );
    }
}
