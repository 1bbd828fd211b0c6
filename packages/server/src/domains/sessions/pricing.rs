//! Time and price arithmetic shared by publishing, booking and rescheduling.

use chrono::{Datelike, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};

use super::window::TimeWindow;

/// Derived figures for a slot, recomputed whenever its window or price changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotPricing {
    pub duration_minutes: i32,
    pub price_per_hour: Decimal,
    /// 0 = Sunday ... 6 = Saturday
    pub day_of_week: i32,
}

pub fn slot_pricing(window: &TimeWindow, price: Decimal) -> SlotPricing {
    let duration_minutes = duration_minutes(window);
    SlotPricing {
        duration_minutes,
        price_per_hour: price_per_hour(price, duration_minutes),
        day_of_week: day_of_week(window.date),
    }
}

pub fn duration_minutes(window: &TimeWindow) -> i32 {
    (window.end - window.start).num_minutes() as i32
}

pub fn price_per_hour(price: Decimal, duration_minutes: i32) -> Decimal {
    if duration_minutes <= 0 {
        return Decimal::ZERO;
    }
    round_money(price * Decimal::from(60) / Decimal::from(duration_minutes))
}

pub fn day_of_week(date: NaiveDate) -> i32 {
    date.weekday().num_days_from_sunday() as i32
}

/// Converts a list price into wallet credits at the fixed exchange rate.
pub fn to_credits(price: Decimal, credits_per_currency_unit: Decimal) -> Decimal {
    round_money(price * credits_per_currency_unit)
}

fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn window(start: (u32, u32), end: (u32, u32)) -> TimeWindow {
        TimeWindow::new(
            NaiveDate::from_ymd_opt(2030, 5, 1).unwrap(),
            NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn hour_long_slot_prices_per_hour_at_list_price() {
        let pricing = slot_pricing(&window((10, 0), (11, 0)), Decimal::from(40));
        assert_eq!(pricing.duration_minutes, 60);
        assert_eq!(pricing.price_per_hour, Decimal::from(40));
    }

    #[test]
    fn ninety_minute_slot_is_prorated() {
        let pricing = slot_pricing(&window((9, 0), (10, 30)), Decimal::from(45));
        assert_eq!(pricing.duration_minutes, 90);
        assert_eq!(pricing.price_per_hour, Decimal::from(30));
    }

    #[test]
    fn price_per_hour_rounds_to_cents() {
        // 50 over 45 minutes = 66.666...
        assert_eq!(price_per_hour(Decimal::from(50), 45), Decimal::new(6667, 2));
    }

    #[test]
    fn day_of_week_counts_from_sunday() {
        // 2030-05-01 is a Wednesday
        assert_eq!(day_of_week(NaiveDate::from_ymd_opt(2030, 5, 1).unwrap()), 3);
        assert_eq!(day_of_week(NaiveDate::from_ymd_opt(2030, 5, 5).unwrap()), 0);
    }

    #[test]
    fn credits_apply_exchange_rate() {
        assert_eq!(to_credits(Decimal::from(40), Decimal::ONE), Decimal::from(40));
        assert_eq!(
            to_credits(Decimal::new(1999, 2), Decimal::new(15, 1)),
            Decimal::new(2999, 2)
        );
    }
}
