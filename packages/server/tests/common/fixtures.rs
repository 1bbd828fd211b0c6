//! Test fixtures for creating test data.
//!
//! These fixtures go through the public activities, so every row they create
//! passed the same validation as production data.

use booking_core::common::UserId;
use booking_core::domains::booking::{publish, PublishSession, PublishedSession};
use booking_core::domains::ledger::{deposit, verify_reconciliation, ReconciliationReport};
use booking_core::domains::sessions::{ClassKind, Occurrence, Recurrence, Venue};
use booking_core::kernel::ServerDeps;
use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).expect("valid time")
}

pub fn credits(amount: i64) -> Decimal {
    Decimal::from(amount)
}

pub fn court() -> Venue {
    Venue::new("12 Court Street", "55401")
}

/// Tops up a wallet under a fresh reference.
pub async fn fund(deps: &ServerDeps, user_id: UserId, amount: i64) {
    deposit(deps, user_id, credits(amount), &format!("topup:{}", Uuid::now_v7()))
        .await
        .expect("Failed to fund wallet");
}

/// Publishes a one-off individual session.
pub async fn individual_session(
    deps: &ServerDeps,
    coach_id: UserId,
    on: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
    price: i64,
) -> Occurrence {
    let request = PublishSession::builder()
        .activity("tennis")
        .date(on)
        .start_time(start)
        .end_time(end)
        .venue(court())
        .kind(ClassKind::Individual)
        .price(credits(price))
        .build();
    single(publish(deps, coach_id, request).await.expect("Failed to publish session"))
}

/// Publishes a one-off group session with `seats` places.
pub async fn group_session(
    deps: &ServerDeps,
    coach_id: UserId,
    on: NaiveDate,
    seats: i32,
    price: i64,
) -> Occurrence {
    let request = PublishSession::builder()
        .activity("yoga")
        .date(on)
        .start_time(time(18, 0))
        .end_time(time(19, 0))
        .venue(court())
        .kind(ClassKind::Group)
        .max_students(seats)
        .price(credits(price))
        .build();
    single(publish(deps, coach_id, request).await.expect("Failed to publish session"))
}

/// Publishes a weekly group series of `count` occurrences starting on `first`.
pub async fn weekly_series(
    deps: &ServerDeps,
    coach_id: UserId,
    first: NaiveDate,
    count: u32,
    price: i64,
) -> PublishedSession {
    let request = PublishSession::builder()
        .activity("swimming")
        .date(first)
        .start_time(time(7, 0))
        .end_time(time(8, 0))
        .venue(court())
        .kind(ClassKind::Group)
        .max_students(4)
        .price(credits(price))
        .recurrence(Recurrence::Weekly)
        .count(count)
        .build();
    publish(deps, coach_id, request)
        .await
        .expect("Failed to publish series")
}

/// Asserts the wallet balance equals the sum of its completed transactions.
pub async fn assert_reconciled(deps: &ServerDeps, user_id: UserId) -> ReconciliationReport {
    let report = verify_reconciliation(deps, user_id)
        .await
        .expect("Failed to verify reconciliation");
    assert!(
        report.is_consistent(),
        "wallet of {} is off by {}",
        user_id,
        report.discrepancy()
    );
    report
}

fn single(published: PublishedSession) -> Occurrence {
    let mut occurrences = published.occurrences;
    assert_eq!(occurrences.len(), 1);
    occurrences.remove(0)
}
