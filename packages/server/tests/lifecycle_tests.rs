//! Integration tests for the class lifecycle.
//!
//! Covers:
//! - start / end: state transitions and earnings
//! - payout: crediting the coach exactly once
//! - submit_attendance: codes applied to enrollments
//! - cancel: refunds for every active seat

mod common;

use crate::common::*;
use booking_core::common::{BookingError, UserId};
use booking_core::domains::booking::book;
use booking_core::domains::ledger::{balance, history};
use booking_core::domains::lifecycle::{
    cancel, end, payout, payout_reference, start, submit_attendance,
};
use booking_core::domains::sessions::{EnrollmentStatus, Occurrence, OccurrenceStatus};
use booking_core::kernel::BookingStore;
use test_context::test_context;

/// A group class with two paid students, full and therefore confirmed.
async fn full_group_class(ctx: &TestHarness, coach: UserId) -> (Occurrence, UserId, UserId) {
    let alice = UserId::new();
    let bob = UserId::new();
    fund(&ctx.deps, alice, 50).await;
    fund(&ctx.deps, bob, 50).await;

    let occurrence = group_session(&ctx.deps, coach, date(2030, 3, 6), 2, 15).await;
    book(&ctx.deps, occurrence.id, alice).await.unwrap();
    let booked = book(&ctx.deps, occurrence.id, bob).await.unwrap();
    assert_eq!(booked.occurrence.status, OccurrenceStatus::Confirmed);

    (booked.occurrence, alice, bob)
}

fn attendance(records: &[(UserId, &str)]) -> Vec<(UserId, String)> {
    records
        .iter()
        .map(|(student, code)| (*student, code.to_string()))
        .collect()
}

// =============================================================================
// Start and end
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn full_class_runs_to_completion_and_pays_the_coach(ctx: &TestHarness) {
    let coach = UserId::new();
    let student = UserId::new();
    fund(&ctx.deps, student, 50).await;
    let occurrence =
        individual_session(&ctx.deps, coach, date(2030, 3, 4), time(10, 0), time(11, 0), 40).await;
    book(&ctx.deps, occurrence.id, student).await.unwrap();
    ctx.notifier().clear();

    let started = start(&ctx.deps, occurrence.id, coach).await.unwrap();
    assert_eq!(started.status, OccurrenceStatus::InProgress);
    assert_eq!(ctx.notifier().kinds(), vec!["class_started"]);
    assert_eq!(ctx.notifier().sent_to(student).len(), 1);

    let earnings = end(&ctx.deps, occurrence.id, coach).await.unwrap();
    assert_eq!(earnings.attended, 1);
    assert_eq!(earnings.price, credits(40));
    assert_eq!(earnings.amount, credits(40));

    let stored = ctx.deps.store.find_occurrence(occurrence.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OccurrenceStatus::Completed);
    let enrollments = ctx.deps.store.find_enrollments(occurrence.id).await.unwrap();
    assert_eq!(enrollments[0].status, EnrollmentStatus::Attended);

    let outcome = payout(&ctx.deps, occurrence.id, coach).await.unwrap();
    assert!(!outcome.already_paid_out);
    assert_eq!(outcome.credited, credits(40));
    let deposit = outcome.transaction.expect("payout records a deposit");
    assert_eq!(
        deposit.external_reference.as_deref(),
        Some(payout_reference(occurrence.id).as_str())
    );

    assert_eq!(balance(&ctx.deps, coach).await.unwrap().balance, credits(40));
    assert_eq!(ctx.notifier().sent_to(coach).last().map(|n| n.kind()), Some("payout_posted"));
    assert_reconciled(&ctx.deps, coach).await;
    assert_reconciled(&ctx.deps, student).await;
}

#[test_context(TestHarness)]
#[tokio::test]
async fn starting_requires_a_confirmed_class(ctx: &TestHarness) {
    let coach = UserId::new();
    let occurrence = group_session(&ctx.deps, coach, date(2030, 3, 6), 4, 15).await;

    let result = start(&ctx.deps, occurrence.id, coach).await;

    assert_eq!(
        result.unwrap_err(),
        BookingError::InvalidTransition {
            operation: "start",
            status: OccurrenceStatus::Published,
        }
    );
}

#[test_context(TestHarness)]
#[tokio::test]
async fn ending_requires_a_class_in_progress(ctx: &TestHarness) {
    let coach = UserId::new();
    let (occurrence, _, _) = full_group_class(ctx, coach).await;

    let result = end(&ctx.deps, occurrence.id, coach).await;

    assert_eq!(
        result.unwrap_err(),
        BookingError::InvalidTransition {
            operation: "end",
            status: OccurrenceStatus::Confirmed,
        }
    );
}

#[test_context(TestHarness)]
#[tokio::test]
async fn only_the_owning_coach_may_run_the_class(ctx: &TestHarness) {
    let coach = UserId::new();
    let (occurrence, _, _) = full_group_class(ctx, coach).await;
    let intruder = UserId::new();

    assert!(matches!(
        start(&ctx.deps, occurrence.id, intruder).await,
        Err(BookingError::Forbidden(_))
    ));
    assert!(matches!(
        cancel(&ctx.deps, occurrence.id, intruder).await,
        Err(BookingError::Forbidden(_))
    ));

    let stored = ctx.deps.store.find_occurrence(occurrence.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OccurrenceStatus::Confirmed);
}

// =============================================================================
// Payout
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn payout_is_credited_only_once(ctx: &TestHarness) {
    let coach = UserId::new();
    let (occurrence, _, _) = full_group_class(ctx, coach).await;
    start(&ctx.deps, occurrence.id, coach).await.unwrap();
    end(&ctx.deps, occurrence.id, coach).await.unwrap();

    let first = payout(&ctx.deps, occurrence.id, coach).await.unwrap();
    let second = payout(&ctx.deps, occurrence.id, coach).await.unwrap();

    assert_eq!(first.credited, credits(30));
    assert!(second.already_paid_out);
    assert_eq!(second.credited, credits(0));
    assert!(second.transaction.is_none());

    assert_eq!(balance(&ctx.deps, coach).await.unwrap().balance, credits(30));
    let payouts = history(&ctx.deps, coach).await.unwrap();
    assert_eq!(payouts.len(), 1);

    let posted: Vec<_> = ctx
        .notifier()
        .sent_to(coach)
        .into_iter()
        .filter(|n| n.kind() == "payout_posted")
        .collect();
    assert_eq!(posted.len(), 1);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn payout_before_completion_is_rejected(ctx: &TestHarness) {
    let coach = UserId::new();
    let (occurrence, _, _) = full_group_class(ctx, coach).await;
    start(&ctx.deps, occurrence.id, coach).await.unwrap();

    let result = payout(&ctx.deps, occurrence.id, coach).await;

    assert_eq!(
        result.unwrap_err(),
        BookingError::InvalidTransition {
            operation: "pay out",
            status: OccurrenceStatus::InProgress,
        }
    );
    assert!(ctx.deps.store.find_wallet(coach).await.unwrap().is_none());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn free_class_completes_without_crediting(ctx: &TestHarness) {
    let coach = UserId::new();
    let student = UserId::new();
    let occurrence =
        individual_session(&ctx.deps, coach, date(2030, 3, 4), time(9, 0), time(10, 0), 0).await;
    book(&ctx.deps, occurrence.id, student).await.unwrap();
    start(&ctx.deps, occurrence.id, coach).await.unwrap();

    let earnings = end(&ctx.deps, occurrence.id, coach).await.unwrap();
    let outcome = payout(&ctx.deps, occurrence.id, coach).await.unwrap();

    assert_eq!(earnings.amount, credits(0));
    assert!(!outcome.already_paid_out);
    assert!(outcome.transaction.is_none());

    let again = payout(&ctx.deps, occurrence.id, coach).await.unwrap();
    assert!(again.already_paid_out);

    let stored = ctx.deps.store.find_occurrence(occurrence.id).await.unwrap().unwrap();
    assert!(stored.paid_out);
}

// =============================================================================
// Attendance
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn absent_students_are_not_paid_for(ctx: &TestHarness) {
    let coach = UserId::new();
    let (occurrence, alice, bob) = full_group_class(ctx, coach).await;

    let marked = submit_attendance(
        &ctx.deps,
        occurrence.id,
        coach,
        &attendance(&[(alice, "late"), (bob, "Absent")]),
    )
    .await
    .unwrap();
    assert_eq!(marked[0].status, EnrollmentStatus::Attended);
    assert_eq!(marked[1].status, EnrollmentStatus::Absent);

    start(&ctx.deps, occurrence.id, coach).await.unwrap();
    let earnings = end(&ctx.deps, occurrence.id, coach).await.unwrap();

    assert_eq!(earnings.attended, 1);
    assert_eq!(earnings.amount, credits(15));

    let bob_enrollment = ctx
        .deps
        .store
        .find_student_enrollment(occurrence.id, bob)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bob_enrollment.status, EnrollmentStatus::Absent);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn attendance_may_be_corrected_after_completion(ctx: &TestHarness) {
    let coach = UserId::new();
    let (occurrence, alice, _) = full_group_class(ctx, coach).await;
    start(&ctx.deps, occurrence.id, coach).await.unwrap();
    end(&ctx.deps, occurrence.id, coach).await.unwrap();

    let marked = submit_attendance(&ctx.deps, occurrence.id, coach, &attendance(&[(alice, "absent")]))
        .await
        .unwrap();
    assert_eq!(marked[0].status, EnrollmentStatus::Absent);

    let outcome = payout(&ctx.deps, occurrence.id, coach).await.unwrap();
    assert_eq!(outcome.credited, credits(15));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn attendance_is_rejected_before_the_class_is_confirmed(ctx: &TestHarness) {
    let coach = UserId::new();
    let student = UserId::new();
    fund(&ctx.deps, student, 50).await;
    let occurrence = group_session(&ctx.deps, coach, date(2030, 3, 6), 4, 15).await;
    book(&ctx.deps, occurrence.id, student).await.unwrap();

    let result =
        submit_attendance(&ctx.deps, occurrence.id, coach, &attendance(&[(student, "present")])).await;

    assert_eq!(
        result.unwrap_err(),
        BookingError::InvalidTransition {
            operation: "submit attendance",
            status: OccurrenceStatus::Pubcon,
        }
    );
}

#[test_context(TestHarness)]
#[tokio::test]
async fn attendance_rejects_duplicates_and_strangers(ctx: &TestHarness) {
    let coach = UserId::new();
    let (occurrence, alice, _) = full_group_class(ctx, coach).await;

    let duplicated = submit_attendance(
        &ctx.deps,
        occurrence.id,
        coach,
        &attendance(&[(alice, "present"), (alice, "absent")]),
    )
    .await;
    assert!(matches!(duplicated, Err(BookingError::ValidationError(_))));

    let stranger = UserId::new();
    let unknown = submit_attendance(
        &ctx.deps,
        occurrence.id,
        coach,
        &attendance(&[(alice, "present"), (stranger, "present")]),
    )
    .await;
    assert!(matches!(
        unknown,
        Err(BookingError::NotFound { entity: "enrollment", .. })
    ));

    // Nothing from the failed batch was written.
    let stored = ctx
        .deps
        .store
        .find_student_enrollment(occurrence.id, alice)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, EnrollmentStatus::Paid);
}

// =============================================================================
// Cancel
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn cancelling_refunds_every_student(ctx: &TestHarness) {
    let coach = UserId::new();
    let (occurrence, alice, bob) = full_group_class(ctx, coach).await;
    ctx.notifier().clear();

    let cancellation = cancel(&ctx.deps, occurrence.id, coach).await.unwrap();

    assert_eq!(cancellation.occurrence.status, OccurrenceStatus::Cancelled);
    assert_eq!(cancellation.refunds.len(), 2);
    assert_eq!(cancellation.total_refunded(), credits(30));

    for student in [alice, bob] {
        assert_eq!(balance(&ctx.deps, student).await.unwrap().balance, credits(50));
        assert_reconciled(&ctx.deps, student).await;

        let enrollment = ctx
            .deps
            .store
            .find_student_enrollment(occurrence.id, student)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(enrollment.status, EnrollmentStatus::CoachCancelled);
    }

    assert_eq!(ctx.notifier().kinds(), vec!["class_cancelled", "class_cancelled"]);

    let stored = ctx.deps.store.find_occurrence(occurrence.id).await.unwrap().unwrap();
    assert_eq!(stored, cancellation.occurrence);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn cancelling_an_empty_class_touches_no_wallets(ctx: &TestHarness) {
    let coach = UserId::new();
    let occurrence = group_session(&ctx.deps, coach, date(2030, 3, 6), 4, 15).await;

    let cancellation = cancel(&ctx.deps, occurrence.id, coach).await.unwrap();

    assert_eq!(cancellation.occurrence.status, OccurrenceStatus::Cancelled);
    assert!(cancellation.refunds.is_empty());
    assert!(ctx.store().all_transactions().is_empty());
    assert!(ctx.notifier().sent().is_empty());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn finished_or_cancelled_classes_cannot_be_cancelled(ctx: &TestHarness) {
    let coach = UserId::new();
    let (occurrence, _, _) = full_group_class(ctx, coach).await;
    cancel(&ctx.deps, occurrence.id, coach).await.unwrap();

    let again = cancel(&ctx.deps, occurrence.id, coach).await;
    assert_eq!(
        again.unwrap_err(),
        BookingError::InvalidTransition {
            operation: "cancel",
            status: OccurrenceStatus::Cancelled,
        }
    );

    let other = individual_session(&ctx.deps, coach, date(2030, 3, 7), time(9, 0), time(10, 0), 0).await;
    let student = UserId::new();
    book(&ctx.deps, other.id, student).await.unwrap();
    start(&ctx.deps, other.id, coach).await.unwrap();
    end(&ctx.deps, other.id, coach).await.unwrap();

    assert_eq!(
        cancel(&ctx.deps, other.id, coach).await.unwrap_err(),
        BookingError::InvalidTransition {
            operation: "cancel",
            status: OccurrenceStatus::Completed,
        }
    );
}
