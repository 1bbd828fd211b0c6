//! The booking flows against a real Postgres store.
//!
//! Needs Docker. Run with: cargo test --test pg_store_tests -- --ignored

mod common;

use crate::common::*;
use booking_core::common::{BookingError, UserId};
use booking_core::domains::booking::book;
use booking_core::domains::ledger::{balance, Wallet};
use booking_core::domains::reschedule::{propose, respond, RescheduleProposal, ResponseDecision};
use booking_core::domains::sessions::{EnrollmentStatus, OccurrenceStatus};
use booking_core::kernel::{BookingStore, Changeset, StoreError};
use futures::future::join_all;
use test_context::test_context;

#[test_context(PgHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn booking_commits_seat_enrollment_and_debit_together(ctx: &PgHarness) {
    let coach = UserId::new();
    let student = UserId::new();
    fund(&ctx.deps, student, 50).await;
    let occurrence =
        individual_session(&ctx.deps, coach, date(2030, 3, 4), time(10, 0), time(11, 0), 40).await;

    let result = book(&ctx.deps, occurrence.id, student).await.unwrap();

    let stored = ctx.store.find_occurrence(occurrence.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OccurrenceStatus::Confirmed);
    assert_eq!(stored.students_attending, 1);
    assert_eq!(stored.version, result.occurrence.version);

    let enrollment = ctx
        .store
        .find_student_enrollment(occurrence.id, student)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(enrollment.id, result.enrollment.id);
    assert_eq!(enrollment.status, EnrollmentStatus::Paid);
    assert_eq!(enrollment.amount_paid, credits(40));

    assert_eq!(balance(&ctx.deps, student).await.unwrap().balance, credits(10));
    assert_reconciled(&ctx.deps, student).await;
}

#[test_context(PgHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn stale_update_rolls_back_the_whole_changeset(ctx: &PgHarness) {
    let coach = UserId::new();
    let occurrence = group_session(&ctx.deps, coach, date(2030, 3, 6), 4, 15).await;

    let mut first = occurrence.clone();
    first.students_attending = 1;
    let mut changes = Changeset::new();
    changes.update_occurrence(&mut first);
    ctx.store.commit(changes).await.unwrap();

    // Built from the version read before the first commit.
    let bystander = UserId::new();
    let mut stale = occurrence.clone();
    stale.students_attending = 2;
    let mut changes = Changeset::new();
    changes.insert_wallet(Wallet::empty(bystander, ctx.deps.now()));
    changes.update_occurrence(&mut stale);

    let error = ctx.store.commit(changes).await.unwrap_err();

    assert!(matches!(error, StoreError::VersionConflict { entity: "occurrence", .. }));
    assert!(error.is_conflict());
    assert!(ctx.store.find_wallet(bystander).await.unwrap().is_none());
    let stored = ctx.store.find_occurrence(occurrence.id).await.unwrap().unwrap();
    assert_eq!(stored.students_attending, 1);
}

#[test_context(PgHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn rejected_reschedule_refunds_through_postgres(ctx: &PgHarness) {
    let coach = UserId::new();
    let student = UserId::new();
    fund(&ctx.deps, student, 50).await;
    let occurrence =
        individual_session(&ctx.deps, coach, date(2030, 3, 4), time(10, 0), time(11, 0), 40).await;
    let booked = book(&ctx.deps, occurrence.id, student).await.unwrap();

    let proposal = RescheduleProposal::new(date(2030, 3, 5), time(12, 0), time(13, 0));
    let proposed = propose(&ctx.deps, occurrence.id, coach, proposal).await.unwrap();
    assert_eq!(proposed.occurrence.status, OccurrenceStatus::Rescheduled);

    let response = respond(
        &ctx.deps,
        occurrence.id,
        booked.enrollment.id,
        student,
        ResponseDecision::Reject,
    )
    .await
    .unwrap();

    assert_eq!(response.refunded, credits(40));
    let stored = ctx.store.find_occurrence(occurrence.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OccurrenceStatus::Cancelled);
    assert!(stored.response_deadline.is_none());
    assert_eq!(balance(&ctx.deps, student).await.unwrap().balance, credits(50));
    assert_reconciled(&ctx.deps, student).await;

    let coach_kinds: Vec<_> = ctx.notifier.sent_to(coach).iter().map(|n| n.kind()).collect();
    assert_eq!(coach_kinds, vec!["reschedule_rejected"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires Docker"]
async fn racing_students_never_overfill_under_postgres() {
    let ctx = PgHarness::new().await.expect("Failed to create Postgres harness");
    let coach = UserId::new();
    let students: Vec<UserId> = (0..6).map(|_| UserId::new()).collect();
    for student in &students {
        fund(&ctx.deps, *student, 50).await;
    }
    let occurrence = group_session(&ctx.deps, coach, date(2030, 3, 6), 2, 20).await;

    let handles = students.iter().map(|student| {
        let deps = ctx.deps.clone();
        let student = *student;
        let occurrence_id = occurrence.id;
        tokio::spawn(async move { book(&deps, occurrence_id, student).await })
    });
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("booking task panicked"))
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 2);
    assert!(results
        .iter()
        .filter(|r| r.is_err())
        .all(|r| matches!(r, Err(BookingError::CapacityExceeded))));

    let stored = ctx.store.find_occurrence(occurrence.id).await.unwrap().unwrap();
    assert_eq!(stored.students_attending, 2);
    for student in &students {
        assert_reconciled(&ctx.deps, *student).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires Docker"]
async fn racing_reschedules_on_one_coach_day_both_land() {
    let ctx = PgHarness::new().await.expect("Failed to create Postgres harness");
    let coach = UserId::new();

    // Each round pits two proposals that lock each other's rows.
    for day in 4..9 {
        let on = date(2030, 3, day);
        let mut booked = Vec::new();
        for (start, end) in [(9, 10), (14, 15)] {
            let student = UserId::new();
            fund(&ctx.deps, student, 50).await;
            let occurrence =
                individual_session(&ctx.deps, coach, on, time(start, 0), time(end, 0), 40).await;
            book(&ctx.deps, occurrence.id, student).await.unwrap();
            booked.push(occurrence.id);
        }

        let moves = [(booked[0], time(11, 0), time(12, 0)), (booked[1], time(16, 0), time(17, 0))];
        let handles = moves.map(|(occurrence_id, start, end)| {
            let deps = ctx.deps.clone();
            let proposal = RescheduleProposal::new(on, start, end);
            tokio::spawn(async move { propose(&deps, occurrence_id, coach, proposal).await })
        });
        let results: Vec<_> = join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.expect("propose task panicked"))
            .collect();

        for result in &results {
            assert!(result.is_ok(), "reschedule failed: {:?}", result);
        }
        for occurrence_id in &booked {
            let stored = ctx.store.find_occurrence(*occurrence_id).await.unwrap().unwrap();
            assert_eq!(stored.status, OccurrenceStatus::Rescheduled);
        }
    }
}
