//! Paying a coach for a completed class.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::transitions::{earnings_for, load_owned};
use crate::common::{BookingError, OccurrenceId, UserId};
use crate::domains::ledger::activities::wallets::wallet_attempt;
use crate::domains::ledger::entries::credit;
use crate::domains::ledger::models::Transaction;
use crate::domains::notifications::{dispatch, Notification, NotificationPayload};
use crate::domains::sessions::OccurrenceStatus;
use crate::kernel::occ::{commit, guarded, with_occ_retry, AttemptError};
use crate::kernel::{Changeset, ServerDeps};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutOutcome {
    pub occurrence_id: OccurrenceId,
    /// Credits added to the coach's wallet by this call.
    pub credited: Decimal,
    /// The occurrence had already been paid out; nothing was credited.
    pub already_paid_out: bool,
    pub transaction: Option<Transaction>,
}

/// Idempotency key of the payout deposit for an occurrence.
pub fn payout_reference(occurrence_id: OccurrenceId) -> String {
    format!("payout:{}", occurrence_id)
}

pub async fn payout(
    deps: &ServerDeps,
    occurrence_id: OccurrenceId,
    coach_id: UserId,
) -> Result<PayoutOutcome, BookingError> {
    let outcome = with_occ_retry(deps, "payout", || payout_attempt(deps, occurrence_id, coach_id)).await?;

    if outcome.already_paid_out {
        info!(occurrence_id = %occurrence_id, "Payout already posted, nothing credited");
        return Ok(outcome);
    }

    info!(
        occurrence_id = %occurrence_id,
        coach_id = %coach_id,
        credited = %outcome.credited,
        "Payout posted"
    );

    dispatch(
        deps,
        vec![Notification::new(
            coach_id,
            NotificationPayload::PayoutPosted {
                occurrence_id,
                amount: outcome.credited,
            },
            deps.now(),
        )],
    )
    .await;

    Ok(outcome)
}

async fn payout_attempt(
    deps: &ServerDeps,
    occurrence_id: OccurrenceId,
    coach_id: UserId,
) -> Result<PayoutOutcome, AttemptError> {
    let occurrence = load_owned(deps, occurrence_id, coach_id).await?;
    occurrence.ensure_status("pay out", &[OccurrenceStatus::Completed])?;

    let reference = payout_reference(occurrence_id);
    let already_posted = guarded(deps, deps.store.find_transaction_by_reference(&reference))
        .await?
        .is_some();
    if occurrence.paid_out || already_posted {
        return Ok(PayoutOutcome {
            occurrence_id,
            credited: Decimal::ZERO,
            already_paid_out: true,
            transaction: None,
        });
    }

    let enrollments = guarded(deps, deps.store.find_enrollments(occurrence_id)).await?;
    let earnings = earnings_for(&occurrence, &enrollments, &deps.policy);

    let mut changes = Changeset::new();
    let transaction = if earnings.amount > Decimal::ZERO {
        let wallet = wallet_attempt(deps, coach_id).await?;
        let entry = credit(
            &wallet,
            earnings.amount,
            format!("Payout: {} on {}", occurrence.activity, occurrence.date),
            Some(reference),
        )?;
        let transaction = entry.transaction.clone();
        changes.apply_ledger(entry);
        Some(transaction)
    } else {
        None
    };

    let mut paid = occurrence;
    paid.paid_out = true;
    changes.update_occurrence(&mut paid);

    commit(deps, changes).await?;

    Ok(PayoutOutcome {
        occurrence_id,
        credited: earnings.amount,
        already_paid_out: false,
        transaction,
    })
}
