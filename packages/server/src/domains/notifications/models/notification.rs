use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::common::{EnrollmentId, NotificationId, OccurrenceId, UserId};

/// What happened, with enough detail for the client to render it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationPayload {
    BookingConfirmed {
        occurrence_id: OccurrenceId,
        enrollment_id: EnrollmentId,
        amount_paid: Decimal,
    },
    RescheduleProposed {
        occurrence_id: OccurrenceId,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        respond_by: NaiveDateTime,
    },
    RescheduleAccepted {
        occurrence_id: OccurrenceId,
        student_id: UserId,
    },
    RescheduleRejected {
        occurrence_id: OccurrenceId,
        student_id: UserId,
        refunded: Decimal,
    },
    /// Nobody answered before the deadline; resolved as a rejection.
    RescheduleExpired {
        occurrence_id: OccurrenceId,
        refunded: Decimal,
    },
    ClassStarted {
        occurrence_id: OccurrenceId,
    },
    ClassCancelled {
        occurrence_id: OccurrenceId,
        refunded: Decimal,
    },
    EnrollmentCancelled {
        occurrence_id: OccurrenceId,
        student_id: UserId,
    },
    PayoutPosted {
        occurrence_id: OccurrenceId,
        amount: Decimal,
    },
}

impl NotificationPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationPayload::BookingConfirmed { .. } => "booking_confirmed",
            NotificationPayload::RescheduleProposed { .. } => "reschedule_proposed",
            NotificationPayload::RescheduleAccepted { .. } => "reschedule_accepted",
            NotificationPayload::RescheduleRejected { .. } => "reschedule_rejected",
            NotificationPayload::RescheduleExpired { .. } => "reschedule_expired",
            NotificationPayload::ClassStarted { .. } => "class_started",
            NotificationPayload::ClassCancelled { .. } => "class_cancelled",
            NotificationPayload::EnrollmentCancelled { .. } => "enrollment_cancelled",
            NotificationPayload::PayoutPosted { .. } => "payout_posted",
        }
    }
}

/// One message for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub payload: NotificationPayload,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(user_id: UserId, payload: NotificationPayload, now: DateTime<Utc>) -> Self {
        Self {
            id: NotificationId::new(),
            user_id,
            payload,
            read: false,
            created_at: now,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_serializes_with_kind_tag() {
        let occurrence_id = OccurrenceId::new();
        let payload = NotificationPayload::ClassCancelled {
            occurrence_id,
            refunded: Decimal::from(40),
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], "class_cancelled");
        assert_eq!(json["occurrence_id"], occurrence_id.to_string());
        assert_eq!(payload.kind(), "class_cancelled");
    }

    #[test]
    fn new_notifications_start_unread() {
        let notification = Notification::new(
            UserId::new(),
            NotificationPayload::ClassStarted {
                occurrence_id: OccurrenceId::new(),
            },
            Utc::now(),
        );
        assert!(!notification.read);
        assert_eq!(notification.kind(), "class_started");
    }
}
