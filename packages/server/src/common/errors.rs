use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::common::OccurrenceId;
use crate::domains::sessions::conflicts::OverlapKind;
use crate::domains::sessions::models::OccurrenceStatus;
use crate::kernel::store::StoreError;

/// Every way a booking, reschedule, lifecycle or ledger call can fail.
///
/// Precondition failures are terminal for the request and carry the reason
/// to show the end user. Only [`BookingError::StoreUnavailable`] is worth
/// retrying.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BookingError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Student already holds an enrollment for this occurrence")]
    AlreadyBooked,

    #[error("Occurrence is not open for booking (status: {status})")]
    NotAvailable { status: OccurrenceStatus },

    #[error("Cannot {operation} while occurrence is {status}")]
    InvalidTransition {
        operation: &'static str,
        status: OccurrenceStatus,
    },

    #[error("Schedule conflict ({kind}) with occurrence {conflicting}")]
    ScheduleConflict {
        kind: OverlapKind,
        conflicting: OccurrenceId,
    },

    #[error("Occurrence is already at capacity")]
    CapacityExceeded,

    #[error("Insufficient funds: {required} PC required, {available} PC available")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
    },

    #[error("Response deadline {deadline} has passed")]
    DeadlineExpired { deadline: NaiveDateTime },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),
}

impl BookingError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    /// Whether the caller may retry the same request with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

impl From<StoreError> for BookingError {
    fn from(error: StoreError) -> Self {
        Self::StoreUnavailable(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_store_unavailable_is_retryable() {
        assert!(BookingError::StoreUnavailable("timeout".into()).is_retryable());
        assert!(!BookingError::AlreadyBooked.is_retryable());
        assert!(!BookingError::CapacityExceeded.is_retryable());
        assert!(!BookingError::validation("bad window").is_retryable());
    }

    #[test]
    fn messages_name_the_failed_invariant() {
        let err = BookingError::InsufficientFunds {
            required: Decimal::from(40),
            available: Decimal::from(10),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient funds: 40 PC required, 10 PC available"
        );

        let err = BookingError::InvalidTransition {
            operation: "start",
            status: OccurrenceStatus::Published,
        };
        assert_eq!(err.to_string(), "Cannot start while occurrence is published");
    }
}
