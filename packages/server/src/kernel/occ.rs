//! Bounded store calls and the optimistic-concurrency retry loop.
//!
//! Activities are written as a single "attempt": read everything, validate,
//! build a [`Changeset`], commit. If the commit loses a race the attempt is
//! run again from scratch against fresh reads.

use std::future::Future;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::common::BookingError;
use crate::kernel::{Changeset, ServerDeps, StoreError};

/// Why one attempt did not complete.
#[derive(Debug)]
pub enum AttemptError {
    /// Another writer moved a row we read; re-read and try again.
    Conflict(StoreError),
    /// Terminal for this request.
    Failed(BookingError),
}

impl From<BookingError> for AttemptError {
    fn from(error: BookingError) -> Self {
        AttemptError::Failed(error)
    }
}

/// Runs one store read under the configured timeout.
pub async fn guarded<T, F>(deps: &ServerDeps, call: F) -> Result<T, BookingError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match timeout(deps.policy.store_timeout, call).await {
        Ok(result) => result.map_err(BookingError::from),
        Err(_) => Err(timed_out(deps)),
    }
}

/// Commits a changeset under the configured timeout, separating lost races
/// from real failures.
pub async fn commit(deps: &ServerDeps, changeset: Changeset) -> Result<(), AttemptError> {
    if changeset.is_empty() {
        return Ok(());
    }
    match timeout(deps.policy.store_timeout, deps.store.commit(changeset)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) if error.is_conflict() => Err(AttemptError::Conflict(error)),
        Ok(Err(error)) => Err(AttemptError::Failed(error.into())),
        Err(_) => Err(AttemptError::Failed(timed_out(deps))),
    }
}

/// Re-runs `attempt` while it reports a conflict, up to the configured limit.
pub async fn with_occ_retry<T, F, Fut>(
    deps: &ServerDeps,
    operation: &'static str,
    mut attempt: F,
) -> Result<T, BookingError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let max_retries = deps.policy.occ_max_retries;
    let mut retries = 0u32;

    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Failed(error)) => return Err(error),
            Err(AttemptError::Conflict(error)) if retries >= max_retries => {
                warn!(
                    operation,
                    retries,
                    error = %error,
                    "Giving up after repeated concurrency conflicts"
                );
                return Err(BookingError::StoreUnavailable(format!(
                    "{} kept conflicting with concurrent updates: {}",
                    operation, error
                )));
            }
            Err(AttemptError::Conflict(error)) => {
                retries += 1;
                debug!(operation, retry = retries, error = %error, "Concurrency conflict, retrying");
                tokio::task::yield_now().await;
            }
        }
    }
}

fn timed_out(deps: &ServerDeps) -> BookingError {
    BookingError::StoreUnavailable(format!(
        "store call exceeded {}ms",
        deps.policy.store_timeout.as_millis()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::TestDependencies;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn conflict() -> AttemptError {
        AttemptError::Conflict(StoreError::VersionConflict {
            entity: "occurrence",
            id: "x".into(),
            expected: 1,
        })
    }

    #[tokio::test]
    async fn retries_until_the_attempt_lands() {
        let deps = TestDependencies::new().server_deps();
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result = with_occ_retry(&deps, "test", || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(conflict())
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_as_unavailable() {
        let deps = TestDependencies::new().server_deps();
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: Result<(), _> = with_occ_retry(&deps, "test", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(conflict())
        })
        .await;

        assert!(matches!(result, Err(BookingError::StoreUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), deps.policy.occ_max_retries + 1);
    }

    #[tokio::test]
    async fn terminal_errors_are_not_retried() {
        let deps = TestDependencies::new().server_deps();
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: Result<(), _> = with_occ_retry(&deps, "test", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AttemptError::Failed(BookingError::CapacityExceeded))
        })
        .await;

        assert_eq!(result, Err(BookingError::CapacityExceeded));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
