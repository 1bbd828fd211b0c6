//! Post-commit delivery of notifications.
//!
//! Runs only after the state change that produced the notifications has been
//! committed. Delivery is best effort: a failed send is logged and skipped.

use futures::future::join_all;
use tracing::{debug, warn};

use crate::domains::notifications::models::Notification;
use crate::kernel::ServerDeps;

/// Sends every notification concurrently and returns how many were delivered.
pub async fn dispatch(deps: &ServerDeps, notifications: Vec<Notification>) -> usize {
    let sends = notifications.iter().map(|notification| async move {
        match deps.notifier.send(notification).await {
            Ok(()) => {
                debug!(
                    user_id = %notification.user_id,
                    kind = notification.kind(),
                    "Notification sent"
                );
                true
            }
            Err(e) => {
                warn!(
                    user_id = %notification.user_id,
                    kind = notification.kind(),
                    error = %e,
                    "Notification delivery failed"
                );
                false
            }
        }
    });

    join_all(sends).await.into_iter().filter(|delivered| *delivered).count()
}
