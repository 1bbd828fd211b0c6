//! In-process notification fan-out.
//!
//! Each user gets a broadcast channel, created on first subscription.
//! Delivery implements [`BaseNotificationService`], so the hub can be plugged
//! straight into `ServerDeps` for local runs, or sit behind whatever push
//! transport a deployment wires in front of it.
//!
//! ```text
//! activity ─► dispatch() ─► StreamHub::send ─► notifications:<user_id> ─► subscribers
//! ```

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use crate::common::UserId;
use crate::domains::notifications::models::Notification;
use crate::kernel::BaseNotificationService;

/// Per-user broadcast hub. Thread-safe and cheap to clone.
#[derive(Clone)]
pub struct StreamHub {
    channels: Arc<RwLock<HashMap<UserId, broadcast::Sender<Notification>>>>,
    capacity: usize,
}

impl StreamHub {
    /// Hub with room for 256 undelivered notifications per user.
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    pub fn topic(user_id: UserId) -> String {
        format!("notifications:{}", user_id)
    }

    /// Publishes to the user's channel. Returns how many subscribers saw it;
    /// zero when the user is not listening.
    pub async fn publish(&self, notification: Notification) -> usize {
        let channels = self.channels.read().await;
        match channels.get(&notification.user_id) {
            Some(tx) => tx.send(notification).unwrap_or(0),
            None => 0,
        }
    }

    pub async fn subscribe(&self, user_id: UserId) -> broadcast::Receiver<Notification> {
        let mut channels = self.channels.write().await;
        channels
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Drops channels nobody listens to any more.
    pub async fn cleanup(&self) {
        let mut channels = self.channels.write().await;
        channels.retain(|_, tx| tx.receiver_count() > 0);
    }
}

impl Default for StreamHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseNotificationService for StreamHub {
    async fn send(&self, notification: &Notification) -> Result<()> {
        let delivered = self.publish(notification.clone()).await;
        tracing::debug!(
            topic = %Self::topic(notification.user_id),
            kind = notification.kind(),
            delivered,
            "Published notification"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::OccurrenceId;
    use crate::domains::notifications::models::NotificationPayload;
    use chrono::Utc;

    fn started(user_id: UserId) -> Notification {
        Notification::new(
            user_id,
            NotificationPayload::ClassStarted {
                occurrence_id: OccurrenceId::new(),
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn subscriber_receives_only_its_own_notifications() {
        let hub = StreamHub::new();
        let alice = UserId::new();
        let bob = UserId::new();
        let mut rx = hub.subscribe(alice).await;

        hub.send(&started(bob)).await.unwrap();
        let mine = started(alice);
        hub.send(&mine).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), mine);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_noop() {
        let hub = StreamHub::new();
        assert_eq!(hub.publish(started(UserId::new())).await, 0);
    }

    #[tokio::test]
    async fn cleanup_removes_abandoned_channels() {
        let hub = StreamHub::new();
        let rx = hub.subscribe(UserId::new()).await;
        assert_eq!(hub.channels.read().await.len(), 1);

        drop(rx);
        hub.cleanup().await;

        assert_eq!(hub.channels.read().await.len(), 0);
    }
}
