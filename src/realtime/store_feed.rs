use futures::stream::StreamExt;
use std::sync::Arc;
use uuid::Uuid;

use super::channel::{NotificationHub, RealtimeChannel, Subscription};
use crate::error::Result;
use crate::notification::{notification_repository::NotificationStore, Notification};

/// Realtime channel driven by the store's own insert events.
///
/// Rows written by any process sharing the store (another replica, or a
/// producer writing the table directly) reach this process's subscribers.
/// `publish` does nothing here: the insert itself is the event.
#[derive(Clone)]
pub struct StoreFeedChannel {
    hub: NotificationHub,
}

impl StoreFeedChannel {
    /// Starts watching `store` and fans every inserted row out through `hub`.
    pub async fn start(store: Arc<dyn NotificationStore>, hub: NotificationHub) -> Result<Self> {
        let mut inserts = store.watch_inserts().await?;

        let pump_hub = hub.clone();
        tokio::spawn(async move {
            while let Some(notification) = inserts.next().await {
                pump_hub.publish(&notification);
            }
            tracing::warn!("Notification insert feed ended, realtime pushes stopped");
        });

        Ok(Self { hub })
    }

    pub fn hub(&self) -> &NotificationHub {
        &self.hub
    }
}

impl RealtimeChannel for StoreFeedChannel {
    fn publish(&self, notification: &Notification) -> usize {
        tracing::debug!(
            "Notification {} will be pushed from the insert feed",
            notification.id
        );
        0
    }

    fn subscribe(&self, user_id: Uuid) -> Subscription {
        self.hub.subscribe(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{
        InMemoryNotificationStore, LoggingEmailNotifier, NewNotification, NotificationService,
        NotificationType,
    };
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    async fn replica(store: Arc<InMemoryNotificationStore>) -> NotificationService {
        let channel = StoreFeedChannel::start(store.clone(), NotificationHub::new())
            .await
            .unwrap();
        NotificationService::new(store, Arc::new(channel), Arc::new(LoggingEmailNotifier))
    }

    #[tokio::test]
    async fn test_insert_on_one_replica_reaches_subscriber_on_another() {
        let store = Arc::new(InMemoryNotificationStore::new());
        let replica_a = replica(store.clone()).await;
        let replica_b = replica(store.clone()).await;
        let user = Uuid::new_v4();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _subscription = replica_a.subscribe_with(user, move |n| {
            let _ = tx.send(n.id);
        });

        let created = replica_b
            .create_notification(NewNotification::new(user, NotificationType::NewMessage))
            .await
            .unwrap();

        let received = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(received, Some(created.notification.id));

        // Exactly once, even though replica B has no subscriber of its own
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_rows_written_directly_to_the_store_are_pushed() {
        let store = Arc::new(InMemoryNotificationStore::new());
        let channel = StoreFeedChannel::start(store.clone(), NotificationHub::new())
            .await
            .unwrap();
        let user = Uuid::new_v4();
        let mut subscription = channel.subscribe(user);

        // A producer that bypasses the service entirely
        let producer = NotificationService::new(
            store.clone(),
            Arc::new(NotificationHub::new()),
            Arc::new(LoggingEmailNotifier),
        );
        let created = producer
            .create_notification(NewNotification::new(user, NotificationType::RfqAwarded))
            .await
            .unwrap();

        let pushed = timeout(Duration::from_secs(1), subscription.recv())
            .await
            .unwrap();
        assert_eq!(pushed.map(|n| n.id), Some(created.notification.id));
    }

    #[tokio::test]
    async fn test_publish_leaves_delivery_to_the_feed() {
        let store = Arc::new(InMemoryNotificationStore::new());
        let channel = StoreFeedChannel::start(store, NotificationHub::new())
            .await
            .unwrap();
        let user = Uuid::new_v4();
        let mut subscription = channel.subscribe(user);

        let stray = NotificationService::new(
            Arc::new(InMemoryNotificationStore::new()),
            Arc::new(NotificationHub::new()),
            Arc::new(LoggingEmailNotifier),
        )
        .create_notification(NewNotification::new(user, NotificationType::SystemAlert))
        .await
        .unwrap()
        .notification;

        assert_eq!(channel.publish(&stray), 0);
        assert_eq!(channel.hub().subscriber_count(&user), 1);
        assert!(subscription.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_unavailable_store_cannot_be_watched() {
        let store = Arc::new(InMemoryNotificationStore::new());
        store.set_unavailable(true);
        assert!(StoreFeedChannel::start(store, NotificationHub::new())
            .await
            .is_err());
    }
}
