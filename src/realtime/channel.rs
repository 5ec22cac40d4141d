use dashmap::DashMap;
use futures::Stream;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::{wrappers::UnboundedReceiverStream, StreamExt};
use uuid::Uuid;

use crate::notification::notification_models::Notification;

/// Recipient-filtered publish/subscribe for newly created notifications.
///
/// Topic is the recipient id, payload is the full stored row. Delivery is
/// at-least-once from the subscriber's point of view: transports may replay
/// after a reconnect and nothing here deduplicates.
pub trait RealtimeChannel: Send + Sync {
    /// Returns how many live subscribers received the notification during
    /// this call.
    fn publish(&self, notification: &Notification) -> usize;

    fn subscribe(&self, user_id: Uuid) -> Subscription;
}

/// A live feed of one recipient's notifications.
///
/// Delivery stops on `unsubscribe()` or when the handle is dropped.
pub struct Subscription {
    user_id: Uuid,
    stream: UnboundedReceiverStream<Notification>,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(
        user_id: Uuid,
        receiver: mpsc::UnboundedReceiver<Notification>,
        cancel: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            user_id,
            stream: UnboundedReceiverStream::new(receiver),
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    /// Next pushed notification, or `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<Notification> {
        self.stream.next().await
    }

    /// Next notification if one is already queued.
    pub fn try_recv(&mut self) -> Option<Notification> {
        self.stream.as_mut().try_recv().ok()
    }

    pub fn unsubscribe(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
            self.stream.close();
        }
    }

    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }
}

impl Stream for Subscription {
    type Item = Notification;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().stream).poll_next(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Subscription driven by a background task that calls a callback per push.
pub struct CallbackSubscription {
    task: JoinHandle<()>,
}

impl CallbackSubscription {
    pub fn spawn<F>(mut subscription: Subscription, callback: F) -> Self
    where
        F: Fn(Notification) + Send + 'static,
    {
        let task = tokio::spawn(async move {
            while let Some(notification) = subscription.recv().await {
                callback(notification);
            }
        });
        Self { task }
    }

    /// Stops delivery; the inner subscription is released with the task.
    pub fn unsubscribe(self) {
        self.task.abort();
    }
}

struct Subscriber {
    id: u64,
    sender: mpsc::UnboundedSender<Notification>,
}

/// In-process fan-out keyed by recipient. One recipient may hold any number
/// of subscriptions (tabs, devices).
#[derive(Clone)]
pub struct NotificationHub {
    subscribers: Arc<DashMap<Uuid, Vec<Subscriber>>>,
    next_id: Arc<AtomicU64>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    fn remove_subscriber(subscribers: &DashMap<Uuid, Vec<Subscriber>>, user_id: Uuid, id: u64) {
        subscribers.remove_if_mut(&user_id, |_, list| {
            list.retain(|s| s.id != id);
            list.is_empty()
        });
        tracing::debug!("Subscription {} for user {} closed", id, user_id);
    }

    /// Number of open subscriptions for one recipient.
    pub fn subscriber_count(&self, user_id: &Uuid) -> usize {
        self.subscribers
            .get(user_id)
            .map(|list| list.len())
            .unwrap_or(0)
    }

    /// Recipients with at least one open subscription.
    pub fn online_users(&self) -> Vec<Uuid> {
        self.subscribers.iter().map(|entry| *entry.key()).collect()
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeChannel for NotificationHub {
    fn publish(&self, notification: &Notification) -> usize {
        let Some(mut list) = self.subscribers.get_mut(&notification.user_id) else {
            return 0;
        };

        list.retain(|s| s.sender.send(notification.clone()).is_ok());
        let delivered = list.len();
        let now_empty = list.is_empty();
        drop(list);

        if now_empty {
            self.subscribers
                .remove_if(&notification.user_id, |_, list| list.is_empty());
        }

        tracing::debug!(
            "Published notification {} to {} subscriber(s) of user {}",
            notification.id,
            delivered,
            notification.user_id
        );
        delivered
    }

    fn subscribe(&self, user_id: Uuid) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .entry(user_id)
            .or_default()
            .push(Subscriber { id, sender });
        tracing::debug!("Subscription {} opened for user {}", id, user_id);

        let subscribers = Arc::clone(&self.subscribers);
        Subscription::new(user_id, receiver, move || {
            Self::remove_subscriber(&subscribers, user_id, id)
        })
    }
}
