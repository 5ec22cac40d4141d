//! Client-side view of a recipient's notifications.
//!
//! Mirrors what the bell, the dropdown and the full notifications page do:
//! load a first page and the unread count, keep both current from the
//! realtime feed, and route clicks back through [`NotificationService`].

use std::collections::HashSet;
use std::time::Duration;
use uuid::Uuid;

use super::{
    notification_models::{Notification, NotificationPreferences, Priority},
    notification_service::{NotificationService, DEFAULT_PAGE_SIZE},
};
use crate::realtime::Subscription;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboxWindow {
    /// Bell and dropdown: only the newest `n` entries are kept.
    Bounded(usize),
    /// Full page: pushes accumulate without limit.
    Unbounded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationTarget {
    Rfq(String),
    Message(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub duration: Duration,
}

impl From<&Notification> for Toast {
    fn from(notification: &Notification) -> Self {
        Self {
            title: notification.title.clone(),
            message: notification.message.clone(),
            priority: notification.priority,
            duration: notification.priority.toast_duration(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    Added { toast: Option<Toast> },
    /// Already listed; at-least-once delivery replayed it.
    Redelivered,
}

pub struct NotificationInbox {
    service: NotificationService,
    user_id: Option<Uuid>,
    window: InboxWindow,
    notifications: Vec<Notification>,
    /// Every id listed since mount, including ones the window has dropped.
    seen: HashSet<Uuid>,
    unread_count: i64,
    preferences: Option<NotificationPreferences>,
    subscription: Option<Subscription>,
}

impl NotificationInbox {
    /// Loads the first page and unread count for `user_id` and starts
    /// listening for pushes. Without a user the inbox stays empty and inert.
    pub async fn mount(
        service: NotificationService,
        user_id: Option<Uuid>,
        window: InboxWindow,
    ) -> Self {
        let mut inbox = Self {
            service,
            user_id,
            window,
            notifications: Vec::new(),
            seen: HashSet::new(),
            unread_count: 0,
            preferences: None,
            subscription: None,
        };

        let Some(user_id) = user_id else {
            return inbox;
        };

        // Subscribe before loading so nothing created in between is lost;
        // anything delivered twice is dropped as a redelivery.
        inbox.subscription = Some(inbox.service.subscribe(user_id));

        let limit = match window {
            InboxWindow::Bounded(n) => n as i64,
            InboxWindow::Unbounded => DEFAULT_PAGE_SIZE,
        };
        let (notifications, unread_count, preferences) = tokio::join!(
            inbox.service.get_user_notifications(user_id, limit, 0),
            inbox.service.get_unread_count(user_id),
            inbox.service.get_notification_preferences(user_id),
        );

        inbox.seen = notifications.iter().map(|n| n.id).collect();
        inbox.notifications = notifications;
        inbox.unread_count = unread_count;
        inbox.preferences = preferences;
        inbox
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn unread_count(&self) -> i64 {
        self.unread_count
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription
            .as_ref()
            .map(Subscription::is_active)
            .unwrap_or(false)
    }

    pub fn apply_push(&mut self, notification: Notification) -> PushOutcome {
        if !self.seen.insert(notification.id) {
            return PushOutcome::Redelivered;
        }

        let show_toast = self
            .preferences
            .as_ref()
            .map(|prefs| prefs.allows_in_app(notification.notification_type))
            .unwrap_or(true);
        let toast = show_toast.then(|| Toast::from(&notification));

        if !notification.is_read {
            self.unread_count += 1;
        }
        self.notifications.insert(0, notification);
        if let InboxWindow::Bounded(max) = self.window {
            self.notifications.truncate(max);
        }

        PushOutcome::Added { toast }
    }

    /// Waits for the next push and applies it. `None` once unmounted.
    pub async fn next_push(&mut self) -> Option<PushOutcome> {
        let notification = self.subscription.as_mut()?.recv().await?;
        Some(self.apply_push(notification))
    }

    /// Applies every push already queued and returns the toasts to show.
    pub fn drain_pushes(&mut self) -> Vec<Toast> {
        let mut toasts = Vec::new();
        while let Some(notification) = self.subscription.as_mut().and_then(Subscription::try_recv)
        {
            if let PushOutcome::Added { toast: Some(toast) } = self.apply_push(notification) {
                toasts.push(toast);
            }
        }
        toasts
    }

    /// Handles a click: marks the notification read if needed and returns
    /// where the client should navigate, if anywhere.
    pub async fn open(&mut self, notification_id: Uuid) -> Option<NavigationTarget> {
        let user_id = self.user_id?;
        let index = self
            .notifications
            .iter()
            .position(|n| n.id == notification_id)?;

        if !self.notifications[index].is_read {
            if self.service.mark_as_read(notification_id, user_id).await {
                self.notifications[index].is_read = true;
            }
            // Other tabs and devices race on the same rows; trust the server.
            self.unread_count = self.service.get_unread_count(user_id).await;
        }

        let notification = &self.notifications[index];
        notification
            .rfq_id()
            .map(NavigationTarget::Rfq)
            .or_else(|| notification.message_id().map(NavigationTarget::Message))
    }

    /// Local state only changes after the server confirms.
    pub async fn mark_all_read(&mut self) -> bool {
        let Some(user_id) = self.user_id else {
            return false;
        };

        if !self.service.mark_all_as_read(user_id).await {
            return false;
        }
        for notification in &mut self.notifications {
            notification.is_read = true;
        }
        self.unread_count = 0;
        true
    }

    pub fn unmount(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

impl Drop for NotificationInbox {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::notification_dto::UpdateNotificationPreferencesRequest;
    use crate::notification::notification_email::LoggingEmailNotifier;
    use crate::notification::notification_memory_store::InMemoryNotificationStore;
    use crate::notification::notification_models::{NewNotification, NotificationType};
    use crate::notification::notification_repository::NotificationStore;
    use crate::realtime::NotificationHub;
    use std::sync::Arc;

    fn service_with_store() -> (
        NotificationService,
        Arc<InMemoryNotificationStore>,
        NotificationHub,
    ) {
        let store = Arc::new(InMemoryNotificationStore::new());
        let hub = NotificationHub::new();
        let service = NotificationService::new(
            store.clone(),
            Arc::new(hub.clone()),
            Arc::new(LoggingEmailNotifier),
        );
        (service, store, hub)
    }

    async fn raise(service: &NotificationService, new: NewNotification) -> Notification {
        service.create_notification(new).await.unwrap().notification
    }

    #[tokio::test]
    async fn test_mount_without_user_is_inert() {
        let (service, _, hub) = service_with_store();
        let mut inbox = NotificationInbox::mount(service, None, InboxWindow::Unbounded).await;

        assert!(inbox.notifications().is_empty());
        assert_eq!(inbox.unread_count(), 0);
        assert!(!inbox.is_subscribed());
        assert!(hub.online_users().is_empty());
        assert!(!inbox.mark_all_read().await);
    }

    #[tokio::test]
    async fn test_mount_loads_page_and_count() {
        let (service, _, hub) = service_with_store();
        let user = Uuid::new_v4();
        for _ in 0..3 {
            raise(&service, NewNotification::new(user, NotificationType::NewRfqAvailable)).await;
        }

        let inbox = NotificationInbox::mount(service, Some(user), InboxWindow::Bounded(2)).await;
        assert_eq!(inbox.notifications().len(), 2);
        assert_eq!(inbox.unread_count(), 3);
        assert!(inbox.is_subscribed());
        assert_eq!(hub.subscriber_count(&user), 1);
    }

    #[tokio::test]
    async fn test_push_prepends_and_counts() {
        let (service, _, _) = service_with_store();
        let user = Uuid::new_v4();
        let mut inbox =
            NotificationInbox::mount(service.clone(), Some(user), InboxWindow::Bounded(2)).await;

        let first = raise(&service, NewNotification::new(user, NotificationType::NewMessage)).await;
        let second =
            raise(&service, NewNotification::new(user, NotificationType::RfqAwarded)).await;
        let third = raise(&service, NewNotification::new(user, NotificationType::RfqExpired)).await;

        let toasts = inbox.drain_pushes();
        assert_eq!(toasts.len(), 3);
        assert_eq!(toasts[1].priority, Priority::Urgent);
        assert_eq!(toasts[1].duration, Priority::Urgent.toast_duration());

        assert_eq!(inbox.unread_count(), 3);
        let ids: Vec<_> = inbox.notifications().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![third.id, second.id]);
        assert!(!ids.contains(&first.id));
    }

    #[tokio::test]
    async fn test_unbounded_page_keeps_every_push() {
        let (service, _, _) = service_with_store();
        let user = Uuid::new_v4();
        let mut inbox =
            NotificationInbox::mount(service.clone(), Some(user), InboxWindow::Unbounded).await;

        for _ in 0..25 {
            raise(&service, NewNotification::new(user, NotificationType::NewMessage)).await;
        }
        inbox.drain_pushes();
        assert_eq!(inbox.notifications().len(), 25);
        assert_eq!(inbox.unread_count(), 25);
    }

    #[tokio::test]
    async fn test_redelivered_push_is_ignored() {
        let (service, _, _) = service_with_store();
        let user = Uuid::new_v4();
        let mut inbox =
            NotificationInbox::mount(service.clone(), Some(user), InboxWindow::Unbounded).await;

        let n = raise(&service, NewNotification::new(user, NotificationType::NewMessage)).await;
        assert!(matches!(inbox.next_push().await, Some(PushOutcome::Added { .. })));
        assert_eq!(inbox.apply_push(n), PushOutcome::Redelivered);
        assert_eq!(inbox.unread_count(), 1);
        assert_eq!(inbox.notifications().len(), 1);
    }

    #[tokio::test]
    async fn test_redelivery_after_window_eviction_is_ignored() {
        let (service, store, _) = service_with_store();
        let user = Uuid::new_v4();
        let mut inbox =
            NotificationInbox::mount(service.clone(), Some(user), InboxWindow::Bounded(1)).await;

        let older = raise(&service, NewNotification::new(user, NotificationType::NewMessage)).await;
        let newer =
            raise(&service, NewNotification::new(user, NotificationType::RfqAwarded)).await;
        inbox.drain_pushes();
        assert_eq!(inbox.notifications()[0].id, newer.id);

        assert_eq!(inbox.apply_push(older), PushOutcome::Redelivered);
        assert_eq!(inbox.notifications().len(), 1);
        assert_eq!(inbox.notifications()[0].id, newer.id);
        assert_eq!(inbox.unread_count(), 2);
        assert_eq!(store.count_unread(user).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_in_app_opt_out_suppresses_toast() {
        let (service, _, _) = service_with_store();
        let user = Uuid::new_v4();
        service
            .update_notification_preferences(
                user,
                UpdateNotificationPreferencesRequest {
                    in_app_enabled: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let mut inbox =
            NotificationInbox::mount(service.clone(), Some(user), InboxWindow::Unbounded).await;

        raise(&service, NewNotification::new(user, NotificationType::NewMessage)).await;
        assert!(inbox.drain_pushes().is_empty());
        assert_eq!(inbox.unread_count(), 1);
    }

    #[tokio::test]
    async fn test_open_marks_read_and_rederives_count() {
        let (service, _, _) = service_with_store();
        let user = Uuid::new_v4();
        let rfq = raise(
            &service,
            NewNotification::new(user, NotificationType::NewQuoteReceived)
                .with_field("rfq_id", "rfq-42")
                .with_field("rfq_title", "Fix Sink"),
        )
        .await;
        let other =
            raise(&service, NewNotification::new(user, NotificationType::SystemAlert)).await;
        let mut inbox =
            NotificationInbox::mount(service.clone(), Some(user), InboxWindow::Unbounded).await;

        // Another device reads one row behind this inbox's back.
        service.mark_as_read(other.id, user).await;

        let target = inbox.open(rfq.id).await;
        assert_eq!(target, Some(NavigationTarget::Rfq("rfq-42".to_string())));
        assert_eq!(inbox.unread_count(), 0);
        assert!(inbox.notifications().iter().find(|n| n.id == rfq.id).unwrap().is_read);
    }

    #[tokio::test]
    async fn test_open_routes_messages_and_ignores_plain_alerts() {
        let (service, _, _) = service_with_store();
        let user = Uuid::new_v4();
        let message = raise(
            &service,
            NewNotification::new(user, NotificationType::NewMessage)
                .with_field("message_id", "m-7"),
        )
        .await;
        let alert =
            raise(&service, NewNotification::new(user, NotificationType::SystemAlert)).await;
        let mut inbox =
            NotificationInbox::mount(service.clone(), Some(user), InboxWindow::Unbounded).await;

        assert_eq!(
            inbox.open(message.id).await,
            Some(NavigationTarget::Message("m-7".to_string()))
        );
        assert_eq!(inbox.open(alert.id).await, None);
        assert_eq!(inbox.unread_count(), 0);
        assert_eq!(inbox.open(Uuid::new_v4()).await, None);
    }

    #[tokio::test]
    async fn test_mark_all_read_waits_for_server() {
        let (service, store, _) = service_with_store();
        let user = Uuid::new_v4();
        for _ in 0..3 {
            raise(&service, NewNotification::new(user, NotificationType::NewMessage)).await;
        }
        let mut inbox =
            NotificationInbox::mount(service.clone(), Some(user), InboxWindow::Unbounded).await;

        store.set_unavailable(true);
        assert!(!inbox.mark_all_read().await);
        assert_eq!(inbox.unread_count(), 3);

        store.set_unavailable(false);
        assert!(inbox.mark_all_read().await);
        assert_eq!(inbox.unread_count(), 0);
        assert!(inbox.notifications().iter().all(|n| n.is_read));
        assert_eq!(service.get_unread_count(user).await, 0);
    }

    #[tokio::test]
    async fn test_unmount_unsubscribes() {
        let (service, _, hub) = service_with_store();
        let user = Uuid::new_v4();
        let mut inbox =
            NotificationInbox::mount(service.clone(), Some(user), InboxWindow::Unbounded).await;
        assert_eq!(hub.subscriber_count(&user), 1);

        inbox.unmount();
        assert!(!inbox.is_subscribed());
        assert_eq!(hub.subscriber_count(&user), 0);
        assert!(inbox.next_push().await.is_none());
    }
}
