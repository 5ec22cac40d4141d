use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{
    notification_dto::UpdateNotificationPreferencesRequest,
    notification_email::EmailNotifier,
    notification_models::{
        CreatedNotification, EmailDelivery, NewNotification, Notification, NotificationDraft,
        NotificationPreferences,
    },
    notification_repository::NotificationStore,
    notification_templates::render,
};
use crate::realtime::{CallbackSubscription, RealtimeChannel, Subscription};

pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// The only path through which notifications are created, read and mutated.
///
/// Every method fails soft: store errors are logged and turned into a safe
/// default (`None`, empty, `0`, `false`) so callers never see a raw failure.
#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
    channel: Arc<dyn RealtimeChannel>,
    email: Arc<dyn EmailNotifier>,
}

impl NotificationService {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        channel: Arc<dyn RealtimeChannel>,
        email: Arc<dyn EmailNotifier>,
    ) -> Self {
        Self {
            store,
            channel,
            email,
        }
    }

    pub async fn create_notification(&self, new: NewNotification) -> Option<CreatedNotification> {
        let template = new.notification_type.template();
        let title = new.title.as_deref().unwrap_or(template.title);
        let message = new.message.as_deref().unwrap_or(template.message);

        let draft = NotificationDraft {
            user_id: new.user_id,
            notification_type: new.notification_type,
            title: render(title, &new.data),
            message: render(message, &new.data),
            priority: new.priority.unwrap_or(template.priority),
            data: serde_json::Value::Object(new.data),
        };

        let mut notification = match self.store.insert(&draft).await {
            Ok(notification) => notification,
            Err(e) => {
                error!(
                    "Failed to create {} notification for user {}: {:?}",
                    draft.notification_type, draft.user_id, e
                );
                return None;
            }
        };

        self.channel.publish(&notification);

        let email = if !template.email {
            EmailDelivery::NotRequested
        } else {
            self.deliver_email(&mut notification).await
        };

        info!(
            "Created {} notification {} for user {} (email: {:?})",
            notification.notification_type, notification.id, notification.user_id, email
        );

        Some(CreatedNotification {
            notification,
            email,
        })
    }

    async fn deliver_email(&self, notification: &mut Notification) -> EmailDelivery {
        let preferences = self.preferences_or_default(notification.user_id).await;
        if !preferences.allows_email(notification.notification_type) {
            debug!(
                "User {} opted out of {} emails",
                notification.user_id, notification.notification_type
            );
            return EmailDelivery::OptedOut;
        }

        if let Err(e) = self.email.send(notification).await {
            warn!("Email for notification {} failed: {:?}", notification.id, e);
            return EmailDelivery::Failed;
        }

        match self.store.mark_email_sent(notification.id).await {
            Ok(()) => {
                notification.email_sent = true;
                EmailDelivery::Confirmed
            }
            Err(e) => {
                warn!(
                    "Email for notification {} sent but email_sent not recorded: {:?}",
                    notification.id, e
                );
                EmailDelivery::Ambiguous
            }
        }
    }

    pub async fn get_user_notifications(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Vec<Notification> {
        self.store
            .find_by_user(user_id, limit, offset)
            .await
            .unwrap_or_else(|e| {
                error!("Failed to load notifications for user {}: {:?}", user_id, e);
                Vec::new()
            })
    }

    pub async fn get_unread_count(&self, user_id: Uuid) -> i64 {
        self.store.count_unread(user_id).await.unwrap_or_else(|e| {
            error!("Failed to count unread notifications for user {}: {:?}", user_id, e);
            0
        })
    }

    /// Succeeds for an already-read or unknown id as well.
    pub async fn mark_as_read(&self, id: Uuid, user_id: Uuid) -> bool {
        match self.store.mark_as_read(id, user_id).await {
            Ok(_) => true,
            Err(e) => {
                error!("Failed to mark notification {} as read: {:?}", id, e);
                false
            }
        }
    }

    pub async fn mark_all_as_read(&self, user_id: Uuid) -> bool {
        match self.store.mark_all_as_read(user_id).await {
            Ok(updated) => {
                debug!("Marked {} notification(s) read for user {}", updated, user_id);
                true
            }
            Err(e) => {
                error!("Failed to mark all notifications read for user {}: {:?}", user_id, e);
                false
            }
        }
    }

    /// Hard delete. Deleting an id that does not exist still reports success.
    pub async fn delete_notification(&self, id: Uuid, user_id: Uuid) -> bool {
        match self.store.delete(id, user_id).await {
            Ok(_) => true,
            Err(e) => {
                error!("Failed to delete notification {}: {:?}", id, e);
                false
            }
        }
    }

    /// Stored preferences, or template defaults for users who never saved any.
    pub async fn get_notification_preferences(
        &self,
        user_id: Uuid,
    ) -> Option<NotificationPreferences> {
        match self.store.find_preferences(user_id).await {
            Ok(found) => {
                Some(found.unwrap_or_else(|| NotificationPreferences::defaults_for(user_id)))
            }
            Err(e) => {
                error!("Failed to load preferences for user {}: {:?}", user_id, e);
                None
            }
        }
    }

    pub async fn update_notification_preferences(
        &self,
        user_id: Uuid,
        update: UpdateNotificationPreferencesRequest,
    ) -> Option<NotificationPreferences> {
        let mut preferences = self.get_notification_preferences(user_id).await?;
        update.apply_to(&mut preferences);

        match self.store.upsert_preferences(&preferences).await {
            Ok(saved) => Some(saved),
            Err(e) => {
                error!("Failed to save preferences for user {}: {:?}", user_id, e);
                None
            }
        }
    }

    async fn preferences_or_default(&self, user_id: Uuid) -> NotificationPreferences {
        self.get_notification_preferences(user_id)
            .await
            .unwrap_or_else(|| NotificationPreferences::defaults_for(user_id))
    }

    /// Live feed of notifications created for `user_id` from now on.
    pub fn subscribe(&self, user_id: Uuid) -> Subscription {
        self.channel.subscribe(user_id)
    }

    /// Calls `callback` once per notification created for `user_id`.
    pub fn subscribe_with<F>(&self, user_id: Uuid, callback: F) -> CallbackSubscription
    where
        F: Fn(Notification) + Send + 'static,
    {
        CallbackSubscription::spawn(self.subscribe(user_id), callback)
    }
}
