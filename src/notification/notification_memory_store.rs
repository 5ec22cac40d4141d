use async_trait::async_trait;
use chrono::Utc;
use futures::stream::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use uuid::Uuid;

use super::notification_models::{Notification, NotificationDraft, NotificationPreferences};
use super::notification_repository::{InsertedNotifications, NotificationStore};
use crate::error::{AppError, Result};

const INSERT_FEED_CAPACITY: usize = 256;

/// Process-local store used when no database is configured.
///
/// Rows are kept in insertion order, which is also creation order.
pub struct InMemoryNotificationStore {
    notifications: RwLock<Vec<Notification>>,
    preferences: RwLock<HashMap<Uuid, NotificationPreferences>>,
    inserts: broadcast::Sender<Notification>,
    unavailable: AtomicBool,
    email_flag_broken: AtomicBool,
}

impl Default for InMemoryNotificationStore {
    fn default() -> Self {
        let (inserts, _) = broadcast::channel(INSERT_FEED_CAPACITY);
        Self {
            notifications: RwLock::default(),
            preferences: RwLock::default(),
            inserts,
            unavailable: AtomicBool::new(false),
            email_flag_broken: AtomicBool::new(false),
        }
    }
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail as if the backing store were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes only `mark_email_sent` fail.
    pub fn set_email_flag_broken(&self, broken: bool) {
        self.email_flag_broken.store(broken, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::StoreUnavailable("in-memory store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn insert(&self, draft: &NotificationDraft) -> Result<Notification> {
        self.check_available()?;

        let now = Utc::now();
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: draft.user_id,
            notification_type: draft.notification_type,
            title: draft.title.clone(),
            message: draft.message.clone(),
            priority: draft.priority,
            is_read: false,
            data: draft.data.clone(),
            email_sent: false,
            created_at: now,
            updated_at: now,
        };

        self.notifications.write().await.push(notification.clone());
        // No watcher yet is fine
        let _ = self.inserts.send(notification.clone());
        Ok(notification)
    }

    async fn find_by_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Notification>> {
        self.check_available()?;

        let notifications = self.notifications.read().await;
        Ok(notifications
            .iter()
            .rev()
            .filter(|n| n.user_id == user_id)
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn count_unread(&self, user_id: Uuid) -> Result<i64> {
        self.check_available()?;

        let notifications = self.notifications.read().await;
        Ok(notifications
            .iter()
            .filter(|n| n.user_id == user_id && !n.is_read)
            .count() as i64)
    }

    async fn mark_as_read(&self, id: Uuid, user_id: Uuid) -> Result<u64> {
        self.check_available()?;

        let mut notifications = self.notifications.write().await;
        let mut affected = 0;
        for n in notifications
            .iter_mut()
            .filter(|n| n.id == id && n.user_id == user_id && !n.is_read)
        {
            n.is_read = true;
            n.updated_at = Utc::now();
            affected += 1;
        }
        Ok(affected)
    }

    async fn mark_all_as_read(&self, user_id: Uuid) -> Result<u64> {
        self.check_available()?;

        let mut notifications = self.notifications.write().await;
        let now = Utc::now();
        let mut affected = 0;
        for n in notifications
            .iter_mut()
            .filter(|n| n.user_id == user_id && !n.is_read)
        {
            n.is_read = true;
            n.updated_at = now;
            affected += 1;
        }
        Ok(affected)
    }

    async fn mark_email_sent(&self, id: Uuid) -> Result<()> {
        self.check_available()?;
        if self.email_flag_broken.load(Ordering::SeqCst) {
            return Err(AppError::StoreUnavailable("email flag update rejected".to_string()));
        }

        let mut notifications = self.notifications.write().await;
        if let Some(n) = notifications.iter_mut().find(|n| n.id == id) {
            n.email_sent = true;
            n.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid, user_id: Uuid) -> Result<u64> {
        self.check_available()?;

        let mut notifications = self.notifications.write().await;
        let before = notifications.len();
        notifications.retain(|n| !(n.id == id && n.user_id == user_id));
        Ok((before - notifications.len()) as u64)
    }

    async fn find_preferences(&self, user_id: Uuid) -> Result<Option<NotificationPreferences>> {
        self.check_available()?;

        Ok(self.preferences.read().await.get(&user_id).cloned())
    }

    async fn upsert_preferences(
        &self,
        preferences: &NotificationPreferences,
    ) -> Result<NotificationPreferences> {
        self.check_available()?;

        let mut stored = preferences.clone();
        stored.updated_at = Some(Utc::now());
        self.preferences
            .write()
            .await
            .insert(stored.user_id, stored.clone());
        Ok(stored)
    }

    async fn watch_inserts(&self) -> Result<InsertedNotifications> {
        self.check_available()?;

        let rows = BroadcastStream::new(self.inserts.subscribe()).filter_map(|event| async move {
            match event {
                Ok(notification) => Some(notification),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!("Insert feed lagged, {} notification(s) not pushed", skipped);
                    None
                }
            }
        });
        Ok(rows.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::notification_models::{NotificationType, Priority};

    fn draft(user_id: Uuid, title: &str) -> NotificationDraft {
        NotificationDraft {
            user_id,
            notification_type: NotificationType::SystemAlert,
            title: title.to_string(),
            message: "body".to_string(),
            priority: Priority::Low,
            data: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn test_pages_are_newest_first() {
        let store = InMemoryNotificationStore::new();
        let user = Uuid::new_v4();
        for title in ["first", "second", "third"] {
            store.insert(&draft(user, title)).await.unwrap();
        }

        let page = store.find_by_user(user, 2, 0).await.unwrap();
        let titles: Vec<_> = page.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, ["third", "second"]);

        let next = store.find_by_user(user, 2, 2).await.unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].title, "first");
    }

    #[tokio::test]
    async fn test_mutations_are_scoped_to_recipient() {
        let store = InMemoryNotificationStore::new();
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let n = store.insert(&draft(owner, "mine")).await.unwrap();

        assert_eq!(store.mark_as_read(n.id, stranger).await.unwrap(), 0);
        assert_eq!(store.delete(n.id, stranger).await.unwrap(), 0);
        assert_eq!(store.count_unread(owner).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_insert_feed_reports_each_row() {
        let store = InMemoryNotificationStore::new();
        let mut feed = store.watch_inserts().await.unwrap();
        let user = Uuid::new_v4();

        let first = store.insert(&draft(user, "first")).await.unwrap();
        let second = store.insert(&draft(user, "second")).await.unwrap();

        assert_eq!(feed.next().await.map(|n| n.id), Some(first.id));
        assert_eq!(feed.next().await.map(|n| n.id), Some(second.id));
    }

    #[tokio::test]
    async fn test_unavailable_store_errors() {
        let store = InMemoryNotificationStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.count_unread(Uuid::new_v4()).await,
            Err(AppError::StoreUnavailable(_))
        ));
    }
}
