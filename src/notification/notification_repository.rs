use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt};
use serde_json::Value;
use sqlx::{postgres::PgListener, PgPool};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

use super::notification_models::{
    ChannelPreference, Notification, NotificationDraft, NotificationPreferences, NotificationType,
};
use crate::error::{AppError, Result};

/// Postgres channel the `notifications` insert trigger notifies with the new row id.
pub const INSERT_CHANNEL: &str = "notification_inserted";

/// Every row inserted into the store from now on, whoever wrote it.
pub type InsertedNotifications = BoxStream<'static, Notification>;

/// Persistence for notifications and per-user preferences.
///
/// Every mutation is scoped to the recipient so one user can never touch
/// another user's rows.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert(&self, draft: &NotificationDraft) -> Result<Notification>;

    /// Newest first.
    async fn find_by_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Notification>>;

    async fn count_unread(&self, user_id: Uuid) -> Result<i64>;

    async fn mark_as_read(&self, id: Uuid, user_id: Uuid) -> Result<u64>;

    async fn mark_all_as_read(&self, user_id: Uuid) -> Result<u64>;

    async fn mark_email_sent(&self, id: Uuid) -> Result<()>;

    async fn delete(&self, id: Uuid, user_id: Uuid) -> Result<u64>;

    async fn find_preferences(&self, user_id: Uuid) -> Result<Option<NotificationPreferences>>;

    async fn upsert_preferences(
        &self,
        preferences: &NotificationPreferences,
    ) -> Result<NotificationPreferences>;

    async fn watch_inserts(&self) -> Result<InsertedNotifications>;
}

#[derive(Clone)]
pub struct NotificationRepository {
    pool: PgPool,
}

impl NotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PreferencesRow {
    user_id: Uuid,
    preferences: Value,
    email_enabled: bool,
    in_app_enabled: bool,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PreferencesRow> for NotificationPreferences {
    type Error = AppError;

    fn try_from(row: PreferencesRow) -> Result<Self> {
        let mut preferences = NotificationPreferences::defaults_for(row.user_id);
        // Rows written before a type existed simply keep that type's default.
        let stored: BTreeMap<NotificationType, ChannelPreference> =
            serde_json::from_value(row.preferences).map_err(|e| {
                tracing::error!("Corrupt preferences for user {}: {:?}", row.user_id, e);
                AppError::InternalError
            })?;
        preferences.types.extend(stored);
        preferences.email_enabled = row.email_enabled;
        preferences.in_app_enabled = row.in_app_enabled;
        preferences.updated_at = Some(row.updated_at);
        Ok(preferences)
    }
}

#[async_trait]
impl NotificationStore for NotificationRepository {
    async fn insert(&self, draft: &NotificationDraft) -> Result<Notification> {
        let notification = sqlx::query_as::<_, Notification>(
            "INSERT INTO notifications (user_id, type, title, message, priority, data)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING *",
        )
        .bind(draft.user_id)
        .bind(draft.notification_type.as_str())
        .bind(&draft.title)
        .bind(&draft.message)
        .bind(draft.priority.as_str())
        .bind(&draft.data)
        .fetch_one(&self.pool)
        .await?;

        Ok(notification)
    }

    async fn find_by_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Notification>> {
        let notifications = sqlx::query_as::<_, Notification>(
            "SELECT * FROM notifications
             WHERE user_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(notifications)
    }

    async fn count_unread(&self, user_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications
             WHERE user_id = $1 AND is_read = false",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn mark_as_read(&self, id: Uuid, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE notifications
             SET is_read = true, updated_at = NOW()
             WHERE id = $1 AND user_id = $2 AND is_read = false",
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn mark_all_as_read(&self, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE notifications
             SET is_read = true, updated_at = NOW()
             WHERE user_id = $1 AND is_read = false",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn mark_email_sent(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE notifications SET email_sent = true, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete(&self, id: Uuid, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn find_preferences(&self, user_id: Uuid) -> Result<Option<NotificationPreferences>> {
        let row = sqlx::query_as::<_, PreferencesRow>(
            "SELECT user_id, preferences, email_enabled, in_app_enabled, updated_at
             FROM notification_preferences WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(NotificationPreferences::try_from).transpose()
    }

    async fn upsert_preferences(
        &self,
        preferences: &NotificationPreferences,
    ) -> Result<NotificationPreferences> {
        let types = serde_json::to_value(&preferences.types)?;

        let row = sqlx::query_as::<_, PreferencesRow>(
            "INSERT INTO notification_preferences
                (user_id, preferences, email_enabled, in_app_enabled)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (user_id) DO UPDATE SET
                preferences = EXCLUDED.preferences,
                email_enabled = EXCLUDED.email_enabled,
                in_app_enabled = EXCLUDED.in_app_enabled,
                updated_at = NOW()
             RETURNING user_id, preferences, email_enabled, in_app_enabled, updated_at",
        )
        .bind(preferences.user_id)
        .bind(types)
        .bind(preferences.email_enabled)
        .bind(preferences.in_app_enabled)
        .fetch_one(&self.pool)
        .await?;

        NotificationPreferences::try_from(row)
    }

    async fn watch_inserts(&self) -> Result<InsertedNotifications> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(INSERT_CHANNEL).await?;
        tracing::info!("Listening for notification inserts on {}", INSERT_CHANNEL);

        let pool = self.pool.clone();
        let rows = listener.into_stream().filter_map(move |event| {
            let pool = pool.clone();
            async move {
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        // The listener reconnects on the next poll
                        tracing::error!("Notification listener error: {:?}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        return None;
                    }
                };

                let id = match Uuid::parse_str(event.payload()) {
                    Ok(id) => id,
                    Err(e) => {
                        tracing::warn!("Ignoring insert event {:?}: {:?}", event.payload(), e);
                        return None;
                    }
                };

                // Deleted before we got to it: nothing to push
                sqlx::query_as::<_, Notification>("SELECT * FROM notifications WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&pool)
                    .await
                    .map_err(|e| {
                        tracing::error!("Failed to load inserted notification {}: {:?}", id, e);
                    })
                    .ok()
                    .flatten()
            }
        });

        Ok(rows.boxed())
    }
}
