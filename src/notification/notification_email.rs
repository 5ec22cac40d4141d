use async_trait::async_trait;
use tracing::info;

use super::notification_models::Notification;
use crate::error::Result;

/// Outbound email for notifications whose template asks for it.
#[async_trait]
pub trait EmailNotifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Records the email that would have been sent. No mail leaves the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEmailNotifier;

#[async_trait]
impl EmailNotifier for LoggingEmailNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        info!(
            user_id = %notification.user_id,
            notification_id = %notification.id,
            kind = %notification.notification_type,
            "Email notification: {}",
            notification.title
        );
        Ok(())
    }
}
