use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::notification::notification_models::Notification;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    Notification(NotificationPayload),
    UnreadCount(UnreadCountPayload),
    Error(ErrorPayload),
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotificationPayload {
    pub notification: Notification,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UnreadCountPayload {
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorPayload {
    pub message: String,
}

// Client-to-server messages
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    MarkRead { notification_id: Uuid },
    MarkAllRead,
    RefreshUnreadCount,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_messages_are_tagged_by_type() {
        let id = Uuid::new_v4();
        let parsed: ClientMessage = serde_json::from_str(&format!(
            r#"{{"type":"mark_read","notification_id":"{}"}}"#,
            id
        ))
        .unwrap();
        assert!(
            matches!(parsed, ClientMessage::MarkRead { notification_id } if notification_id == id)
        );

        let parsed: ClientMessage = serde_json::from_str(r#"{"type":"mark_all_read"}"#).unwrap();
        assert!(matches!(parsed, ClientMessage::MarkAllRead));
    }

    #[test]
    fn test_unread_count_message_shape() {
        let json = serde_json::to_value(WsMessage::UnreadCount(UnreadCountPayload { count: 3 }))
            .unwrap();
        assert_eq!(json, serde_json::json!({ "type": "unread_count", "count": 3 }));
    }
}
