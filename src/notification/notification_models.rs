use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;
use utoipa::ToSchema;
use uuid::Uuid;

use super::notification_templates::{template_for, NotificationTemplate};

/// Raised when a stored or submitted string names no known variant.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    NewQuoteReceived,
    RfqDeadlineApproaching,
    RfqExpired,
    NewRfqAvailable,
    QuoteStatusChanged,
    RfqAwarded,
    QuoteDeadlineReminder,
    NewMessage,
    SystemAlert,
}

impl NotificationType {
    pub const ALL: [NotificationType; 9] = [
        NotificationType::NewQuoteReceived,
        NotificationType::RfqDeadlineApproaching,
        NotificationType::RfqExpired,
        NotificationType::NewRfqAvailable,
        NotificationType::QuoteStatusChanged,
        NotificationType::RfqAwarded,
        NotificationType::QuoteDeadlineReminder,
        NotificationType::NewMessage,
        NotificationType::SystemAlert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::NewQuoteReceived => "new_quote_received",
            NotificationType::RfqDeadlineApproaching => "rfq_deadline_approaching",
            NotificationType::RfqExpired => "rfq_expired",
            NotificationType::NewRfqAvailable => "new_rfq_available",
            NotificationType::QuoteStatusChanged => "quote_status_changed",
            NotificationType::RfqAwarded => "rfq_awarded",
            NotificationType::QuoteDeadlineReminder => "quote_deadline_reminder",
            NotificationType::NewMessage => "new_message",
            NotificationType::SystemAlert => "system_alert",
        }
    }

    pub fn template(&self) -> &'static NotificationTemplate {
        template_for(*self)
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NotificationType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "notification type",
                value: s.to_string(),
            })
    }
}

impl TryFrom<String> for NotificationType {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    /// How long a toast for this priority stays on screen.
    pub fn toast_duration(&self) -> Duration {
        match self {
            Priority::Low => Duration::from_secs(3),
            Priority::Medium => Duration::from_secs(4),
            Priority::High => Duration::from_secs(6),
            Priority::Urgent => Duration::from_secs(10),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(UnknownVariant {
                kind: "priority",
                value: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for Priority {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    #[sqlx(rename = "type", try_from = "String")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    #[sqlx(try_from = "String")]
    pub priority: Priority,
    pub is_read: bool,
    #[schema(value_type = Object)]
    pub data: Value,
    pub email_sent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    fn data_field(&self, key: &str) -> Option<String> {
        match self.data.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn rfq_id(&self) -> Option<String> {
        self.data_field("rfq_id")
    }

    pub fn message_id(&self) -> Option<String> {
        self.data_field("message_id")
    }
}

/// A notification a server-side actor wants to raise for a recipient.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub data: Map<String, Value>,
    pub title: Option<String>,
    pub message: Option<String>,
    pub priority: Option<Priority>,
}

impl NewNotification {
    pub fn new(user_id: Uuid, notification_type: NotificationType) -> Self {
        Self {
            user_id,
            notification_type,
            data: Map::new(),
            title: None,
            message: None,
            priority: None,
        }
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// Fully rendered row, ready for insertion.
#[derive(Debug, Clone)]
pub struct NotificationDraft {
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub data: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ChannelPreference {
    pub email: bool,
    pub in_app: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NotificationPreferences {
    pub user_id: Uuid,
    #[schema(value_type = Object)]
    pub types: BTreeMap<NotificationType, ChannelPreference>,
    pub email_enabled: bool,
    pub in_app_enabled: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl NotificationPreferences {
    /// Preferences for a user who never saved any, derived from the templates.
    pub fn defaults_for(user_id: Uuid) -> Self {
        let types = NotificationType::ALL
            .into_iter()
            .map(|kind| {
                let template = kind.template();
                (
                    kind,
                    ChannelPreference {
                        email: template.email,
                        in_app: template.in_app,
                    },
                )
            })
            .collect();

        Self {
            user_id,
            types,
            email_enabled: true,
            in_app_enabled: true,
            updated_at: None,
        }
    }

    fn channel(&self, kind: NotificationType) -> ChannelPreference {
        self.types.get(&kind).copied().unwrap_or(ChannelPreference {
            email: kind.template().email,
            in_app: kind.template().in_app,
        })
    }

    pub fn allows_email(&self, kind: NotificationType) -> bool {
        self.email_enabled && self.channel(kind).email
    }

    pub fn allows_in_app(&self, kind: NotificationType) -> bool {
        self.in_app_enabled && self.channel(kind).in_app
    }
}

/// What happened to the email side effect of a created notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EmailDelivery {
    /// The template does not send email for this type.
    NotRequested,
    /// The recipient turned email off for this type or globally.
    OptedOut,
    /// Sent and `email_sent` persisted.
    Confirmed,
    /// The send itself failed.
    Failed,
    /// Sent, but recording `email_sent` failed.
    Ambiguous,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CreatedNotification {
    pub notification: Notification,
    pub email: EmailDelivery,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_type_round_trips_through_text() {
        for kind in NotificationType::ALL {
            assert_eq!(kind.as_str().parse::<NotificationType>().unwrap(), kind);
            assert_eq!(
                serde_json::to_value(kind).unwrap(),
                Value::String(kind.to_string())
            );
        }
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let err = "quote_withdrawn".parse::<NotificationType>().unwrap_err();
        assert_eq!(err.value, "quote_withdrawn");
        assert!(serde_json::from_str::<NotificationType>("\"quote_withdrawn\"").is_err());
    }

    #[test]
    fn test_priority_display_and_parse() {
        assert_eq!(Priority::Urgent.to_string(), "urgent");
        assert_eq!("low".parse::<Priority>().unwrap(), Priority::Low);
        assert!("critical".parse::<Priority>().is_err());
    }

    #[test]
    fn test_urgent_toasts_last_longest() {
        let durations: Vec<_> = [Priority::Low, Priority::Medium, Priority::High, Priority::Urgent]
            .iter()
            .map(Priority::toast_duration)
            .collect();
        assert!(durations.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_default_preferences_follow_templates() {
        let prefs = NotificationPreferences::defaults_for(Uuid::new_v4());
        assert_eq!(prefs.types.len(), NotificationType::ALL.len());
        assert!(prefs.allows_email(NotificationType::NewQuoteReceived));
        assert!(!prefs.allows_email(NotificationType::NewMessage));
        assert!(prefs.allows_in_app(NotificationType::NewMessage));
    }

    #[test]
    fn test_global_toggle_overrides_type_preference() {
        let mut prefs = NotificationPreferences::defaults_for(Uuid::new_v4());
        prefs.email_enabled = false;
        assert!(!prefs.allows_email(NotificationType::RfqAwarded));
    }

    #[test]
    fn test_navigation_fields_read_from_data() {
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            notification_type: NotificationType::NewMessage,
            title: "New Message".into(),
            message: "hi".into(),
            priority: Priority::Medium,
            is_read: false,
            data: serde_json::json!({ "message_id": "m-1" }),
            email_sent: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(notification.message_id().as_deref(), Some("m-1"));
        assert_eq!(notification.rfq_id(), None);
    }
}
