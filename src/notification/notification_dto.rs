use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::notification_models::{
    ChannelPreference, NewNotification, NotificationPreferences, NotificationType, Priority,
};

#[derive(Debug, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NotificationQuery {
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<i64>,
    #[validate(range(min = 0))]
    pub offset: Option<i64>,
}

/// Body of the producer endpoint used by other server-side components.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateNotificationRequest {
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    #[schema(value_type = Option<Object>)]
    pub data: Option<Map<String, Value>>,
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 2000))]
    pub message: Option<String>,
    pub priority: Option<Priority>,
}

impl From<CreateNotificationRequest> for NewNotification {
    fn from(request: CreateNotificationRequest) -> Self {
        Self {
            user_id: request.user_id,
            notification_type: request.notification_type,
            data: request.data.unwrap_or_default(),
            title: request.title,
            message: request.message,
            priority: request.priority,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, ToSchema)]
pub struct ChannelPreferenceUpdate {
    pub email: Option<bool>,
    pub in_app: Option<bool>,
}

/// Partial update; absent fields keep their stored (or default) value.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateNotificationPreferencesRequest {
    #[schema(value_type = Option<Object>)]
    pub types: Option<BTreeMap<NotificationType, ChannelPreferenceUpdate>>,
    pub email_enabled: Option<bool>,
    pub in_app_enabled: Option<bool>,
}

impl UpdateNotificationPreferencesRequest {
    pub fn apply_to(self, preferences: &mut NotificationPreferences) {
        for (kind, update) in self.types.unwrap_or_default() {
            let template = kind.template();
            let entry = preferences.types.entry(kind).or_insert(ChannelPreference {
                email: template.email,
                in_app: template.in_app,
            });
            if let Some(email) = update.email {
                entry.email = email;
            }
            if let Some(in_app) = update.in_app {
                entry.in_app = in_app;
            }
        }
        if let Some(enabled) = self.email_enabled {
            preferences.email_enabled = enabled;
        }
        if let Some(enabled) = self.in_app_enabled {
            preferences.in_app_enabled = enabled;
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UnreadCountResponse {
    pub count: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OperationResponse {
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_update_keeps_untouched_fields() {
        let mut prefs = NotificationPreferences::defaults_for(Uuid::new_v4());
        let update: UpdateNotificationPreferencesRequest =
            serde_json::from_value(serde_json::json!({
                "types": { "rfq_expired": { "email": false } }
            }))
            .unwrap();

        update.apply_to(&mut prefs);

        let expired = prefs.types[&NotificationType::RfqExpired];
        assert!(!expired.email);
        assert!(expired.in_app);
        assert!(prefs.email_enabled);
        assert!(prefs.allows_email(NotificationType::NewQuoteReceived));
    }

    #[test]
    fn test_unknown_type_in_update_is_rejected() {
        let parsed = serde_json::from_value::<UpdateNotificationPreferencesRequest>(
            serde_json::json!({ "types": { "booking_cancelled": { "email": true } } }),
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn test_create_request_validation() {
        let request: CreateNotificationRequest = serde_json::from_value(serde_json::json!({
            "user_id": Uuid::new_v4(),
            "type": "new_message",
            "title": ""
        }))
        .unwrap();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_query_bounds() {
        let query = NotificationQuery {
            limit: Some(0),
            offset: None,
        };
        assert!(query.validate().is_err());
        let query = NotificationQuery {
            limit: Some(20),
            offset: Some(40),
        };
        assert!(query.validate().is_ok());
    }
}
