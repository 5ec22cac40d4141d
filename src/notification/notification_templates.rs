use serde_json::{Map, Value};

use super::notification_models::{NotificationType, Priority};

/// Static presentation and delivery defaults for one notification type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationTemplate {
    pub title: &'static str,
    pub message: &'static str,
    pub priority: Priority,
    pub email: bool,
    pub in_app: bool,
}

const NEW_QUOTE_RECEIVED: NotificationTemplate = NotificationTemplate {
    title: "New Quote Received",
    message: "You have received a new quote for your RFQ: {rfq_title}",
    priority: Priority::High,
    email: true,
    in_app: true,
};

const RFQ_DEADLINE_APPROACHING: NotificationTemplate = NotificationTemplate {
    title: "RFQ Deadline Approaching",
    message: "Your RFQ \"{rfq_title}\" closes in {hours_remaining} hours",
    priority: Priority::Medium,
    email: true,
    in_app: true,
};

const RFQ_EXPIRED: NotificationTemplate = NotificationTemplate {
    title: "RFQ Expired",
    message: "Your RFQ \"{rfq_title}\" has expired",
    priority: Priority::Medium,
    email: true,
    in_app: true,
};

const NEW_RFQ_AVAILABLE: NotificationTemplate = NotificationTemplate {
    title: "New RFQ Available",
    message: "A new RFQ matching your services is available: {rfq_title}",
    priority: Priority::Medium,
    email: false,
    in_app: true,
};

const QUOTE_STATUS_CHANGED: NotificationTemplate = NotificationTemplate {
    title: "Quote Status Updated",
    message: "Your quote for \"{rfq_title}\" has been {status}",
    priority: Priority::High,
    email: true,
    in_app: true,
};

const RFQ_AWARDED: NotificationTemplate = NotificationTemplate {
    title: "RFQ Awarded",
    message: "Congratulations! You have been awarded the RFQ: {rfq_title}",
    priority: Priority::Urgent,
    email: true,
    in_app: true,
};

const QUOTE_DEADLINE_REMINDER: NotificationTemplate = NotificationTemplate {
    title: "Quote Deadline Reminder",
    message: "Reminder: quotes for \"{rfq_title}\" are due in {hours_remaining} hours",
    priority: Priority::Medium,
    email: false,
    in_app: true,
};

const NEW_MESSAGE: NotificationTemplate = NotificationTemplate {
    title: "New Message",
    message: "You have a new message from {sender_name}",
    priority: Priority::Medium,
    email: false,
    in_app: true,
};

const SYSTEM_ALERT: NotificationTemplate = NotificationTemplate {
    title: "System Alert",
    message: "{alert_message}",
    priority: Priority::Urgent,
    email: false,
    in_app: true,
};

pub fn template_for(kind: NotificationType) -> &'static NotificationTemplate {
    match kind {
        NotificationType::NewQuoteReceived => &NEW_QUOTE_RECEIVED,
        NotificationType::RfqDeadlineApproaching => &RFQ_DEADLINE_APPROACHING,
        NotificationType::RfqExpired => &RFQ_EXPIRED,
        NotificationType::NewRfqAvailable => &NEW_RFQ_AVAILABLE,
        NotificationType::QuoteStatusChanged => &QUOTE_STATUS_CHANGED,
        NotificationType::RfqAwarded => &RFQ_AWARDED,
        NotificationType::QuoteDeadlineReminder => &QUOTE_DEADLINE_REMINDER,
        NotificationType::NewMessage => &NEW_MESSAGE,
        NotificationType::SystemAlert => &SYSTEM_ALERT,
    }
}

/// Replaces every `{key}` whose key is present in `data`.
///
/// Placeholders without a matching key, and unbalanced braces, are copied
/// through untouched. Substituted values are never re-scanned.
pub fn render(template: &str, data: &Map<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };

        let key = &after[..close];
        if key.contains('{') {
            // "{a {b}": the first brace opens nothing, retry from the next one
            out.push('{');
            rest = after;
            continue;
        }

        match data.get(key) {
            Some(value) => out.push_str(&value_text(value)),
            None => {
                out.push('{');
                out.push_str(key);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    out
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
