// Declare submodules
pub mod notification_dto;
pub mod notification_email;
pub mod notification_handlers;
pub mod notification_inbox;
pub mod notification_memory_store;
pub mod notification_models;
pub mod notification_repository;
pub mod notification_service;
pub mod notification_templates;

// Re-export public items
pub use notification_email::{EmailNotifier, LoggingEmailNotifier};
pub use notification_inbox::{InboxWindow, NavigationTarget, NotificationInbox, PushOutcome, Toast};
pub use notification_memory_store::InMemoryNotificationStore;
pub use notification_models::{
    CreatedNotification, EmailDelivery, NewNotification, Notification, NotificationPreferences,
    NotificationType, Priority,
};
pub use notification_repository::{NotificationRepository, NotificationStore};
pub use notification_service::NotificationService;
