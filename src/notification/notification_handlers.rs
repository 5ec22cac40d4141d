use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Sse,
    },
    Json,
};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use uuid::Uuid;
use validator::Validate;

use super::{
    notification_dto::{
        CreateNotificationRequest, NotificationQuery, OperationResponse, UnreadCountResponse,
        UpdateNotificationPreferencesRequest,
    },
    notification_models::{CreatedNotification, Notification, NotificationPreferences},
    notification_service::DEFAULT_PAGE_SIZE,
};
use crate::{
    error::{AppError, Result},
    middleware::{AuthUser, InternalCaller},
    state::AppState,
};

/// Get a page of notifications for the authenticated user, newest first
#[utoipa::path(
    get,
    path = "/api/notifications",
    params(NotificationQuery),
    responses(
        (status = 200, description = "Page of notifications", body = Vec<Notification>),
        (status = 400, description = "Invalid pagination"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "notifications",
    security(("bearer_auth" = []))
)]
pub async fn get_notifications(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<Vec<Notification>>> {
    query.validate()?;

    let notifications = state
        .notification_service
        .get_user_notifications(
            user_id,
            query.limit.unwrap_or(DEFAULT_PAGE_SIZE),
            query.offset.unwrap_or(0),
        )
        .await;

    Ok(Json(notifications))
}

/// Count unread notifications
#[utoipa::path(
    get,
    path = "/api/notifications/unread-count",
    responses(
        (status = 200, description = "Unread count", body = UnreadCountResponse),
        (status = 401, description = "Unauthorized")
    ),
    tag = "notifications",
    security(("bearer_auth" = []))
)]
pub async fn get_unread_count(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Json<UnreadCountResponse> {
    let count = state.notification_service.get_unread_count(user_id).await;
    Json(UnreadCountResponse { count })
}

/// Subscribe to real-time notifications via Server-Sent Events
#[utoipa::path(
    get,
    path = "/api/notifications/stream",
    responses(
        (status = 200, description = "SSE stream of notifications"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "notifications",
    security(("bearer_auth" = []))
)]
pub async fn notification_stream(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let subscription = state.notification_service.subscribe(user_id);

    let stream = subscription.filter_map(|notification| async move {
        match Event::default().event("notification").json_data(&notification) {
            Ok(event) => Some(Ok(event)),
            Err(e) => {
                tracing::error!("Failed to encode notification {}: {:?}", notification.id, e);
                None
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Mark notification as read
#[utoipa::path(
    patch,
    path = "/api/notifications/{id}/read",
    params(
        ("id" = Uuid, Path, description = "Notification ID")
    ),
    responses(
        (status = 200, description = "Read state updated", body = OperationResponse),
        (status = 401, description = "Unauthorized")
    ),
    tag = "notifications",
    security(("bearer_auth" = []))
)]
pub async fn mark_notification_read(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(notification_id): Path<Uuid>,
) -> Json<OperationResponse> {
    let success = state
        .notification_service
        .mark_as_read(notification_id, user_id)
        .await;

    Json(OperationResponse { success })
}

/// Mark every notification of the user as read
#[utoipa::path(
    patch,
    path = "/api/notifications/read-all",
    responses(
        (status = 200, description = "Read state updated", body = OperationResponse),
        (status = 401, description = "Unauthorized")
    ),
    tag = "notifications",
    security(("bearer_auth" = []))
)]
pub async fn mark_all_notifications_read(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Json<OperationResponse> {
    let success = state.notification_service.mark_all_as_read(user_id).await;
    Json(OperationResponse { success })
}

/// Delete a notification
#[utoipa::path(
    delete,
    path = "/api/notifications/{id}",
    params(
        ("id" = Uuid, Path, description = "Notification ID")
    ),
    responses(
        (status = 200, description = "Notification deleted", body = OperationResponse),
        (status = 401, description = "Unauthorized")
    ),
    tag = "notifications",
    security(("bearer_auth" = []))
)]
pub async fn delete_notification(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(notification_id): Path<Uuid>,
) -> Json<OperationResponse> {
    let success = state
        .notification_service
        .delete_notification(notification_id, user_id)
        .await;

    Json(OperationResponse { success })
}

/// Get notification preferences
#[utoipa::path(
    get,
    path = "/api/notifications/preferences",
    responses(
        (status = 200, description = "Current preferences", body = NotificationPreferences),
        (status = 401, description = "Unauthorized"),
        (status = 503, description = "Store unavailable")
    ),
    tag = "notifications",
    security(("bearer_auth" = []))
)]
pub async fn get_notification_preferences(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<NotificationPreferences>> {
    state
        .notification_service
        .get_notification_preferences(user_id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::StoreUnavailable("preferences".to_string()))
}

/// Update notification preferences
#[utoipa::path(
    put,
    path = "/api/notifications/preferences",
    request_body = UpdateNotificationPreferencesRequest,
    responses(
        (status = 200, description = "Preferences updated", body = NotificationPreferences),
        (status = 401, description = "Unauthorized"),
        (status = 503, description = "Store unavailable")
    ),
    tag = "notifications",
    security(("bearer_auth" = []))
)]
pub async fn update_notification_preferences(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<UpdateNotificationPreferencesRequest>,
) -> Result<Json<NotificationPreferences>> {
    state
        .notification_service
        .update_notification_preferences(user_id, payload)
        .await
        .map(Json)
        .ok_or_else(|| AppError::StoreUnavailable("preferences".to_string()))
}

/// Raise a notification for a recipient (server-side producers only)
#[utoipa::path(
    post,
    path = "/api/internal/notifications",
    request_body = CreateNotificationRequest,
    responses(
        (status = 201, description = "Notification created", body = CreatedNotification),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Missing or invalid internal token"),
        (status = 503, description = "Store unavailable")
    ),
    tag = "internal",
    security(("internal_token" = []))
)]
pub async fn create_notification(
    State(state): State<AppState>,
    _caller: InternalCaller,
    Json(payload): Json<CreateNotificationRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;

    let created = state
        .notification_service
        .create_notification(payload.into())
        .await
        .ok_or_else(|| AppError::StoreUnavailable("notification insert".to_string()))?;

    Ok((StatusCode::CREATED, Json(created)))
}
