use crate::{
    middleware::auth_middleware,
    notification::{notification_dto::*, notification_handlers as handlers, notification_models::*},
    realtime::{self, types::*},
    state::AppState,
};
use axum::{
    extract::State,
    middleware,
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::get_notifications,
        handlers::get_unread_count,
        handlers::notification_stream,
        handlers::mark_notification_read,
        handlers::mark_all_notifications_read,
        handlers::delete_notification,
        handlers::get_notification_preferences,
        handlers::update_notification_preferences,
        handlers::create_notification,
    ),
    components(
        schemas(
            Notification,
            NotificationType,
            Priority,
            NotificationPreferences,
            ChannelPreference,
            ChannelPreferenceUpdate,
            UpdateNotificationPreferencesRequest,
            CreateNotificationRequest,
            CreatedNotification,
            EmailDelivery,
            UnreadCountResponse,
            OperationResponse,
            WsMessage,
            NotificationPayload,
            UnreadCountPayload,
            ErrorPayload,
        )
    ),
    tags(
        (name = "notifications", description = "Recipient notification endpoints"),
        (name = "internal", description = "Server-side producer endpoints")
    ),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            );
            components.add_security_scheme(
                "internal_token",
                utoipa::openapi::security::SecurityScheme::ApiKey(
                    utoipa::openapi::security::ApiKey::Header(
                        utoipa::openapi::security::ApiKeyValue::new(
                            crate::middleware::auth::INTERNAL_TOKEN_HEADER,
                        ),
                    ),
                ),
            );
        }
    }
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "online_users": state.hub.online_users().len(),
    }))
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Protected routes (recipient JWT required)
    let notification_routes = Router::new()
        .route("/", get(handlers::get_notifications))
        .route("/unread-count", get(handlers::get_unread_count))
        .route("/stream", get(handlers::notification_stream))
        .route("/read-all", patch(handlers::mark_all_notifications_read))
        .route("/:id/read", patch(handlers::mark_notification_read))
        .route("/:id", delete(handlers::delete_notification))
        .route(
            "/preferences",
            get(handlers::get_notification_preferences)
                .put(handlers::update_notification_preferences),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let ws_routes = Router::new()
        .route("/", get(realtime::ws_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Producer routes authenticate with the internal token instead
    let internal_routes =
        Router::new().route("/notifications", post(handlers::create_notification));

    let api_routes = Router::new()
        .route("/health", get(health))
        .nest("/notifications", notification_routes)
        .nest("/ws", ws_routes)
        .nest("/internal", internal_routes);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
