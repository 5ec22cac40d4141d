use handyman_notifications::{
    create_router,
    db::{create_pool, run_migrations},
    notification::{
        InMemoryNotificationStore, LoggingEmailNotifier, NotificationRepository,
        NotificationService, NotificationStore,
    },
    realtime::{NotificationHub, StoreFeedChannel},
    AppState, Config,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,handyman_notifications=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Arc::new(Config::from_env()?);

    let store: Arc<dyn NotificationStore> = match config.database_url.as_deref() {
        Some(database_url) => {
            tracing::info!("Connecting to database...");
            let db = create_pool(database_url, config.db_max_connections).await?;

            tracing::info!("Running migrations...");
            run_migrations(&db).await?;

            Arc::new(NotificationRepository::new(db))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, notifications are kept in memory only");
            Arc::new(InMemoryNotificationStore::new())
        }
    };

    // Pushes follow the store's insert events, so rows written by other
    // instances reach this instance's SSE and WebSocket clients too
    let hub = NotificationHub::new();
    let channel = StoreFeedChannel::start(store.clone(), hub.clone()).await?;

    let notification_service =
        NotificationService::new(store, Arc::new(channel), Arc::new(LoggingEmailNotifier));

    if config.internal_api_token.is_none() {
        tracing::warn!("INTERNAL_API_TOKEN not set, the producer endpoint will reject all calls");
    }

    let state = AppState {
        config: config.clone(),
        notification_service,
        hub,
    };

    let app = create_router(state);

    let addr = config.bind_addr();
    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
