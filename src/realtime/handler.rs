use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::types::{
    ClientMessage, ErrorPayload, NotificationPayload, UnreadCountPayload, WsMessage,
};
use crate::{
    error::{AppError, Result},
    middleware::AuthUser,
    state::AppState,
};

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, user_id, state))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, user_id: Uuid, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
    let mut subscription = state.notification_service.subscribe(user_id);
    tracing::info!("User {} connected via WebSocket", user_id);

    send_unread_count(&state, user_id, &tx).await;

    // Spawn task to send messages from channel to WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                if sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
    });

    // Forward pushed notifications into the outgoing channel
    let push_tx = tx.clone();
    let mut push_task = tokio::spawn(async move {
        while let Some(notification) = subscription.recv().await {
            let msg = WsMessage::Notification(NotificationPayload { notification });
            if push_tx.send(msg).is_err() {
                break;
            }
        }
    });

    // Spawn task to receive messages from WebSocket
    let state_clone = state.clone();
    let tx_clone = tx.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Err(e) =
                    process_client_message(&text, user_id, &state_clone, &tx_clone).await
                {
                    tracing::error!("Error processing message: {:?}", e);
                    let error_msg = WsMessage::Error(ErrorPayload {
                        message: e.to_string(),
                    });
                    let _ = tx_clone.send(error_msg);
                }
            } else if let Message::Close(_) = msg {
                break;
            }
        }
    });

    // Wait for any task to finish, then tear the rest down
    tokio::select! {
        _ = &mut send_task => {},
        _ = &mut push_task => {},
        _ = &mut recv_task => {},
    }
    send_task.abort();
    push_task.abort();
    recv_task.abort();

    tracing::info!("WebSocket connection closed for user {}", user_id);
}

async fn send_unread_count(state: &AppState, user_id: Uuid, tx: &mpsc::UnboundedSender<WsMessage>) {
    let count = state.notification_service.get_unread_count(user_id).await;
    let _ = tx.send(WsMessage::UnreadCount(UnreadCountPayload { count }));
}

/// Process incoming client messages
async fn process_client_message(
    text: &str,
    user_id: Uuid,
    state: &AppState,
    tx: &mpsc::UnboundedSender<WsMessage>,
) -> Result<()> {
    let client_msg: ClientMessage = serde_json::from_str(text)
        .map_err(|e| AppError::BadRequest(format!("Invalid message format: {}", e)))?;

    match client_msg {
        ClientMessage::MarkRead { notification_id } => {
            if !state
                .notification_service
                .mark_as_read(notification_id, user_id)
                .await
            {
                return Err(AppError::StoreUnavailable("mark read".to_string()));
            }
        }
        ClientMessage::MarkAllRead => {
            if !state.notification_service.mark_all_as_read(user_id).await {
                return Err(AppError::StoreUnavailable("mark all read".to_string()));
            }
        }
        ClientMessage::RefreshUnreadCount => {}
    }

    // Counts are always re-derived from the store, never decremented locally
    send_unread_count(state, user_id, tx).await;

    Ok(())
}
