//! services/api/src/web/ws_handler.rs
//!
//! The live account stream. A connection receives the current account
//! snapshot, then every newer one, until the client disconnects or the
//! session is logged out.

use crate::web::{
    protocol::ServerMessage,
    rest::AccountView,
    state::AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use blogsmith_core::SessionContext;
use futures::{
    stream::{SplitSink, SplitStream, StreamExt},
    SinkExt,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(session): Extension<SessionContext>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, session))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, session: SessionContext) {
    info!("New WebSocket connection established for user: {}", session.user_id);
    let (mut sender, receiver) = socket.split();

    // --- 1. Initial Snapshot ---
    let (current, mut feed) = match app_state.accounts.subscribe(&session.user_id).await {
        Ok(subscription) => subscription,
        Err(e) => {
            error!("Failed to load account for live updates: {}", e);
            let message = ServerMessage::Error {
                message: "Failed to load account data.".to_string(),
            };
            send_message(&mut sender, &message).await;
            return;
        }
    };
    let mut signed_in = app_state.session_watch.observe(&session);

    let first = ServerMessage::AccountUpdated {
        account: AccountView::from(current),
    };
    if !send_message(&mut sender, &first).await {
        drop(signed_in);
        app_state.session_watch.release(&session.token);
        return;
    }

    // --- 2. Client Watcher ---
    // The client sends nothing meaningful; its task only notices the close.
    let closed = CancellationToken::new();
    let client_task = tokio::spawn(watch_client(receiver, closed.clone()));

    // --- 3. Main Push Loop ---
    loop {
        tokio::select! {
            _ = closed.cancelled() => {
                info!("Client disconnected.");
                break;
            }
            update = feed.next() => match update {
                Some(account) => {
                    let message = ServerMessage::AccountUpdated { account: account.into() };
                    if !send_message(&mut sender, &message).await {
                        break;
                    }
                }
                None => {
                    warn!("Account feed closed for user {}", session.user_id);
                    break;
                }
            },
            changed = signed_in.changed() => {
                if changed.is_err() || signed_in.borrow().is_none() {
                    info!("Session ended for user {}; closing stream.", session.user_id);
                    send_message(&mut sender, &ServerMessage::SignedOut).await;
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    }

    // --- 4. Cleanup ---
    closed.cancel();
    client_task.abort();
    feed.cancel();
    drop(signed_in);
    app_state.session_watch.release(&session.token);
    info!("WebSocket connection closed.");
}

/// Drains client frames until the socket closes, then cancels `closed`.
async fn watch_client(mut receiver: SplitStream<WebSocket>, closed: CancellationToken) {
    loop {
        tokio::select! {
            _ = closed.cancelled() => return,
            frame = receiver.next() => match frame {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    closed.cancel();
}

/// Serializes and sends one message. Returns `false` once the client is gone.
async fn send_message(sender: &mut SplitSink<WebSocket, Message>, message: &ServerMessage) -> bool {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize server message: {}", e);
            return false;
        }
    };
    if let Err(e) = sender.send(Message::Text(json.into())).await {
        warn!("Failed to send WebSocket message: {}", e);
        return false;
    }
    true
}
