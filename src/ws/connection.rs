//! WebSocket connection lifecycle: handshake, event dispatch, cleanup.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::game::engine::Engine;
use crate::http::routes::AppState;
use crate::store::DataStore;
use crate::ws::protocol::{ClientEvent, ServerEvent};

#[derive(Deserialize)]
pub struct WsParams {
    pub token: String,
}

/// Handshake: a bearer token is required and must verify. No anonymous
/// sessions, no fallback.
pub async fn ws_handler<S: DataStore>(
    State(state): State<AppState<S>>,
    Query(WsParams { token }): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let claims = match state.auth.verify(&token) {
        Ok(claims) => claims,
        Err(err) => {
            debug!(%err, "rejected ws handshake");
            return (StatusCode::UNAUTHORIZED, "invalid token").into_response();
        }
    };
    ws.on_upgrade(move |socket| handle_socket(state.engine, socket, claims.sub, claims.name))
        .into_response()
}

async fn handle_socket<S: DataStore>(
    engine: Engine<S>,
    socket: WebSocket,
    user: Uuid,
    username: String,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    engine.on_connect(user, &username, tx.clone()).await;

    // Forward server pushes to the socket.
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&event) else { continue };
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = ws_rx.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => dispatch(&engine, user, event, &tx).await,
                Err(err) => {
                    let _ = tx.send(ServerEvent::Error { message: format!("Bad message: {}", err) });
                }
            },
            Message::Close(_) => break,
            Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    engine.on_disconnect(user).await;
}

async fn dispatch<S: DataStore>(
    engine: &Engine<S>,
    user: Uuid,
    event: ClientEvent,
    tx: &mpsc::UnboundedSender<ServerEvent>,
) {
    match event {
        ClientEvent::Ping => {
            let _ = tx.send(ServerEvent::Pong);
        }
        ClientEvent::JoinQueue { mode } => engine.join_queue(user, mode).await,
        ClientEvent::LeaveQueue => engine.leave_queue(user).await,
        ClientEvent::GuessLetter { room_code, letter } => {
            engine.guess_letter(user, &room_code, letter).await
        }
        ClientEvent::CreatePrivateRoom => engine.create_private_room(user).await,
        ClientEvent::JoinPrivateRoom { room_code } => {
            engine.join_private_room(user, &room_code).await
        }
        ClientEvent::InviteFriend { friend_id, room_code } => {
            engine.invite_friend(user, friend_id, &room_code).await
        }
        ClientEvent::SendChat { room_code, message } => {
            engine.send_chat(user, &room_code, &message)
        }
    }
}
