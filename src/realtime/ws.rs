use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::debug_handler;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::unbounded_channel;
use uuid::Uuid;

use super::engine;
use super::events::{ClientEvent, ServerEvent};
use super::registry::{ConnId, JoinOutcome};
use crate::{users, AppError, AppResult, AppState};

#[debug_handler]
pub async fn socket(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |stream| handle_socket(state, stream))
}

async fn handle_socket(state: AppState, stream: WebSocket) {
    let conn: ConnId = Uuid::now_v7();
    let (tx, mut rx) = unbounded_channel();
    state.registry.register(conn, tx);
    state.registry.send_to(conn, ServerEvent::Connected { sid: conn });
    tracing::debug!(%conn, "connection registered");

    let (mut sender, mut receiver) = stream.split();

    // Writer task: drains this connection's queue onto the socket.
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if sender.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = receiver.next().await {
        match message {
            WsMessage::Text(text) => dispatch(&state, conn, &text).await,
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    // Dropping out of the read loop is the disconnect: implicit leave plus
    // registry cleanup, no dangling membership.
    if let Some(room) = state.registry.unregister(conn) {
        tracing::debug!(%conn, room, "disconnected while joined");
    }
    writer.abort();
}

/// Any failure lands as an `error` event on the originating connection only;
/// other rooms and connections never notice.
async fn dispatch(state: &AppState, conn: ConnId, text: &str) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(_) => {
            state.registry.send_to(
                conn,
                ServerEvent::Error { error: "unrecognized event".to_owned() },
            );
            return;
        }
    };

    let result = match event {
        ClientEvent::JoinRoom { room, uid } => handle_join(state, conn, room, uid).await,
        ClientEvent::LeaveRoom { room } => handle_leave(state, conn, room),
        ClientEvent::SendMessage { room, content, user, file_content } => {
            handle_send(state, conn, room, content, user, file_content).await
        }
    };

    if let Err(err) = result {
        state.registry.send_to(conn, ServerEvent::Error { error: err.to_string() });
    }
}

async fn handle_join(
    state: &AppState,
    conn: ConnId,
    room: Option<String>,
    uid: Option<String>,
) -> AppResult<()> {
    let (Some(room), Some(uid)) = (room, uid) else {
        return Err(AppError::BadRequest("room and uid are required".to_owned()));
    };

    match engine::join_room(&state.db_pool, &state.registry, conn, &room, &uid).await? {
        JoinOutcome::Joined | JoinOutcome::AlreadyJoined => Ok(()),
        JoinOutcome::Occupied => Err(AppError::Conflict(
            "already joined to a room; leave it first".to_owned(),
        )),
        JoinOutcome::UnknownConnection => Err(AppError::BadRequest(
            "connection is not registered".to_owned(),
        )),
    }
}

/// Leaves the connection's current room, then answers with a snapshot of the
/// requested room's occupants. Unknown rooms yield an empty list, not an
/// error.
fn handle_leave(state: &AppState, conn: ConnId, room: Option<String>) -> AppResult<()> {
    let Some(room) = room else {
        return Err(AppError::BadRequest("room is required".to_owned()));
    };

    state.registry.leave(conn);
    let users = state.registry.members(&room);
    state.registry.send_to(conn, ServerEvent::RoomUsers { room, users });
    Ok(())
}

async fn handle_send(
    state: &AppState,
    conn: ConnId,
    room: Option<String>,
    content: Option<String>,
    user: Option<String>,
    file_content: Option<String>,
) -> AppResult<()> {
    let (Some(room), Some(content), Some(user)) = (room, content, user) else {
        return Err(AppError::BadRequest("room, content and user are required".to_owned()));
    };

    let Some(sender) = users::get_by_uid(&state.db_pool, &user).await? else {
        return Err(AppError::NotFound("User not found.".to_owned()));
    };

    let attachment = match file_content {
        Some(encoded) => {
            let bytes = BASE64
                .decode(encoded)
                .map_err(|_| AppError::BadRequest("file_content is not valid base64".to_owned()))?;
            Some(state.images.upload(bytes).await?)
        }
        None => None,
    };

    engine::send_message(
        &state.db_pool,
        &state.registry,
        conn,
        &room,
        sender,
        content,
        attachment,
    )
    .await?;
    Ok(())
}
