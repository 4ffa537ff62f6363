// Room messaging semantics on top of the registry: joins resolve the user
// first, sends persist then fan out then refresh the chat's cached pointer.

use sqlx::SqlitePool;
use uuid::Uuid;

use super::events::ServerEvent;
use super::registry::{ConnId, JoinOutcome, Registry, RoomMember};
use crate::models::{now_millis, Message, User};
use crate::{users, AppError, AppResult};

pub async fn join_room(
    pool: &SqlitePool,
    registry: &Registry,
    conn: ConnId,
    room: &str,
    uid: &str,
) -> AppResult<JoinOutcome> {
    let Some(user) = users::get_by_uid(pool, uid).await? else {
        return Err(AppError::NotFound("User not found.".to_owned()));
    };

    let outcome = registry.join(
        conn,
        room,
        RoomMember {
            uid: user.uid,
            email: user.email,
            username: user.username,
        },
    );

    match outcome {
        JoinOutcome::Joined => tracing::debug!(%conn, room, "joined room"),
        JoinOutcome::AlreadyJoined => tracing::debug!(%conn, room, "duplicate join ignored"),
        _ => {}
    }
    Ok(outcome)
}

/// Persists the message, echoes it to every connection in the room (sender
/// included), then refreshes the parent chat's last-message pointer. The
/// three writes are sequential and individually best-effort; the pointer
/// update is a no-op for rooms without a chat row.
pub async fn send_message(
    pool: &SqlitePool,
    registry: &Registry,
    sender_conn: ConnId,
    room: &str,
    sender: User,
    content: String,
    attachment: Option<String>,
) -> AppResult<Message> {
    let message = Message {
        id: Uuid::now_v7().to_string(),
        chat: room.to_owned(),
        content,
        attachment,
        user: sender,
        created_at: now_millis(),
    };

    sqlx::query(
        "INSERT INTO messages (id,chat,content,attachment,author,created_at) VALUES (?,?,?,?,?,?)",
    )
    .bind(&message.id)
    .bind(&message.chat)
    .bind(&message.content)
    .bind(&message.attachment)
    .bind(serde_json::to_string(&message.user)?)
    .bind(message.created_at)
    .execute(pool)
    .await?;

    let reached = registry.broadcast(
        room,
        &ServerEvent::Message {
            sender: sender_conn,
            message: message.clone(),
        },
    );
    tracing::debug!(room, reached, "message fan-out");

    sqlx::query("UPDATE chats SET last_message=? WHERE id=?")
        .bind(serde_json::to_string(&message)?)
        .bind(room)
        .execute(pool)
        .await?;

    Ok(message)
}
