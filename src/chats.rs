use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{debug_handler, Json, Router};
use serde_json::json;
use sqlx::SqlitePool;

use crate::auth::AuthUid;
use crate::models::{Chat, Message};
use crate::{users, AppError, AppResult, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/friends/", get(list_friends))
        .route("/chats/", get(list_chats))
        .route("/messages/{chat_id}", get(chat_messages))
}

type ChatRow = (String, String, String, Option<String>);

fn chat_from_row(row: ChatRow) -> AppResult<Chat> {
    let (id, users, likes, last_message) = row;
    Ok(Chat {
        id,
        users: serde_json::from_str(&users)?,
        likes: serde_json::from_str(&likes)?,
        last_message: last_message.as_deref().map(serde_json::from_str).transpose()?,
    })
}

const CHAT_COLUMNS: &str = "id,users,likes,last_message";

pub async fn insert_chat(pool: &SqlitePool, chat: &Chat) -> AppResult<()> {
    let [a, b] = chat.users.as_slice() else {
        return Err(AppError::Internal(anyhow::anyhow!(
            "direct chats hold exactly two users"
        )));
    };

    sqlx::query(
        "INSERT INTO chats (id,user_a,user_b,users,likes,last_message) VALUES (?,?,?,?,?,?)",
    )
    .bind(&chat.id)
    .bind(&a.uid)
    .bind(&b.uid)
    .bind(serde_json::to_string(&chat.users)?)
    .bind(serde_json::to_string(&chat.likes)?)
    .bind(chat.last_message.as_ref().map(serde_json::to_string).transpose()?)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find_direct(pool: &SqlitePool, a: &str, b: &str) -> AppResult<Option<Chat>> {
    let row: Option<ChatRow> = sqlx::query_as(&format!(
        "SELECT {CHAT_COLUMNS} FROM chats
         WHERE (user_a=? AND user_b=?) OR (user_a=? AND user_b=?)"
    ))
    .bind(a)
    .bind(b)
    .bind(b)
    .bind(a)
    .fetch_optional(pool)
    .await?;
    row.map(chat_from_row).transpose()
}

pub async fn get_chat(pool: &SqlitePool, id: &str) -> AppResult<Option<Chat>> {
    let row: Option<ChatRow> =
        sqlx::query_as(&format!("SELECT {CHAT_COLUMNS} FROM chats WHERE id=?"))
            .bind(id)
            .fetch_optional(pool)
            .await?;
    row.map(chat_from_row).transpose()
}

#[debug_handler]
async fn list_friends(
    State(state): State<AppState>,
    AuthUid(uid): AuthUid,
) -> AppResult<impl IntoResponse> {
    let caller = users::get_by_uid(&state.db_pool, &uid)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found.".to_owned()))?;

    let friends = users::get_many(&state.db_pool, &caller.friends).await?;

    // Preview map: friend uid to the cached last message of the direct chat.
    let mut last_messages = serde_json::Map::new();
    for friend in &friends {
        let chat = find_direct(&state.db_pool, &caller.uid, &friend.uid).await?;
        if let Some(message) = chat.and_then(|chat| chat.last_message) {
            last_messages.insert(friend.uid.clone(), serde_json::to_value(message)?);
        }
    }

    Ok(Json(json!({ "friends": friends, "last_messages": last_messages })))
}

#[debug_handler]
async fn list_chats(
    State(state): State<AppState>,
    AuthUid(uid): AuthUid,
) -> AppResult<impl IntoResponse> {
    let caller = users::get_by_uid(&state.db_pool, &uid)
        .await?
        .ok_or_else(|| AppError::NotFound("Invalid session.".to_owned()))?;

    let rows: Vec<ChatRow> = sqlx::query_as(&format!(
        "SELECT {CHAT_COLUMNS} FROM chats WHERE user_a=? OR user_b=?"
    ))
    .bind(&caller.uid)
    .bind(&caller.uid)
    .fetch_all(&state.db_pool)
    .await?;
    let chats = rows.into_iter().map(chat_from_row).collect::<AppResult<Vec<_>>>()?;

    Ok(Json(json!({ "status": "success", "result": chats })))
}

type MessageRow = (String, String, String, Option<String>, String, i64);

pub fn message_from_row(row: MessageRow) -> AppResult<Message> {
    let (id, chat, content, attachment, author, created_at) = row;
    Ok(Message {
        id,
        chat,
        content,
        attachment,
        user: serde_json::from_str(&author)?,
        created_at,
    })
}

/// Full history of a chat, oldest first.
pub async fn chat_history(pool: &SqlitePool, chat_id: &str) -> AppResult<Vec<Message>> {
    let rows: Vec<MessageRow> = sqlx::query_as(
        "SELECT id,chat,content,attachment,author,created_at FROM messages
         WHERE chat=? ORDER BY created_at ASC, id ASC",
    )
    .bind(chat_id)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(message_from_row).collect()
}

#[debug_handler]
async fn chat_messages(
    State(state): State<AppState>,
    AuthUid(uid): AuthUid,
    Path(chat_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    users::get_by_uid(&state.db_pool, &uid)
        .await?
        .ok_or_else(|| AppError::NotFound("Invalid session.".to_owned()))?;

    if get_chat(&state.db_pool, &chat_id).await?.is_none() {
        return Err(AppError::NotFound("Chat not found.".to_owned()));
    }

    let messages = chat_history(&state.db_pool, &chat_id).await?;
    Ok(Json(json!({ "status": "success", "result": messages })))
}
