use axum::extract::{Multipart, Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{debug_handler, Json, Router};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::auth::AuthUid;
use crate::models::{now_millis, Post, User};
use crate::{users, AppError, AppResult, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts/", get(list_posts))
        .route("/post/{post_id}", delete(delete_post))
        .route("/create-post/", post(create_post))
        .route("/like/", post(toggle_like))
        .route("/likes/user", get(user_likes))
}

type PostRow = (String, String, String, String, String, String, i64);

fn from_row(row: PostRow) -> AppResult<Post> {
    let (id, title, content, files, author, likes, created_at) = row;
    Ok(Post {
        id,
        title,
        content,
        files: serde_json::from_str(&files)?,
        user: serde_json::from_str(&author)?,
        likes: serde_json::from_str(&likes)?,
        created_at,
    })
}

const COLUMNS: &str = "id,title,content,files,author,likes,created_at";

async fn insert(pool: &SqlitePool, post: &Post) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO posts (id,title,content,files,author_uid,author,likes,created_at)
         VALUES (?,?,?,?,?,?,?,?)",
    )
    .bind(&post.id)
    .bind(&post.title)
    .bind(&post.content)
    .bind(serde_json::to_string(&post.files)?)
    .bind(&post.user.uid)
    .bind(serde_json::to_string(&post.user)?)
    .bind(serde_json::to_string(&post.likes)?)
    .bind(post.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Rewrites the author snapshot on every post the user owns, so profile
/// edits show up on old posts too.
pub async fn update_author(pool: &SqlitePool, user: &User) -> AppResult<()> {
    sqlx::query("UPDATE posts SET author=? WHERE author_uid=?")
        .bind(serde_json::to_string(user)?)
        .bind(&user.uid)
        .execute(pool)
        .await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    user: String,
}

#[debug_handler]
async fn list_posts(
    State(state): State<AppState>,
    AuthUid(uid): AuthUid,
    Query(ListQuery { user }): Query<ListQuery>,
) -> AppResult<impl IntoResponse> {
    let caller = users::get_by_uid(&state.db_pool, &uid)
        .await?
        .ok_or_else(|| AppError::NotFound("Invalid session.".to_owned()))?;

    let rows: Vec<PostRow> = if user == "public-friends" {
        sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM posts
             WHERE author_uid IN (SELECT value FROM json_each(?))
                OR json_extract(author, '$.public_profile') = 1
             ORDER BY created_at DESC"
        ))
        .bind(serde_json::to_string(&caller.friends)?)
        .fetch_all(&state.db_pool)
        .await?
    } else {
        let target = users::get_by_uid(&state.db_pool, &user)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found.".to_owned()))?;
        sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM posts WHERE author_uid=? ORDER BY created_at DESC"
        ))
        .bind(&target.uid)
        .fetch_all(&state.db_pool)
        .await?
    };

    let posts = rows.into_iter().map(from_row).collect::<AppResult<Vec<_>>>()?;
    Ok(Json(json!({ "result": posts })))
}

#[debug_handler]
async fn create_post(
    State(state): State<AppState>,
    AuthUid(uid): AuthUid,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let author = users::get_by_uid(&state.db_pool, &uid)
        .await?
        .ok_or_else(|| AppError::NotFound("Invalid session.".to_owned()))?;

    let mut title = None;
    let mut content = None;
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        match field.name().unwrap_or_default() {
            "title" => title = Some(field.text().await?),
            "content" => content = Some(field.text().await?),
            // Uploads already finished are not rolled back when a later one
            // fails; the post itself is never created in that case.
            "files" => files.push(state.images.upload(field.bytes().await?.to_vec()).await?),
            _ => {}
        }
    }

    let post = Post {
        id: Uuid::now_v7().to_string(),
        title: title.ok_or_else(|| AppError::BadRequest("title is required".to_owned()))?,
        content: content.ok_or_else(|| AppError::BadRequest("content is required".to_owned()))?,
        files,
        user: author,
        likes: Vec::new(),
        created_at: now_millis(),
    };
    insert(&state.db_pool, &post).await?;

    Ok(Json(json!({ "status": "success", "post": post })))
}

#[debug_handler]
async fn delete_post(
    State(state): State<AppState>,
    AuthUid(uid): AuthUid,
    Path(post_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let caller = users::get_by_uid(&state.db_pool, &uid)
        .await?
        .ok_or_else(|| AppError::NotFound("Invalid session.".to_owned()))?;

    let row: Option<(String,)> = sqlx::query_as("SELECT author_uid FROM posts WHERE id=?")
        .bind(&post_id)
        .fetch_optional(&state.db_pool)
        .await?;
    let Some((author_uid,)) = row else {
        return Err(AppError::NotFound("Post not found.".to_owned()));
    };

    if author_uid != caller.uid {
        return Err(AppError::Unauthenticated(
            "You can't delete a post that doesn't belong to you.".to_owned(),
        ));
    }

    sqlx::query("DELETE FROM posts WHERE id=?")
        .bind(&post_id)
        .execute(&state.db_pool)
        .await?;

    Ok(Json(json!({ "status": "success", "message": "Post deleted." })))
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum LikeTarget {
    #[serde(alias = "posts")]
    Post,
    Chat,
}

#[derive(Debug, Deserialize)]
struct LikeBody {
    #[serde(rename = "type")]
    target: LikeTarget,
    id: String,
}

#[debug_handler]
async fn toggle_like(
    State(state): State<AppState>,
    AuthUid(uid): AuthUid,
    Json(LikeBody { target, id }): Json<LikeBody>,
) -> AppResult<impl IntoResponse> {
    let caller = users::get_by_uid(&state.db_pool, &uid)
        .await?
        .ok_or_else(|| AppError::NotFound("Invalid session.".to_owned()))?;

    let row: Option<(String,)> = match target {
        LikeTarget::Post => sqlx::query_as("SELECT likes FROM posts WHERE id=?"),
        LikeTarget::Chat => sqlx::query_as("SELECT likes FROM chats WHERE id=?"),
    }
    .bind(&id)
    .fetch_optional(&state.db_pool)
    .await?;

    let Some((likes,)) = row else {
        let what = match target {
            LikeTarget::Post => "Post not found.",
            LikeTarget::Chat => "Chat not found.",
        };
        return Err(AppError::NotFound(what.to_owned()));
    };

    let mut likes: Vec<String> = serde_json::from_str(&likes)?;
    let liked = if let Some(at) = likes.iter().position(|it| *it == caller.uid) {
        likes.remove(at);
        false
    } else {
        likes.push(caller.uid.clone());
        true
    };

    match target {
        LikeTarget::Post => sqlx::query("UPDATE posts SET likes=? WHERE id=?"),
        LikeTarget::Chat => sqlx::query("UPDATE chats SET likes=? WHERE id=?"),
    }
    .bind(serde_json::to_string(&likes)?)
    .bind(&id)
    .execute(&state.db_pool)
    .await?;

    Ok(Json(json!({
        "status": "success",
        "action": if liked { "like" } else { "dislike" },
        "likes": likes,
    })))
}

#[debug_handler]
async fn user_likes(
    State(state): State<AppState>,
    AuthUid(uid): AuthUid,
) -> AppResult<impl IntoResponse> {
    let caller = users::get_by_uid(&state.db_pool, &uid)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found.".to_owned()))?;

    let rows: Vec<(String,)> = sqlx::query_as("SELECT likes FROM posts WHERE author_uid=?")
        .bind(&caller.uid)
        .fetch_all(&state.db_pool)
        .await?;

    let mut likes = 0usize;
    for (raw,) in rows {
        likes += serde_json::from_str::<Vec<String>>(&raw)?.len();
    }

    Ok(Json(json!({ "likes": likes })))
}
