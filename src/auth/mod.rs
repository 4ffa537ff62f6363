pub mod provider;

use axum::extract::{FromRequestParts, Multipart, State};
use axum::http::header;
use axum::http::request::Parts;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{debug_handler, Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::models::{User, DEFAULT_AVATAR};
use crate::{posts, users, AppError, AppResult, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/user", get(current_user).patch(update_user))
}

/// Verified uid of the caller, straight from the bearer token.
pub struct AuthUid(pub String);

impl FromRequestParts<AppState> for AuthUid {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> AppResult<AuthUid> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();

        let Some(token) = header.strip_prefix("Bearer ") else {
            return Err(AppError::Unauthenticated("BEARER Token not found".to_owned()));
        };

        Ok(AuthUid(state.identity.verify(token).await?))
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
    pub uid: String,
    pub username: String,
    pub email: String,
}

#[debug_handler]
async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterBody>,
) -> AppResult<impl IntoResponse> {
    if users::get_by_uid(&state.db_pool, &body.uid).await?.is_some()
        || users::get_by_username(&state.db_pool, &body.username).await?.is_some()
        || users::get_by_email(&state.db_pool, &body.email).await?.is_some()
    {
        return Err(AppError::Conflict("Username already exists.".to_owned()));
    }

    let user = User {
        uid: body.uid,
        username: body.username,
        email: body.email,
        friends: Vec::new(),
        public_profile: false,
        profile_picture: DEFAULT_AVATAR.to_owned(),
    };
    users::create(&state.db_pool, &user).await?;

    tracing::info!(uid = %user.uid, username = %user.username, "registered user");
    Ok(Json(json!({ "status": "success" })))
}

#[debug_handler]
async fn current_user(
    State(state): State<AppState>,
    AuthUid(uid): AuthUid,
) -> AppResult<impl IntoResponse> {
    let user = users::get_by_uid(&state.db_pool, &uid)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found.".to_owned()))?;
    Ok(Json(json!({ "user": user })))
}

#[debug_handler]
async fn update_user(
    State(state): State<AppState>,
    AuthUid(uid): AuthUid,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let mut user = users::get_by_uid(&state.db_pool, &uid)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found.".to_owned()))?;

    let mut username = None;
    let mut public_profile = None;
    let mut avatar = None;

    while let Some(field) = multipart.next_field().await? {
        match field.name().unwrap_or_default() {
            "username" => username = Some(field.text().await?),
            "public_profile" => {
                let raw = field.text().await?;
                public_profile = Some(raw.parse::<bool>().map_err(|_| {
                    AppError::BadRequest("public_profile must be true or false".to_owned())
                })?);
            }
            "file" => avatar = Some(field.bytes().await?.to_vec()),
            _ => {}
        }
    }

    let username =
        username.ok_or_else(|| AppError::BadRequest("username is required".to_owned()))?;
    let public_profile = public_profile
        .ok_or_else(|| AppError::BadRequest("public_profile is required".to_owned()))?;

    if let Some(other) = users::get_by_username(&state.db_pool, &username).await? {
        if other.uid != user.uid {
            return Err(AppError::Conflict("Username already exists.".to_owned()));
        }
    }

    // No fresh upload means the avatar falls back to the default.
    user.profile_picture = match avatar {
        Some(bytes) => state.images.upload(bytes).await?,
        None => DEFAULT_AVATAR.to_owned(),
    };
    user.username = username;
    user.public_profile = public_profile;

    users::update_profile(&state.db_pool, &user).await?;
    posts::update_author(&state.db_pool, &user).await?;

    Ok(Json(json!({ "status": "success", "user": user })))
}
