pub mod bond;

use axum::extract::{Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{debug_handler, Json, Router};
use serde_json::json;

use crate::auth::AuthUid;
use crate::{users, AppError, AppResult, AppState};

pub fn router() -> Router<AppState> {
    Router::new().route("/wavebond/", get(issue_bond).post(redeem_bond))
}

#[debug_handler]
async fn issue_bond(
    State(state): State<AppState>,
    AuthUid(uid): AuthUid,
) -> AppResult<impl IntoResponse> {
    let user = users::get_by_uid(&state.db_pool, &uid)
        .await?
        .ok_or_else(|| AppError::NotFound("Invalid session.".to_owned()))?;

    let blob = bond::issue(&state.db_pool, &state.envelope, &state.wavebond_dir, &user).await?;

    Ok((
        [
            (
                header::CONTENT_TYPE,
                "application/octet-stream".to_owned(),
            ),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.wavebond\"", user.username),
            ),
        ],
        blob,
    ))
}

#[debug_handler]
async fn redeem_bond(
    State(state): State<AppState>,
    AuthUid(uid): AuthUid,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let requester = users::get_by_uid(&state.db_pool, &uid)
        .await?
        .ok_or_else(|| AppError::NotFound("Invalid session.".to_owned()))?;

    let mut blob = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            blob = Some(field.bytes().await?.to_vec());
        }
    }
    let blob =
        blob.ok_or_else(|| AppError::BadRequest("wavebond file is required".to_owned()))?;

    let (owner, requester) =
        bond::redeem(&state.db_pool, &state.envelope, &blob, &requester).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "wavebond_user": owner,
            "updated_user": requester,
        })),
    ))
}
