use sqlx::SqlitePool;

use crate::models::User;
use crate::{AppError, AppResult};

type UserRow = (String, String, String, String, bool, String);

fn from_row(row: UserRow) -> AppResult<User> {
    let (uid, username, email, friends, public_profile, profile_picture) = row;
    Ok(User {
        uid,
        username,
        email,
        friends: serde_json::from_str(&friends)?,
        public_profile,
        profile_picture,
    })
}

const COLUMNS: &str = "uid,username,email,friends,public_profile,profile_picture";

async fn get_by(pool: &SqlitePool, column: &str, value: &str) -> AppResult<Option<User>> {
    let row: Option<UserRow> =
        sqlx::query_as(&format!("SELECT {COLUMNS} FROM users WHERE {column}=?"))
            .bind(value)
            .fetch_optional(pool)
            .await?;
    row.map(from_row).transpose()
}

pub async fn get_by_uid(pool: &SqlitePool, uid: &str) -> AppResult<Option<User>> {
    get_by(pool, "uid", uid).await
}

pub async fn get_by_username(pool: &SqlitePool, username: &str) -> AppResult<Option<User>> {
    get_by(pool, "username", username).await
}

pub async fn get_by_email(pool: &SqlitePool, email: &str) -> AppResult<Option<User>> {
    get_by(pool, "email", email).await
}

pub async fn create(pool: &SqlitePool, user: &User) -> AppResult<()> {
    let result = sqlx::query(
        "INSERT INTO users (uid,username,email,friends,public_profile,profile_picture)
         VALUES (?,?,?,?,?,?)",
    )
    .bind(&user.uid)
    .bind(&user.username)
    .bind(&user.email)
    .bind(serde_json::to_string(&user.friends)?)
    .bind(user.public_profile)
    .bind(&user.profile_picture)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(AppError::Conflict("Username already exists.".to_owned()))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn set_friends(pool: &SqlitePool, uid: &str, friends: &[String]) -> AppResult<()> {
    sqlx::query("UPDATE users SET friends=? WHERE uid=?")
        .bind(serde_json::to_string(friends)?)
        .bind(uid)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn update_profile(pool: &SqlitePool, user: &User) -> AppResult<()> {
    sqlx::query("UPDATE users SET username=?, public_profile=?, profile_picture=? WHERE uid=?")
        .bind(&user.username)
        .bind(user.public_profile)
        .bind(&user.profile_picture)
        .bind(&user.uid)
        .execute(pool)
        .await?;
    Ok(())
}

/// Users whose uid appears in `uids`, via SQLite's json_each over the
/// serialized list.
pub async fn get_many(pool: &SqlitePool, uids: &[String]) -> AppResult<Vec<User>> {
    let rows: Vec<UserRow> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM users WHERE uid IN (SELECT value FROM json_each(?))"
    ))
    .bind(serde_json::to_string(uids)?)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(from_row).collect()
}
