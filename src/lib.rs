pub mod auth;
pub mod chats;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod images;
pub mod models;
pub mod posts;
pub mod realtime;
pub mod users;
pub mod wavebond;

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::FromRef;
use serde_json::Value;
use sqlx::SqlitePool;

pub use error::{AppError, AppResult};

use auth::provider::IdentityProvider;
use crypto::Envelope;
use images::ImageHost;
use realtime::registry::Registry;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub registry: Arc<Registry>,
    pub identity: Arc<dyn IdentityProvider>,
    pub images: Arc<ImageHost>,
    pub envelope: Envelope,
    pub wavebond_dir: PathBuf,
}

pub trait GetField {
    fn get_str_field(&self, field: &str) -> AppResult<String>;
    fn get_obj_field(&self, field: &str) -> AppResult<&Value>;
}

impl GetField for serde_json::Value {
    fn get_str_field(&self, field: &str) -> AppResult<String> {
        Ok(
            self.get(field)
            .ok_or(format!("expected {field} in {self}"))?
            .as_str()
            .ok_or(format!("expected {field} in {self} to be string"))?
            .to_owned()
        )
    }

    fn get_obj_field(&self, field: &str) -> AppResult<&Value> {
        self.get(field)
        .ok_or(format!("expected {field} in {self}").into())
    }
}
