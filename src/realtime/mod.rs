pub mod engine;
pub mod events;
pub mod registry;
mod ws;

use axum::routing::get;
use axum::Router;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws::socket))
}
