use serde::{Deserialize, Serialize};

use super::registry::{ConnId, RoomMember};
use crate::models::Message;

/// What clients may send over the socket. Fields are all optional so a
/// half-formed event surfaces as an `error` event instead of a parse drop.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinRoom {
        room: Option<String>,
        uid: Option<String>,
    },
    LeaveRoom {
        room: Option<String>,
    },
    SendMessage {
        room: Option<String>,
        content: Option<String>,
        user: Option<String>,
        /// Base64 attachment payload, uploaded to the image host before the
        /// message is stored.
        file_content: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected { sid: ConnId },
    Message { sender: ConnId, message: Message },
    RoomUsers { room: String, users: Vec<RoomMember> },
    Error { error: String },
}
