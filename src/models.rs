use serde::{Deserialize, Serialize};

pub const DEFAULT_AVATAR: &str = "/no_pfp.webp";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub uid: String,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub friends: Vec<String>,
    #[serde(default)]
    pub public_profile: bool,
    #[serde(default)]
    pub profile_picture: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub content: String,
    pub files: Vec<String>,
    pub user: User,
    pub likes: Vec<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub users: Vec<User>,
    pub likes: Vec<String>,
    pub last_message: Option<Message>,
}

impl Chat {
    /// A fresh direct chat between exactly two users, no messages yet.
    pub fn direct(a: &User, b: &User) -> Chat {
        Chat {
            id: uuid::Uuid::now_v7().to_string(),
            users: vec![a.clone(), b.clone()],
            likes: Vec::new(),
            last_message: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub chat: String,
    pub content: String,
    pub attachment: Option<String>,
    pub user: User,
    pub created_at: i64,
}

pub fn now_millis() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
