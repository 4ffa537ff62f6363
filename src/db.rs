use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

pub async fn connect(url: &str, max_connections: u32) -> sqlx::Result<SqlitePool> {
    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
}

/// Idempotent schema setup, run once at startup.
pub async fn init_schema(pool: &SqlitePool) -> sqlx::Result<()> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS users (
            uid TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            friends TEXT NOT NULL DEFAULT '[]',
            public_profile INTEGER NOT NULL DEFAULT 0,
            profile_picture TEXT NOT NULL DEFAULT '/no_pfp.webp'
        )",
        "CREATE TABLE IF NOT EXISTS posts (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            files TEXT NOT NULL DEFAULT '[]',
            author_uid TEXT NOT NULL,
            author TEXT NOT NULL,
            likes TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS chats (
            id TEXT PRIMARY KEY,
            user_a TEXT NOT NULL,
            user_b TEXT NOT NULL,
            users TEXT NOT NULL,
            likes TEXT NOT NULL DEFAULT '[]',
            last_message TEXT
        )",
        "CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            chat TEXT NOT NULL,
            content TEXT NOT NULL,
            attachment TEXT,
            author TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_messages_chat ON messages (chat, created_at)",
        "CREATE INDEX IF NOT EXISTS idx_posts_author ON posts (author_uid, created_at)",
        "CREATE TABLE IF NOT EXISTS wavebonds (
            user_uid TEXT PRIMARY KEY,
            wave BLOB NOT NULL,
            version INTEGER NOT NULL
        )",
    ];

    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
