use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use wavenet::auth::provider::HttpIdentityProvider;
use wavenet::config::Config;
use wavenet::crypto::Envelope;
use wavenet::images::ImageHost;
use wavenet::realtime::registry::Registry;
use wavenet::{auth, chats, db, posts, realtime, wavebond, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("wavenet=debug,info")),
        )
        .init();

    let config = Config::from_env()?;

    let db_pool = db::connect(&config.database_url, 16).await?;
    db::init_schema(&db_pool).await?;

    let app_state = AppState {
        db_pool,
        registry: Arc::new(Registry::new()),
        identity: Arc::new(HttpIdentityProvider::new(config.identity_verify_url.clone())),
        images: Arc::new(ImageHost::new(
            config.image_host_url.clone(),
            config.image_host_key.clone(),
        )),
        envelope: Envelope::new(&config.bond_secret),
        wavebond_dir: config.wavebond_dir.clone(),
    };

    let app = axum::Router::new()
        .merge(auth::router())
        .merge(posts::router())
        .merge(chats::router())
        .merge(wavebond::router())
        .merge(realtime::router())
        .with_state(app_state)
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "wavenet listening");
    axum::serve(listener, app).await?;
    Ok(())
}
