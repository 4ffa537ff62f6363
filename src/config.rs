use std::path::PathBuf;

use anyhow::anyhow;

pub struct Config {
    pub bind_addr: String,
    pub database_url: String,
    /// Shared secret the wavebond envelope key is derived from.
    pub bond_secret: String,
    pub wavebond_dir: PathBuf,
    pub identity_verify_url: String,
    pub image_host_url: String,
    pub image_host_key: String,
}

fn require(name: &str) -> anyhow::Result<String> {
    dotenv::var(name).map_err(|_| anyhow!("missing environment variable {name}"))
}

impl Config {
    pub fn from_env() -> anyhow::Result<Config> {
        Ok(Config {
            bind_addr: dotenv::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned()),
            database_url: require("DATABASE_URL")?,
            bond_secret: require("CYPH_SECRET_KEY")?,
            wavebond_dir: dotenv::var("WAVEBOND_DIR")
                .unwrap_or_else(|_| "./wavebonds".to_owned())
                .into(),
            identity_verify_url: require("IDP_VERIFY_URL")?,
            image_host_url: require("IMGDB_URL")?,
            image_host_key: require("IMGDB_KEY")?,
        })
    }
}
