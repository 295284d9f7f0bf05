// Environment configuration for the binaries

use crate::feed::DEFAULT_FEED_URL;
use std::env;
use std::path::PathBuf;

/// Runtime settings, read from the environment (a `.env` file is honored).
#[derive(Debug, Clone)]
pub struct Settings {
    /// Path of the SQLite mirror database.
    pub database_path: PathBuf,

    /// URL of the published watchlist.
    pub feed_url: String,

    /// HTTP listen port for the server binary.
    pub port: u16,
}

impl Settings {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let database_path = env::var("WATCHLIST_DB")
            .unwrap_or_else(|_| "watchlist.db".to_string())
            .into();
        let feed_url = env::var("SDN_FEED_URL").unwrap_or_else(|_| DEFAULT_FEED_URL.to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .unwrap_or(8080);

        Settings {
            database_path,
            feed_url,
            port,
        }
    }
}
