//! Tally server binary
//!
//! Configuration (environment variables):
//! - `TALLY_DB`: database path (default: tally.db)
//! - `TALLY_DB_KEY`: encryption passphrase; unset runs unencrypted
//! - `TALLY_HOST`: bind address (default: 127.0.0.1)
//! - `TALLY_PORT`: listen port (default: 3000)
//! - `TALLY_ALLOWED_ORIGINS`: comma-separated CORS origins (default: same-origin)
//! - `TALLY_DIGEST_SCHEDULE` / `TALLY_ROLLOVER_SCHEDULE`: scheduler intervals

use anyhow::Result;
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tally_core::db::{Database, DB_KEY_ENV};
use tally_server::{serve, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Set up logging: RUST_LOG env var > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let db_path = std::env::var("TALLY_DB").unwrap_or_else(|_| "tally.db".to_string());
    let db = if std::env::var(DB_KEY_ENV).is_ok() {
        Database::new(&db_path)?
    } else {
        warn!(
            "{} not set - opening unencrypted database at {}",
            DB_KEY_ENV, db_path
        );
        Database::new_unencrypted(&db_path)?
    };

    let host = std::env::var("TALLY_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("TALLY_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3000);

    let allowed_origins = std::env::var("TALLY_ALLOWED_ORIGINS")
        .map(|s| {
            s.split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect()
        })
        .unwrap_or_default();

    serve(db, &host, port, ServerConfig { allowed_origins }).await
}
