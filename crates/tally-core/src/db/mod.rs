//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `receipts` - Receipt storage and currency correction
//! - `insight_items` - Per-item categorization/insight records
//! - `budgets` - Budget configs, spend attribution state, analytics queries
//! - `digests` - Weekly digest storage
//! - `price_history` - Append-only price observations with trend
//! - `users` - Cross-domain user helpers

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;

use crate::error::{Error, Result};

mod budgets;
mod digests;
mod insight_items;
mod price_history;
mod receipts;
mod users;

pub use digests::NewWeeklyDigest;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "TALLY_DB_KEY";

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the
/// same key, regardless of database path. This allows moving/renaming/
/// restoring the database freely.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Fixed application salt - changing this would invalidate all existing encrypted databases
    const APP_SALT: &[u8; 16] = b"tally-salt-v1-fx";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    // Extract the hash portion for use as SQLCipher key (hex encoded)
    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Parse a SQLite datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    // SQLite stores as "YYYY-MM-DD HH:MM:SS" format
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

/// Format a DateTime<Utc> the way SQLite's CURRENT_TIMESTAMP does
pub(crate) fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl Database {
    /// Create a new database connection pool with encryption
    ///
    /// Requires `TALLY_DB_KEY` environment variable to be set.
    /// The database will be encrypted using SQLCipher with a key derived
    /// from the passphrase via Argon2.
    pub fn new(path: &str) -> Result<Self> {
        let encryption_key = std::env::var(DB_KEY_ENV).ok();
        match encryption_key {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use new_unencrypted() for development databases.",
                DB_KEY_ENV
            ))),
        }
    }

    /// Create a new unencrypted database connection pool
    ///
    /// WARNING: This creates an unencrypted database. Only use for development
    /// or testing. For production, use `new()` with `TALLY_DB_KEY` set.
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Create a new database with an explicit encryption key
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);

        let pool = if let Some(pass) = passphrase {
            let key = derive_key(pass)?;
            let key_pragma = format!("PRAGMA key = 'x\"{}\"';", key);

            // Use with_init to set the key on every new connection
            let manager = manager.with_init(move |conn| {
                conn.execute_batch(&key_pragma)?;
                Ok(())
            });

            Pool::builder().max_size(10).build(manager)?
        } else {
            Pool::builder().max_size(10).build(manager)?
        };

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create an in-memory database (for testing)
    ///
    /// Note: Uses a temporary file rather than `:memory:` because SQLCipher
    /// has issues with in-memory databases in the connection pool.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = format!("/tmp/tally_test_{}_{}.db", std::process::id(), id);

        // Remove any existing file
        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Enable foreign keys
            PRAGMA foreign_keys = ON;

            -- WAL mode: better concurrency, readers don't block writers
            PRAGMA journal_mode = WAL;
            PRAGMA cache_size = 2000;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            -- Receipts (extraction output plus resolved currency)
            CREATE TABLE IF NOT EXISTS receipts (
                id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL,
                merchant TEXT,
                receipt_date DATE,
                category TEXT,
                items_json TEXT NOT NULL DEFAULT '[]',     -- JSON array of line items
                subtotal REAL,
                tax REAL,
                total REAL,
                currency TEXT NOT NULL DEFAULT 'USD',
                currency_evidence TEXT NOT NULL DEFAULT '',
                currency_confidence REAL NOT NULL DEFAULT 0,
                insight_status TEXT NOT NULL DEFAULT 'pending',  -- pending, processing, completed, failed
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_receipts_user ON receipts(user_id);
            CREATE INDEX IF NOT EXISTS idx_receipts_status ON receipts(insight_status);
            CREATE INDEX IF NOT EXISTS idx_receipts_created ON receipts(created_at);

            -- Insight items (one queryable row per categorized line item)
            CREATE TABLE IF NOT EXISTS insight_items (
                id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL,
                receipt_id INTEGER NOT NULL REFERENCES receipts(id) ON DELETE CASCADE,
                item_name TEXT NOT NULL,
                item_price REAL NOT NULL,
                category TEXT NOT NULL,
                recurring BOOLEAN NOT NULL DEFAULT 0,
                insight TEXT,
                status TEXT NOT NULL DEFAULT 'completed',
                detected_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_insight_items_user ON insight_items(user_id);
            CREATE INDEX IF NOT EXISTS idx_insight_items_receipt ON insight_items(receipt_id);
            CREATE INDEX IF NOT EXISTS idx_insight_items_detected ON insight_items(detected_at);
            CREATE INDEX IF NOT EXISTS idx_insight_items_category ON insight_items(category);

            -- Budget configs (one per user, lazily created)
            CREATE TABLE IF NOT EXISTS budget_configs (
                id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL UNIQUE,
                notifications_enabled BOOLEAN NOT NULL DEFAULT 1,
                last_reset_at DATETIME,
                last_summary_sent_at DATETIME,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            -- Category budgets (per-category limit and running spend)
            CREATE TABLE IF NOT EXISTS category_budgets (
                id INTEGER PRIMARY KEY,
                config_id INTEGER NOT NULL REFERENCES budget_configs(id) ON DELETE CASCADE,
                category TEXT NOT NULL COLLATE NOCASE,
                monthly_limit REAL NOT NULL,
                current_spend REAL NOT NULL DEFAULT 0,
                notified_80 BOOLEAN NOT NULL DEFAULT 0,
                notified_100 BOOLEAN NOT NULL DEFAULT 0,
                last_notified_at DATETIME,
                UNIQUE(config_id, category)
            );

            CREATE INDEX IF NOT EXISTS idx_category_budgets_config ON category_budgets(config_id);

            -- Weekly digests (immutable rollups; only sent flag changes)
            CREATE TABLE IF NOT EXISTS weekly_digests (
                id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL,
                week_start DATE NOT NULL,
                total_spend REAL NOT NULL,
                top_categories TEXT NOT NULL,              -- JSON array
                overspent TEXT NOT NULL,                   -- JSON array
                recurring_alerts TEXT NOT NULL,            -- JSON array
                tip TEXT NOT NULL,
                sent BOOLEAN NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_weekly_digests_user ON weekly_digests(user_id);
            CREATE INDEX IF NOT EXISTS idx_weekly_digests_week ON weekly_digests(week_start);

            -- Price history (append-only observations with trend vs previous)
            CREATE TABLE IF NOT EXISTS price_history (
                id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL,
                item_name TEXT NOT NULL,
                price REAL NOT NULL,
                merchant TEXT,
                category TEXT NOT NULL,
                currency TEXT NOT NULL,
                trend TEXT NOT NULL DEFAULT 'stable',      -- up, down, stable
                percent_change REAL NOT NULL DEFAULT 0,
                recorded_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_price_history_user_item ON price_history(user_id, item_name);
            CREATE INDEX IF NOT EXISTS idx_price_history_recorded ON price_history(recorded_at);
            "#,
        )?;

        info!("Database schema initialized");
        Ok(())
    }
}
