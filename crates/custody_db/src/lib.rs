//! Persistent state for Custody
//!
//! This crate owns the two tables the ingestion pipeline depends on:
//!
//! - `file_status`: one row per discovered file path, tracking where that
//!   file is in the Found → Uploading → Success/Error lifecycle.
//! - `project_metadata`: one row per configured sync project (root path,
//!   author descriptor, optional extension allow-list).
//!
//! The file status table is the synchronization point that prevents
//! duplicate uploads. Every mutation is a single statement keyed by path.
//!
//! # Usage
//!
//! ```rust,ignore
//! use custody_db::{CustodyDb, Result};
//!
//! let db = CustodyDb::open("~/.custody/custody.sqlite3").await?;
//!
//! let record = db.claim_or_get("/data/note.txt").await?;
//! db.mark_uploading("/data/note.txt", &sha256).await?;
//! db.mark_success("/data/note.txt", "bafy...").await?;
//! ```

mod error;
mod file_status;
mod projects;
mod schema;
mod types;

pub use error::{DbError, Result};
pub use types::*;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::info;

/// Handle to the Custody state database.
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Clone)]
pub struct CustodyDb {
    pool: SqlitePool,
}

impl CustodyDb {
    /// Open or create a database at the given path.
    ///
    /// Creates all tables if they don't exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let db = Self { pool };
        db.ensure_schema().await?;

        info!(path = %path.display(), "Database opened");

        Ok(db)
    }

    /// Open an existing database (fails if not exists).
    pub async fn open_existing(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(DbError::not_found(format!(
                "Database not found: {}",
                path.display()
            )));
        }

        let url = format!("sqlite:{}?mode=rw", path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    /// Get the underlying connection pool (escape hatch for complex queries).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

// Timestamp utilities
impl CustodyDb {
    /// Current time as milliseconds since Unix epoch.
    pub fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// Convert milliseconds to DateTime.
    pub fn millis_to_datetime(millis: i64) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp_millis(millis).unwrap_or_else(chrono::Utc::now)
    }
}
