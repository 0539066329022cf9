//! Database schema creation.
//!
//! All CREATE TABLE statements live here - single source of truth.

use crate::error::Result;
use crate::CustodyDb;
use tracing::info;

impl CustodyDb {
    /// Ensure all tables exist.
    pub(crate) async fn ensure_schema(&self) -> Result<()> {
        // WAL lets the scan and watch loops read while the other writes
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&self.pool)
            .await?;
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&self.pool)
            .await?;

        self.create_file_status_table().await?;
        self.create_project_metadata_table().await?;

        info!("Database schema verified");
        Ok(())
    }

    async fn create_file_status_table(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS file_status (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_path TEXT UNIQUE NOT NULL,
                sha256 TEXT,
                status TEXT NOT NULL
                    CHECK (status IN ('Found', 'Uploading', 'Success', 'Error')),
                error TEXT,
                cid TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_file_status_file_path ON file_status(file_path)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_file_status_sha256 ON file_status(sha256)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_file_status_status ON file_status(status)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn create_project_metadata_table(&self) -> Result<()> {
        // file_extensions: JSON array of ".ext" strings, NULL = no override
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS project_metadata (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id TEXT UNIQUE NOT NULL,
                project_path TEXT UNIQUE NOT NULL,
                author_type TEXT,
                author_name TEXT,
                author_identifier TEXT,
                file_extensions TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_project_metadata_project_id ON project_metadata(project_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
