//! File status operations (the ingestion state machine)

use crate::error::{DbError, Result};
use crate::types::{FileStatus, FileStatusRecord, StatusCounts};
use crate::CustodyDb;
use sqlx::Row;
use tracing::debug;

const RECORD_COLUMNS: &str = "file_path, status, sha256, cid, error, created_at, updated_at";

impl CustodyDb {
    /// Get the record for a path, if it has ever been claimed.
    pub async fn get(&self, file_path: &str) -> Result<Option<FileStatusRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM file_status WHERE file_path = ?"
        ))
        .bind(file_path)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    /// Return the existing record for a path, or insert a new `Found` record.
    ///
    /// An existing record is returned unchanged whatever its state. The
    /// insert is unique on `file_path`: if another caller claims the same
    /// path between the lookup and the insert this returns
    /// [`DbError::Constraint`] instead of creating a second row.
    pub async fn claim_or_get(&self, file_path: &str) -> Result<FileStatusRecord> {
        if let Some(existing) = self.get(file_path).await? {
            return Ok(existing);
        }

        let now = Self::now_millis();
        sqlx::query(
            "INSERT INTO file_status (file_path, status, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(file_path)
        .bind(FileStatus::Found.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| DbError::from_insert(e, || format!("file already claimed: {file_path}")))?;

        debug!(path = file_path, "Claimed file");

        Ok(FileStatusRecord {
            file_path: file_path.to_string(),
            status: FileStatus::Found,
            sha256: None,
            cid: None,
            error: None,
            created_at: Self::millis_to_datetime(now),
            updated_at: Self::millis_to_datetime(now),
        })
    }

    /// Transition a non-terminal record to `Uploading`, recording its digest.
    pub async fn mark_uploading(&self, file_path: &str, sha256: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE file_status SET status = ?, sha256 = ?, updated_at = ?
            WHERE file_path = ? AND status IN ('Found', 'Uploading')
            "#,
        )
        .bind(FileStatus::Uploading.as_str())
        .bind(sha256)
        .bind(Self::now_millis())
        .bind(file_path)
        .execute(&self.pool)
        .await?;

        self.check_transition(file_path, FileStatus::Uploading, result.rows_affected())
            .await
    }

    /// Transition to `Success` with the content identifier. Terminal.
    pub async fn mark_success(&self, file_path: &str, cid: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE file_status SET status = ?, cid = ?, updated_at = ?
            WHERE file_path = ? AND status IN ('Found', 'Uploading')
            "#,
        )
        .bind(FileStatus::Success.as_str())
        .bind(cid)
        .bind(Self::now_millis())
        .bind(file_path)
        .execute(&self.pool)
        .await?;

        self.check_transition(file_path, FileStatus::Success, result.rows_affected())
            .await
    }

    /// Transition to `Error` with a message. Terminal.
    pub async fn mark_error(&self, file_path: &str, message: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE file_status SET status = ?, error = ?, updated_at = ?
            WHERE file_path = ? AND status IN ('Found', 'Uploading')
            "#,
        )
        .bind(FileStatus::Error.as_str())
        .bind(message)
        .bind(Self::now_millis())
        .bind(file_path)
        .execute(&self.pool)
        .await?;

        self.check_transition(file_path, FileStatus::Error, result.rows_affected())
            .await
    }

    /// List records in a given status, most recently updated first.
    pub async fn list_by_status(
        &self,
        status: FileStatus,
        limit: Option<u32>,
    ) -> Result<Vec<FileStatusRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM file_status WHERE status = ? ORDER BY updated_at DESC, id DESC LIMIT ?"
        ))
        .bind(status.as_str())
        .bind(limit.map(i64::from).unwrap_or(-1))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }

    /// Count tracked files per status.
    pub async fn status_counts(&self) -> Result<StatusCounts> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM file_status GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut counts = StatusCounts::default();
        for row in &rows {
            let status: String = row.get("status");
            let n = row.get::<i64, _>("n") as u64;
            match FileStatus::parse(&status) {
                Some(FileStatus::Found) => counts.found = n,
                Some(FileStatus::Uploading) => counts.uploading = n,
                Some(FileStatus::Success) => counts.success = n,
                Some(FileStatus::Error) => counts.error = n,
                None => {
                    return Err(DbError::invalid_state(format!(
                        "Unknown file status: {status}"
                    )))
                }
            }
        }
        Ok(counts)
    }

    /// Explain why a guarded UPDATE touched no row.
    async fn check_transition(&self, file_path: &str, to: FileStatus, rows: u64) -> Result<()> {
        if rows > 0 {
            debug!(path = file_path, status = %to, "File status updated");
            return Ok(());
        }
        match self.get(file_path).await? {
            None => Err(DbError::not_found(format!("file not tracked: {file_path}"))),
            Some(record) => Err(DbError::invalid_state(format!(
                "cannot move {file_path} from {} to {to}",
                record.status
            ))),
        }
    }
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<FileStatusRecord> {
    let status_str: String = row.get("status");
    let status = FileStatus::parse(&status_str)
        .ok_or_else(|| DbError::invalid_state(format!("Unknown file status: {status_str}")))?;

    Ok(FileStatusRecord {
        file_path: row.get("file_path"),
        status,
        sha256: row.get("sha256"),
        cid: row.get("cid"),
        error: row.get("error"),
        created_at: CustodyDb::millis_to_datetime(row.get("created_at")),
        updated_at: CustodyDb::millis_to_datetime(row.get("updated_at")),
    })
}
