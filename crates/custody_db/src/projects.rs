//! Project metadata operations

use crate::error::{DbError, Result};
use crate::types::{Author, ProjectRecord};
use crate::CustodyDb;
use sqlx::Row;

impl CustodyDb {
    /// Insert or update a project, keyed by `project_id`.
    ///
    /// Fails with [`DbError::Constraint`] if another project already owns
    /// the same root path.
    pub async fn upsert_project(&self, project: &ProjectRecord) -> Result<()> {
        let extensions_json = project
            .file_extensions
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let now = Self::now_millis();

        sqlx::query(
            r#"
            INSERT INTO project_metadata (
                project_id, project_path, author_type, author_name, author_identifier,
                file_extensions, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(project_id) DO UPDATE SET
                project_path = excluded.project_path,
                author_type = excluded.author_type,
                author_name = excluded.author_name,
                author_identifier = excluded.author_identifier,
                file_extensions = excluded.file_extensions,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&project.project_id)
        .bind(&project.project_path)
        .bind(&project.author.author_type)
        .bind(&project.author.name)
        .bind(&project.author.identifier)
        .bind(&extensions_json)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DbError::from_insert(e, || {
                format!("project path already registered: {}", project.project_path)
            })
        })?;

        Ok(())
    }

    /// Get a project by ID
    pub async fn get_project(&self, project_id: &str) -> Result<Option<ProjectRecord>> {
        let row = sqlx::query(
            "SELECT project_id, project_path, author_type, author_name, author_identifier, file_extensions FROM project_metadata WHERE project_id = ?",
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_project).transpose()
    }

    /// List all projects
    pub async fn list_projects(&self) -> Result<Vec<ProjectRecord>> {
        let rows = sqlx::query(
            "SELECT project_id, project_path, author_type, author_name, author_identifier, file_extensions FROM project_metadata ORDER BY project_id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_project).collect()
    }

    /// Delete a project. Tracked file records are kept.
    pub async fn delete_project(&self, project_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM project_metadata WHERE project_id = ?")
            .bind(project_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn row_to_project(row: &sqlx::sqlite::SqliteRow) -> Result<ProjectRecord> {
    let extensions_json: Option<String> = row.get("file_extensions");
    let file_extensions = extensions_json
        .as_deref()
        .map(serde_json::from_str::<Vec<String>>)
        .transpose()?;

    Ok(ProjectRecord {
        project_id: row.get("project_id"),
        project_path: row.get("project_path"),
        author: Author {
            author_type: row.get("author_type"),
            name: row.get("author_name"),
            identifier: row.get("author_identifier"),
        },
        file_extensions,
    })
}
