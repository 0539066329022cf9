//! Project command - register and list projects

use crate::cli::current_thread_runtime;
use crate::cli::output::print_table;
use anyhow::{bail, Context, Result};
use clap::Subcommand;
use custody::filter::normalize_extension;
use custody::CustodyConfig;
use custody_db::{Author, CustodyDb, ProjectRecord};

#[derive(Subcommand, Debug)]
pub enum ProjectAction {
    /// Register a project or replace an existing one
    Add {
        /// Project identifier
        id: String,

        /// Project root, relative to the sync root unless absolute
        path: String,

        /// Author type, e.g. Person or Organization
        #[arg(long)]
        author_type: Option<String>,

        #[arg(long)]
        author_name: Option<String>,

        #[arg(long)]
        author_identifier: Option<String>,

        /// Extension allow-list for this project (comma-separated)
        #[arg(long, value_delimiter = ',')]
        extensions: Option<Vec<String>>,
    },

    /// List registered projects
    List {
        #[arg(long)]
        json: bool,
    },

    /// Remove a project (tracked files are kept)
    Remove { id: String },
}

/// Execute a project subcommand
pub fn run(action: ProjectAction, config: &CustodyConfig) -> Result<()> {
    let db_path = config.database_path.clone();
    let rt = current_thread_runtime()?;
    rt.block_on(async {
        let db = CustodyDb::open(&db_path)
            .await
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
        let result = run_async(action, &db).await;
        db.close().await;
        result
    })
}

async fn run_async(action: ProjectAction, db: &CustodyDb) -> Result<()> {
    match action {
        ProjectAction::Add {
            id,
            path,
            author_type,
            author_name,
            author_identifier,
            extensions,
        } => {
            let record = build_record(
                id,
                path,
                Author {
                    author_type,
                    name: author_name,
                    identifier: author_identifier,
                },
                extensions,
            )?;
            db.upsert_project(&record).await?;
            println!("Project '{}' -> {}", record.project_id, record.project_path);
        }

        ProjectAction::List { json } => {
            let projects = db.list_projects().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&projects)?);
            } else if projects.is_empty() {
                println!("No projects registered");
            } else {
                let rows = projects.iter().map(project_row).collect();
                print_table(&["ID", "Path", "Author", "Extensions"], rows);
            }
        }

        ProjectAction::Remove { id } => {
            if !db.delete_project(&id).await? {
                bail!("Project not found: {}", id);
            }
            println!("Removed project '{}'", id);
        }
    }
    Ok(())
}

fn build_record(
    id: String,
    path: String,
    author: Author,
    extensions: Option<Vec<String>>,
) -> Result<ProjectRecord> {
    if id.trim().is_empty() {
        bail!("Project id must not be empty");
    }
    if path.trim().is_empty() {
        bail!("Project path must not be empty");
    }
    let file_extensions = extensions.map(|list| {
        list.iter()
            .map(|ext| normalize_extension(ext))
            .filter(|ext| ext.len() > 1)
            .collect::<Vec<_>>()
    });
    Ok(ProjectRecord {
        project_id: id,
        project_path: path,
        author,
        file_extensions,
    })
}

fn project_row(project: &ProjectRecord) -> Vec<String> {
    let author = [
        &project.author.author_type,
        &project.author.name,
        &project.author.identifier,
    ]
    .iter()
    .filter_map(|field| field.as_deref())
    .filter(|value| !value.is_empty())
    .collect::<Vec<_>>()
    .join(" / ");

    let extensions = match &project.file_extensions {
        Some(list) => list.join(", "),
        None => "-".to_string(),
    };

    vec![
        project.project_id.clone(),
        project.project_path.clone(),
        if author.is_empty() { "-".to_string() } else { author },
        extensions,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_record_normalizes_extensions() {
        let record = build_record(
            "field".to_string(),
            "Field".to_string(),
            Author::default(),
            Some(vec!["JPG".to_string(), ".mp4".to_string(), "".to_string()]),
        )
        .unwrap();
        assert_eq!(
            record.file_extensions,
            Some(vec![".jpg".to_string(), ".mp4".to_string()])
        );
    }

    #[test]
    fn test_build_record_rejects_empty_id() {
        assert!(build_record(" ".to_string(), "x".to_string(), Author::default(), None).is_err());
    }

    #[test]
    fn test_project_row_joins_author_fields() {
        let record = ProjectRecord {
            project_id: "field".to_string(),
            project_path: "Field".to_string(),
            author: Author {
                author_type: Some("Person".to_string()),
                name: Some("Ada".to_string()),
                identifier: None,
            },
            file_extensions: None,
        };
        assert_eq!(
            project_row(&record),
            vec!["field", "Field", "Person / Ada", "-"]
        );
    }
}
