//! Status command - inspect the state database

use crate::cli::current_thread_runtime;
use crate::cli::output::{format_time, print_table, print_table_colored, short_digest, status_color};
use anyhow::{bail, Context, Result};
use custody::CustodyConfig;
use custody_db::{CustodyDb, FileStatus, FileStatusRecord};
use std::path::{Path, PathBuf};

/// Arguments for the status command
#[derive(Debug)]
pub struct StatusArgs {
    pub path: Option<PathBuf>,
    pub status: Option<String>,
    pub limit: u32,
    pub json: bool,
}

/// Execute the status command
pub fn run(args: StatusArgs, config: &CustodyConfig) -> Result<()> {
    let db_path = config.database_path.clone();
    if !db_path.exists() {
        bail!(
            "Database not found: {}\n\nRun 'custody scan' or 'custody sync' first.",
            db_path.display()
        );
    }

    let rt = current_thread_runtime()?;
    rt.block_on(async {
        let db = CustodyDb::open_existing(&db_path)
            .await
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
        let result = run_async(args, &db).await;
        db.close().await;
        result
    })
}

async fn run_async(args: StatusArgs, db: &CustodyDb) -> Result<()> {
    if let Some(path) = &args.path {
        return show_file(db, path, args.json).await;
    }

    if let Some(status) = &args.status {
        let status = parse_status(status)?;
        let records = db.list_by_status(status, Some(args.limit)).await?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&records)?);
        } else if records.is_empty() {
            println!("No files in status {}", status);
        } else {
            print_records(&records);
        }
        return Ok(());
    }

    let counts = db.status_counts().await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&counts)?);
        return Ok(());
    }

    let mut rows: Vec<Vec<(String, Option<comfy_table::Color>)>> = FileStatus::ALL
        .iter()
        .map(|&status| {
            vec![
                (status.to_string(), Some(status_color(status))),
                (counts.get(status).to_string(), None),
            ]
        })
        .collect();
    rows.push(vec![
        ("Total".to_string(), None),
        (counts.total().to_string(), None),
    ]);
    print_table_colored(&["Status", "Files"], rows);
    Ok(())
}

async fn show_file(db: &CustodyDb, path: &Path, json: bool) -> Result<()> {
    // Keys are absolute paths under the canonical sync root
    let key = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let key = key.to_string_lossy();

    let Some(record) = db.get(&key).await? else {
        if json {
            println!("null");
        } else {
            println!("{} is not tracked", key);
        }
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    let mut rows = vec![
        vec!["Path".to_string(), record.file_path.clone()],
        vec!["Status".to_string(), record.status.to_string()],
    ];
    if let Some(sha256) = &record.sha256 {
        rows.push(vec!["SHA-256".to_string(), sha256.clone()]);
    }
    if let Some(cid) = &record.cid {
        rows.push(vec!["CID".to_string(), cid.clone()]);
    }
    if let Some(error) = &record.error {
        rows.push(vec!["Error".to_string(), error.clone()]);
    }
    rows.push(vec!["First seen".to_string(), format_time(record.created_at)]);
    rows.push(vec!["Updated".to_string(), format_time(record.updated_at)]);
    print_table(&["Field", "Value"], rows);
    Ok(())
}

fn print_records(records: &[FileStatusRecord]) {
    let rows = records
        .iter()
        .map(|record| {
            let detail = match record.status {
                FileStatus::Success => record.cid.clone().unwrap_or_default(),
                FileStatus::Error => record.error.clone().unwrap_or_default(),
                _ => record
                    .sha256
                    .as_deref()
                    .map(short_digest)
                    .unwrap_or_default(),
            };
            vec![
                (record.file_path.clone(), None),
                (record.status.to_string(), Some(status_color(record.status))),
                (detail, None),
                (format_time(record.updated_at), None),
            ]
        })
        .collect();
    print_table_colored(&["Path", "Status", "Detail", "Updated"], rows);
}

/// Case-insensitive status name.
fn parse_status(input: &str) -> Result<FileStatus> {
    match FileStatus::ALL
        .iter()
        .find(|s| s.as_str().eq_ignore_ascii_case(input))
    {
        Some(status) => Ok(*status),
        None => bail!(
            "Unknown status '{}'. Expected one of: found, uploading, success, error",
            input
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status_ignores_case() {
        assert_eq!(parse_status("error").unwrap(), FileStatus::Error);
        assert_eq!(parse_status("SUCCESS").unwrap(), FileStatus::Success);
        assert_eq!(parse_status("Found").unwrap(), FileStatus::Found);
        assert!(parse_status("done").is_err());
    }
}
