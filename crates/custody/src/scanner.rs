//! Initial recursive scan of a sync tree

use crate::filter::InclusionFilter;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("scan root {0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("walk failed: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Qualifying files and every directory visited (future watch targets).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub files: Vec<PathBuf>,
    pub directories: Vec<PathBuf>,
}

/// Walk `root`, collecting qualifying files and all non-hidden directories.
///
/// Hidden directories below the root are pruned. Any walk error aborts the
/// scan. Output is in file-name order.
pub fn initial_scan(root: &Path, filter: &InclusionFilter) -> Result<ScanResult, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }

    let mut result = ScanResult::default();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !filter.is_hidden(&entry.file_name().to_string_lossy())
        });

    for entry in walker {
        let entry = entry?;
        let file_type = entry.file_type();
        if file_type.is_dir() {
            result.directories.push(entry.into_path());
        } else if file_type.is_file() && filter.includes(entry.path()) {
            result.files.push(entry.into_path());
        }
    }

    debug!(
        root = %root.display(),
        files = result.files.len(),
        directories = result.directories.len(),
        "Initial scan complete"
    );
    Ok(result)
}
