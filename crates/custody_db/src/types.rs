//! Row types for the Custody state database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// File Status
// ============================================================================

/// Ingestion state of a tracked file path.
///
/// `Success` and `Error` are terminal: once written they are never
/// overwritten by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileStatus {
    Found,
    Uploading,
    Success,
    Error,
}

impl FileStatus {
    pub const ALL: [FileStatus; 4] = [
        FileStatus::Found,
        FileStatus::Uploading,
        FileStatus::Success,
        FileStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Found => "Found",
            Self::Uploading => "Uploading",
            Self::Success => "Success",
            Self::Error => "Error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Found" => Some(Self::Found),
            "Uploading" => Some(Self::Uploading),
            "Success" => Some(Self::Success),
            "Error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row of `file_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStatusRecord {
    pub file_path: String,
    pub status: FileStatus,
    /// Primary content digest (SHA-256 hex), set when uploading begins
    pub sha256: Option<String>,
    /// Content identifier, set on success only
    pub cid: Option<String>,
    /// Error message, set on failure only
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Number of tracked files in each status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub found: u64,
    pub uploading: u64,
    pub success: u64,
    pub error: u64,
}

impl StatusCounts {
    pub fn total(&self) -> u64 {
        self.found + self.uploading + self.success + self.error
    }

    pub fn get(&self, status: FileStatus) -> u64 {
        match status {
            FileStatus::Found => self.found,
            FileStatus::Uploading => self.uploading,
            FileStatus::Success => self.success,
            FileStatus::Error => self.error,
        }
    }
}

// ============================================================================
// Projects
// ============================================================================

/// Author descriptor attached to every asset of a project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub author_type: Option<String>,
    pub name: Option<String>,
    pub identifier: Option<String>,
}

impl Author {
    /// True when no subfield carries a non-empty value.
    pub fn is_empty(&self) -> bool {
        [&self.author_type, &self.name, &self.identifier]
            .iter()
            .all(|field| field.as_deref().map_or(true, str::is_empty))
    }
}

/// One row of `project_metadata`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    /// Unique project identifier
    pub project_id: String,
    /// Project root, relative to the sync root unless absolute
    pub project_path: String,
    #[serde(default)]
    pub author: Author,
    /// Extension allow-list override (".ext" form); `None` = no override
    #[serde(default)]
    pub file_extensions: Option<Vec<String>>,
}
