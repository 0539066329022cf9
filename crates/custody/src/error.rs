//! Error types for the ingestion pipeline

use crate::bundle::VerifyError;
use crate::fingerprint::FingerprintError;
use crate::scanner::ScanError;
use crate::upload::UploadError;
use std::io;
use thiserror::Error;

/// Everything that can stop one file (or one scan) from being ingested.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Store error: {0}")]
    Store(#[from] custody_db::DbError),

    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("Fingerprint error: {0}")]
    Fingerprint(#[from] FingerprintError),

    #[error("Bundle verification failed: {0}")]
    Verify(#[from] VerifyError),

    #[error("Upload failed: {0}")]
    Upload(#[from] UploadError),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Config error: {0}")]
    Config(String),

    /// The path was already recorded as failed; it is not retried.
    #[error("file {path} has error: {message}")]
    PreviouslyFailed { path: String, message: String },

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, IngestError>;

impl From<tokio::task::JoinError> for IngestError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}
