//! Custody - durable file ingestion for digital evidence
//!
//! Custody watches sync folders, fingerprints every qualifying file,
//! extracts provenance metadata (including from signed capture bundles and
//! web-archive bundles) and uploads each file with its metadata to a
//! content-addressing backend. A per-file status row makes the whole thing
//! resumable: restarts never lose a file and never re-upload a finished one.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐    ┌─────────────┐    ┌──────────────┐    ┌────────────┐
//! │  Scanner /  │    │   Status    │    │  Classifier  │    │  Uploader  │
//! │  Watcher    │───▶│   Store     │───▶│ + Fingerprint│───▶│ (multipart │
//! │ (discovery) │    │  (claim)    │    │  (metadata)  │    │  stream)   │
//! └─────────────┘    └─────────────┘    └──────────────┘    └─────┬──────┘
//!                           ▲                                     │
//!                           └──────── Success(cid) / Error ───────┘
//! ```
//!
//! # Core Concepts
//!
//! - **Sync root**: the directory tree Custody treats as its ingestion source
//! - **Project**: a sub-tree of the sync root with its own author descriptor
//!   and optional extension allow-list
//! - **Claim**: the first write of a path's status row; later encounters of
//!   the same path replay from that row instead of re-uploading

pub mod bundle;
pub mod classify;
pub mod config;
pub mod error;
pub mod filter;
pub mod fingerprint;
pub mod metadata;
pub mod pipeline;
pub mod project;
pub mod scanner;
pub mod service;
pub mod upload;
pub mod watcher;

// Re-exports for convenience
pub use bundle::{BundleVerifier, StructuralVerifier, VerifyError};
pub use classify::{Classifier, FileKind};
pub use config::{CustodyConfig, ProjectConfig, SyncConfig, WebhookConfig};
pub use error::{IngestError, Result};
pub use filter::InclusionFilter;
pub use fingerprint::{fingerprint_file, Fingerprint};
pub use metadata::{FileMetadata, MetadataValue};
pub use pipeline::{Ingestor, Outcome};
pub use project::{ProjectRegistry, ProjectScope};
pub use scanner::{initial_scan, ScanResult};
pub use service::{ScanSummary, SyncService};
pub use upload::{MetadataFormat, UploadError, UploadOptions, UploadSource, Uploader, WebhookUploader};
pub use watcher::{DirectoryWatcher, WatchEvent};
