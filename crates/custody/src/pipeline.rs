//! Per-file ingestion
//!
//! [`Ingestor::handle_file`] is the single routine behind both the initial
//! scan and the watch loop. The status row decides what happens:
//!
//! | Stored status | Action                                          |
//! |---------------|-------------------------------------------------|
//! | (none)        | claim as `Found`, then process                  |
//! | `Found`       | process                                         |
//! | `Uploading`   | interrupted earlier; process again from scratch |
//! | `Success`     | return the stored cid, no upload                |
//! | `Error`       | return the stored error, no retry               |

use crate::bundle::BundleVerifier;
use crate::classify::{annotate_project, Classifier, Extraction};
use crate::error::{IngestError, Result};
use crate::metadata::keys;
use crate::project::ProjectScope;
use crate::upload::{UploadError, UploadOptions, Uploader};
use custody_db::{CustodyDb, FileStatus};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Result of handling one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Uploaded during this call
    Uploaded { cid: String },
    /// Found in `Success` state; nothing sent
    AlreadyUploaded { cid: String },
    /// Excluded by the owning project's extension allow-list
    Skipped,
}

impl Outcome {
    pub fn cid(&self) -> Option<&str> {
        match self {
            Self::Uploaded { cid } | Self::AlreadyUploaded { cid } => Some(cid),
            Self::Skipped => None,
        }
    }
}

#[derive(Clone)]
pub struct Ingestor {
    db: CustodyDb,
    classifier: Classifier,
    uploader: Arc<dyn Uploader>,
}

impl Ingestor {
    pub fn new(
        db: CustodyDb,
        sync_root: impl Into<PathBuf>,
        uploader: Arc<dyn Uploader>,
        verifier: Arc<dyn BundleVerifier>,
    ) -> Self {
        Self {
            db,
            classifier: Classifier::new(sync_root, verifier),
            uploader,
        }
    }

    pub fn db(&self) -> &CustodyDb {
        &self.db
    }

    /// Ingest one file, replaying from its status row when it has one.
    pub async fn handle_file(&self, path: &Path, project: Option<&ProjectScope>) -> Result<Outcome> {
        if let Some(scope) = project {
            if !scope.allows(path) {
                return Ok(Outcome::Skipped);
            }
        }

        let key = path.to_string_lossy().into_owned();
        info!(path = %key, "Found file");

        let record = self.db.claim_or_get(&key).await?;
        match record.status {
            FileStatus::Success => {
                let cid = record.cid.unwrap_or_default();
                info!(path = %key, cid = %cid, "Already uploaded");
                return Ok(Outcome::AlreadyUploaded { cid });
            }
            FileStatus::Error => {
                return Err(IngestError::PreviouslyFailed {
                    path: key,
                    message: record.error.unwrap_or_default(),
                });
            }
            FileStatus::Uploading => {
                warn!(path = %key, "Retrying interrupted upload");
            }
            FileStatus::Found => {}
        }

        let extraction = match self.extract(path).await {
            Ok(extraction) => extraction,
            Err(e) => return Err(self.fail(&key, e).await),
        };

        self.db.mark_uploading(&key, &extraction.sha256).await?;
        info!(
            path = %key,
            status = %FileStatus::Uploading,
            kind = %extraction.kind,
            assets = extraction.assets.len(),
            "Uploading"
        );

        let options = UploadOptions {
            source: None,
            project_id: project.map(|scope| scope.id().to_string()),
            format: extraction.kind.metadata_format(),
        };

        let mut last_cid = None;
        for mut asset in extraction.assets {
            if let Some(scope) = project {
                annotate_project(&mut asset.metadata, scope);
            }
            let options = UploadOptions {
                format: asset.format,
                ..options.clone()
            };
            match self
                .uploader
                .upload(&asset.source, &asset.metadata, &options)
                .await
            {
                Ok(cid) => {
                    info!(
                        path = %key,
                        asset_origin = asset.metadata.get_str(keys::ASSET_ORIGIN).unwrap_or_default(),
                        cid = %cid,
                        "Uploaded asset"
                    );
                    last_cid = Some(cid);
                }
                Err(e) => return Err(self.fail(&key, e.into()).await),
            }
        }

        let Some(cid) = last_cid else {
            return Err(self.fail(&key, UploadError::MissingCid.into()).await);
        };

        self.db.mark_success(&key, &cid).await?;
        info!(path = %key, status = %FileStatus::Success, cid = %cid, "Ingested");
        Ok(Outcome::Uploaded { cid })
    }

    async fn extract(&self, path: &Path) -> Result<Extraction> {
        let classifier = self.classifier.clone();
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || classifier.extract(&path)).await?
    }

    /// Record a terminal failure. A failed status write is logged; the
    /// original error is what the caller gets back.
    async fn fail(&self, key: &str, err: IngestError) -> IngestError {
        error!(path = %key, status = %FileStatus::Error, error = %err, "Ingestion failed");
        if let Err(store_err) = self.db.mark_error(key, &err.to_string()).await {
            error!(path = %key, error = %store_err, "Failed to record error status");
        }
        err
    }
}
