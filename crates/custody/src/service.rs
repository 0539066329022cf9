//! Sync service: initial scan, then the watch loop
//!
//! Both phases feed the same [`Ingestor`] one file at a time. The watch loop
//! does not start until every project's initial scan has finished.

use crate::error::{IngestError, Result};
use crate::filter::InclusionFilter;
use crate::pipeline::{Ingestor, Outcome};
use crate::project::ProjectRegistry;
use crate::scanner::initial_scan;
use crate::watcher::{DirectoryWatcher, WatchEvent};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Tally of one initial scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub uploaded: usize,
    pub already_uploaded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Scan roots whose walk failed
    pub failed_roots: usize,
    /// Directories to watch afterwards
    pub directories: Vec<PathBuf>,
}

impl ScanSummary {
    fn record(&mut self, result: &Result<Outcome>) {
        match result {
            Ok(Outcome::Uploaded { .. }) => self.uploaded += 1,
            Ok(Outcome::AlreadyUploaded { .. }) => self.already_uploaded += 1,
            Ok(Outcome::Skipped) => self.skipped += 1,
            Err(_) => self.failed += 1,
        }
    }

    pub fn files(&self) -> usize {
        self.uploaded + self.already_uploaded + self.skipped + self.failed
    }
}

pub struct SyncService {
    ingestor: Ingestor,
    registry: ProjectRegistry,
    filter: InclusionFilter,
}

impl SyncService {
    pub fn new(ingestor: Ingestor, registry: ProjectRegistry, filter: InclusionFilter) -> Self {
        Self {
            ingestor,
            registry,
            filter,
        }
    }

    pub fn registry(&self) -> &ProjectRegistry {
        &self.registry
    }

    /// Scan every project root (or the whole sync root) and ingest each
    /// qualifying file, sequentially. Stops between files once `cancel`
    /// fires.
    pub async fn initial_scan(&self, cancel: &CancellationToken) -> ScanSummary {
        let mut summary = ScanSummary::default();
        let mut seen = HashSet::new();

        for root in self.registry.scan_roots() {
            info!(root = %root.display(), "Scanning");
            let filter = self.filter.clone();
            let walk_root = root.clone();
            let scanned = tokio::task::spawn_blocking(move || initial_scan(&walk_root, &filter))
                .await
                .map_err(IngestError::from)
                .and_then(|r| r.map_err(IngestError::from));

            let scanned = match scanned {
                Ok(scanned) => scanned,
                Err(e) => {
                    error!(root = %root.display(), error = %e, "Initial scan failed");
                    summary.failed_roots += 1;
                    continue;
                }
            };

            for dir in scanned.directories {
                if !summary.directories.contains(&dir) {
                    summary.directories.push(dir);
                }
            }
            for file in scanned.files {
                if cancel.is_cancelled() {
                    info!("Initial scan cancelled");
                    return summary;
                }
                // Nested project roots are walked by their parent too
                if !seen.insert(file.clone()) {
                    continue;
                }
                let result = self.process(&file).await;
                summary.record(&result);
            }
        }

        info!(
            files = summary.files(),
            uploaded = summary.uploaded,
            already_uploaded = summary.already_uploaded,
            failed = summary.failed,
            "Initial scan finished"
        );
        summary
    }

    /// Handle one discovered path. Paths that are gone or are not regular
    /// files by now are skipped quietly.
    pub async fn process(&self, path: &Path) -> Result<Outcome> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                debug!(path = %path.display(), "Not a regular file");
                return Ok(Outcome::Skipped);
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Path vanished before processing");
                return Ok(Outcome::Skipped);
            }
        }

        let scope = self.registry.resolve(path);
        let result = self.ingestor.handle_file(path, scope).await;
        if let Err(e) = &result {
            warn!(path = %path.display(), error = %e, "File not ingested");
        }
        result
    }

    /// Process watch events one at a time until cancelled.
    ///
    /// Cancellation is checked between events; a file in flight finishes
    /// first.
    pub async fn watch(&self, directories: &[PathBuf], cancel: CancellationToken) -> Result<()> {
        let mut watcher = DirectoryWatcher::start(directories, self.filter.clone())?;
        info!(directories = directories.len(), "Watching for new files");

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Watch loop cancelled");
                    break;
                }

                event = watcher.next_event() => {
                    match event {
                        Some(WatchEvent::Appeared(path)) => {
                            // Failures are logged and persisted by `process`
                            let _ = self.process(&path).await;
                        }
                        Some(WatchEvent::Failed(e)) => {
                            warn!(error = %e, "Watcher error");
                        }
                        None => {
                            warn!("Watcher channel closed");
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Initial scan followed by the watch loop.
    pub async fn run(&self, cancel: CancellationToken) -> Result<ScanSummary> {
        let summary = self.initial_scan(&cancel).await;
        if cancel.is_cancelled() {
            return Ok(summary);
        }
        self.watch(&summary.directories, cancel).await?;
        Ok(summary)
    }
}
