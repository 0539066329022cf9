//! Sync and scan commands
//!
//! `custody sync` runs the initial scan and then the watch loop until
//! Ctrl-C; `custody scan` stops after the initial scan.

use crate::cli::output::print_table;
use anyhow::{Context, Result};
use custody::{
    CustodyConfig, InclusionFilter, Ingestor, ProjectRegistry, ScanSummary, StructuralVerifier,
    SyncService, WebhookUploader,
};
use custody_db::CustodyDb;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Arguments for the sync and scan commands
#[derive(Debug)]
pub struct SyncArgs {
    pub config: CustodyConfig,
    /// Keep watching after the initial scan
    pub watch: bool,
    pub json: bool,
}

/// Execute the sync or scan command
pub fn run(args: SyncArgs) -> Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?;

    rt.block_on(run_async(args))
}

async fn run_async(args: SyncArgs) -> Result<()> {
    let config = args.config;

    let sync_root = std::fs::canonicalize(&config.sync.root).with_context(|| {
        format!("Sync root not found: {}", config.sync.root.display())
    })?;

    let db = CustodyDb::open(&config.database_path)
        .await
        .with_context(|| format!("Failed to open database: {}", config.database_path.display()))?;

    for project in &config.projects {
        db.upsert_project(&project.to_record())
            .await
            .with_context(|| format!("Failed to register project '{}'", project.id))?;
    }

    let registry = ProjectRegistry::load(&db, &sync_root)
        .await
        .context("Failed to load projects")?;
    info!(
        sync_root = %sync_root.display(),
        projects = registry.scopes().len(),
        "Starting"
    );

    let uploader = WebhookUploader::new(&config.webhook).context("Failed to build HTTP client")?;
    let ingestor = Ingestor::new(
        db.clone(),
        registry.sync_root(),
        Arc::new(uploader),
        Arc::new(StructuralVerifier::new()),
    );
    let service = SyncService::new(ingestor, registry, InclusionFilter::from_config(&config.sync));

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received, finishing current file");
                cancel.cancel();
            }
        })
    };

    let summary = if args.watch {
        service.run(cancel).await.context("Watch loop failed")?
    } else {
        service.initial_scan(&cancel).await
    };
    ctrl_c.abort();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    db.close().await;
    Ok(())
}

fn print_summary(summary: &ScanSummary) {
    print_table(
        &["Outcome", "Files"],
        vec![
            vec!["Uploaded".to_string(), summary.uploaded.to_string()],
            vec![
                "Already uploaded".to_string(),
                summary.already_uploaded.to_string(),
            ],
            vec!["Skipped".to_string(), summary.skipped.to_string()],
            vec!["Failed".to_string(), summary.failed.to_string()],
        ],
    );
    if summary.failed_roots > 0 {
        println!("{} scan root(s) could not be walked; see the log", summary.failed_roots);
    }
}
