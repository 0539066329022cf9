//! End-to-end tests for per-file ingestion against a real state database.

mod common;

use common::{
    archive_bundle_entries, signed_bundle_entries, write_zip, CountingVerifier, Harness,
    RecordingUploader,
};
use custody::metadata::keys;
use custody::{
    IngestError, MetadataFormat, MetadataValue, Outcome, ProjectScope, StructuralVerifier,
    UploadSource,
};
use custody_db::{Author, FileStatus, ProjectRecord};
use std::sync::Arc;

fn field_project(root: &std::path::Path, extensions: Option<Vec<String>>) -> ProjectScope {
    ProjectScope::new(
        root,
        ProjectRecord {
            project_id: "field".to_string(),
            project_path: "Field".to_string(),
            author: Author {
                author_type: Some("Person".to_string()),
                name: Some("Ada".to_string()),
                identifier: None,
            },
            file_extensions: extensions,
        },
    )
}

// ============================================================================
// Generic files
// ============================================================================

#[tokio::test]
async fn test_generic_file_uploaded_and_marked_success() {
    let h = Harness::new().await;
    let path = h.write("note.txt", b"hello");
    let uploader = Arc::new(RecordingUploader::new());
    let ingestor = h.ingestor(uploader.clone(), Arc::new(StructuralVerifier::new()));

    let outcome = ingestor.handle_file(&path, None).await.unwrap();
    assert_eq!(outcome, Outcome::Uploaded { cid: "bafy1".to_string() });

    let calls = uploader.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].source, UploadSource::File(path.clone()));
    assert_eq!(calls[0].options.format, MetadataFormat::Json);
    assert_eq!(calls[0].options.project_id, None);
    assert_eq!(calls[0].metadata.get_str(keys::ASSET_ORIGIN), Some("note.txt"));
    assert_eq!(
        calls[0].metadata.get_str(keys::SHA256),
        Some("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824")
    );

    let record = h.db.get(&path.to_string_lossy()).await.unwrap().unwrap();
    assert_eq!(record.status, FileStatus::Success);
    assert_eq!(record.cid.as_deref(), Some("bafy1"));
    assert_eq!(
        record.sha256.as_deref(),
        Some("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824")
    );
}

#[tokio::test]
async fn test_success_replay_sends_nothing() {
    let h = Harness::new().await;
    let path = h.write("note.txt", b"hello");
    let uploader = Arc::new(RecordingUploader::new());
    let ingestor = h.ingestor(uploader.clone(), Arc::new(StructuralVerifier::new()));

    ingestor.handle_file(&path, None).await.unwrap();
    let replay = ingestor.handle_file(&path, None).await.unwrap();

    assert_eq!(replay, Outcome::AlreadyUploaded { cid: "bafy1".to_string() });
    assert_eq!(uploader.count(), 1);
}

#[tokio::test]
async fn test_found_and_uploading_rows_are_processed_again() {
    let h = Harness::new().await;
    let found = h.write("found.txt", b"one");
    let interrupted = h.write("interrupted.txt", b"two");
    let uploader = Arc::new(RecordingUploader::new());
    let ingestor = h.ingestor(uploader.clone(), Arc::new(StructuralVerifier::new()));

    h.db.claim_or_get(&found.to_string_lossy()).await.unwrap();
    let key = interrupted.to_string_lossy();
    h.db.claim_or_get(&key).await.unwrap();
    h.db.mark_uploading(&key, "stale").await.unwrap();

    assert!(matches!(
        ingestor.handle_file(&found, None).await.unwrap(),
        Outcome::Uploaded { .. }
    ));
    assert!(matches!(
        ingestor.handle_file(&interrupted, None).await.unwrap(),
        Outcome::Uploaded { .. }
    ));
    assert_eq!(uploader.count(), 2);

    let record = h.db.get(&key).await.unwrap().unwrap();
    assert_eq!(record.status, FileStatus::Success);
    assert_eq!(record.sha256.as_deref(), Some(common::sha256_hex(b"two").as_str()));
}

#[tokio::test]
async fn test_rejected_upload_is_terminal() {
    let h = Harness::new().await;
    let path = h.write("note.txt", b"hello");
    let uploader = Arc::new(RecordingUploader::rejecting(400));
    let ingestor = h.ingestor(uploader.clone(), Arc::new(StructuralVerifier::new()));

    let err = ingestor.handle_file(&path, None).await.unwrap_err();
    assert!(matches!(err, IngestError::Upload(_)));

    let record = h.db.get(&path.to_string_lossy()).await.unwrap().unwrap();
    assert_eq!(record.status, FileStatus::Error);
    assert!(record.error.unwrap().contains("HTTP 400"));

    // Never retried
    let replay = ingestor.handle_file(&path, None).await.unwrap_err();
    assert!(matches!(replay, IngestError::PreviouslyFailed { .. }));
    assert_eq!(uploader.count(), 1);
}

// ============================================================================
// Projects
// ============================================================================

#[tokio::test]
async fn test_project_extension_override_skips_without_claim() {
    let h = Harness::new().await;
    let path = h.write("Field/notes.txt", b"hello");
    let scope = field_project(&h.root, Some(vec![".jpg".to_string()]));
    let uploader = Arc::new(RecordingUploader::new());
    let ingestor = h.ingestor(uploader.clone(), Arc::new(StructuralVerifier::new()));

    let outcome = ingestor.handle_file(&path, Some(&scope)).await.unwrap();
    assert_eq!(outcome, Outcome::Skipped);
    assert_eq!(uploader.count(), 0);
    assert!(h.db.get(&path.to_string_lossy()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_project_fields_and_routing() {
    let h = Harness::new().await;
    let path = h.write("Field/site/photo.txt", b"not really a photo");
    let scope = field_project(&h.root, None);
    let uploader = Arc::new(RecordingUploader::new());
    let ingestor = h.ingestor(uploader.clone(), Arc::new(StructuralVerifier::new()));

    ingestor.handle_file(&path, Some(&scope)).await.unwrap();

    let call = &uploader.calls()[0];
    assert_eq!(call.options.project_id.as_deref(), Some("field"));
    assert_eq!(call.metadata.get_str(keys::PROJECT_ID), Some("field"));
    assert_eq!(
        call.metadata.get_str(keys::ASSET_ORIGIN),
        Some("Field/site/photo.txt")
    );
    let author = call.metadata.get(keys::AUTHOR).and_then(MetadataValue::as_map).unwrap();
    assert_eq!(author.get("@type").and_then(MetadataValue::as_str), Some("Person"));
    assert_eq!(author.get("name").and_then(MetadataValue::as_str), Some("Ada"));
    assert!(!author.contains_key("identifier"));
}

// ============================================================================
// Signed bundles
// ============================================================================

#[tokio::test]
async fn test_signed_bundle_uploads_each_asset() {
    let h = Harness::new().await;
    let path = h.root.join("Field/capture.zip");
    write_zip(
        &path,
        &signed_bundle_entries(&[("a.jpg", b"first image"), ("b.jpg", b"second image")], true),
    );
    let scope = field_project(&h.root, None);
    let uploader = Arc::new(RecordingUploader::new());
    let ingestor = h.ingestor(uploader.clone(), Arc::new(StructuralVerifier::new()));

    let outcome = ingestor.handle_file(&path, Some(&scope)).await.unwrap();
    assert_eq!(outcome, Outcome::Uploaded { cid: "bafy2".to_string() });

    let calls = uploader.calls();
    assert_eq!(calls.len(), 2);

    let mut origins: Vec<_> = calls
        .iter()
        .map(|c| c.metadata.get_str(keys::ASSET_ORIGIN).unwrap().to_string())
        .collect();
    origins.sort();
    assert_eq!(
        origins,
        vec![
            "Field/capture.zip/sdcard/DCIM/a.jpg",
            "Field/capture.zip/sdcard/DCIM/b.jpg"
        ]
    );

    for call in &calls {
        assert_eq!(call.options.format, MetadataFormat::Cbor);
        assert_eq!(call.options.project_id.as_deref(), Some("field"));
        assert_eq!(call.metadata.get(keys::AUTHOR), calls[0].metadata.get(keys::AUTHOR));
        assert!(call.metadata.contains_key(keys::PROOFMODE));
        match &call.source {
            UploadSource::BundleEntry { archive, entry } => {
                assert_eq!(archive, &path);
                assert_eq!(
                    Some(entry.as_str()),
                    call.metadata.get_str(keys::FILE_NAME)
                );
            }
            other => panic!("expected bundle entry source, got {other:?}"),
        }
    }

    let record = h.db.get(&path.to_string_lossy()).await.unwrap().unwrap();
    assert_eq!(record.status, FileStatus::Success);
    assert_eq!(record.cid.as_deref(), Some("bafy2"));
}

#[tokio::test]
async fn test_unverifiable_bundle_fails_once_and_replays_error() {
    let h = Harness::new().await;
    let path = h.root.join("capture.zip");
    write_zip(&path, &signed_bundle_entries(&[("a.jpg", b"first image")], false));
    let uploader = Arc::new(RecordingUploader::new());
    let verifier = Arc::new(CountingVerifier::default());
    let ingestor = h.ingestor(uploader.clone(), verifier.clone());

    let err = ingestor.handle_file(&path, None).await.unwrap_err();
    assert!(matches!(err, IngestError::Verify(_)));
    let message = err.to_string();
    assert!(message.contains("Bundle verification failed"));

    let record = h.db.get(&path.to_string_lossy()).await.unwrap().unwrap();
    assert_eq!(record.status, FileStatus::Error);
    assert_eq!(record.error.as_deref(), Some(message.as_str()));

    match ingestor.handle_file(&path, None).await.unwrap_err() {
        IngestError::PreviouslyFailed { message: stored, .. } => assert_eq!(stored, message),
        other => panic!("expected PreviouslyFailed, got {other:?}"),
    }
    assert_eq!(verifier.verifications(), 1);
    assert_eq!(uploader.count(), 0);
}

// ============================================================================
// Archive bundles
// ============================================================================

#[tokio::test]
async fn test_archive_bundle_uploads_whole_file_with_cbor_metadata() {
    let h = Harness::new().await;
    let path = h.root.join("web/capture.wacz");
    write_zip(&path, &archive_bundle_entries());
    let uploader = Arc::new(RecordingUploader::new());
    let verifier = Arc::new(CountingVerifier::default());
    let ingestor = h.ingestor(uploader.clone(), verifier.clone());

    let outcome = ingestor.handle_file(&path, None).await.unwrap();
    assert_eq!(outcome, Outcome::Uploaded { cid: "bafy1".to_string() });
    assert_eq!(verifier.verifications(), 1);

    let calls = uploader.calls();
    assert_eq!(calls.len(), 1);
    let call = &calls[0];
    assert_eq!(call.source, UploadSource::File(path.clone()));
    assert_eq!(call.options.format, MetadataFormat::Cbor);

    let metadata = &call.metadata;
    assert_eq!(metadata.get_str(keys::MEDIA_TYPE), Some("application/wacz"));
    assert_eq!(metadata.get_str(keys::ASSET_ORIGIN), Some("web/capture.wacz"));
    assert_eq!(metadata.get_str(keys::FILE_NAME), Some("capture.wacz"));
    assert_eq!(metadata.get_str(keys::LAST_MODIFIED), Some("2024-01-02T03:05:00Z"));
    assert_eq!(metadata.get_str(keys::TIME_CREATED), Some("2024-01-02T03:04:05Z"));
    assert_eq!(
        metadata.get_str(keys::ASSET_SIGNATURE),
        Some(hex::encode(b"archive-signature").as_str())
    );
    // Generic attributes of the container survive the overlay
    let container_sha = common::sha256_hex(&std::fs::read(&path).unwrap());
    assert_eq!(metadata.get_str(keys::SHA256), Some(container_sha.as_str()));
    assert!(metadata.contains_key(keys::BLAKE3));
    assert!(metadata.contains_key(keys::FILE_SIZE));

    let wacz = metadata.get(keys::WACZ).and_then(MetadataValue::as_map).unwrap();
    assert_eq!(
        wacz.get("meta_sig").and_then(MetadataValue::as_bytes),
        Some(&b"archive-signature"[..])
    );
    assert_eq!(
        wacz.get("pubkey").and_then(MetadataValue::as_bytes),
        Some(&b"archive-key"[..])
    );
    assert!(wacz.contains_key("metadata"));

    let record = h.db.get(&path.to_string_lossy()).await.unwrap().unwrap();
    assert_eq!(record.status, FileStatus::Success);
    assert_eq!(record.cid.as_deref(), Some("bafy1"));
    assert_eq!(record.sha256.as_deref(), Some(container_sha.as_str()));
}

#[tokio::test]
async fn test_plain_zip_is_uploaded_as_generic() {
    let h = Harness::new().await;
    let path = h.root.join("photos.zip");
    write_zip(&path, &[("a.jpg".to_string(), b"image".to_vec())]);
    let uploader = Arc::new(RecordingUploader::new());
    let verifier = Arc::new(CountingVerifier::default());
    let ingestor = h.ingestor(uploader.clone(), verifier.clone());

    ingestor.handle_file(&path, None).await.unwrap();

    let calls = uploader.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].options.format, MetadataFormat::Json);
    assert_eq!(calls[0].source, UploadSource::File(path.clone()));
    assert_eq!(verifier.verifications(), 0);
}
