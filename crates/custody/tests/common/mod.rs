//! Shared fixtures for the pipeline and service tests.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use custody::bundle::{ArchiveMetadata, SignedAsset};
use custody::{
    BundleVerifier, FileMetadata, Ingestor, StructuralVerifier, UploadError, UploadOptions,
    UploadSource, Uploader, VerifyError,
};
use custody_db::CustodyDb;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

/// One call seen by [`RecordingUploader`].
#[derive(Debug, Clone)]
pub struct UploadCall {
    pub source: UploadSource,
    pub metadata: FileMetadata,
    pub options: UploadOptions,
}

/// Uploader double: records every call and answers with numbered cids.
#[derive(Default)]
pub struct RecordingUploader {
    calls: Mutex<Vec<UploadCall>>,
    fail_with: Option<u16>,
}

impl RecordingUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call is rejected with the given HTTP status.
    pub fn rejecting(status: u16) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_with: Some(status),
        }
    }

    pub fn calls(&self) -> Vec<UploadCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Uploader for RecordingUploader {
    async fn upload(
        &self,
        source: &UploadSource,
        metadata: &FileMetadata,
        options: &UploadOptions,
    ) -> Result<String, UploadError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(UploadCall {
            source: source.clone(),
            metadata: metadata.clone(),
            options: options.clone(),
        });
        match self.fail_with {
            Some(status) => Err(UploadError::Rejected(status)),
            None => Ok(format!("bafy{}", calls.len())),
        }
    }
}

/// Structural verifier that counts verification calls.
#[derive(Default)]
pub struct CountingVerifier {
    inner: StructuralVerifier,
    verifications: AtomicUsize,
}

impl CountingVerifier {
    pub fn verifications(&self) -> usize {
        self.verifications.load(Ordering::SeqCst)
    }
}

impl BundleVerifier for CountingVerifier {
    fn is_signed_bundle(&self, path: &Path) -> bool {
        self.inner.is_signed_bundle(path)
    }

    fn is_archive_bundle(&self, path: &Path) -> bool {
        self.inner.is_archive_bundle(path)
    }

    fn verify_signed_bundle(&self, path: &Path) -> Result<Vec<SignedAsset>, VerifyError> {
        self.verifications.fetch_add(1, Ordering::SeqCst);
        self.inner.verify_signed_bundle(path)
    }

    fn verify_archive_bundle(&self, path: &Path) -> Result<ArchiveMetadata, VerifyError> {
        self.verifications.fetch_add(1, Ordering::SeqCst);
        self.inner.verify_archive_bundle(path)
    }
}

/// Temp sync root plus a fresh database under a separate directory.
pub struct Harness {
    pub tmp: TempDir,
    pub root: PathBuf,
    pub db: CustodyDb,
}

impl Harness {
    pub async fn new() -> Self {
        let tmp = TempDir::new().expect("Failed to create temp dir");
        let root = tmp.path().join("sync");
        std::fs::create_dir_all(&root).unwrap();
        let root = std::fs::canonicalize(&root).unwrap();
        let db = CustodyDb::open(tmp.path().join("state").join("custody.db"))
            .await
            .expect("Failed to open database");
        Self { tmp, root, db }
    }

    pub fn write(&self, rel: &str, data: &[u8]) -> PathBuf {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, data).unwrap();
        path
    }

    pub fn ingestor(
        &self,
        uploader: Arc<dyn Uploader>,
        verifier: Arc<dyn BundleVerifier>,
    ) -> Ingestor {
        Ingestor::new(self.db.clone(), &self.root, uploader, verifier)
    }
}

pub fn write_zip(path: &Path, entries: &[(String, Vec<u8>)]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
    for (name, data) in entries {
        writer
            .start_file(name.as_str(), SimpleFileOptions::default())
            .unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap();
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Entries of a signed capture bundle holding the given media files.
/// `with_media_sig = false` leaves out each media signature.
pub fn signed_bundle_entries(media: &[(&str, &[u8])], with_media_sig: bool) -> Vec<(String, Vec<u8>)> {
    let mut entries = vec![("pubkey.asc".to_string(), b"PUBKEY".to_vec())];
    for (name, data) in media {
        let digest = sha256_hex(data);
        let proof = serde_json::json!({
            "File Path": format!("/sdcard/DCIM/{name}"),
            "File Hash SHA256": digest,
            "File Modified": "2024-03-01T10:00:00Z",
            "File Created": "2024-03-01T09:59:00Z",
        });
        entries.push((name.to_string(), data.to_vec()));
        entries.push((format!("{digest}.proof.json"), proof.to_string().into_bytes()));
        entries.push((format!("{digest}.proof.json.asc"), b"META-SIG".to_vec()));
        if with_media_sig {
            entries.push((format!("{digest}.asc"), format!("SIG-{name}").into_bytes()));
        }
    }
    entries
}

/// Entries of a web-archive bundle whose digest file matches its package.
pub fn archive_bundle_entries() -> Vec<(String, Vec<u8>)> {
    let package = br#"{"profile":"data-package","created":"2024-01-02T03:04:05Z","modified":"2024-01-02T03:05:00Z"}"#;
    let digest = serde_json::json!({
        "path": "datapackage.json",
        "hash": format!("sha256:{}", sha256_hex(package)),
        "signedData": {
            "signature": STANDARD.encode(b"archive-signature"),
            "publicKey": STANDARD.encode(b"archive-key"),
        }
    });
    vec![
        ("datapackage.json".to_string(), package.to_vec()),
        ("datapackage-digest.json".to_string(), digest.to_string().into_bytes()),
        ("archive/data.warc.gz".to_string(), b"WARC".to_vec()),
    ]
}
