//! Format classification and metadata extraction
//!
//! Every file is one of three kinds. Each kind has its own extraction
//! function and all of them return the same [`Extraction`] shape: the
//! container's primary digest plus one [`Asset`] per upload.

use crate::bundle::{ArchiveMetadata, BundleVerifier, SignedAsset, VerifyError};
use crate::error::Result;
use crate::fingerprint::{fingerprint_file, sniff_file, sniff_reader, Fingerprint};
use crate::metadata::{keys, FileMetadata, MetadataValue};
use crate::project::{path_string, ProjectScope};
use crate::upload::{MetadataFormat, UploadSource};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use zip::ZipArchive;

const ZIP_MEDIA_TYPE: &str = "application/zip";
const ARCHIVE_MEDIA_TYPE: &str = "application/wacz";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Generic,
    /// Multi-asset signed capture bundle
    SignedBundle,
    /// Single-asset web-archive bundle
    ArchiveBundle,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::SignedBundle => "signed-bundle",
            Self::ArchiveBundle => "archive-bundle",
        }
    }

    /// Metadata encoding used for this kind's uploads.
    pub fn metadata_format(&self) -> MetadataFormat {
        match self {
            Self::Generic => MetadataFormat::Json,
            Self::SignedBundle | Self::ArchiveBundle => MetadataFormat::Cbor,
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One upload: metadata plus where its bytes come from.
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub metadata: FileMetadata,
    pub source: UploadSource,
    pub format: MetadataFormat,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub kind: FileKind,
    /// SHA-256 of the file as found on disk
    pub sha256: String,
    pub assets: Vec<Asset>,
}

/// Classifies files and builds their metadata records.
#[derive(Clone)]
pub struct Classifier {
    sync_root: PathBuf,
    verifier: Arc<dyn BundleVerifier>,
}

impl Classifier {
    pub fn new(sync_root: impl Into<PathBuf>, verifier: Arc<dyn BundleVerifier>) -> Self {
        Self {
            sync_root: sync_root.into(),
            verifier,
        }
    }

    /// Sniff the head of the file; zip containers are probed further,
    /// archive bundles before signed bundles.
    pub fn detect(&self, path: &Path) -> Result<FileKind> {
        let media_type = sniff_file(path)?;
        if media_type != ZIP_MEDIA_TYPE {
            return Ok(FileKind::Generic);
        }
        if self.verifier.is_archive_bundle(path) {
            return Ok(FileKind::ArchiveBundle);
        }
        if self.verifier.is_signed_bundle(path) {
            return Ok(FileKind::SignedBundle);
        }
        Ok(FileKind::Generic)
    }

    /// Classify a file and produce its metadata records. Blocking.
    pub fn extract(&self, path: &Path) -> Result<Extraction> {
        let kind = self.detect(path)?;
        debug!(path = %path.display(), kind = %kind, "Classified");

        let fingerprint = fingerprint_file(path)?;
        let assets = match kind {
            FileKind::Generic => vec![Asset {
                metadata: self.generic_metadata(path, &fingerprint),
                source: UploadSource::File(path.to_path_buf()),
                format: kind.metadata_format(),
            }],
            FileKind::SignedBundle => {
                let verified = self.verifier.verify_signed_bundle(path)?;
                self.signed_assets(path, verified)?
            }
            FileKind::ArchiveBundle => {
                let archive = self.verifier.verify_archive_bundle(path)?;
                vec![Asset {
                    metadata: self.archive_metadata(path, &fingerprint, archive),
                    source: UploadSource::File(path.to_path_buf()),
                    format: kind.metadata_format(),
                }]
            }
        };

        Ok(Extraction {
            kind,
            sha256: fingerprint.digests.sha256,
            assets,
        })
    }

    /// Path relative to the sync root, forward slashes.
    pub fn asset_origin(&self, path: &Path) -> String {
        match path.strip_prefix(&self.sync_root) {
            Ok(rel) if !rel.as_os_str().is_empty() => path_string(rel),
            _ => path_string(path),
        }
    }

    fn generic_metadata(&self, path: &Path, fp: &Fingerprint) -> FileMetadata {
        let mut metadata = FileMetadata::new();
        metadata.insert(keys::MEDIA_TYPE, fp.media_type());
        metadata.insert(keys::FILE_NAME, fp.file_name.as_str());
        metadata.insert(keys::LAST_MODIFIED, rfc3339(fp.modified));
        metadata.insert(keys::TIME_CREATED, rfc3339(fp.created));
        metadata.insert(keys::ASSET_ORIGIN, self.asset_origin(path));
        metadata.insert(keys::SHA256, fp.digests.sha256.as_str());
        metadata.insert(keys::MD5, fp.digests.md5.as_str());
        metadata.insert(keys::BLAKE3, fp.digests.blake3.as_str());
        metadata.insert(keys::FILE_SIZE, fp.size());
        metadata
    }

    fn archive_metadata(
        &self,
        path: &Path,
        fp: &Fingerprint,
        archive: ArchiveMetadata,
    ) -> FileMetadata {
        let mut metadata = self.generic_metadata(path, fp);

        let mut overlay = FileMetadata::new();
        if let Some(modified) = archive.modified {
            overlay.insert(keys::LAST_MODIFIED, modified);
        }
        if let Some(created) = archive.created {
            overlay.insert(keys::TIME_CREATED, created);
        }
        overlay.insert(keys::MEDIA_TYPE, ARCHIVE_MEDIA_TYPE);
        overlay.insert(
            keys::ASSET_SIGNATURE,
            hex::encode(&archive.metadata_signature),
        );

        let mut wacz = BTreeMap::new();
        wacz.insert("metadata".to_string(), MetadataValue::Bytes(archive.metadata_bytes));
        wacz.insert(
            "meta_sig".to_string(),
            MetadataValue::Bytes(archive.metadata_signature),
        );
        wacz.insert("pubkey".to_string(), MetadataValue::Bytes(archive.public_key));
        overlay.insert(keys::WACZ, wacz);

        metadata.merge_from(overlay);
        metadata
    }

    fn signed_assets(&self, path: &Path, verified: Vec<SignedAsset>) -> Result<Vec<Asset>> {
        let mut archive = ZipArchive::new(File::open(path)?).map_err(VerifyError::from)?;
        let entries = self.verifier.extract_bundle_files(&archive)?;
        let bundle_origin = self.asset_origin(path);

        let mut assets = Vec::with_capacity(verified.len());
        for asset in verified {
            let name = asset.capture.file_name().to_string();
            let entry = entries
                .get(&name)
                .cloned()
                .ok_or_else(|| VerifyError::missing(name.as_str()))?;
            let media_type = {
                let reader = archive
                    .by_name(&entry)
                    .map_err(VerifyError::from)?;
                sniff_reader(reader)?
            };

            let origin = format!(
                "{}/{}",
                bundle_origin,
                asset.capture.file_path.trim_start_matches(|c: char| c == '/' || c == '\\')
            );

            let mut metadata = FileMetadata::new();
            metadata.insert(keys::MEDIA_TYPE, media_type);
            metadata.insert(keys::FILE_NAME, name.as_str());
            metadata.insert(keys::LAST_MODIFIED, asset.capture.file_modified);
            metadata.insert(keys::TIME_CREATED, asset.capture.file_created);
            metadata.insert(keys::ASSET_ORIGIN, origin);
            metadata.insert(keys::SHA256, asset.sha256);
            metadata.insert(keys::ASSET_SIGNATURE, hex::encode(&asset.asset_signature));

            let mut proof = BTreeMap::new();
            proof.insert("metadata".to_string(), MetadataValue::Bytes(asset.metadata_bytes));
            proof.insert(
                "meta_sig".to_string(),
                MetadataValue::Bytes(asset.metadata_signature),
            );
            proof.insert(
                "media_sig".to_string(),
                MetadataValue::Bytes(asset.asset_signature),
            );
            proof.insert("pubkey".to_string(), MetadataValue::Bytes(asset.public_key));
            if let Some(ots) = asset.ots {
                proof.insert("ots".to_string(), MetadataValue::Bytes(ots));
            }
            if let Some(gst) = asset.gst {
                proof.insert("gst".to_string(), MetadataValue::Bytes(gst));
            }
            metadata.insert(keys::PROOFMODE, proof);

            assets.push(Asset {
                metadata,
                source: UploadSource::BundleEntry {
                    archive: path.to_path_buf(),
                    entry,
                },
                format: FileKind::SignedBundle.metadata_format(),
            });
        }
        Ok(assets)
    }
}

/// Add project and author fields without replacing anything already set.
pub fn annotate_project(metadata: &mut FileMetadata, scope: &ProjectScope) {
    metadata.insert_if_absent(keys::PROJECT_ID, scope.id());
    metadata.insert_if_absent(keys::PROJECT_PATH, scope.normalized_path.as_str());

    let author = &scope.record.author;
    let mut fields = BTreeMap::new();
    for (key, value) in [
        ("@type", &author.author_type),
        ("name", &author.name),
        ("identifier", &author.identifier),
    ] {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            fields.insert(key.to_string(), MetadataValue::from(value));
        }
    }
    if !fields.is_empty() {
        metadata.insert_if_absent(keys::AUTHOR, fields);
    }
}

fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}
