//! Bundle verification
//!
//! Signed capture bundles and web-archive bundles are both zip containers.
//! Classification asks a [`BundleVerifier`] two cheap questions ("is this a
//! signed bundle?", "is this an archive bundle?") and, on a yes, asks it to
//! verify the container and hand back the material that goes into the
//! uploaded metadata.
//!
//! [`StructuralVerifier`] is the built-in implementation: it checks layout
//! and declared digests but does not check signatures cryptographically.

mod structural;

pub use structural::StructuralVerifier;

use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::Path;
use thiserror::Error;
use zip::ZipArchive;

/// Signed-bundle proof metadata entry suffix
pub const PROOF_SUFFIX: &str = ".proof.json";
/// Signed-bundle public key entry
pub const PUBKEY_ENTRY: &str = "pubkey.asc";
/// Archive-bundle package descriptor
pub const DATAPACKAGE_ENTRY: &str = "datapackage.json";
/// Archive-bundle signed digest of the package descriptor
pub const DATAPACKAGE_DIGEST_ENTRY: &str = "datapackage-digest.json";

/// Entry suffixes that are bundle bookkeeping rather than captured media
const ARTIFACT_SUFFIXES: &[&str] = &[".proof.json", ".proof.csv", ".asc", ".ots", ".gst"];

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("cannot read bundle: {0}")]
    Io(#[from] io::Error),

    #[error("invalid zip container: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("malformed bundle: {0}")]
    Malformed(String),

    #[error("missing bundle entry {0}")]
    MissingEntry(String),

    #[error("digest mismatch for {entry}: expected {expected}, got {actual}")]
    DigestMismatch {
        entry: String,
        expected: String,
        actual: String,
    },

    #[error("invalid JSON in {entry}: {source}")]
    Json {
        entry: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid signature material in {entry}: {reason}")]
    Signature { entry: String, reason: String },
}

impl VerifyError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    pub fn missing(entry: impl Into<String>) -> Self {
        Self::MissingEntry(entry.into())
    }
}

/// Capture-time attributes recorded by the capturing device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureMetadata {
    /// Path of the asset on the capturing device
    pub file_path: String,
    pub file_modified: String,
    pub file_created: String,
}

impl CaptureMetadata {
    /// Base name of the captured file; this is also its key in the bundle.
    pub fn file_name(&self) -> &str {
        self.file_path
            .rsplit(|c: char| c == '/' || c == '\\')
            .next()
            .unwrap_or(&self.file_path)
    }
}

/// One verified asset of a signed bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedAsset {
    pub capture: CaptureMetadata,
    /// Lowercase hex SHA-256 of the asset bytes
    pub sha256: String,
    /// Raw proof metadata document
    pub metadata_bytes: Vec<u8>,
    pub metadata_signature: Vec<u8>,
    pub asset_signature: Vec<u8>,
    pub public_key: Vec<u8>,
    /// OpenTimestamps proof, when the bundle carries one
    pub ots: Option<Vec<u8>>,
    /// Google SafetyNet attestation, when the bundle carries one
    pub gst: Option<Vec<u8>>,
}

/// Verified archive-level metadata of a web-archive bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMetadata {
    pub created: Option<String>,
    pub modified: Option<String>,
    /// Raw package descriptor
    pub metadata_bytes: Vec<u8>,
    pub metadata_signature: Vec<u8>,
    pub public_key: Vec<u8>,
}

/// Verification collaborator for zip-contained bundle formats.
///
/// The probes must be cheap and must not fail: an unreadable file is simply
/// "not a bundle" and falls through to generic handling.
pub trait BundleVerifier: Send + Sync {
    fn is_signed_bundle(&self, path: &Path) -> bool;

    fn is_archive_bundle(&self, path: &Path) -> bool;

    /// Verify a signed bundle and list its assets.
    fn verify_signed_bundle(&self, path: &Path) -> Result<Vec<SignedAsset>, VerifyError>;

    /// Verify an archive bundle and return its signed metadata.
    fn verify_archive_bundle(&self, path: &Path) -> Result<ArchiveMetadata, VerifyError>;

    /// Map each asset name to the zip entry holding its bytes.
    fn extract_bundle_files(
        &self,
        archive: &ZipArchive<File>,
    ) -> Result<BTreeMap<String, String>, VerifyError> {
        Ok(asset_entries(archive.file_names()))
    }
}

/// Base name of a zip entry path.
pub(crate) fn entry_base_name(entry: &str) -> &str {
    entry.rsplit('/').next().unwrap_or(entry)
}

fn is_artifact(base_name: &str) -> bool {
    base_name == PUBKEY_ENTRY || ARTIFACT_SUFFIXES.iter().any(|s| base_name.ends_with(s))
}

/// Asset name to entry name for every non-directory, non-artifact entry.
pub(crate) fn asset_entries<'a>(names: impl Iterator<Item = &'a str>) -> BTreeMap<String, String> {
    names
        .filter(|name| !name.ends_with('/'))
        .filter_map(|name| {
            let base = entry_base_name(name);
            (!base.is_empty() && !is_artifact(base)).then(|| (base.to_string(), name.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_entries_skip_artifacts() {
        let names = [
            "IMG_0001.jpg",
            "abc.proof.json",
            "abc.proof.json.asc",
            "abc.asc",
            "abc.ots",
            "abc.gst",
            "abc.proof.csv",
            "pubkey.asc",
            "media/",
            "media/clip.mp4",
        ];
        let map = asset_entries(names.iter().copied());
        assert_eq!(map.len(), 2);
        assert_eq!(map["IMG_0001.jpg"], "IMG_0001.jpg");
        assert_eq!(map["clip.mp4"], "media/clip.mp4");
    }

    #[test]
    fn test_capture_file_name() {
        let capture = CaptureMetadata {
            file_path: "/storage/emulated/0/DCIM/IMG_0001.jpg".into(),
            file_modified: String::new(),
            file_created: String::new(),
        };
        assert_eq!(capture.file_name(), "IMG_0001.jpg");

        let bare = CaptureMetadata {
            file_path: "IMG_0002.jpg".into(),
            ..capture
        };
        assert_eq!(bare.file_name(), "IMG_0002.jpg");
    }
}
