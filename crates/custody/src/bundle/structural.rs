//! Layout and digest checks for signed and archive bundles

use super::{
    entry_base_name, ArchiveMetadata, BundleVerifier, CaptureMetadata,
    SignedAsset, VerifyError, DATAPACKAGE_DIGEST_ENTRY, DATAPACKAGE_ENTRY, PROOF_SUFFIX,
    PUBKEY_ENTRY,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use tracing::debug;
use zip::result::ZipError;
use zip::ZipArchive;

/// Verifies bundle structure and declared SHA-256 digests.
///
/// Signed bundle: for every `<digest>.proof.json` the container must hold
/// `<digest>.asc`, `<digest>.proof.json.asc`, a shared `pubkey.asc` and the
/// captured file itself, whose SHA-256 must equal `<digest>`. `.ots` and
/// `.gst` proofs are picked up when present.
///
/// Archive bundle: `datapackage-digest.json` must declare the `sha256:` hash
/// of `datapackage.json` and carry base64 `signedData` material.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralVerifier;

impl StructuralVerifier {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Deserialize)]
struct ProofRecord {
    #[serde(rename = "File Path")]
    file_path: String,
    #[serde(rename = "File Hash SHA256")]
    file_hash_sha256: String,
    #[serde(rename = "File Modified", default)]
    file_modified: String,
    #[serde(rename = "File Created", default)]
    file_created: String,
}

#[derive(Deserialize)]
struct PackageDigest {
    #[serde(default)]
    path: Option<String>,
    hash: String,
    #[serde(rename = "signedData", default)]
    signed_data: Option<SignedData>,
}

#[derive(Deserialize)]
struct SignedData {
    #[serde(default)]
    signature: Option<String>,
    #[serde(rename = "publicKey", default)]
    public_key: Option<String>,
}

#[derive(Deserialize)]
struct DataPackage {
    #[serde(default)]
    created: Option<String>,
    #[serde(default)]
    modified: Option<String>,
}

fn open_archive(path: &Path) -> Result<ZipArchive<File>, VerifyError> {
    Ok(ZipArchive::new(File::open(path)?)?)
}

/// Run a name-only check over a zip, treating any failure as "no".
fn probe(path: &Path, check: impl Fn(&ZipArchive<File>) -> bool) -> bool {
    match open_archive(path) {
        Ok(archive) => check(&archive),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Not a readable zip");
            false
        }
    }
}

fn entry_error(name: &str, err: ZipError) -> VerifyError {
    match err {
        ZipError::FileNotFound => VerifyError::missing(name),
        other => other.into(),
    }
}

fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> Result<Vec<u8>, VerifyError> {
    let mut entry = archive.by_name(name).map_err(|e| entry_error(name, e))?;
    let mut buf = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
    entry.read_to_end(&mut buf)?;
    Ok(buf)
}

fn sha256_entry(archive: &mut ZipArchive<File>, name: &str) -> Result<String, VerifyError> {
    let mut entry = archive.by_name(name).map_err(|e| entry_error(name, e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut entry, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Base name to full entry name for every file entry.
fn entries_by_base_name(archive: &ZipArchive<File>) -> BTreeMap<String, String> {
    archive
        .file_names()
        .filter(|name| !name.ends_with('/'))
        .map(|name| (entry_base_name(name).to_string(), name.to_string()))
        .collect()
}

fn required<'a>(by_base: &'a BTreeMap<String, String>, base: &str) -> Result<&'a str, VerifyError> {
    by_base
        .get(base)
        .map(String::as_str)
        .ok_or_else(|| VerifyError::missing(base))
}

fn parse_json<'a, T: Deserialize<'a>>(entry: &str, bytes: &'a [u8]) -> Result<T, VerifyError> {
    serde_json::from_slice(bytes).map_err(|source| VerifyError::Json {
        entry: entry.to_string(),
        source,
    })
}

fn decode_signature_field(field: Option<&str>, what: &str) -> Result<Vec<u8>, VerifyError> {
    let raw = field.ok_or_else(|| VerifyError::Signature {
        entry: DATAPACKAGE_DIGEST_ENTRY.to_string(),
        reason: format!("no {what}"),
    })?;
    STANDARD.decode(raw).map_err(|e| VerifyError::Signature {
        entry: DATAPACKAGE_DIGEST_ENTRY.to_string(),
        reason: format!("{what}: {e}"),
    })
}

impl BundleVerifier for StructuralVerifier {
    fn is_signed_bundle(&self, path: &Path) -> bool {
        probe(path, |archive| {
            archive
                .file_names()
                .any(|name| entry_base_name(name).ends_with(PROOF_SUFFIX))
        })
    }

    fn is_archive_bundle(&self, path: &Path) -> bool {
        probe(path, |archive| {
            let mut has_package = false;
            let mut has_digest = false;
            for name in archive.file_names() {
                has_package |= name == DATAPACKAGE_ENTRY;
                has_digest |= name == DATAPACKAGE_DIGEST_ENTRY;
            }
            has_package && has_digest
        })
    }

    fn verify_signed_bundle(&self, path: &Path) -> Result<Vec<SignedAsset>, VerifyError> {
        let mut archive = open_archive(path)?;
        let by_base = entries_by_base_name(&archive);
        let media = self.extract_bundle_files(&archive)?;

        let public_key = {
            let name = required(&by_base, PUBKEY_ENTRY)?.to_string();
            read_entry(&mut archive, &name)?
        };

        let proofs: Vec<(String, String)> = by_base
            .iter()
            .filter_map(|(base, full)| {
                base.strip_suffix(PROOF_SUFFIX)
                    .map(|digest| (digest.to_lowercase(), full.clone()))
            })
            .collect();
        if proofs.is_empty() {
            return Err(VerifyError::malformed("no proof metadata entries"));
        }

        let mut assets = Vec::with_capacity(proofs.len());
        for (digest, proof_entry) in proofs {
            let metadata_bytes = read_entry(&mut archive, &proof_entry)?;
            let record: ProofRecord = parse_json(&proof_entry, &metadata_bytes)?;

            let declared = record.file_hash_sha256.to_lowercase();
            if declared != digest {
                return Err(VerifyError::DigestMismatch {
                    entry: proof_entry,
                    expected: digest,
                    actual: declared,
                });
            }

            let capture = CaptureMetadata {
                file_path: record.file_path,
                file_modified: record.file_modified,
                file_created: record.file_created,
            };

            let media_entry = media
                .get(capture.file_name())
                .cloned()
                .ok_or_else(|| VerifyError::missing(capture.file_name()))?;
            let actual = sha256_entry(&mut archive, &media_entry)?;
            if actual != digest {
                return Err(VerifyError::DigestMismatch {
                    entry: media_entry,
                    expected: digest,
                    actual,
                });
            }

            let asset_sig_entry = required(&by_base, &format!("{digest}.asc"))?.to_string();
            let meta_sig_entry =
                required(&by_base, &format!("{digest}{PROOF_SUFFIX}.asc"))?.to_string();
            let asset_signature = read_entry(&mut archive, &asset_sig_entry)?;
            let metadata_signature = read_entry(&mut archive, &meta_sig_entry)?;

            let ots = match by_base.get(&format!("{digest}.ots")).cloned() {
                Some(name) => Some(read_entry(&mut archive, &name)?),
                None => None,
            };
            let gst = match by_base.get(&format!("{digest}.gst")).cloned() {
                Some(name) => Some(read_entry(&mut archive, &name)?),
                None => None,
            };

            debug!(
                bundle = %path.display(),
                asset = capture.file_name(),
                sha256 = %digest,
                "Verified bundle asset"
            );

            assets.push(SignedAsset {
                capture,
                sha256: digest,
                metadata_bytes,
                metadata_signature,
                asset_signature,
                public_key: public_key.clone(),
                ots,
                gst,
            });
        }

        Ok(assets)
    }

    fn verify_archive_bundle(&self, path: &Path) -> Result<ArchiveMetadata, VerifyError> {
        let mut archive = open_archive(path)?;
        let metadata_bytes = read_entry(&mut archive, DATAPACKAGE_ENTRY)?;
        let digest_bytes = read_entry(&mut archive, DATAPACKAGE_DIGEST_ENTRY)?;
        let digest: PackageDigest = parse_json(DATAPACKAGE_DIGEST_ENTRY, &digest_bytes)?;

        if let Some(target) = digest.path.as_deref() {
            if target != DATAPACKAGE_ENTRY {
                return Err(VerifyError::malformed(format!(
                    "{DATAPACKAGE_DIGEST_ENTRY} covers {target}, not {DATAPACKAGE_ENTRY}"
                )));
            }
        }

        let expected = digest
            .hash
            .strip_prefix("sha256:")
            .ok_or_else(|| {
                VerifyError::malformed(format!("unsupported package digest {}", digest.hash))
            })?
            .to_lowercase();
        let actual = hex::encode(Sha256::digest(&metadata_bytes));
        if actual != expected {
            return Err(VerifyError::DigestMismatch {
                entry: DATAPACKAGE_ENTRY.to_string(),
                expected,
                actual,
            });
        }

        let signed = digest.signed_data.ok_or_else(|| VerifyError::Signature {
            entry: DATAPACKAGE_DIGEST_ENTRY.to_string(),
            reason: "no signedData".to_string(),
        })?;
        let metadata_signature = decode_signature_field(signed.signature.as_deref(), "signature")?;
        let public_key = decode_signature_field(signed.public_key.as_deref(), "publicKey")?;

        let package: DataPackage = parse_json(DATAPACKAGE_ENTRY, &metadata_bytes)?;

        Ok(ArchiveMetadata {
            created: package.created,
            modified: package.modified,
            metadata_bytes,
            metadata_signature,
            public_key,
        })
    }
}
