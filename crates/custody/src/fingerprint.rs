//! Single-pass content fingerprinting
//!
//! A file is read exactly once. Every chunk is fanned out through a
//! [`MultiWriter`] to the SHA-256, MD5 and BLAKE3 accumulators and to a
//! [`MediaSniffer`] that keeps the leading block for media-type detection.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Bytes kept for media-type detection
pub const SNIFF_LEN: usize = 8192;

const READ_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum FingerprintError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0} is not a regular file")]
    NotAFile(PathBuf),
}

/// Content digests of one byte stream, lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digests {
    pub sha256: String,
    pub md5: String,
    pub blake3: String,
    pub media_type: String,
    pub size: u64,
}

/// Digests plus the filesystem attributes of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub digests: Digests,
    pub file_name: String,
    pub modified: DateTime<Utc>,
    /// Birth time where the platform reports one, otherwise `modified`
    pub created: DateTime<Utc>,
}

impl Fingerprint {
    pub fn sha256(&self) -> &str {
        &self.digests.sha256
    }

    pub fn media_type(&self) -> &str {
        &self.digests.media_type
    }

    pub fn size(&self) -> u64 {
        self.digests.size
    }
}

/// Writes each buffer to every sink, in order.
pub struct MultiWriter<'a> {
    sinks: Vec<&'a mut dyn Write>,
}

impl<'a> MultiWriter<'a> {
    pub fn new(sinks: Vec<&'a mut dyn Write>) -> Self {
        Self { sinks }
    }
}

impl Write for MultiWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for sink in self.sinks.iter_mut() {
            sink.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        for sink in self.sinks.iter_mut() {
            sink.flush()?;
        }
        Ok(())
    }
}

/// Keeps the first `limit` bytes written to it and discards the rest.
#[derive(Debug, Default)]
pub struct MediaSniffer {
    head: Vec<u8>,
    limit: usize,
}

impl MediaSniffer {
    pub fn new(limit: usize) -> Self {
        Self {
            head: Vec::with_capacity(limit),
            limit,
        }
    }

    pub fn media_type(&self) -> String {
        detect_media_type(&self.head)
    }
}

impl Write for MediaSniffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let room = self.limit.saturating_sub(self.head.len());
        self.head.extend_from_slice(&buf[..room.min(buf.len())]);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Classify a leading block of content by magic bytes.
///
/// Unrecognised content is `text/plain` when it is valid UTF-8 without NUL
/// bytes (a multi-byte character cut at the block boundary still counts),
/// otherwise `application/octet-stream`.
pub fn detect_media_type(head: &[u8]) -> String {
    if let Some(kind) = infer::get(head) {
        return kind.mime_type().to_string();
    }
    if looks_like_text(head) {
        "text/plain; charset=utf-8".to_string()
    } else {
        "application/octet-stream".to_string()
    }
}

fn looks_like_text(head: &[u8]) -> bool {
    if head.contains(&0) {
        return false;
    }
    match std::str::from_utf8(head) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    }
}

/// Hash and sniff a byte stream in one pass.
pub fn fingerprint_reader<R: Read>(mut reader: R) -> io::Result<Digests> {
    let mut sha = Sha256::new();
    let mut md = md5::Context::new();
    let mut blake = blake3::Hasher::new();
    let mut sniffer = MediaSniffer::new(SNIFF_LEN);

    let size = {
        let mut fan_out = MultiWriter::new(vec![
            &mut sha as &mut dyn Write,
            &mut md,
            &mut blake,
            &mut sniffer,
        ]);
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let mut total = 0u64;
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            fan_out.write_all(&buf[..n])?;
            total += n as u64;
        }
        total
    };

    Ok(Digests {
        sha256: hex::encode(sha.finalize()),
        md5: format!("{:x}", md.compute()),
        blake3: blake.finalize().to_hex().to_string(),
        media_type: sniffer.media_type(),
        size,
    })
}

/// Fingerprint a file on disk.
///
/// Any read error discards the partial digests.
pub fn fingerprint_file(path: &Path) -> Result<Fingerprint, FingerprintError> {
    let read_err = |source| FingerprintError::Read {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(read_err)?;
    let meta = file.metadata().map_err(read_err)?;
    if !meta.is_file() {
        return Err(FingerprintError::NotAFile(path.to_path_buf()));
    }

    let digests = fingerprint_reader(io::BufReader::new(file)).map_err(read_err)?;

    let modified: DateTime<Utc> = meta
        .modified()
        .map(DateTime::<Utc>::from)
        .map_err(read_err)?;
    let created = meta.created().map(DateTime::<Utc>::from).unwrap_or(modified);

    Ok(Fingerprint {
        digests,
        file_name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        modified,
        created,
    })
}

/// Media type of a file from its first block only.
pub fn sniff_file(path: &Path) -> io::Result<String> {
    let mut head = Vec::with_capacity(SNIFF_LEN);
    File::open(path)?
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut head)?;
    Ok(detect_media_type(&head))
}

/// Media type of any reader from its first block only.
pub fn sniff_reader<R: Read>(reader: R) -> io::Result<String> {
    let mut head = Vec::with_capacity(SNIFF_LEN);
    reader.take(SNIFF_LEN as u64).read_to_end(&mut head)?;
    Ok(detect_media_type(&head))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_known_digests_of_empty_input() {
        let d = fingerprint_reader(io::empty()).unwrap();
        assert_eq!(
            d.sha256,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(d.md5, "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(
            d.blake3,
            "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
        );
        assert_eq!(d.size, 0);
    }

    #[test]
    fn test_known_digests_of_abc() {
        let d = fingerprint_reader(&b"abc"[..]).unwrap();
        assert_eq!(
            d.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(d.md5, "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(d.size, 3);
        assert_eq!(d.media_type, "text/plain; charset=utf-8");
    }

    #[test]
    fn test_fingerprint_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("blob.bin");
        let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &content).unwrap();

        let a = fingerprint_file(&path).unwrap();
        let b = fingerprint_file(&path).unwrap();
        assert_eq!(a.digests, b.digests);
        assert_eq!(a.size(), 200_000);
        assert_eq!(a.file_name, "blob.bin");
    }

    #[test]
    fn test_digests_are_lowercase_hex() {
        let d = fingerprint_reader(&b"Custody"[..]).unwrap();
        for digest in [&d.sha256, &d.md5, &d.blake3] {
            assert!(digest
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        }
        assert_eq!(d.sha256.len(), 64);
        assert_eq!(d.md5.len(), 32);
        assert_eq!(d.blake3.len(), 64);
    }

    #[test]
    fn test_media_type_detection() {
        assert_eq!(detect_media_type(b"PK\x03\x04rest"), "application/zip");
        assert_eq!(detect_media_type(b"\x89PNG\r\n\x1a\n"), "image/png");
        assert_eq!(detect_media_type(b"plain words"), "text/plain; charset=utf-8");
        assert_eq!(detect_media_type(b"\x00\x01\x02"), "application/octet-stream");
        // "é" split across the block boundary
        assert_eq!(detect_media_type(b"caf\xc3"), "text/plain; charset=utf-8");
    }

    #[test]
    fn test_sniffer_keeps_only_the_head() {
        let mut sniffer = MediaSniffer::new(4);
        sniffer.write_all(b"PK").unwrap();
        sniffer.write_all(b"\x03\x04 and a lot more").unwrap();
        assert_eq!(sniffer.head, b"PK\x03\x04");
    }

    #[test]
    fn test_multi_writer_feeds_every_sink() {
        let mut a = Vec::new();
        let mut b = Vec::new();
        {
            let mut w = MultiWriter::new(vec![&mut a as &mut dyn Write, &mut b]);
            w.write_all(b"one ").unwrap();
            w.write_all(b"two").unwrap();
        }
        assert_eq!(a, b"one two");
        assert_eq!(b, b"one two");
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = fingerprint_file(Path::new("/definitely/not/here.bin")).unwrap_err();
        assert!(matches!(err, FingerprintError::Read { .. }));
    }

    #[test]
    fn test_directory_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let err = fingerprint_file(tmp.path()).unwrap_err();
        assert!(matches!(err, FingerprintError::NotAFile(_)));
    }

    struct FailingReader {
        served: bool,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.served {
                return Err(io::Error::new(io::ErrorKind::Other, "disk gone"));
            }
            self.served = true;
            buf[..4].copy_from_slice(b"data");
            Ok(4)
        }
    }

    #[test]
    fn test_read_error_mid_stream_aborts() {
        let err = fingerprint_reader(FailingReader { served: false }).unwrap_err();
        assert_eq!(err.to_string(), "disk gone");
    }
}
