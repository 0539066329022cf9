//! Streaming multipart upload to the content-addressing backend
//!
//! The request body is never materialized. A blocking producer reads the
//! file (or a zip entry) in chunks and pushes them through a bounded channel
//! that backs the `file` part of the multipart form. A read failure in the
//! producer surfaces as a body error, which aborts the request.
//!
//! Wire format: `POST http://<host>/<source>[?project_id=<id>]` with fields
//! `metadata_format`, `metadata` and `file`, in that order.

use crate::config::WebhookConfig;
use crate::metadata::{keys, FileMetadata};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, StatusCode, Url};
use serde::Deserialize;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

/// Chunk size for the body producer
const CHUNK_SIZE: usize = 64 * 1024;
/// Chunks buffered between producer and request
const CHANNEL_DEPTH: usize = 8;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("bad request (HTTP {0})")]
    Rejected(u16),

    #[error("bad status code in response: {0}")]
    BadStatus(u16),

    #[error("backend reported error: {0}")]
    Server(String),

    #[error("backend response carried no cid")]
    MissingCid,

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("cannot encode metadata: {0}")]
    Encode(String),

    #[error("invalid response body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid upload URL: {0}")]
    Url(String),

    #[error("cannot open {path}: {source}")]
    Source {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// How the `metadata` field is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetadataFormat {
    #[default]
    Json,
    Cbor,
}

impl MetadataFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Cbor => "application/cbor",
        }
    }
}

/// Where the bytes of the `file` part come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadSource {
    File(PathBuf),
    /// One entry of a zip container
    BundleEntry { archive: PathBuf, entry: String },
}

impl UploadSource {
    pub fn path(&self) -> &Path {
        match self {
            Self::File(path) => path,
            Self::BundleEntry { archive, .. } => archive,
        }
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOptions {
    /// Endpoint path segment; the uploader's default when `None`
    pub source: Option<String>,
    /// Project routing parameter
    pub project_id: Option<String>,
    pub format: MetadataFormat,
}

#[async_trait]
pub trait Uploader: Send + Sync {
    /// Send one asset and its metadata; returns the assigned content id.
    async fn upload(
        &self,
        source: &UploadSource,
        metadata: &FileMetadata,
        options: &UploadOptions,
    ) -> Result<String, UploadError>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    cid: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP uploader for the webhook backend.
#[derive(Debug, Clone)]
pub struct WebhookUploader {
    client: Client,
    host: String,
    jwt: Option<String>,
    default_source: String,
}

impl WebhookUploader {
    pub fn new(config: &WebhookConfig) -> Result<Self, UploadError> {
        let client = Client::builder()
            .read_timeout(config.read_timeout())
            .connect_timeout(config.connect_timeout())
            .build()?;
        Ok(Self {
            client,
            host: config.host.clone(),
            jwt: config.jwt.clone().filter(|t| !t.is_empty()),
            default_source: config.source.clone(),
        })
    }

    pub fn endpoint(&self, options: &UploadOptions) -> Result<Url, UploadError> {
        let source = options
            .source
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.default_source);
        let mut url = Url::parse(&format!("http://{}/{}", self.host, source))
            .map_err(|e| UploadError::Url(e.to_string()))?;
        if let Some(project_id) = options.project_id.as_deref().filter(|p| !p.is_empty()) {
            url.query_pairs_mut().append_pair("project_id", project_id);
        }
        Ok(url)
    }

    fn metadata_part(metadata: &FileMetadata, format: MetadataFormat) -> Result<Part, UploadError> {
        match format {
            MetadataFormat::Json => {
                let json = metadata.to_json()?;
                Ok(Part::text(json))
            }
            MetadataFormat::Cbor => {
                let cbor = metadata
                    .to_cbor()
                    .map_err(|e| UploadError::Encode(e.to_string()))?;
                Ok(Part::bytes(cbor)
                    .file_name("metadata")
                    .mime_str(format.content_type())?)
            }
        }
    }
}

#[async_trait]
impl Uploader for WebhookUploader {
    async fn upload(
        &self,
        source: &UploadSource,
        metadata: &FileMetadata,
        options: &UploadOptions,
    ) -> Result<String, UploadError> {
        let url = self.endpoint(options)?;
        let file_name = metadata
            .get_str(keys::FILE_NAME)
            .unwrap_or("file")
            .to_string();

        let form = Form::new()
            .text("metadata_format", options.format.content_type())
            .part("metadata", Self::metadata_part(metadata, options.format)?)
            .part(
                "file",
                Part::stream(stream_body(source)?).file_name(file_name),
            );

        debug!(%url, source = %source.path().display(), "Uploading");
        let mut request = self.client.post(url).multipart(form);
        if let Some(jwt) = &self.jwt {
            request = request.bearer_auth(jwt);
        }
        let response = request.send().await?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::NOT_FOUND {
            return Err(UploadError::Rejected(status.as_u16()));
        }
        if status != StatusCode::OK {
            return Err(UploadError::BadStatus(status.as_u16()));
        }

        let body = response.bytes().await?;
        let parsed: UploadResponse = serde_json::from_slice(&body)?;
        if let Some(error) = parsed.error.filter(|e| !e.is_empty()) {
            return Err(UploadError::Server(error));
        }
        parsed
            .cid
            .filter(|cid| !cid.is_empty())
            .ok_or(UploadError::MissingCid)
    }
}

/// Body for the `file` part, fed by a blocking producer task.
fn stream_body(source: &UploadSource) -> Result<Body, UploadError> {
    let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(CHANNEL_DEPTH);

    match source {
        UploadSource::File(path) => {
            let file = File::open(path).map_err(|source| UploadError::Source {
                path: path.clone(),
                source,
            })?;
            tokio::task::spawn_blocking(move || pump(file, &tx));
        }
        UploadSource::BundleEntry { archive, entry } => {
            let file = File::open(archive).map_err(|source| UploadError::Source {
                path: archive.clone(),
                source,
            })?;
            let entry = entry.clone();
            tokio::task::spawn_blocking(move || {
                let mut zip = match zip::ZipArchive::new(file) {
                    Ok(zip) => zip,
                    Err(e) => {
                        let _ = tx.blocking_send(Err(io::Error::new(io::ErrorKind::InvalidData, e)));
                        return;
                    }
                };
                match zip.by_name(&entry) {
                    Ok(reader) => pump(reader, &tx),
                    Err(e) => {
                        let _ = tx.blocking_send(Err(io::Error::new(
                            io::ErrorKind::NotFound,
                            format!("bundle entry {entry}: {e}"),
                        )));
                    }
                };
            });
        }
    }

    Ok(Body::wrap_stream(ReceiverStream::new(rx)))
}

/// Copy a reader into the channel until EOF, a read error, or the request
/// side hanging up.
fn pump<R: Read>(mut reader: R, tx: &mpsc::Sender<io::Result<Bytes>>) {
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let chunk = match reader.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => Ok(Bytes::copy_from_slice(&buf[..n])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(error = %e, "Upload body read failed");
                Err(e)
            }
        };
        let failed = chunk.is_err();
        if tx.blocking_send(chunk).is_err() || failed {
            return;
        }
    }
}
