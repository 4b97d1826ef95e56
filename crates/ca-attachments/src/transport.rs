//! Upload Transport
//!
//! The transport moves the bytes of a local payload to the backend and reports
//! progress along the way. The store calls it once per local registration and
//! once per retry; links never reach it.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::model::{extension_of, Payload};

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Upload rejected by backend: {0}")]
    Rejected(String),
    #[error("Transport backend error: {0}")]
    BackendError(String),
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Progress callback handed to a transport for one upload attempt
#[derive(Clone)]
pub struct ProgressReporter {
    sink: Arc<dyn Fn(u8) + Send + Sync>,
}

impl ProgressReporter {
    pub fn new(sink: impl Fn(u8) + Send + Sync + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
        }
    }

    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    /// Report a percentage in `0..=100`
    pub fn report(&self, percent: u8) {
        (self.sink)(percent.min(100));
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter").finish_non_exhaustive()
    }
}

/// Transport trait - performs the byte upload for one payload
#[async_trait]
pub trait Transport: Send + Sync {
    /// Upload the payload and return the identifier the backend assigned
    async fn upload(&self, payload: Payload, progress: ProgressReporter)
        -> TransportResult<String>;

    /// Get transport name for logging
    fn name(&self) -> &str;
}

/// Storage key for an uploaded payload: a UUID keeping the original extension.
///
/// Only alphanumeric extensions are kept, so a key is always a plain file
/// name.
pub fn generate_upload_key(filename: &str) -> String {
    let uuid = Uuid::new_v4();
    match extension_of(filename) {
        Some(ext) if ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            format!("{}.{}", uuid, ext.to_ascii_lowercase())
        }
        _ => uuid.to_string(),
    }
}

fn calculate_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Write `bytes` in chunks, reporting progress after each one
async fn write_chunks<W>(
    writer: &mut W,
    bytes: &[u8],
    chunk_size: usize,
    progress: &ProgressReporter,
) -> io::Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let total = bytes.len().max(1);
    let mut written = 0usize;
    for chunk in bytes.chunks(chunk_size.max(1)) {
        writer.write_all(chunk).await?;
        written += chunk.len();
        progress.report(((written * 100) / total) as u8);
    }
    Ok(written)
}

/// Run a write into `path`; on failure the partial file is removed
async fn discard_on_error<T>(
    path: &Path,
    write: impl Future<Output = io::Result<T>>,
) -> io::Result<T> {
    let result = write.await;
    if let Err(e) = &result {
        warn!(path = ?path, error = %e, "Write failed, discarding partial file");
        if let Err(rm) = fs::remove_file(path).await {
            debug!(path = ?path, error = %rm, "Nothing to discard");
        }
    }
    result
}

/// Transport writing payloads into a local directory.
///
/// Bytes are written in chunks with a progress report after each one; the
/// returned backend id is the storage key.
pub struct LocalDirTransport {
    root: PathBuf,
    chunk_size: usize,
}

impl LocalDirTransport {
    pub fn new(root: impl AsRef<Path>, chunk_size: usize) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl Transport for LocalDirTransport {
    #[instrument(skip(self, payload, progress), fields(transport = "local_dir", filename = %payload.name))]
    async fn upload(
        &self,
        payload: Payload,
        progress: ProgressReporter,
    ) -> TransportResult<String> {
        let key = generate_upload_key(&payload.name);
        let path = self.root.join(&key);
        fs::create_dir_all(&self.root).await?;

        let written = discard_on_error(&path, async {
            let mut file = fs::File::create(&path).await?;
            let written =
                write_chunks(&mut file, &payload.bytes, self.chunk_size, &progress).await?;
            file.sync_all().await?;
            Ok(written)
        })
        .await?;

        let digest = calculate_digest(&payload.bytes);
        debug!(path = ?path, size = written, digest = %digest, "Payload stored");

        Ok(key)
    }

    fn name(&self) -> &str {
        "local_dir"
    }
}

/// In-memory transport for testing and dry runs
pub struct MemoryTransport {
    uploads: RwLock<HashMap<String, (Bytes, String)>>,
    fail_with: Option<String>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            uploads: RwLock::new(HashMap::new()),
            fail_with: None,
        }
    }

    /// A transport whose every upload is rejected
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            uploads: RwLock::new(HashMap::new()),
            fail_with: Some(reason.into()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Bytes> {
        self.uploads.read().await.get(key).map(|(data, _)| data.clone())
    }

    pub async fn digest(&self, key: &str) -> Option<String> {
        self.uploads
            .read()
            .await
            .get(key)
            .map(|(_, digest)| digest.clone())
    }

    pub async fn len(&self) -> usize {
        self.uploads.read().await.len()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn upload(
        &self,
        payload: Payload,
        progress: ProgressReporter,
    ) -> TransportResult<String> {
        progress.report(50);

        if let Some(reason) = &self.fail_with {
            return Err(TransportError::Rejected(reason.clone()));
        }

        let key = generate_upload_key(&payload.name);
        let digest = calculate_digest(&payload.bytes);

        let mut uploads = self.uploads.write().await;
        uploads.insert(key.clone(), (payload.bytes, digest));

        Ok(key)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
