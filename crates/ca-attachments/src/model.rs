//! Attachment Model
//!
//! Records, payloads and the files they are read from.

use std::path::{Path, PathBuf};

use base64::Engine;
use bytes::Bytes;
use ca_core::{AttachmentId, TransferMethod};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upload progress of a record.
///
/// `-1` marks a failed attempt, `0..=99` an upload in flight and `100` a
/// completed one. No other value can be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub struct Progress(i8);

impl Progress {
    pub const FAILED: Self = Self(-1);
    pub const PENDING: Self = Self(0);
    pub const COMPLETE: Self = Self(100);

    /// Progress for an upload still in flight; clamped to `0..=99` so that
    /// only a confirmed success can reach 100.
    pub fn in_flight(percent: u8) -> Self {
        Self(percent.min(99) as i8)
    }

    pub fn value(&self) -> i8 {
        self.0
    }

    pub fn is_failed(&self) -> bool {
        *self == Self::FAILED
    }

    pub fn is_complete(&self) -> bool {
        *self == Self::COMPLETE
    }

    pub fn is_terminal(&self) -> bool {
        self.is_failed() || self.is_complete()
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::PENDING
    }
}

impl TryFrom<i8> for Progress {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        if value == -1 || (0..=100).contains(&value) {
            Ok(Self(value))
        } else {
            Err(format!("progress out of range: {}", value))
        }
    }
}

impl From<Progress> for i8 {
    fn from(progress: Progress) -> Self {
        progress.0
    }
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Extension of a file name: the text after the last `.`, if any
pub fn extension_of(name: &str) -> Option<&str> {
    name.rfind('.')
        .map(|pos| &name[pos + 1..])
        .filter(|ext| !ext.is_empty())
}

/// Where the bytes of a local file live
#[derive(Debug, Clone, PartialEq)]
pub enum FileSource {
    /// A file on disk (picker, drag-and-drop of a path)
    Path(PathBuf),
    /// Bytes already in memory (clipboard, drop of an in-memory blob)
    Memory(Bytes),
}

/// A local file offered by an ingestion source, not yet read
#[derive(Debug, Clone, PartialEq)]
pub struct LocalFile {
    pub name: String,
    pub size: u64,
    pub source: FileSource,
}

impl LocalFile {
    pub fn new(name: impl Into<String>, size: u64, source: FileSource) -> Self {
        Self {
            name: name.into(),
            size,
            source,
        }
    }

    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self::new(name, bytes.len() as u64, FileSource::Memory(bytes))
    }

    /// Describe a file on disk; size comes from its metadata
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let meta = tokio::fs::metadata(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(name, meta.len(), FileSource::Path(path.to_path_buf())))
    }

    pub fn extension(&self) -> Option<&str> {
        extension_of(&self.name)
    }

    /// Read the bytes. This is the suspension point between validation and
    /// record creation.
    pub async fn read(&self) -> std::io::Result<Payload> {
        let bytes = match &self.source {
            FileSource::Path(path) => Bytes::from(tokio::fs::read(path).await?),
            FileSource::Memory(bytes) => bytes.clone(),
        };
        Ok(Payload::new(&self.name, bytes))
    }
}

/// Bytes of a local file after reading, retained for retries
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl Payload {
    pub fn new(name: impl Into<String>, bytes: Bytes) -> Self {
        let name = name.into();
        let content_type = mime_guess::from_path(&name)
            .first_or_octet_stream()
            .to_string();
        Self {
            name,
            content_type,
            bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// `data:` URI usable as a preview source
    pub fn data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.content_type,
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

/// One attachment tracked by the store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttachmentRecord {
    pub id: AttachmentId,
    pub source_kind: TransferMethod,
    /// Read bytes (local only)
    #[serde(skip)]
    pub payload: Option<Payload>,
    /// File the payload was read from (local only)
    #[serde(skip)]
    pub origin: Option<LocalFile>,
    /// Original file name (local only)
    pub name: Option<String>,
    /// Size in bytes (local only)
    pub size: Option<u64>,
    /// Preview source: `data:` URI for local files, the link for remote ones
    pub renderable_url: String,
    /// Link as supplied by the user (remote only)
    pub remote_target: Option<String>,
    /// Identifier assigned by the transport on success
    pub backend_id: String,
    pub progress: Progress,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    /// Upload attempt the current progress belongs to
    #[serde(skip)]
    pub(crate) attempt: u32,
}

impl AttachmentRecord {
    /// Record for a freshly read local file
    pub fn local(payload: Payload, origin: Option<LocalFile>) -> Self {
        Self {
            id: AttachmentId::new(),
            source_kind: TransferMethod::LocalFile,
            name: Some(payload.name.clone()),
            size: Some(payload.len() as u64),
            renderable_url: payload.data_uri(),
            payload: Some(payload),
            origin,
            remote_target: None,
            backend_id: String::new(),
            progress: Progress::PENDING,
            deleted: false,
            created_at: Utc::now(),
            attempt: 0,
        }
    }

    /// Record for a user-supplied link; malformed links start out failed
    pub fn remote(url: impl Into<String>, well_formed: bool) -> Self {
        let url = url.into();
        Self {
            id: AttachmentId::new(),
            source_kind: TransferMethod::RemoteUrl,
            payload: None,
            origin: None,
            name: None,
            size: None,
            renderable_url: url.clone(),
            remote_target: Some(url),
            backend_id: String::new(),
            progress: if well_formed {
                Progress::PENDING
            } else {
                Progress::FAILED
            },
            deleted: false,
            created_at: Utc::now(),
            attempt: 0,
        }
    }

    /// Keep a specific identity (re-entrant registration)
    pub fn with_id(mut self, id: AttachmentId) -> Self {
        self.id = id;
        self
    }

    pub fn is_local(&self) -> bool {
        self.source_kind == TransferMethod::LocalFile
    }

    pub fn is_remote(&self) -> bool {
        self.source_kind == TransferMethod::RemoteUrl
    }

    /// Local file whose bytes the backend has confirmed
    pub fn is_uploaded(&self) -> bool {
        self.is_local() && self.progress.is_complete() && !self.backend_id.is_empty()
    }

    pub fn is_failed(&self) -> bool {
        self.progress.is_failed()
    }

    pub fn extension(&self) -> Option<&str> {
        self.name
            .as_deref()
            .or(self.remote_target.as_deref())
            .and_then(extension_of)
    }
}
