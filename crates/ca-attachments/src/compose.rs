//! Send gate for a chat turn
//!
//! Collects the attachments of every feature store into the descriptors sent
//! with a message, refusing while a local file still lacks its backend id.

use std::sync::Arc;

use ca_core::TransferMethod;
use ca_notifications::{Message, Notifier};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument};

use crate::display::format_size;
use crate::model::{extension_of, AttachmentRecord};
use crate::store::AttachmentStore;

const SHEET_EXTENSIONS: &[&str] = &["xlsx"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Image,
    Sheet,
}

impl FileKind {
    fn of(name: Option<&str>) -> Self {
        match name.and_then(extension_of) {
            Some(ext) if SHEET_EXTENSIONS.contains(&ext) => Self::Sheet,
            _ => Self::Image,
        }
    }
}

/// Attachment descriptor sent with a message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingFile {
    pub transfer_method: TransferMethod,
    /// The link for remote files, empty for uploaded ones
    pub url: String,
    pub upload_file_id: String,
    #[serde(rename = "type")]
    pub kind: FileKind,
    pub name: String,
    pub size: String,
}

impl From<&AttachmentRecord> for OutgoingFile {
    fn from(record: &AttachmentRecord) -> Self {
        Self {
            transfer_method: record.source_kind,
            url: record.remote_target.clone().unwrap_or_default(),
            upload_file_id: record.backend_id.clone(),
            kind: FileKind::of(record.name.as_deref()),
            name: record.name.clone().unwrap_or_default(),
            size: record.size.map(format_size).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingTurn {
    pub query: String,
    pub files: Vec<OutgoingFile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("Attachments are still uploading")]
    UploadsPending,
    #[error("Query is empty")]
    EmptyQuery,
}

impl SendError {
    pub fn message(&self) -> Message {
        match self {
            Self::UploadsPending => Message::WaitForUpload,
            Self::EmptyQuery => Message::QueryRequired,
        }
    }
}

/// Message composer over the attachment stores of each enabled feature
pub struct Composer {
    stores: Vec<AttachmentStore>,
    notifier: Arc<dyn Notifier>,
}

impl Composer {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            stores: Vec::new(),
            notifier,
        }
    }

    pub fn with_store(mut self, store: AttachmentStore) -> Self {
        self.stores.push(store);
        self
    }

    fn records(&self) -> Vec<AttachmentRecord> {
        self.stores.iter().flat_map(|s| s.records()).collect()
    }

    /// Whether a local file is still waiting for its backend id
    pub fn uploads_pending(&self) -> bool {
        self.records()
            .iter()
            .any(|r| r.is_local() && r.backend_id.is_empty())
    }

    /// Build the outgoing turn and clear every store.
    ///
    /// Refusals are notified and leave the stores as they were. Failed
    /// records are left out of the turn.
    #[instrument(skip(self, query))]
    pub fn take_for_send(&self, query: &str) -> Result<OutgoingTurn, SendError> {
        self.check(query).map_err(|e| {
            self.notifier.send(&e.message());
            e
        })?;

        let files: Vec<OutgoingFile> = self
            .records()
            .iter()
            .filter(|r| !r.is_failed())
            .map(OutgoingFile::from)
            .collect();

        for store in &self.stores {
            store.clear();
        }
        info!(files = files.len(), "Turn composed");

        Ok(OutgoingTurn {
            query: query.to_string(),
            files,
        })
    }

    fn check(&self, query: &str) -> Result<(), SendError> {
        if self.uploads_pending() {
            return Err(SendError::UploadsPending);
        }
        if query.trim().is_empty() {
            return Err(SendError::EmptyQuery);
        }
        Ok(())
    }
}
