//! Clipboard paste

use ca_core::{AttachmentId, TransferMethod};
use tracing::debug;

use crate::error::{AttachmentError, AttachmentResult};
use crate::model::LocalFile;
use crate::store::AttachmentStore;

/// Contents of a paste event
#[derive(Debug, Default)]
pub struct PasteEvent {
    pub files: Vec<LocalFile>,
    pub text: Option<String>,
    default_prevented: bool,
}

impl PasteEvent {
    pub fn with_files(files: Vec<LocalFile>) -> Self {
        Self {
            files,
            ..Default::default()
        }
    }

    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    /// `false` means the host should perform its normal text paste
    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }
}

/// Turns a pasted file into an attachment; plain text pastes pass through
#[derive(Clone)]
pub struct ClipboardPaste {
    store: AttachmentStore,
}

impl ClipboardPaste {
    pub fn new(store: AttachmentStore) -> Self {
        Self { store }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.accepts(TransferMethod::LocalFile)
    }

    pub async fn on_paste(&self, event: &mut PasteEvent) -> AttachmentResult<Option<AttachmentId>> {
        if event.files.is_empty() {
            return Ok(None);
        }
        if !self.is_enabled() {
            return Err(AttachmentError::Disabled);
        }

        event.prevent_default();
        let file = event.files.remove(0);
        debug!(filename = %file.name, "File pasted");
        self.store.register_local(file).await.map(Some)
    }
}
