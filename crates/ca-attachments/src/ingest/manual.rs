//! Manual file picker

use ca_core::{AttachmentId, TransferMethod};
use tracing::debug;

use crate::error::{AttachmentError, AttachmentResult};
use crate::model::LocalFile;
use crate::store::AttachmentStore;

/// Forwards a picker selection to the store
#[derive(Clone)]
pub struct ManualPicker {
    store: AttachmentStore,
}

impl ManualPicker {
    pub fn new(store: AttachmentStore) -> Self {
        Self { store }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.accepts(TransferMethod::LocalFile)
    }

    /// Register the first selected file; an empty selection does nothing
    pub async fn on_files_selected(
        &self,
        files: Vec<LocalFile>,
    ) -> AttachmentResult<Option<AttachmentId>> {
        if !self.is_enabled() {
            return Err(AttachmentError::Disabled);
        }
        let Some(file) = files.into_iter().next() else {
            return Ok(None);
        };
        debug!(filename = %file.name, "File picked");
        self.store.register_local(file).await.map(Some)
    }
}
