//! Remote link input

use ca_core::{AttachmentId, TransferMethod};

use crate::error::{AttachmentError, AttachmentResult};
use crate::store::AttachmentStore;

/// Small text input whose submit registers the typed link.
///
/// The typed value is kept after a submit.
pub struct LinkInput {
    store: AttachmentStore,
    value: String,
}

impl LinkInput {
    pub fn new(store: AttachmentStore) -> Self {
        Self {
            store,
            value: String::new(),
        }
    }

    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_enabled(&self) -> bool {
        self.store.accepts(TransferMethod::RemoteUrl)
    }

    /// State of the submit control
    pub fn can_submit(&self) -> bool {
        !self.value.is_empty() && self.is_enabled()
    }

    pub fn submit(&self) -> AttachmentResult<Option<AttachmentId>> {
        if !self.is_enabled() {
            return Err(AttachmentError::Disabled);
        }
        if self.value.is_empty() {
            return Ok(None);
        }
        self.store.register_remote(&self.value).map(Some)
    }
}
