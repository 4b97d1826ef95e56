//! Drag-and-drop target
//!
//! Enter/over/leave only drive the `active` indicator; the drop itself hands
//! the first file to the store. While ingestion is disabled the zone leaves
//! events untouched so the host keeps its default handling.

use ca_core::{AttachmentId, TransferMethod};
use tracing::debug;

use crate::error::{AttachmentError, AttachmentResult};
use crate::model::LocalFile;
use crate::store::AttachmentStore;

/// A drag event as seen by the drop zone
#[derive(Debug, Default)]
pub struct DragEvent {
    pub files: Vec<LocalFile>,
    default_prevented: bool,
    propagation_stopped: bool,
}

impl DragEvent {
    pub fn new(files: Vec<LocalFile>) -> Self {
        Self {
            files,
            ..Default::default()
        }
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }

    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }

    fn claim(&mut self) {
        self.prevent_default();
        self.stop_propagation();
    }
}

pub struct DropZone {
    store: AttachmentStore,
    active: bool,
}

impl DropZone {
    pub fn new(store: AttachmentStore) -> Self {
        Self {
            store,
            active: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.accepts(TransferMethod::LocalFile)
    }

    /// Whether a drag is currently hovering the zone
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn on_drag_enter(&mut self, event: &mut DragEvent) {
        if self.is_enabled() {
            event.claim();
            self.active = true;
        }
    }

    pub fn on_drag_over(&mut self, event: &mut DragEvent) {
        if self.is_enabled() {
            event.claim();
        }
    }

    pub fn on_drag_leave(&mut self, event: &mut DragEvent) {
        if self.is_enabled() {
            event.claim();
        }
        self.active = false;
    }

    /// Register the first dropped file
    pub async fn on_drop(&mut self, event: &mut DragEvent) -> AttachmentResult<Option<AttachmentId>> {
        self.active = false;
        if !self.is_enabled() {
            return Err(AttachmentError::Disabled);
        }
        event.claim();

        if event.files.is_empty() {
            return Ok(None);
        }
        let file = event.files.remove(0);
        debug!(filename = %file.name, "File dropped");
        self.store.register_local(file).await.map(Some)
    }
}
