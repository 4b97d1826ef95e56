//! Ingestion Adapters
//!
//! Thin translations from one kind of user interaction into a single store
//! call. All four share [`ingestion_enabled`]; a disabled adapter returns
//! [`AttachmentError::Disabled`](crate::AttachmentError::Disabled) without
//! notifying and without touching the event it was handed.

pub mod clipboard;
pub mod drag_drop;
pub mod manual;
pub mod remote_link;

use ca_core::{TransferMethod, UploadSettings};

pub use clipboard::{ClipboardPaste, PasteEvent};
pub use drag_drop::{DragEvent, DropZone};
pub use manual::ManualPicker;
pub use remote_link::LinkInput;

/// Whether a source of kind `method` may add an attachment to a feature
/// currently holding `current_count` non-deleted records.
pub fn ingestion_enabled(
    settings: Option<&UploadSettings>,
    method: TransferMethod,
    current_count: usize,
) -> bool {
    match settings {
        Some(s) => s.enabled && s.allows(method) && current_count < s.max_count,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingestion_enabled() {
        let files = UploadSettings::files().with_max_count(2);

        assert!(ingestion_enabled(Some(&files), TransferMethod::LocalFile, 0));
        assert!(ingestion_enabled(Some(&files), TransferMethod::RemoteUrl, 1));
        assert!(!ingestion_enabled(Some(&files), TransferMethod::LocalFile, 2));
        assert!(!ingestion_enabled(None, TransferMethod::LocalFile, 0));
        assert!(!ingestion_enabled(
            Some(&files.clone().disabled()),
            TransferMethod::LocalFile,
            0
        ));

        let local_only = files.with_transfer_methods(&[TransferMethod::LocalFile]);
        assert!(!ingestion_enabled(Some(&local_only), TransferMethod::RemoteUrl, 0));
    }
}
