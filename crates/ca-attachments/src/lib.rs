//! # ca-attachments
//!
//! Client-side attachment pipeline for Chat Attachments RS.
//!
//! ## Features
//!
//! - One attachment store per feature (vision images, generic files)
//! - Validation against the feature's upload settings
//! - Background uploads with progress, retry under the same identity
//! - Ingestion from a file picker, drag-and-drop, clipboard and links
//! - The send gate that turns attachments into outgoing descriptors
//!
//! ## Example
//!
//! ```rust,ignore
//! use ca_attachments::{AttachmentStore, LocalFile, MemoryTransport};
//! use ca_core::UploadSettings;
//! use ca_notifications::TracingNotifier;
//! use std::sync::Arc;
//!
//! let store = AttachmentStore::new(
//!     Some(UploadSettings::vision()),
//!     Arc::new(MemoryTransport::new()),
//!     Arc::new(TracingNotifier),
//! );
//!
//! let id = store.register_local(LocalFile::from_path("cat.png").await?).await?;
//! store.settle().await;
//! assert!(store.get(id).unwrap().is_uploaded());
//! ```

pub mod compose;
pub mod display;
pub mod error;
pub mod ingest;
pub mod model;
pub mod retry;
pub mod store;
pub mod transport;
pub mod validator;

#[cfg(test)]
mod testing;

pub use compose::{Composer, FileKind, OutgoingFile, OutgoingTurn, SendError};
pub use display::{accept_attribute, format_size, picker_mode, remote_link_type, truncate_name, PickerMode};
pub use error::{AttachmentError, AttachmentResult};
pub use ingest::{ingestion_enabled, ClipboardPaste, DragEvent, DropZone, LinkInput, ManualPicker, PasteEvent};
pub use model::{AttachmentRecord, FileSource, LocalFile, Payload, Progress};
pub use retry::RetryController;
pub use store::{AttachmentStore, RetryStart};
pub use transport::{
    generate_upload_key, LocalDirTransport, MemoryTransport, ProgressReporter, Transport,
    TransportError, TransportResult,
};
pub use validator::{is_well_formed_url, validate, Accepted, Candidate, Rejection};
