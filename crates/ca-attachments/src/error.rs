//! Attachment pipeline errors
//!
//! Only ingestion can fail synchronously. Upload and link failures happen
//! later and show up as a record with progress `-1` instead.

use thiserror::Error;

use crate::validator::Rejection;

/// Errors surfaced by store and adapter operations.
///
/// Every variant has already been reported to the notifier (or is silent by
/// policy) by the time it is returned; callers may ignore it.
#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("Attachment ingestion is disabled")]
    Disabled,
    #[error("Attachment rejected: {0}")]
    Rejected(#[from] Rejection),
    #[error("Failed to read {name}: {source}")]
    ReadFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

pub type AttachmentResult<T> = Result<T, AttachmentError>;
