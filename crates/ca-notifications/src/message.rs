//! Notification Messages

use ca_core::TransferMethod;
use serde::{Deserialize, Serialize};

/// Severity of a user-facing notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Info,
    Warning,
    Error,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Messages the attachment pipeline can surface
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// File extension is not in the allowed set
    TypeLimit { allowed: Vec<String> },
    /// File exceeds the size limit
    SizeLimit { max_mib: f64 },
    /// Attachment count limit reached
    CountLimit { max: usize },
    /// Transfer method not enabled for the feature
    TransferMethodNotAllowed { method: TransferMethod },
    /// Local bytes could not be read
    ReadError,
    /// Transport reported a failed upload
    UploadError,
    /// A turn was sent while local uploads are unfinished
    WaitForUpload,
    /// A turn was sent without text
    QueryRequired,
}

impl Message {
    /// Get the i18n key for this message
    pub fn i18n_key(&self) -> &'static str {
        match self {
            Self::TypeLimit { .. } => "file_uploader.upload_from_computer_type_limit",
            Self::SizeLimit { .. } => "file_uploader.upload_from_computer_limit",
            Self::CountLimit { .. } => "file_uploader.upload_count_limit",
            Self::TransferMethodNotAllowed { .. } => "file_uploader.transfer_method_not_allowed",
            Self::ReadError => "file_uploader.upload_from_computer_read_error",
            Self::UploadError => "file_uploader.upload_from_computer_upload_error",
            Self::WaitForUpload => "chat.wait_for_file_upload",
            Self::QueryRequired => "chat.query_required",
        }
    }

    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::WaitForUpload | Self::QueryRequired => NotificationKind::Info,
            _ => NotificationKind::Error,
        }
    }

    /// Render the English text
    pub fn text(&self) -> String {
        match self {
            Self::TypeLimit { allowed } => {
                format!("This file type is not supported. Allowed types: {}", allowed.join(", "))
            }
            Self::SizeLimit { max_mib } => format!("File size cannot exceed {}MB", max_mib),
            Self::CountLimit { max } => format!("You can attach at most {} files", max),
            Self::TransferMethodNotAllowed { method } => {
                format!("Attaching by {} is not enabled", method)
            }
            Self::ReadError => "Failed to read the file, please try again".to_string(),
            Self::UploadError => "Upload failed, please upload again".to_string(),
            Self::WaitForUpload => "Please wait for the files to finish uploading".to_string(),
            Self::QueryRequired => "A message is required".to_string(),
        }
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text())
    }
}
