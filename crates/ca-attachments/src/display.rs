//! Display helpers for attachment lists and pickers

use ca_core::config::IMAGE_EXTENSIONS;
use ca_core::{TransferMethod, UploadSettings};

use crate::model::extension_of;

/// How the attach control is presented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerMode {
    /// A plain file picker
    LocalOnly,
    /// A menu offering the link input and, when allowed, the picker
    Menu { local: bool, remote: bool },
}

/// Human-readable size, `""` for zero
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return String::new();
    }
    let kib = bytes as f64 / 1024.0;
    if kib < 1024.0 {
        format!("{:.2}KB", kib)
    } else {
        format!("{:.2}MB", kib / 1024.0)
    }
}

/// File name without its extension, cut to `max` characters
pub fn truncate_name(name: &str, max: usize) -> String {
    let base = name.rfind('.').map_or(name, |pos| &name[..pos]);
    if base.chars().count() <= max {
        return base.to_string();
    }
    let mut short: String = base.chars().take(max).collect();
    short.push_str("...");
    short
}

/// Badge for a linked image: its extension upper-cased when it is a known
/// image type, otherwise `IMAGE`
pub fn remote_link_type(url: &str) -> String {
    match extension_of(url) {
        Some(ext) if IMAGE_EXTENSIONS.contains(&ext) => ext.to_uppercase(),
        _ => "IMAGE".to_string(),
    }
}

/// `accept` filter for a native file picker, e.g. `.png,.jpg`
pub fn accept_attribute(settings: &UploadSettings) -> String {
    settings
        .allowed_extensions
        .iter()
        .map(|ext| format!(".{}", ext))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn picker_mode(settings: &UploadSettings) -> PickerMode {
    let local = settings.allows(TransferMethod::LocalFile);
    let remote = settings.allows(TransferMethod::RemoteUrl);
    if local && !remote {
        PickerMode::LocalOnly
    } else {
        PickerMode::Menu { local, remote }
    }
}
