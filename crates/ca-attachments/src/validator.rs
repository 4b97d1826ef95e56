//! Attachment Validation
//!
//! Pure accept/reject decisions for a candidate file or link against a
//! feature's [`UploadSettings`]. Rules run in order and the first failing rule
//! wins:
//!
//! 1. transfer method must be allowed
//! 2. the current attachment count must be below `max_count`
//! 3. local files: extension must be allowed, size must be within the limit
//! 4. links: a scheme check that never rejects, it only decides whether the
//!    new record starts out failed

use std::sync::LazyLock;

use ca_core::{TransferMethod, UploadSettings};
use ca_notifications::Message;
use regex::Regex;
use thiserror::Error;

use crate::model::{extension_of, LocalFile};

static URL_SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(https?|ftp)://").expect("valid url scheme regex"));

/// Something an ingestion source wants to attach
#[derive(Debug, Clone, Copy)]
pub enum Candidate<'a> {
    Local { name: &'a str, size: u64 },
    Remote { url: &'a str },
}

impl<'a> Candidate<'a> {
    pub fn file(file: &'a LocalFile) -> Self {
        Self::Local {
            name: &file.name,
            size: file.size,
        }
    }

    pub fn link(url: &'a str) -> Self {
        Self::Remote { url }
    }

    pub fn transfer_method(&self) -> TransferMethod {
        match self {
            Self::Local { .. } => TransferMethod::LocalFile,
            Self::Remote { .. } => TransferMethod::RemoteUrl,
        }
    }
}

/// A candidate that passed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accepted {
    File,
    /// `well_formed == false` means the record is created already failed
    Link { well_formed: bool },
}

/// Why a candidate was turned away
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("Transfer method not allowed: {0}")]
    UnsupportedTransferMethod(TransferMethod),
    #[error("Attachment limit reached (max: {max})")]
    LimitExceeded { max: usize },
    #[error("Unsupported file type: {extension:?}")]
    UnsupportedType {
        extension: String,
        allowed: Vec<String>,
    },
    #[error("File too large: {size} bytes (max: {max} bytes)")]
    TooLarge { size: u64, max: u64, max_mib: f64 },
}

impl Rejection {
    /// User-facing message for this rejection
    pub fn message(&self) -> Message {
        match self {
            Self::UnsupportedTransferMethod(method) => {
                Message::TransferMethodNotAllowed { method: *method }
            }
            Self::LimitExceeded { max } => Message::CountLimit { max: *max },
            Self::UnsupportedType { allowed, .. } => Message::TypeLimit {
                allowed: allowed.clone(),
            },
            Self::TooLarge { max_mib, .. } => Message::SizeLimit { max_mib: *max_mib },
        }
    }
}

/// Syntactic link check: `http://`, `https://` or `ftp://` prefix
pub fn is_well_formed_url(url: &str) -> bool {
    URL_SCHEME.is_match(url)
}

/// Validate a candidate against the settings, given how many non-deleted
/// attachments the feature already holds.
pub fn validate(
    candidate: &Candidate<'_>,
    settings: &UploadSettings,
    current_count: usize,
) -> Result<Accepted, Rejection> {
    let method = candidate.transfer_method();
    if !settings.allows(method) {
        return Err(Rejection::UnsupportedTransferMethod(method));
    }

    if current_count >= settings.max_count {
        return Err(Rejection::LimitExceeded {
            max: settings.max_count,
        });
    }

    match candidate {
        Candidate::Local { name, size } => {
            let extension = extension_of(name).unwrap_or_default();
            if !settings.allows_extension(extension) {
                return Err(Rejection::UnsupportedType {
                    extension: extension.to_lowercase(),
                    allowed: settings.allowed_extensions.iter().cloned().collect(),
                });
            }

            let max = settings.max_size_bytes();
            if *size > max {
                return Err(Rejection::TooLarge {
                    size: *size,
                    max,
                    max_mib: settings.max_size_mib,
                });
            }

            Ok(Accepted::File)
        }
        Candidate::Remote { url } => Ok(Accepted::Link {
            well_formed: is_well_formed_url(url),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    fn settings() -> UploadSettings {
        UploadSettings::files()
            .with_extensions(&["png", "pdf"])
            .with_max_size_mib(5.0)
            .with_max_count(6)
    }

    fn local(name: &str, size: u64) -> Candidate<'_> {
        Candidate::Local { name, size }
    }

    #[test]
    fn test_size_limit() {
        let s = settings();
        assert!(matches!(
            validate(&local("big.png", 10 * MIB), &s, 0),
            Err(Rejection::TooLarge { .. })
        ));
        assert_eq!(validate(&local("ok.png", 4 * MIB), &s, 0), Ok(Accepted::File));
        assert_eq!(validate(&local("edge.png", 5 * MIB), &s, 0), Ok(Accepted::File));
    }

    #[test]
    fn test_count_limit() {
        let s = settings();
        assert_eq!(validate(&local("a.png", 1), &s, 5), Ok(Accepted::File));
        assert_eq!(
            validate(&local("seventh.png", 1), &s, 6),
            Err(Rejection::LimitExceeded { max: 6 })
        );
        assert_eq!(
            validate(&Candidate::link("https://x.io/a.png"), &s, 6),
            Err(Rejection::LimitExceeded { max: 6 })
        );
    }

    #[test]
    fn test_extension_rules() {
        let s = settings();
        assert_eq!(validate(&local("SCAN.PDF", 1), &s, 0), Ok(Accepted::File));

        match validate(&local("notes.txt", 1), &s, 0) {
            Err(Rejection::UnsupportedType { extension, allowed }) => {
                assert_eq!(extension, "txt");
                assert_eq!(allowed, vec!["pdf".to_string(), "png".to_string()]);
            }
            other => panic!("unexpected: {:?}", other),
        }

        // Only the text after the last dot counts
        assert!(validate(&local("photo.png.exe", 1), &s, 0).is_err());
        assert!(validate(&local("archive.tar.pdf", 1), &s, 0).is_ok());
        assert!(validate(&local("README", 1), &s, 0).is_err());
    }

    #[test]
    fn test_rule_order() {
        // Transfer method is checked before the count
        let s = settings().with_transfer_methods(&[TransferMethod::RemoteUrl]);
        assert_eq!(
            validate(&local("a.png", 1), &s, 100),
            Err(Rejection::UnsupportedTransferMethod(TransferMethod::LocalFile))
        );

        // Count before type and size
        let s = settings();
        assert_eq!(
            validate(&local("a.exe", 100 * MIB), &s, 6),
            Err(Rejection::LimitExceeded { max: 6 })
        );

        // Type before size
        assert!(matches!(
            validate(&local("a.exe", 100 * MIB), &s, 0),
            Err(Rejection::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_links_are_soft_validated() {
        let s = settings();
        assert_eq!(
            validate(&Candidate::link("https://example.com/cat.png"), &s, 0),
            Ok(Accepted::Link { well_formed: true })
        );
        assert_eq!(
            validate(&Candidate::link("ftp://files.example.com/a"), &s, 0),
            Ok(Accepted::Link { well_formed: true })
        );
        assert_eq!(
            validate(&Candidate::link("not-a-url"), &s, 0),
            Ok(Accepted::Link { well_formed: false })
        );

        let s = settings().with_transfer_methods(&[TransferMethod::LocalFile]);
        assert_eq!(
            validate(&Candidate::link("https://example.com"), &s, 0),
            Err(Rejection::UnsupportedTransferMethod(TransferMethod::RemoteUrl))
        );
    }

    #[test]
    fn test_url_scheme_check() {
        assert!(is_well_formed_url("http://a"));
        assert!(is_well_formed_url("HTTPS://A.COM"));
        assert!(!is_well_formed_url("mailto:me@example.com"));
        assert!(!is_well_formed_url(" https://leading-space"));
        assert!(!is_well_formed_url("https:/one-slash"));
    }

    #[test]
    fn test_rejection_messages() {
        let too_large = Rejection::TooLarge {
            size: 10 * MIB,
            max: 5 * MIB,
            max_mib: 5.0,
        };
        assert_eq!(too_large.message(), Message::SizeLimit { max_mib: 5.0 });
        assert_eq!(
            Rejection::LimitExceeded { max: 3 }.message(),
            Message::CountLimit { max: 3 }
        );
    }
}
