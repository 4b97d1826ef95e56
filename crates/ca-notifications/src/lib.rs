//! # ca-notifications
//!
//! User-facing notifications for Chat Attachments RS.
//!
//! The attachment pipeline reports validation, read and upload problems
//! through a single [`Notifier`] sink. The host application decides how to
//! surface them (toast, status line, log).
//!
//! - [`Message`]: the catalogue of messages the pipeline can emit
//! - [`MemoryNotifier`]: collects notices, used by tests and the CLI
//! - [`TracingNotifier`]: forwards notices to `tracing`

pub mod message;
pub mod notifier;

pub use message::{Message, NotificationKind};
pub use notifier::{MemoryNotifier, Notice, Notifier, TracingNotifier};
