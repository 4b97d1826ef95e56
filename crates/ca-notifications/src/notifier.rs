//! Notification Sinks

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::message::{Message, NotificationKind};

/// A notice delivered to a sink
#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub kind: NotificationKind,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Sink for user-facing messages.
///
/// This is the only I/O boundary of the attachment pipeline besides the
/// transport; implementations must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, kind: NotificationKind, message: &str);

    /// Deliver a catalogue message
    fn send(&self, message: &Message) {
        self.notify(message.kind(), &message.text());
    }
}

/// In-memory sink that records every notice
#[derive(Default)]
pub struct MemoryNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    pub fn count(&self, kind: NotificationKind) -> usize {
        self.notices.lock().iter().filter(|n| n.kind == kind).count()
    }

    pub fn last(&self) -> Option<Notice> {
        self.notices.lock().last().cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.notices.lock().is_empty()
    }

    /// Remove and return everything recorded so far
    pub fn drain(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.lock())
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, kind: NotificationKind, message: &str) {
        self.notices.lock().push(Notice {
            kind,
            message: message.to_string(),
            created_at: Utc::now(),
        });
    }
}

/// Sink that forwards notices to the tracing subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, kind: NotificationKind, message: &str) {
        match kind {
            NotificationKind::Error => tracing::error!(kind = %kind, "{}", message),
            NotificationKind::Warning => tracing::warn!(kind = %kind, "{}", message),
            NotificationKind::Success | NotificationKind::Info => {
                tracing::info!(kind = %kind, "{}", message)
            }
        }
    }
}
