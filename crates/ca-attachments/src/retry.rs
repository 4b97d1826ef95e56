//! Retry Controller
//!
//! Re-runs the upload of a local attachment under its existing identity. The
//! store keeps the read payload for the lifetime of a record, so the usual
//! path is a plain restart; when the bytes are gone the file is read again
//! from where it originally came from.

use ca_core::AttachmentId;
use ca_notifications::Message;
use tracing::{info, instrument, warn};

use crate::error::{AttachmentError, AttachmentResult};
use crate::store::{AttachmentStore, RetryStart};

pub struct RetryController {
    store: AttachmentStore,
}

impl RetryController {
    pub fn new(store: AttachmentStore) -> Self {
        Self { store }
    }

    /// Restart the upload of `id`.
    ///
    /// Progress and completion are reported through the store exactly like
    /// the first attempt. Returns `Skipped` for links, absent and deleted
    /// records.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn retry(&self, id: AttachmentId) -> AttachmentResult<RetryStart> {
        match self.store.retry(id) {
            RetryStart::PayloadMissing => {}
            outcome => return Ok(outcome),
        }

        let Some(origin) = self.store.origin_of(id) else {
            return Ok(RetryStart::Skipped);
        };
        info!(filename = %origin.name, "Payload missing, reading file again");

        let payload = match origin.read().await {
            Ok(payload) => payload,
            Err(source) => {
                warn!(error = %source, "Failed to re-read file for retry");
                self.store.notifier().send(&Message::ReadError);
                return Err(AttachmentError::ReadFailed {
                    name: origin.name,
                    source,
                });
            }
        };

        // The record may have been removed while the file was being read
        if !self.store.restore_payload(id, payload) {
            return Ok(RetryStart::Skipped);
        }
        Ok(self.store.retry(id))
    }

    /// Restart every failed local upload, in display order
    pub async fn retry_failed(&self) -> Vec<(AttachmentId, AttachmentResult<RetryStart>)> {
        let failed: Vec<AttachmentId> = self
            .store
            .records()
            .into_iter()
            .filter(|r| r.is_local() && r.is_failed())
            .map(|r| r.id)
            .collect();

        let mut outcomes = Vec::with_capacity(failed.len());
        for id in failed {
            outcomes.push((id, self.retry(id).await));
        }
        outcomes
    }
}
