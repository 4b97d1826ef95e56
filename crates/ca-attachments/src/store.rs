//! Attachment Store
//!
//! The single owner of a feature's attachment records. Every mutation goes
//! through the operations below, and every asynchronous completion (payload
//! read, transport progress, success, failure) looks its record up by
//! identity in the current collection when it lands. A record that was
//! removed or cleared in the meantime is simply not found, so the late
//! callback is dropped.
//!
//! Records are never physically removed by [`AttachmentStore::remove`]; the
//! flag hides them from [`AttachmentStore::records`] while keeping positions
//! stable. [`AttachmentStore::clear`] empties the collection outright.

use std::collections::HashMap;
use std::sync::Arc;

use ca_core::{AttachmentId, TransferMethod, UploadSettings};
use ca_notifications::{Message, Notifier};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::error::{AttachmentError, AttachmentResult};
use crate::ingest::ingestion_enabled;
use crate::model::{AttachmentRecord, LocalFile, Payload, Progress};
use crate::transport::{ProgressReporter, Transport};
use crate::validator::{validate, Accepted, Candidate, Rejection};

/// Result of asking the store to re-run an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStart {
    /// Progress reset to 0 and the transport invoked again
    Restarted,
    /// Local record without retained bytes; its origin can be re-read
    PayloadMissing,
    /// Absent, deleted, remote, or nothing to upload
    Skipped,
}

/// Insertion-ordered records with an identity index
#[derive(Default)]
struct Records {
    items: Vec<AttachmentRecord>,
    index: HashMap<AttachmentId, usize>,
}

impl Records {
    fn get(&self, id: AttachmentId) -> Option<&AttachmentRecord> {
        self.index.get(&id).map(|&pos| &self.items[pos])
    }

    /// Mutable access to a record that exists and is not deleted
    fn live_mut(&mut self, id: AttachmentId) -> Option<&mut AttachmentRecord> {
        let pos = *self.index.get(&id)?;
        let record = &mut self.items[pos];
        (!record.deleted).then_some(record)
    }

    /// Insert a record, or merge it into the one with the same identity.
    ///
    /// Merging is last-writer-wins per field; fields the incoming record
    /// leaves unset keep their current value. The source kind and the
    /// deleted flag never change through a merge, and deleted records are
    /// left alone.
    fn upsert(&mut self, incoming: AttachmentRecord) -> AttachmentId {
        let id = incoming.id;
        let Some(&pos) = self.index.get(&id) else {
            self.index.insert(id, self.items.len());
            self.items.push(incoming);
            return id;
        };

        let existing = &mut self.items[pos];
        if existing.deleted {
            return id;
        }

        existing.payload = incoming.payload.or(existing.payload.take());
        existing.origin = incoming.origin.or(existing.origin.take());
        existing.name = incoming.name.or(existing.name.take());
        existing.size = incoming.size.or(existing.size);
        existing.remote_target = incoming.remote_target.or(existing.remote_target.take());
        if !incoming.renderable_url.is_empty() {
            existing.renderable_url = incoming.renderable_url;
        }
        if !incoming.backend_id.is_empty() {
            existing.backend_id = incoming.backend_id;
        }
        existing.progress = incoming.progress;
        existing.attempt = existing.attempt.max(incoming.attempt);
        id
    }

    fn active(&self) -> impl Iterator<Item = &AttachmentRecord> {
        self.items.iter().filter(|r| !r.deleted)
    }

    fn clear(&mut self) {
        self.items.clear();
        self.index.clear();
    }
}

struct Shared {
    records: Mutex<Records>,
    settings: RwLock<Option<UploadSettings>>,
    transport: Arc<dyn Transport>,
    notifier: Arc<dyn Notifier>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

/// Authoritative collection of attachment records for one feature.
///
/// Cheap to clone; clones share the same records, so ingestion adapters and
/// upload tasks each hold their own handle.
#[derive(Clone)]
pub struct AttachmentStore {
    shared: Arc<Shared>,
}

impl AttachmentStore {
    pub fn new(
        settings: Option<UploadSettings>,
        transport: Arc<dyn Transport>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                records: Mutex::new(Records::default()),
                settings: RwLock::new(settings),
                transport,
                notifier,
                in_flight: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn settings(&self) -> Option<UploadSettings> {
        self.shared.settings.read().clone()
    }

    /// Swap the capability descriptor; existing records are kept
    pub fn set_settings(&self, settings: Option<UploadSettings>) {
        *self.shared.settings.write() = settings;
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.shared.notifier
    }

    /// Whether ingestion through `method` is currently possible
    pub fn accepts(&self, method: TransferMethod) -> bool {
        ingestion_enabled(self.shared.settings.read().as_ref(), method, self.active_count())
    }

    /// Number of non-deleted records
    pub fn active_count(&self) -> usize {
        self.shared.records.lock().active().count()
    }

    /// Rendering view: non-deleted records in insertion order
    pub fn records(&self) -> Vec<AttachmentRecord> {
        self.shared.records.lock().active().cloned().collect()
    }

    /// Every record, deleted ones included
    pub fn all_records(&self) -> Vec<AttachmentRecord> {
        self.shared.records.lock().items.clone()
    }

    /// Look up a record by identity, deleted or not
    pub fn get(&self, id: AttachmentId) -> Option<AttachmentRecord> {
        self.shared.records.lock().get(id).cloned()
    }

    /// Settings to validate against, or `Disabled` when ingestion is off
    fn enabled_settings(&self) -> AttachmentResult<UploadSettings> {
        match self.settings() {
            Some(settings) if settings.enabled => Ok(settings),
            _ => Err(AttachmentError::Disabled),
        }
    }

    fn validate(&self, candidate: &Candidate<'_>) -> AttachmentResult<Accepted> {
        let settings = self.enabled_settings()?;
        validate(candidate, &settings, self.active_count()).map_err(|r| self.reject(r))
    }

    fn reject(&self, rejection: Rejection) -> AttachmentError {
        warn!(reason = %rejection, "Attachment rejected");
        self.shared.notifier.send(&rejection.message());
        AttachmentError::Rejected(rejection)
    }

    /// Insert a new record unless the store is already full.
    ///
    /// The count is checked again under the records lock, so registrations
    /// that validated concurrently cannot push the store past `max_count`.
    /// Merges into an existing record are not counted.
    fn insert_within_limit(&self, record: AttachmentRecord) -> AttachmentResult<AttachmentId> {
        let settings = self.enabled_settings()?;
        let mut records = self.shared.records.lock();
        if records.get(record.id).is_none() && records.active().count() >= settings.max_count {
            drop(records);
            return Err(self.reject(Rejection::LimitExceeded {
                max: settings.max_count,
            }));
        }
        Ok(records.upsert(record))
    }

    /// Validate, read and start uploading a local file.
    ///
    /// Rejections and read failures are notified and leave the store
    /// untouched. On success the record exists with progress 0 before this
    /// returns and the upload runs in the background.
    #[instrument(skip(self, file), fields(filename = %file.name, size = file.size))]
    pub async fn register_local(&self, file: LocalFile) -> AttachmentResult<AttachmentId> {
        self.validate(&Candidate::file(&file))?;

        let payload = match file.read().await {
            Ok(payload) => payload,
            Err(source) => {
                warn!(error = %source, "Failed to read local file");
                self.shared.notifier.send(&Message::ReadError);
                return Err(AttachmentError::ReadFailed {
                    name: file.name,
                    source,
                });
            }
        };

        let record = AttachmentRecord::local(payload.clone(), Some(file));
        let id = self.insert_within_limit(record)?;
        info!(id = %id, "Local attachment registered");

        self.start_upload(id, 0, payload);
        Ok(id)
    }

    /// Record a user-supplied link. No network call is made; malformed links
    /// are recorded already failed so the user sees them.
    #[instrument(skip(self))]
    pub fn register_remote(&self, url: &str) -> AttachmentResult<AttachmentId> {
        let well_formed = match self.validate(&Candidate::link(url))? {
            Accepted::Link { well_formed } => well_formed,
            Accepted::File => true,
        };

        let id = self.insert_within_limit(AttachmentRecord::remote(url, well_formed))?;
        if well_formed {
            info!(id = %id, "Remote attachment registered");
        } else {
            warn!(id = %id, "Remote attachment registered with malformed link");
        }
        Ok(id)
    }

    /// Insert a record or merge it into an existing one with the same id
    pub fn upsert(&self, record: AttachmentRecord) -> AttachmentId {
        self.shared.records.lock().upsert(record)
    }

    /// Apply `f` to a live record, optionally only for a given upload attempt
    fn update<F>(&self, id: AttachmentId, attempt: Option<u32>, f: F) -> bool
    where
        F: FnOnce(&mut AttachmentRecord) -> bool,
    {
        let mut records = self.shared.records.lock();
        match records.live_mut(id) {
            Some(record) if attempt.map_or(true, |a| a == record.attempt) => f(record),
            _ => false,
        }
    }

    fn set_in_flight(record: &mut AttachmentRecord, percent: u8) -> bool {
        if record.progress.is_terminal() {
            return false;
        }
        record.progress = Progress::in_flight(percent);
        true
    }

    fn set_succeeded(record: &mut AttachmentRecord, backend_id: String) -> bool {
        if record.progress.is_terminal() {
            return false;
        }
        record.backend_id = backend_id;
        record.progress = Progress::COMPLETE;
        true
    }

    fn set_failed(record: &mut AttachmentRecord) -> bool {
        if record.progress.is_terminal() {
            return false;
        }
        record.progress = Progress::FAILED;
        true
    }

    /// Overwrite the in-flight progress of a record.
    ///
    /// Values are clamped to `0..=99`; only [`Self::mark_upload_succeeded`]
    /// completes a record. Terminal records are left alone.
    pub fn apply_progress(&self, id: AttachmentId, percent: u8) -> bool {
        self.update(id, None, |r| Self::set_in_flight(r, percent))
    }

    /// Complete an upload with the backend's identifier.
    ///
    /// An empty identifier cannot satisfy a completed local record and is
    /// treated as a failure.
    pub fn mark_upload_succeeded(&self, id: AttachmentId, backend_id: impl Into<String>) -> bool {
        self.complete_upload(id, None, backend_id.into())
    }

    /// Fail an upload and notify the user
    pub fn mark_upload_failed(&self, id: AttachmentId) -> bool {
        self.fail_upload(id, None)
    }

    fn complete_upload(&self, id: AttachmentId, attempt: Option<u32>, backend_id: String) -> bool {
        if backend_id.is_empty() {
            warn!(id = %id, "Transport returned an empty backend id");
            return self.fail_upload(id, attempt);
        }
        let changed = self.update(id, attempt, |r| Self::set_succeeded(r, backend_id));
        if changed {
            info!(id = %id, "Upload completed");
        } else {
            debug!(id = %id, "Ignoring late upload success");
        }
        changed
    }

    fn fail_upload(&self, id: AttachmentId, attempt: Option<u32>) -> bool {
        let changed = self.update(id, attempt, Self::set_failed);
        if changed {
            self.shared.notifier.send(&Message::UploadError);
        } else {
            debug!(id = %id, "Ignoring late upload failure");
        }
        changed
    }

    /// The renderer loaded the linked resource
    pub fn mark_remote_loaded(&self, id: AttachmentId) -> bool {
        self.update(id, None, |r| {
            if !r.is_remote() || r.progress.is_terminal() {
                return false;
            }
            r.progress = Progress::COMPLETE;
            true
        })
    }

    /// The renderer could not load the linked resource.
    ///
    /// A link that loaded once can still fail later, e.g. when its target
    /// disappears; only an already failed link is left alone.
    pub fn mark_remote_failed(&self, id: AttachmentId) -> bool {
        let changed = self.update(id, None, |r| {
            if !r.is_remote() || r.progress.is_failed() {
                return false;
            }
            r.progress = Progress::FAILED;
            true
        });
        if changed {
            warn!(id = %id, "Remote attachment could not be loaded");
        }
        changed
    }

    /// Hide a record from the rendering view.
    ///
    /// An upload still in flight is not cancelled; its completion finds the
    /// record deleted and is dropped.
    pub fn remove(&self, id: AttachmentId) -> bool {
        let removed = self.update(id, None, |r| {
            r.deleted = true;
            true
        });
        if removed {
            debug!(id = %id, "Attachment removed");
        }
        removed
    }

    /// Drop every record (after a turn has been sent)
    pub fn clear(&self) {
        self.shared.records.lock().clear();
        debug!("Attachments cleared");
    }

    /// Re-run the upload of a local record with its retained payload.
    ///
    /// Progress goes back to 0 under the same identity and any callback from
    /// an earlier attempt is ignored from here on.
    pub fn retry(&self, id: AttachmentId) -> RetryStart {
        let restart = {
            let mut records = self.shared.records.lock();
            let Some(record) = records.live_mut(id) else {
                return RetryStart::Skipped;
            };
            if !record.is_local() {
                return RetryStart::Skipped;
            }
            let Some(payload) = record.payload.clone() else {
                return if record.origin.is_some() {
                    RetryStart::PayloadMissing
                } else {
                    RetryStart::Skipped
                };
            };

            record.attempt += 1;
            record.progress = Progress::PENDING;
            record.backend_id.clear();
            (record.attempt, payload)
        };

        let (attempt, payload) = restart;
        info!(id = %id, attempt, "Retrying upload");
        self.start_upload(id, attempt, payload);
        RetryStart::Restarted
    }

    /// File a record's payload was read from, for re-reading
    pub(crate) fn origin_of(&self, id: AttachmentId) -> Option<LocalFile> {
        self.shared.records.lock().get(id).and_then(|r| r.origin.clone())
    }

    /// Put re-read bytes back on a live local record
    pub(crate) fn restore_payload(&self, id: AttachmentId, payload: Payload) -> bool {
        self.update(id, None, |r| {
            if !r.is_local() {
                return false;
            }
            r.payload = Some(payload);
            true
        })
    }

    /// Spawn the transport call for one upload attempt
    fn start_upload(&self, id: AttachmentId, attempt: u32, payload: Payload) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                warn!(id = %id, error = %e, "No async runtime to run the upload on");
                self.fail_upload(id, Some(attempt));
                return;
            }
        };

        let progress_store = self.clone();
        let reporter = ProgressReporter::new(move |percent| {
            progress_store.update(id, Some(attempt), |r| Self::set_in_flight(r, percent));
        });

        let store = self.clone();
        let handle = runtime.spawn(async move {
            let transport = store.shared.transport.clone();
            debug!(id = %id, attempt, transport = transport.name(), "Upload started");
            match transport.upload(payload, reporter).await {
                Ok(backend_id) => {
                    store.complete_upload(id, Some(attempt), backend_id);
                }
                Err(e) => {
                    warn!(id = %id, attempt, error = %e, "Upload failed");
                    store.fail_upload(id, Some(attempt));
                }
            }
        });

        let mut in_flight = self.shared.in_flight.lock();
        in_flight.retain(|h| !h.is_finished());
        in_flight.push(handle);
    }

    /// Wait until every upload started so far has finished
    pub async fn settle(&self) {
        loop {
            let handles = std::mem::take(&mut *self.shared.in_flight.lock());
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Upload task ended abnormally");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{run_until_idle, ScriptedTransport, Step};
    use crate::transport::MemoryTransport;
    use ca_notifications::{MemoryNotifier, NotificationKind};

    const MIB: u64 = 1024 * 1024;

    fn settings() -> UploadSettings {
        UploadSettings::files()
            .with_extensions(&["png", "pdf", "txt"])
            .with_max_size_mib(5.0)
            .with_max_count(6)
    }

    fn memory_store() -> (AttachmentStore, Arc<MemoryNotifier>) {
        let notifier = Arc::new(MemoryNotifier::new());
        let store = AttachmentStore::new(
            Some(settings()),
            Arc::new(MemoryTransport::new()),
            notifier.clone(),
        );
        (store, notifier)
    }

    fn scripted_store() -> (AttachmentStore, Arc<ScriptedTransport>, Arc<MemoryNotifier>) {
        let notifier = Arc::new(MemoryNotifier::new());
        let transport = Arc::new(ScriptedTransport::new());
        let store = AttachmentStore::new(Some(settings()), transport.clone(), notifier.clone());
        (store, transport, notifier)
    }

    fn png(name: &str) -> LocalFile {
        LocalFile::from_bytes(name, vec![0u8; 16])
    }

    #[tokio::test]
    async fn test_register_local_uploads() {
        let (store, notifier) = memory_store();

        let id = store.register_local(png("cat.png")).await.unwrap();
        let record = store.get(id).unwrap();
        assert_eq!(record.progress, Progress::PENDING);
        assert!(record.renderable_url.starts_with("data:image/png;base64,"));

        store.settle().await;

        let record = store.get(id).unwrap();
        assert_eq!(record.progress, Progress::COMPLETE);
        assert!(!record.backend_id.is_empty());
        assert!(record.is_uploaded());
        assert!(notifier.is_empty());
    }

    #[tokio::test]
    async fn test_identity_stable_across_transitions() {
        let (store, transport, _) = scripted_store();
        let script = transport.expect_upload();

        let id = store.register_local(png("a.png")).await.unwrap();
        for p in [10, 45, 99] {
            script.send(Step::Progress(p)).unwrap();
            run_until_idle().await;
            let records = store.records();
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].id, id);
            assert_eq!(records[0].progress.value(), p as i8);
        }

        script.send(Step::Succeed("file-1".into())).unwrap();
        store.settle().await;

        let records = store.all_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, id);
        assert_eq!(records[0].backend_id, "file-1");
    }

    #[tokio::test]
    async fn test_progress_report_of_100_does_not_complete() {
        let (store, transport, _) = scripted_store();
        let script = transport.expect_upload();

        let id = store.register_local(png("a.png")).await.unwrap();
        script.send(Step::Progress(100)).unwrap();
        run_until_idle().await;

        let record = store.get(id).unwrap();
        assert_eq!(record.progress.value(), 99);
        assert!(record.backend_id.is_empty());
    }

    #[tokio::test]
    async fn test_rejections_notify_without_mutation() {
        let (store, notifier) = memory_store();

        let big = LocalFile::from_bytes("big.png", vec![0u8; (10 * MIB) as usize]);
        assert!(matches!(
            store.register_local(big).await,
            Err(AttachmentError::Rejected(_))
        ));

        let wrong_type = png("virus.exe");
        assert!(store.register_local(wrong_type).await.is_err());

        assert!(store.all_records().is_empty());
        assert_eq!(notifier.count(NotificationKind::Error), 2);
    }

    #[tokio::test]
    async fn test_seventh_attachment_rejected() {
        let (store, notifier) = memory_store();

        for i in 0..6 {
            store.register_local(png(&format!("{}.png", i))).await.unwrap();
        }
        let result = store.register_local(png("7.png")).await;
        assert!(matches!(result, Err(AttachmentError::Rejected(_))));
        assert_eq!(store.active_count(), 6);
        assert_eq!(notifier.count(NotificationKind::Error), 1);

        // Removing one frees a slot
        let first = store.records()[0].id;
        store.remove(first);
        assert!(store.register_local(png("7.png")).await.is_ok());
        store.settle().await;
    }

    #[tokio::test]
    async fn test_concurrent_registrations_respect_limit() {
        let notifier = Arc::new(MemoryNotifier::new());
        let store = AttachmentStore::new(
            Some(settings().with_max_count(1)),
            Arc::new(MemoryTransport::new()),
            notifier.clone(),
        );
        let dir = tempfile::tempdir().unwrap();
        let mut files = Vec::new();
        for name in ["a.png", "b.png"] {
            let path = dir.path().join(name);
            tokio::fs::write(&path, b"pixels").await.unwrap();
            files.push(LocalFile::from_path(&path).await.unwrap());
        }
        let second = files.pop().unwrap();
        let first = files.pop().unwrap();

        // Both pass validation before either file has been read
        let (a, b) = tokio::join!(store.register_local(first), store.register_local(second));

        assert_eq!([&a, &b].iter().filter(|r| r.is_ok()).count(), 1);
        let refused = if a.is_err() { a } else { b };
        assert!(matches!(
            refused,
            Err(AttachmentError::Rejected(Rejection::LimitExceeded { max: 1 }))
        ));
        assert_eq!(store.active_count(), 1);
        assert_eq!(store.all_records().len(), 1);
        assert_eq!(notifier.count(NotificationKind::Error), 1);
        assert_eq!(
            notifier.last().unwrap().message,
            Message::CountLimit { max: 1 }.text()
        );
        store.settle().await;
    }

    #[tokio::test]
    async fn test_disabled_settings_are_silent() {
        let notifier = Arc::new(MemoryNotifier::new());
        let store = AttachmentStore::new(
            Some(settings().disabled()),
            Arc::new(MemoryTransport::new()),
            notifier.clone(),
        );
        assert!(matches!(
            store.register_local(png("a.png")).await,
            Err(AttachmentError::Disabled)
        ));

        store.set_settings(None);
        assert!(matches!(
            store.register_remote("https://example.com/a.png"),
            Err(AttachmentError::Disabled)
        ));

        assert!(store.all_records().is_empty());
        assert!(notifier.is_empty());
    }

    #[tokio::test]
    async fn test_read_failure_creates_no_record() {
        let (store, notifier) = memory_store();
        let missing = LocalFile::new(
            "gone.png",
            10,
            crate::model::FileSource::Path("/definitely/not/here/gone.png".into()),
        );

        let result = store.register_local(missing).await;
        assert!(matches!(result, Err(AttachmentError::ReadFailed { .. })));
        assert!(store.all_records().is_empty());
        assert_eq!(
            notifier.last().unwrap().message,
            Message::ReadError.text()
        );
    }

    #[tokio::test]
    async fn test_upload_failure_notifies() {
        let notifier = Arc::new(MemoryNotifier::new());
        let store = AttachmentStore::new(
            Some(settings()),
            Arc::new(MemoryTransport::failing("boom")),
            notifier.clone(),
        );

        let id = store.register_local(png("a.png")).await.unwrap();
        store.settle().await;

        assert!(store.get(id).unwrap().is_failed());
        assert_eq!(notifier.last().unwrap().message, Message::UploadError.text());
    }

    #[tokio::test]
    async fn test_malformed_link_fails_immediately() {
        let (store, notifier) = memory_store();

        let id = store.register_remote("not-a-url").unwrap();
        let record = store.get(id).unwrap();
        assert_eq!(record.progress, Progress::FAILED);
        assert_eq!(record.remote_target.as_deref(), Some("not-a-url"));
        assert!(notifier.is_empty());

        // A failed link is never resurrected by a load event
        assert!(!store.mark_remote_loaded(id));
        assert!(store.get(id).unwrap().is_failed());
    }

    #[tokio::test]
    async fn test_remote_load_outcomes() {
        let (store, _) = memory_store();

        let ok = store.register_remote("https://example.com/a.png").unwrap();
        let bad = store.register_remote("https://example.com/missing.png").unwrap();
        assert_eq!(store.get(ok).unwrap().progress, Progress::PENDING);

        assert!(store.mark_remote_loaded(ok));
        assert!(store.mark_remote_failed(bad));

        assert_eq!(store.get(ok).unwrap().progress, Progress::COMPLETE);
        assert_eq!(store.get(bad).unwrap().progress, Progress::FAILED);
        assert!(!store.mark_remote_loaded(bad));

        // Link outcomes never apply to local records
        let local = store.register_local(png("a.png")).await.unwrap();
        assert!(!store.mark_remote_loaded(local));
        store.settle().await;
    }

    #[tokio::test]
    async fn test_loaded_link_can_fail_later() {
        let (store, notifier) = memory_store();
        let id = store.register_remote("https://example.com/a.png").unwrap();

        assert!(store.mark_remote_loaded(id));
        assert!(store.mark_remote_failed(id));
        assert_eq!(store.get(id).unwrap().progress, Progress::FAILED);

        assert!(!store.mark_remote_failed(id));
        assert!(!store.mark_remote_loaded(id));
        assert_eq!(store.get(id).unwrap().progress, Progress::FAILED);
        assert!(notifier.is_empty());
    }

    #[tokio::test]
    async fn test_mutations_on_absent_or_deleted_are_noops() {
        let (store, transport, notifier) = scripted_store();
        let _script = transport.expect_upload();

        let id = store.register_local(png("a.png")).await.unwrap();
        store.remove(id);
        let absent = AttachmentId::new();

        let before = store.all_records();
        let view_before = store.records();

        for target in [id, absent] {
            assert!(!store.apply_progress(target, 50));
            assert!(!store.mark_upload_succeeded(target, "x"));
            assert!(!store.mark_upload_failed(target));
            assert!(!store.mark_remote_loaded(target));
            assert!(!store.mark_remote_failed(target));
            assert!(!store.remove(target));
            assert_eq!(store.retry(target), RetryStart::Skipped);
        }

        assert_eq!(store.all_records(), before);
        assert_eq!(store.records(), view_before);
        assert!(view_before.is_empty());
        assert!(notifier.is_empty());
    }

    #[tokio::test]
    async fn test_late_success_after_remove_stays_hidden() {
        let (store, transport, _) = scripted_store();
        let script = transport.expect_upload();

        let id = store.register_local(png("a.png")).await.unwrap();
        script.send(Step::Progress(45)).unwrap();
        run_until_idle().await;
        assert_eq!(store.get(id).unwrap().progress.value(), 45);

        assert!(store.remove(id));
        assert!(store.records().is_empty());

        script.send(Step::Succeed("late".into())).unwrap();
        store.settle().await;

        assert!(store.records().is_empty());
        let underlying = store.get(id).unwrap();
        assert!(underlying.deleted);
        assert_eq!(underlying.progress.value(), 45);
        assert!(underlying.backend_id.is_empty());
    }

    #[tokio::test]
    async fn test_clear_absorbs_in_flight_callbacks() {
        let (store, transport, notifier) = scripted_store();
        let script = transport.expect_upload();

        store.register_local(png("a.png")).await.unwrap();
        store.clear();

        script.send(Step::Progress(80)).unwrap();
        script.send(Step::Fail).unwrap();
        store.settle().await;

        assert!(store.all_records().is_empty());
        assert!(notifier.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_uploads_complete_out_of_order() {
        let (store, transport, _) = scripted_store();
        let first_script = transport.expect_upload();
        let second_script = transport.expect_upload();

        let first = store.register_local(png("first.png")).await.unwrap();
        run_until_idle().await;
        let second = store.register_local(png("second.png")).await.unwrap();
        run_until_idle().await;

        second_script.send(Step::Succeed("b".into())).unwrap();
        run_until_idle().await;
        first_script.send(Step::Progress(30)).unwrap();
        first_script.send(Step::Fail).unwrap();
        store.settle().await;

        let records = store.records();
        assert_eq!(records.iter().map(|r| r.id).collect::<Vec<_>>(), vec![first, second]);
        assert!(records[0].is_failed());
        assert_eq!(records[1].backend_id, "b");
    }

    #[tokio::test]
    async fn test_retry_reuses_identity() {
        let (store, transport, _) = scripted_store();
        let first = transport.expect_upload();
        let second = transport.expect_upload();

        let id = store.register_local(png("a.png")).await.unwrap();
        first.send(Step::Fail).unwrap();
        store.settle().await;
        assert!(store.get(id).unwrap().is_failed());

        assert_eq!(store.retry(id), RetryStart::Restarted);
        assert_eq!(store.get(id).unwrap().progress, Progress::PENDING);

        second.send(Step::Progress(60)).unwrap();
        second.send(Step::Succeed("again".into())).unwrap();
        store.settle().await;

        let records = store.all_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, id);
        assert_eq!(records[0].progress, Progress::COMPLETE);
        assert_eq!(records[0].backend_id, "again");
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_superseded_attempt_is_ignored() {
        let (store, transport, _) = scripted_store();
        let first = transport.expect_upload();
        let second = transport.expect_upload();

        let id = store.register_local(png("a.png")).await.unwrap();
        run_until_idle().await;
        assert_eq!(store.retry(id), RetryStart::Restarted);

        first.send(Step::Succeed("stale".into())).unwrap();
        run_until_idle().await;
        assert_eq!(store.get(id).unwrap().progress, Progress::PENDING);

        second.send(Step::Succeed("fresh".into())).unwrap();
        store.settle().await;
        assert_eq!(store.get(id).unwrap().backend_id, "fresh");
    }

    #[tokio::test]
    async fn test_retry_skips_links_and_missing_payloads() {
        let (store, _) = memory_store();

        let link = store.register_remote("https://example.com/a.png").unwrap();
        assert_eq!(store.retry(link), RetryStart::Skipped);

        let mut record = AttachmentRecord::local(
            Payload::new("a.png", bytes::Bytes::from_static(b"x")),
            None,
        );
        record.payload = None;
        let id = store.upsert(record);
        assert_eq!(store.retry(id), RetryStart::Skipped);
        assert_eq!(store.get(id).unwrap().progress, Progress::PENDING);
    }

    #[tokio::test]
    async fn test_upsert_merges_existing_identity() {
        let (store, _) = memory_store();

        let id = store.register_remote("https://example.com/a.png").unwrap();
        let mut update = AttachmentRecord::remote("", true).with_id(id);
        update.remote_target = None;
        update.progress = Progress::in_flight(20);

        assert_eq!(store.upsert(update), id);
        let records = store.all_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].progress.value(), 20);
        assert_eq!(records[0].renderable_url, "https://example.com/a.png");
        assert_eq!(
            records[0].remote_target.as_deref(),
            Some("https://example.com/a.png")
        );
    }

    #[tokio::test]
    async fn test_empty_backend_id_counts_as_failure() {
        let (store, transport, notifier) = scripted_store();
        let script = transport.expect_upload();

        let id = store.register_local(png("a.png")).await.unwrap();
        script.send(Step::Succeed(String::new())).unwrap();
        store.settle().await;

        assert!(store.get(id).unwrap().is_failed());
        assert_eq!(notifier.count(NotificationKind::Error), 1);
    }

    #[tokio::test]
    async fn test_accepts_follows_settings_and_count() {
        let (store, _) = memory_store();
        assert!(store.accepts(TransferMethod::LocalFile));
        assert!(store.accepts(TransferMethod::RemoteUrl));

        store.set_settings(Some(
            settings()
                .with_transfer_methods(&[TransferMethod::LocalFile])
                .with_max_count(1),
        ));
        assert!(!store.accepts(TransferMethod::RemoteUrl));

        store.register_local(png("a.png")).await.unwrap();
        assert!(!store.accepts(TransferMethod::LocalFile));
        store.settle().await;
    }
}
