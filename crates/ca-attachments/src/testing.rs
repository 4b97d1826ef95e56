//! Test doubles for driving uploads step by step

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::model::Payload;
use crate::transport::{ProgressReporter, Transport, TransportError, TransportResult};

/// One thing a scripted upload does next
#[derive(Debug, Clone)]
pub enum Step {
    Progress(u8),
    Succeed(String),
    Fail,
}

/// Transport whose uploads follow scripts fed from the test.
///
/// Each upload takes the next queued script in call order and blocks on it
/// until the test sends a terminal step.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<mpsc::UnboundedReceiver<Step>>>,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a script for the next upload call
    pub fn expect_upload(&self) -> mpsc::UnboundedSender<Step> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.scripts.lock().push_back(rx);
        tx
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn upload(&self, _payload: Payload, progress: ProgressReporter) -> TransportResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let Some(mut script) = self.scripts.lock().pop_front() else {
            return Err(TransportError::BackendError("no script queued".into()));
        };

        while let Some(step) = script.recv().await {
            match step {
                Step::Progress(percent) => progress.report(percent),
                Step::Succeed(id) => return Ok(id),
                Step::Fail => return Err(TransportError::BackendError("scripted failure".into())),
            }
        }
        Err(TransportError::BackendError("script dropped".into()))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Let spawned tasks run until they block
pub async fn run_until_idle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}
