use std::future::Future;
use std::sync::Arc;

use common::now_secs;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Scan,
    Lyrics,
    Covers,
    All,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Scan => "scan",
            JobKind::Lyrics => "lyrics",
            JobKind::Covers => "covers",
            JobKind::All => "all",
        }
    }

    pub fn wants_lyrics(&self) -> bool {
        matches!(self, JobKind::Lyrics | JobKind::All)
    }

    pub fn wants_cover(&self) -> bool {
        matches!(self, JobKind::Covers | JobKind::All)
    }
}

/// Snapshot of the single background job. Stays at the last job's final
/// values after it ends.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BatchJobStatus {
    pub running: bool,
    pub task_type: Option<JobKind>,
    pub task_id: String,
    pub total: usize,
    pub current: usize,
    pub success: usize,
    pub failed: usize,
    pub message: String,
    pub created_at: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobBusy;

impl std::fmt::Display for JobBusy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "another batch task is running")
    }
}

impl std::error::Error for JobBusy {}

#[derive(Default)]
struct Slot {
    status: BatchJobStatus,
    generation: u64,
    cancel: Option<CancellationToken>,
}

/// The job slot and status registry. At most one job holds a `JobToken` at
/// a time; every clone shares the same slot.
#[derive(Clone, Default)]
pub struct JobManager {
    slot: Arc<Mutex<Slot>>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl JobManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the slot, or reports `JobBusy` without touching the status.
    pub fn try_start(&self, kind: JobKind, total: usize) -> Result<JobToken, JobBusy> {
        let mut slot = self.slot.lock();
        if slot.status.running {
            return Err(JobBusy);
        }
        slot.generation += 1;
        let cancel = CancellationToken::new();
        let task_id = new_task_id();
        slot.status = BatchJobStatus {
            running: true,
            task_type: Some(kind),
            task_id: task_id.clone(),
            total,
            current: 0,
            success: 0,
            failed: 0,
            message: "Started".to_string(),
            created_at: Some(now_secs()),
        };
        slot.cancel = Some(cancel.clone());
        Ok(JobToken {
            slot: Arc::clone(&self.slot),
            generation: slot.generation,
            task_id,
            kind,
            cancel,
            finished: false,
        })
    }

    pub fn snapshot(&self) -> BatchJobStatus {
        self.slot.lock().status.clone()
    }

    pub fn is_running(&self) -> bool {
        self.slot.lock().status.running
    }

    /// Asks the running job to stop after its current item.
    pub fn cancel(&self) -> bool {
        let slot = self.slot.lock();
        if !slot.status.running {
            return false;
        }
        match slot.cancel.as_ref() {
            Some(cancel) => {
                cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Runs the job body in the background. The handle is kept for `join`.
    pub fn launch<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(job);
        *self.worker.lock() = Some(handle);
    }

    /// Waits for the most recently launched job to return.
    pub async fn join(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!("Background job ended abnormally: {}", err);
            }
        }
    }
}

/// Write access to the status registry for the job that owns the slot.
/// Dropping an unfinished token releases the slot.
pub struct JobToken {
    slot: Arc<Mutex<Slot>>,
    generation: u64,
    task_id: String,
    kind: JobKind,
    cancel: CancellationToken,
    finished: bool,
}

impl JobToken {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub fn set_total(&self, total: usize) {
        self.update(|status| status.total = total);
    }

    /// Marks item `index` (1-based) as in progress.
    pub fn begin_item(&self, index: usize, message: impl Into<String>) {
        let message = message.into();
        self.update(|status| {
            status.current = index;
            status.message = message;
        });
    }

    pub fn record_item(&self, success: bool) {
        self.update(|status| {
            if success {
                status.success += 1;
            } else {
                status.failed += 1;
            }
        });
    }

    pub fn finish(mut self, message: impl Into<String>) {
        let message = message.into();
        self.release(message);
    }

    fn release(&mut self, message: String) {
        self.finished = true;
        let mut slot = self.slot.lock();
        if slot.generation != self.generation {
            return;
        }
        slot.status.running = false;
        slot.status.message = message;
        slot.cancel = None;
    }

    fn update<F: FnOnce(&mut BatchJobStatus)>(&self, change: F) {
        let mut slot = self.slot.lock();
        if slot.generation == self.generation && slot.status.running {
            change(&mut slot.status);
        }
    }
}

impl Drop for JobToken {
    fn drop(&mut self) {
        if !self.finished {
            self.release("Aborted".to_string());
        }
    }
}

/// `YYYYMMDDhhmmss-xxxxxxxx`, UTC plus eight random hex digits.
pub fn new_task_id() -> String {
    let now = OffsetDateTime::now_utc();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{:04}{:02}{:02}{:02}{:02}{:02}-{}",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second(),
        &suffix[..8]
    )
}
