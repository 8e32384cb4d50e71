//! Job bookkeeping: status, counters and cancellation for one run.
//!
//! A [`JobSlot`] admits one run at a time. The run owns an [`ActiveJob`];
//! callers observe and cancel it through a cloneable [`JobHandle`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{HarvestError, Result};
use crate::progress::{self, ProgressEvent, ProgressReceiver, ProgressSender};
use crate::store::RunId;

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, no batch started yet.
    Pending,
    /// Batches are being fetched.
    Processing,
    /// Every batch was processed.
    Completed,
    /// The run failed.
    Failed,
    /// The run was cancelled.
    Cancelled,
}

impl JobStatus {
    /// Returns true for statuses no transition leaves.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled)
    }
}

/// Stage the pipeline is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    /// Not started.
    Idle,
    /// Opening the mail session.
    Connecting,
    /// Searching and scanning the folder.
    Scanning,
    /// Fetching flagged messages batch by batch.
    BatchProcessing,
    /// Building the summary and archive.
    Finalizing,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Finished by cancellation.
    Cancelled,
}

/// Observable state of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobState {
    /// Job identifier, also the working store namespace.
    pub job_id: RunId,
    /// Folder being harvested.
    pub folder: String,
    /// Lifecycle status.
    pub status: JobStatus,
    /// Pipeline stage.
    pub stage: RunStage,
    /// Messages in the folder.
    pub total_messages: usize,
    /// Messages flagged by the structural scan.
    pub flagged_messages: usize,
    /// Number of fetch batches.
    pub batch_count: usize,
    /// Batches finished.
    pub processed_batches: usize,
    /// Flagged messages fetched so far.
    pub processed_messages: usize,
    /// PDF attachments persisted so far.
    pub total_pdfs: usize,
    /// DOCX attachments persisted so far.
    pub total_docx: usize,
    /// Failure message, once failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time. Strictly increases on every mutation.
    pub updated_at: DateTime<Utc>,
}

impl JobState {
    fn new(job_id: RunId, folder: &str) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            folder: folder.to_string(),
            status: JobStatus::Pending,
            stage: RunStage::Idle,
            total_messages: 0,
            flagged_messages: 0,
            batch_count: 0,
            processed_batches: 0,
            processed_messages: 0,
            total_pdfs: 0,
            total_docx: 0,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self) {
        let now = Utc::now();
        let floor = self.updated_at + Duration::milliseconds(1);
        self.updated_at = now.max(floor);
    }
}

/// Serialized writer of a job's state.
///
/// Mutations that break the lifecycle rules are rejected and return false.
#[derive(Debug)]
pub struct JobTracker {
    tx: watch::Sender<JobState>,
}

impl JobTracker {
    /// Creates a tracker in [`JobStatus::Pending`].
    #[must_use]
    pub fn new(job_id: RunId, folder: &str) -> Self {
        let (tx, _rx) = watch::channel(JobState::new(job_id, folder));
        Self { tx }
    }

    /// Returns a copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> JobState {
        self.tx.borrow().clone()
    }

    /// Subscribes to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<JobState> {
        self.tx.subscribe()
    }

    fn update(&self, op: &str, f: impl FnOnce(&mut JobState) -> bool) -> bool {
        let mut applied = false;
        self.tx.send_if_modified(|state| {
            applied = f(state);
            if applied {
                state.touch();
            }
            applied
        });
        if !applied {
            debug!(op, status = ?self.tx.borrow().status, "job transition rejected");
        }
        applied
    }

    /// Records the pipeline stage.
    pub fn set_stage(&self, stage: RunStage) -> bool {
        self.update("set_stage", |state| {
            if state.status.is_terminal() {
                return false;
            }
            state.stage = stage;
            true
        })
    }

    /// Records folder totals once the search and scan are done.
    pub fn set_totals(&self, total_messages: usize, flagged: usize, batch_count: usize) -> bool {
        self.update("set_totals", |state| {
            if state.status != JobStatus::Pending {
                return false;
            }
            state.total_messages = total_messages;
            state.flagged_messages = flagged;
            state.batch_count = batch_count;
            true
        })
    }

    /// Moves `pending` to `processing` when the first batch starts.
    pub fn start_batch(&self) -> bool {
        self.update("start_batch", |state| match state.status {
            JobStatus::Pending => {
                state.status = JobStatus::Processing;
                true
            }
            JobStatus::Processing => true,
            _ => false,
        })
    }

    /// Adds one finished batch. The job completes with its last batch.
    pub fn complete_batch(&self, messages: usize, pdfs: usize, docx: usize) -> bool {
        self.update("complete_batch", |state| {
            if state.status != JobStatus::Processing {
                return false;
            }
            state.processed_batches += 1;
            state.processed_messages += messages;
            state.total_pdfs += pdfs;
            state.total_docx += docx;
            if state.processed_batches >= state.batch_count {
                state.status = JobStatus::Completed;
            }
            true
        })
    }

    /// Marks the job completed. Used when there is nothing to fetch.
    pub fn complete(&self) -> bool {
        self.update("complete", |state| {
            if state.status.is_terminal() {
                return false;
            }
            state.status = JobStatus::Completed;
            state.stage = RunStage::Completed;
            true
        })
    }

    /// Marks the job failed.
    pub fn fail(&self, message: impl Into<String>) -> bool {
        let message = message.into();
        self.update("fail", |state| {
            if state.status.is_terminal() {
                return false;
            }
            state.status = JobStatus::Failed;
            state.stage = RunStage::Failed;
            state.error = Some(message);
            true
        })
    }

    /// Marks the job cancelled.
    pub fn cancel(&self) -> bool {
        self.update("cancel", |state| {
            if state.status.is_terminal() {
                return false;
            }
            state.status = JobStatus::Cancelled;
            state.stage = RunStage::Cancelled;
            true
        })
    }
}

/// Observer and cancel handle for a running job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    job_id: RunId,
    state: watch::Receiver<JobState>,
    cancel: CancellationToken,
}

impl JobHandle {
    /// Job identifier.
    #[must_use]
    pub const fn job_id(&self) -> RunId {
        self.job_id
    }

    /// Returns the latest state.
    #[must_use]
    pub fn state(&self) -> JobState {
        self.state.borrow().clone()
    }

    /// Waits for the next state change. Returns false once the job is gone.
    pub async fn changed(&mut self) -> bool {
        self.state.changed().await.is_ok()
    }

    /// Requests cancellation. The run stops at its next batch boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// A job admitted by a [`JobSlot`], owned by the running pipeline.
///
/// Dropping it frees the slot.
#[derive(Debug)]
pub struct ActiveJob {
    tracker: JobTracker,
    cancel: CancellationToken,
    progress: ProgressSender,
    _slot: SlotGuard,
}

impl ActiveJob {
    /// Job identifier.
    #[must_use]
    pub fn job_id(&self) -> RunId {
        self.tracker.tx.borrow().job_id
    }

    /// State writer.
    #[must_use]
    pub const fn tracker(&self) -> &JobTracker {
        &self.tracker
    }

    /// Returns a handle for observers.
    #[must_use]
    pub fn handle(&self) -> JobHandle {
        JobHandle {
            job_id: self.job_id(),
            state: self.tracker.subscribe(),
            cancel: self.cancel.clone(),
        }
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Sends a progress event.
    pub fn emit(&self, event: ProgressEvent) -> bool {
        self.progress.send(event)
    }
}

#[derive(Debug)]
struct SlotGuard(Arc<AtomicBool>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Admits at most one job at a time.
#[derive(Debug, Clone, Default)]
pub struct JobSlot {
    busy: Arc<AtomicBool>,
}

impl JobSlot {
    /// Creates an idle slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true while a job holds the slot.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Starts a job for `folder`.
    ///
    /// # Errors
    ///
    /// Returns `HarvestError::JobInFlight` if another job holds the slot.
    pub fn begin(&self, folder: &str) -> Result<(ActiveJob, ProgressReceiver)> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(HarvestError::JobInFlight);
        }

        let (progress, receiver) = progress::channel();
        let job = ActiveJob {
            tracker: JobTracker::new(RunId::new(), folder),
            cancel: CancellationToken::new(),
            progress,
            _slot: SlotGuard(Arc::clone(&self.busy)),
        };
        debug!(job = %job.job_id(), folder, "job started");
        Ok((job, receiver))
    }
}
