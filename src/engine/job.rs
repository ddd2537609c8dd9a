//! Transfer jobs and the bounded job queue
//!
//! The queue is the backpressure point of the whole engine: when workers
//! stall, the walker blocks pushing new jobs, capping memory even on
//! trees with millions of entries. The walker owns the only sender and
//! closes the queue by dropping it; workers treat a closed-and-drained
//! queue as the signal to exit.

use crate::engine::cancel::CancelToken;
use crate::error::{MigrateError, Result};
use crate::provider::FileMeta;
use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Default job queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// A single file transfer from a source provider to a destination provider
///
/// Jobs are immutable once emitted and owned by exactly one worker from
/// dequeue until the handler returns.
#[derive(Debug, Clone)]
pub struct TransferJob {
    /// Stable identifier, used as the state-store key.
    /// The walker uses the source path; callers running several job
    /// streams against one store must namespace ids externally.
    pub id: String,

    /// Path to read from the source provider
    pub source_path: String,

    /// Path to write to the destination provider
    pub destination_path: String,

    /// Source metadata to preserve at the destination
    pub file_info: FileMeta,

    /// Cancellation scope for this job
    pub cancel: CancelToken,
}

/// Shared counters for the job queue
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Jobs pushed by the walker
    pub jobs_enqueued: AtomicU64,

    /// Sum of file sizes pushed by the walker
    pub bytes_enqueued: AtomicU64,

    /// Jobs taken by workers
    pub jobs_dequeued: AtomicU64,
}

impl QueueStats {
    pub fn jobs_enqueued(&self) -> u64 {
        self.jobs_enqueued.load(Ordering::Relaxed)
    }

    pub fn bytes_enqueued(&self) -> u64 {
        self.bytes_enqueued.load(Ordering::Relaxed)
    }

    pub fn jobs_dequeued(&self) -> u64 {
        self.jobs_dequeued.load(Ordering::Relaxed)
    }

    pub(crate) fn record_enqueued(&self, bytes: u64) {
        self.jobs_enqueued.fetch_add(1, Ordering::Relaxed);
        self.bytes_enqueued.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_dequeued(&self) {
        self.jobs_dequeued.fetch_add(1, Ordering::Relaxed);
    }
}

/// Bounded FIFO channel of [`TransferJob`]s
pub struct JobQueue;

impl JobQueue {
    /// Create a bounded queue, returning the single producer handle and a
    /// cloneable consumer handle. Capacity 0 selects the default.
    pub fn bounded(capacity: usize) -> (JobSender, JobReceiver) {
        let capacity = if capacity == 0 {
            DEFAULT_QUEUE_CAPACITY
        } else {
            capacity
        };
        let (tx, rx) = bounded(capacity);
        let stats = Arc::new(QueueStats::default());

        (
            JobSender {
                tx,
                stats: Arc::clone(&stats),
            },
            JobReceiver { rx, stats },
        )
    }
}

/// Producer handle - deliberately not `Clone`: the walker is the sole
/// sender, and dropping this handle is what closes the queue
pub struct JobSender {
    tx: Sender<TransferJob>,
    stats: Arc<QueueStats>,
}

impl JobSender {
    /// Push a job, blocking under backpressure.
    ///
    /// Returns `Cancelled` if the scope fires while blocked, and
    /// `QueueClosed` if every receiver is gone.
    pub fn send(&self, job: TransferJob, cancel: &CancelToken) -> Result<()> {
        let bytes = job.file_info.size;
        select! {
            send(self.tx, job) -> res => {
                res.map_err(|_| MigrateError::QueueClosed)?;
                self.stats.record_enqueued(bytes);
                Ok(())
            }
            recv(cancel.signal()) -> _ => Err(MigrateError::Cancelled),
        }
    }

    /// Push without blocking; `Ok(false)` means the queue is full
    pub fn try_send(&self, job: TransferJob) -> Result<bool> {
        let bytes = job.file_info.size;
        match self.tx.try_send(job) {
            Ok(()) => {
                self.stats.record_enqueued(bytes);
                Ok(true)
            }
            Err(TrySendError::Full(_)) => Ok(false),
            Err(TrySendError::Disconnected(_)) => Err(MigrateError::QueueClosed),
        }
    }

    /// Shared queue counters
    pub fn stats(&self) -> Arc<QueueStats> {
        Arc::clone(&self.stats)
    }
}

/// Consumer handle, cloned once per worker
#[derive(Clone)]
pub struct JobReceiver {
    rx: Receiver<TransferJob>,
    stats: Arc<QueueStats>,
}

impl JobReceiver {
    /// Blocking receive; `None` when the queue is closed and drained
    pub fn recv(&self) -> Option<TransferJob> {
        match self.rx.recv() {
            Ok(job) => {
                self.stats.record_dequeued();
                Some(job)
            }
            Err(_) => None,
        }
    }

    /// Raw channel, for use in worker `select!` loops.
    /// Callers that receive through it record the dequeue themselves.
    pub fn chan(&self) -> &Receiver<TransferJob> {
        &self.rx
    }

    /// Shared queue counters
    pub fn stats(&self) -> Arc<QueueStats> {
        Arc::clone(&self.stats)
    }

    /// Jobs currently buffered
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
