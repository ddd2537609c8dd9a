//! Job lifecycle tracking and mid-transfer checkpointing
//!
//! The tracker is a thin façade over the state store encoding the legal
//! state transitions (Pending -> InProgress -> Completed | Failed).
//! [`TrackedWriter`] wraps a destination stream and periodically persists
//! bytes-transferred so a crashed run can resume from the last checkpoint
//! instead of byte zero.

use crate::engine::job::TransferJob;
use crate::error::StoreResult;
use crate::store::{JobRecord, JobState, StateStore};
use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// When to persist a job's progress
#[derive(Debug, Clone, Copy)]
pub struct CheckpointConfig {
    /// Checkpoint after this many bytes since the last one
    pub bytes_interval: u64,

    /// Checkpoint after this much time since the last one
    pub time_interval: Duration,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            bytes_interval: 10 * 1024 * 1024,
            time_interval: Duration::from_secs(5),
        }
    }
}

/// Façade over the state store for per-job lifecycle bookkeeping
pub struct JobTracker {
    store: Arc<dyn StateStore>,
    config: CheckpointConfig,
}

impl JobTracker {
    pub fn new(store: Arc<dyn StateStore>, config: CheckpointConfig) -> Self {
        Self { store, config }
    }

    /// Write a Pending record for the job. Must precede `mark_in_progress`.
    pub fn init_job(&self, job: &TransferJob) -> StoreResult<()> {
        let record = JobRecord::pending(
            &job.id,
            &job.source_path,
            &job.destination_path,
            job.file_info.size,
        );
        self.store.save_job(&record)
    }

    /// Transition a job to InProgress
    pub fn mark_in_progress(&self, job_id: &str) -> StoreResult<()> {
        let mut record = self.store.get_job(job_id)?;
        record.state = JobState::InProgress;
        self.store.save_job(&record)
    }

    /// Transition a job to Completed.
    /// Forces `bytes_transferred` to `total_bytes`; the destination
    /// close succeeding is taken as ground truth.
    pub fn mark_completed(&self, job_id: &str) -> StoreResult<()> {
        let mut record = self.store.get_job(job_id)?;
        record.state = JobState::Completed;
        record.bytes_transferred = record.total_bytes;
        self.store.save_job(&record)
    }

    /// Transition a job to Failed, recording the error message
    pub fn mark_failed(&self, job_id: &str, error: &str) -> StoreResult<()> {
        let mut record = self.store.get_job(job_id)?;
        record.state = JobState::Failed;
        record.error = Some(error.to_string());
        self.store.save_job(&record)
    }

    /// Last persisted record for a job, for resume decisions
    pub fn job_record(&self, job_id: &str) -> StoreResult<JobRecord> {
        self.store.get_job(job_id)
    }

    /// Wrap a destination stream in a checkpointing writer.
    /// `start_bytes` seeds the counter when resuming a partial transfer.
    pub fn tracked_writer<W: Write>(
        &self,
        inner: W,
        job_id: impl Into<String>,
        start_bytes: u64,
    ) -> TrackedWriter<'_, W> {
        TrackedWriter {
            inner,
            tracker: self,
            job_id: job_id.into(),
            state: Mutex::new(CheckpointState {
                bytes_written: start_bytes,
                last_checkpoint: start_bytes,
                last_checkpoint_at: Instant::now(),
            }),
        }
    }
}

struct CheckpointState {
    bytes_written: u64,
    last_checkpoint: u64,
    last_checkpoint_at: Instant,
}

/// Write adapter that counts bytes and periodically persists progress
///
/// A checkpoint failure is swallowed: a transient store error must not
/// terminate a long transfer, and the next checkpoint retries anyway.
pub struct TrackedWriter<'t, W> {
    inner: W,
    tracker: &'t JobTracker,
    job_id: String,
    state: Mutex<CheckpointState>,
}

impl<W> TrackedWriter<'_, W> {
    /// Total bytes written through this writer (including `start_bytes`)
    pub fn bytes_written(&self) -> u64 {
        self.state.lock().bytes_written
    }

    /// Release the wrapped stream, e.g. to close it
    pub fn into_inner(self) -> W {
        self.inner
    }

    fn checkpoint(&self, bytes: u64) {
        // Read-modify-write outside the counter lock; the store
        // serializes concurrent writers per id.
        match self.tracker.store.get_job(&self.job_id) {
            Ok(mut record) => {
                record.bytes_transferred = bytes;
                if let Err(e) = self.tracker.store.save_job(&record) {
                    debug!(job = %self.job_id, error = %e, "checkpoint save failed");
                    return;
                }
                let mut state = self.state.lock();
                state.last_checkpoint = bytes;
                state.last_checkpoint_at = Instant::now();
            }
            Err(e) => {
                debug!(job = %self.job_id, error = %e, "checkpoint read failed");
            }
        }
    }
}

impl<W: Write> Write for TrackedWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        if n > 0 {
            let (needs_checkpoint, current) = {
                let mut state = self.state.lock();
                state.bytes_written += n as u64;
                let by_bytes = state.bytes_written - state.last_checkpoint
                    >= self.tracker.config.bytes_interval;
                let by_time =
                    state.last_checkpoint_at.elapsed() >= self.tracker.config.time_interval;
                (by_bytes || by_time, state.bytes_written)
            };

            if needs_checkpoint {
                self.checkpoint(current);
            }
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::cancel::CancelSource;
    use crate::provider::FileMeta;
    use crate::store::MemoryStore;

    fn test_job(id: &str, size: u64) -> TransferJob {
        let cancel = CancelSource::new();
        TransferJob {
            id: id.into(),
            source_path: format!("/src/{id}"),
            destination_path: format!("/dst/{id}"),
            file_info: FileMeta::file(id, size, None),
            cancel: cancel.token(),
        }
    }

    fn tracker_with(config: CheckpointConfig) -> (Arc<JobTracker>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let tracker = Arc::new(JobTracker::new(
            Arc::clone(&store) as Arc<dyn StateStore>,
            config,
        ));
        (tracker, store)
    }

    #[test]
    fn test_lifecycle_transitions() {
        let (tracker, store) = tracker_with(CheckpointConfig::default());
        let job = test_job("job1", 100);

        tracker.init_job(&job).unwrap();
        let record = store.get_job("job1").unwrap();
        assert_eq!(record.state, JobState::Pending);
        assert_eq!(record.total_bytes, 100);
        assert_eq!(record.bytes_transferred, 0);

        tracker.mark_in_progress("job1").unwrap();
        assert_eq!(store.get_job("job1").unwrap().state, JobState::InProgress);

        tracker.mark_completed("job1").unwrap();
        let record = store.get_job("job1").unwrap();
        assert_eq!(record.state, JobState::Completed);
        assert_eq!(record.bytes_transferred, 100);
    }

    #[test]
    fn test_mark_failed_records_error() {
        let (tracker, store) = tracker_with(CheckpointConfig::default());
        let job = test_job("bad", 10);

        tracker.init_job(&job).unwrap();
        tracker.mark_in_progress("bad").unwrap();
        tracker.mark_failed("bad", "destination vanished").unwrap();

        let record = store.get_job("bad").unwrap();
        assert_eq!(record.state, JobState::Failed);
        assert_eq!(record.error.as_deref(), Some("destination vanished"));
    }

    #[test]
    fn test_completed_forces_byte_count() {
        let (tracker, store) = tracker_with(CheckpointConfig::default());
        let job = test_job("short", 1000);

        tracker.init_job(&job).unwrap();
        tracker.mark_in_progress("short").unwrap();
        tracker.mark_completed("short").unwrap();

        // Even though no checkpoint ever ran
        let record = store.get_job("short").unwrap();
        assert_eq!(record.bytes_transferred, 1000);
    }

    #[test]
    fn test_tracked_writer_checkpoints_on_bytes() {
        let (tracker, store) = tracker_with(CheckpointConfig {
            bytes_interval: 10,
            time_interval: Duration::from_millis(1),
        });
        let job = test_job("job2", 11);
        tracker.init_job(&job).unwrap();
        tracker.mark_in_progress("job2").unwrap();

        let mut tw = tracker.tracked_writer(Vec::new(), "job2", 0);

        tw.write_all(b"12345").unwrap();
        std::thread::sleep(Duration::from_millis(2));
        tw.write_all(b"678901").unwrap();

        // 11 bytes >= the 10-byte interval: a checkpoint must have run
        // by the end of the second write
        let record = store.get_job("job2").unwrap();
        assert_eq!(record.bytes_transferred, 11);
        assert_eq!(tw.bytes_written(), 11);
    }

    #[test]
    fn test_tracked_writer_below_thresholds_does_not_checkpoint() {
        let (tracker, store) = tracker_with(CheckpointConfig {
            bytes_interval: 1024,
            time_interval: Duration::from_secs(3600),
        });
        let job = test_job("quiet", 5);
        tracker.init_job(&job).unwrap();

        let mut tw = tracker.tracked_writer(Vec::new(), "quiet", 0);
        tw.write_all(b"abcde").unwrap();

        assert_eq!(store.get_job("quiet").unwrap().bytes_transferred, 0);
        assert_eq!(tw.bytes_written(), 5);
    }

    #[test]
    fn test_tracked_writer_is_exact_passthrough() {
        let (tracker, _store) = tracker_with(CheckpointConfig {
            bytes_interval: 3,
            time_interval: Duration::from_millis(1),
        });
        let job = test_job("pass", 26);
        tracker.init_job(&job).unwrap();

        let mut tw = tracker.tracked_writer(Vec::new(), "pass", 0);
        tw.write_all(b"abcdefghijklmnopqrstuvwxyz").unwrap();

        assert_eq!(tw.bytes_written(), 26);
        assert_eq!(tw.into_inner(), b"abcdefghijklmnopqrstuvwxyz".to_vec());
    }

    #[test]
    fn test_tracked_writer_resume_offset() {
        let (tracker, store) = tracker_with(CheckpointConfig {
            bytes_interval: 4,
            time_interval: Duration::from_secs(3600),
        });
        let job = test_job("resume", 100);
        tracker.init_job(&job).unwrap();

        // Resuming at byte 50: the counter continues from there
        let mut tw = tracker.tracked_writer(Vec::new(), "resume", 50);
        tw.write_all(b"more").unwrap();

        assert_eq!(tw.bytes_written(), 54);
        assert_eq!(store.get_job("resume").unwrap().bytes_transferred, 54);
    }

    #[test]
    fn test_checkpoint_failure_is_swallowed() {
        // A store that cannot find the job: checkpoints fail quietly
        let (tracker, _store) = tracker_with(CheckpointConfig {
            bytes_interval: 1,
            time_interval: Duration::from_millis(1),
        });

        let mut tw = tracker.tracked_writer(Vec::new(), "never-inited", 0);
        tw.write_all(b"data").unwrap();
        assert_eq!(tw.bytes_written(), 4);
    }
}
