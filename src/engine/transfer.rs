//! The per-job transfer pipeline
//!
//! One call of [`transfer_file`] is the full life of a job:
//! init -> in-progress -> open read -> open write -> buffered copy with
//! checkpointing -> close -> completed. Every per-job failure is recorded
//! in the state store via `mark_failed` before it propagates; the worker
//! boundary then swallows it so one bad file never stops the migration.

use crate::engine::buffer::BufferPool;
use crate::engine::cancel::CancelToken;
use crate::engine::checksum::{ChecksumReader, ChecksumWriter};
use crate::engine::job::TransferJob;
use crate::engine::tracker::JobTracker;
use crate::error::{MigrateError, Result};
use crate::progress::ProgressTracker;
use crate::provider::Provider;
use crate::store::JobState;
use std::io::{Read, Write};
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared dependencies of every transfer, wired once in main
pub struct TransferContext {
    pub source: Arc<dyn Provider>,
    pub dest: Arc<dyn Provider>,
    pub tracker: Arc<JobTracker>,
    pub buffers: Arc<BufferPool>,
    pub progress: Arc<ProgressTracker>,
    /// Compare source-read and destination-write CRC-64 at close
    pub verify_checksum: bool,
    /// Skip jobs whose record is already Completed with a matching size
    pub resume: bool,
}

impl TransferContext {
    /// True when a prior run already completed this exact job
    fn already_completed(&self, job: &TransferJob) -> bool {
        match self.tracker.job_record(&job.id) {
            Ok(record) => {
                record.state == JobState::Completed && record.total_bytes == job.file_info.size
            }
            Err(_) => false,
        }
    }
}

/// Transfer a single file from source to destination.
///
/// Cancellation is not a failure: the job record is left InProgress (or
/// Pending) for the next run to resume.
pub fn transfer_file(ctx: &TransferContext, cancel: &CancelToken, job: &TransferJob) -> Result<()> {
    if ctx.resume && ctx.already_completed(job) {
        debug!(job = %job.id, "already completed, skipping");
        ctx.progress.record_skipped(job.file_info.size);
        return Ok(());
    }

    ctx.progress
        .stream_started(&job.id, &job.source_path, job.file_info.size);

    let result = run_transfer(ctx, cancel, job);

    ctx.progress.stream_finished(&job.id);
    match &result {
        Ok(()) => ctx.progress.record_completed(job.file_info.size),
        Err(e) if e.is_cancelled() => {}
        Err(e) => {
            warn!(job = %job.id, error = %e, "transfer failed");
            ctx.progress.record_failed();
        }
    }

    result
}

fn run_transfer(ctx: &TransferContext, cancel: &CancelToken, job: &TransferJob) -> Result<()> {
    ctx.tracker.init_job(job)?;
    ctx.tracker.mark_in_progress(&job.id)?;

    let fail = |e: MigrateError| -> MigrateError {
        if !e.is_cancelled() {
            if let Err(save_err) = ctx.tracker.mark_failed(&job.id, &e.to_string()) {
                warn!(job = %job.id, error = %save_err, "failed to record job failure");
            }
        }
        e
    };

    let reader = ctx
        .source
        .open_read(cancel, &job.source_path)
        .map_err(|e| fail(e.into()))?;

    let writer = ctx
        .dest
        .open_write(cancel, &job.destination_path, &job.file_info)
        .map_err(|e| fail(e.into()))?;

    if ctx.verify_checksum {
        let mut reader = ChecksumReader::new(reader);
        let mut tracked = ctx
            .tracker
            .tracked_writer(ChecksumWriter::new(writer), &job.id, 0);

        copy_buffered(ctx, cancel, job, &mut reader, &mut tracked).map_err(|e| fail(e))?;

        let checksum_writer = tracked.into_inner();
        let wrote = checksum_writer.checksum();
        let read = reader.checksum();

        checksum_writer.into_inner().close().map_err(|e| fail(e.into()))?;

        if read != wrote {
            return Err(fail(MigrateError::ChecksumMismatch {
                path: job.source_path.clone(),
                read,
                wrote,
            }));
        }
    } else {
        let mut reader = reader;
        let mut tracked = ctx.tracker.tracked_writer(writer, &job.id, 0);

        copy_buffered(ctx, cancel, job, &mut reader, &mut tracked).map_err(|e| fail(e))?;

        tracked.into_inner().close().map_err(|e| fail(e.into()))?;
    }

    ctx.tracker.mark_completed(&job.id)?;
    debug!(job = %job.id, bytes = job.file_info.size, "transfer complete");
    Ok(())
}

/// Pump bytes through a pooled buffer, checking cancellation per chunk
fn copy_buffered<R, W>(
    ctx: &TransferContext,
    cancel: &CancelToken,
    job: &TransferJob,
    reader: &mut R,
    writer: &mut W,
) -> Result<()>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buf = ctx.buffers.get();

    let result = loop {
        if cancel.is_cancelled() {
            break Err(MigrateError::Cancelled);
        }

        let n = match reader.read(&mut buf) {
            Ok(0) => break Ok(()),
            Ok(n) => n,
            Err(e) => break Err(e.into()),
        };

        if let Err(e) = writer.write_all(&buf[..n]) {
            break Err(e.into());
        }

        ctx.progress.stream_progressed(&job.id, n as u64);
    };

    ctx.buffers.put(buf);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::cancel::CancelSource;
    use crate::engine::tracker::CheckpointConfig;
    use crate::provider::{FileMeta, LocalProvider};
    use crate::store::{MemoryStore, StateStore};
    use std::fs;
    use tempfile::tempdir;

    fn context(src: &std::path::Path, dst: &std::path::Path, store: Arc<MemoryStore>) -> TransferContext {
        let (tx, _rx) = crate::engine::job::JobQueue::bounded(10);
        TransferContext {
            source: Arc::new(LocalProvider::rooted(src)),
            dest: Arc::new(LocalProvider::rooted(dst)),
            tracker: Arc::new(JobTracker::new(
                store as Arc<dyn StateStore>,
                CheckpointConfig::default(),
            )),
            buffers: Arc::new(BufferPool::new(8)),
            progress: Arc::new(ProgressTracker::new(tx.stats())),
            verify_checksum: false,
            resume: false,
        }
    }

    fn job_for(name: &str, size: u64) -> TransferJob {
        let cancel = CancelSource::new();
        TransferJob {
            id: name.into(),
            source_path: name.into(),
            destination_path: name.into(),
            file_info: FileMeta::file(name, size, None),
            cancel: cancel.token(),
        }
    }

    #[test]
    fn test_transfer_copies_bytes() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        fs::write(src.path().join("a.txt"), b"hello fastmig").unwrap();

        let store = Arc::new(MemoryStore::new());
        let ctx = context(src.path(), dst.path(), Arc::clone(&store));
        let scope = CancelSource::new();

        let job = job_for("a.txt", 13);
        transfer_file(&ctx, &scope.token(), &job).unwrap();

        assert_eq!(fs::read(dst.path().join("a.txt")).unwrap(), b"hello fastmig");
        let record = store.get_job("a.txt").unwrap();
        assert_eq!(record.state, JobState::Completed);
        assert_eq!(record.bytes_transferred, 13);
    }

    #[test]
    fn test_transfer_with_checksum() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        // Larger than the 8-byte test buffer to force several chunks
        let payload = vec![0xA5u8; 4096];
        fs::write(src.path().join("big.bin"), &payload).unwrap();

        let store = Arc::new(MemoryStore::new());
        let mut ctx = context(src.path(), dst.path(), Arc::clone(&store));
        ctx.verify_checksum = true;
        let scope = CancelSource::new();

        let job = job_for("big.bin", payload.len() as u64);
        transfer_file(&ctx, &scope.token(), &job).unwrap();

        assert_eq!(fs::read(dst.path().join("big.bin")).unwrap(), payload);
        assert_eq!(store.get_job("big.bin").unwrap().state, JobState::Completed);
    }

    #[test]
    fn test_zero_byte_file() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        fs::write(src.path().join("empty"), b"").unwrap();

        let store = Arc::new(MemoryStore::new());
        let ctx = context(src.path(), dst.path(), Arc::clone(&store));
        let scope = CancelSource::new();

        transfer_file(&ctx, &scope.token(), &job_for("empty", 0)).unwrap();

        assert_eq!(fs::metadata(dst.path().join("empty")).unwrap().len(), 0);
        let record = store.get_job("empty").unwrap();
        assert_eq!(record.state, JobState::Completed);
        assert_eq!(record.bytes_transferred, 0);
    }

    #[test]
    fn test_missing_source_marks_failed() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();

        let store = Arc::new(MemoryStore::new());
        let ctx = context(src.path(), dst.path(), Arc::clone(&store));
        let scope = CancelSource::new();

        let err = transfer_file(&ctx, &scope.token(), &job_for("ghost", 1)).unwrap_err();
        assert!(!err.is_cancelled());

        let record = store.get_job("ghost").unwrap();
        assert_eq!(record.state, JobState::Failed);
        assert!(record.error.is_some());
        assert_eq!(ctx.progress.snapshot().failed_files, 1);
    }

    #[test]
    fn test_resume_skips_completed() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        fs::write(src.path().join("done.txt"), b"xyz").unwrap();

        let store = Arc::new(MemoryStore::new());
        let mut ctx = context(src.path(), dst.path(), Arc::clone(&store));
        ctx.resume = true;
        let scope = CancelSource::new();

        // First run transfers for real
        let job = job_for("done.txt", 3);
        transfer_file(&ctx, &scope.token(), &job).unwrap();

        // Second run must not rewrite the destination
        fs::remove_file(dst.path().join("done.txt")).unwrap();
        transfer_file(&ctx, &scope.token(), &job).unwrap();
        assert!(!dst.path().join("done.txt").exists());

        let snap = ctx.progress.snapshot();
        assert_eq!(snap.skipped_files, 1);
    }

    #[test]
    fn test_cancelled_transfer_is_not_failed() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        fs::write(src.path().join("c.txt"), b"data").unwrap();

        let store = Arc::new(MemoryStore::new());
        let ctx = context(src.path(), dst.path(), Arc::clone(&store));
        let scope = CancelSource::new();
        scope.cancel();

        let err = transfer_file(&ctx, &scope.token(), &job_for("c.txt", 4)).unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(ctx.progress.snapshot().failed_files, 0);
    }
}
