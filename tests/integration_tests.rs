//! End-to-end tests for fastmig
//!
//! These exercise the full engine (walker -> queue -> pool -> providers
//! -> tracker -> store) against real temp directories, without any
//! object-store credentials.

use fastmig::config::StorageUrl;
use fastmig::engine::{
    transfer_file, BufferPool, CancelSource, CheckpointConfig, JobQueue, JobTracker,
    TransferContext, Walker, WorkerPool,
};
use fastmig::progress::ProgressTracker;
use fastmig::provider::{LocalProvider, MetadataMapper, Provider};
use fastmig::store::{JobState, SqliteStore, StateStore};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

/// Wire up the whole engine and run a migration to completion
fn run_migration(
    source_root: &Path,
    dest_root: &Path,
    store: Arc<dyn StateStore>,
    streams: usize,
    verify_checksum: bool,
    resume: bool,
) -> fastmig::Result<u64> {
    let source: Arc<dyn Provider> =
        Arc::new(LocalProvider::new().with_metadata_mapper(MetadataMapper::new()));
    let dest: Arc<dyn Provider> =
        Arc::new(LocalProvider::new().with_metadata_mapper(MetadataMapper::new()));

    let (job_tx, job_rx) = JobQueue::bounded(100);
    let progress = Arc::new(ProgressTracker::new(job_tx.stats()));
    let tracker = Arc::new(JobTracker::new(store, CheckpointConfig::default()));
    let cancel = CancelSource::new();

    let ctx = Arc::new(TransferContext {
        source: Arc::clone(&source),
        dest,
        tracker,
        buffers: Arc::new(BufferPool::new(64 * 1024)),
        progress,
        verify_checksum,
        resume,
    });

    let pool = {
        let ctx = Arc::clone(&ctx);
        WorkerPool::new(
            job_rx,
            Arc::new(move |token, job| transfer_file(&ctx, token, &job)),
        )
    };
    pool.set_worker_count(streams).unwrap();

    let walker = Walker::new(source, job_tx);
    let emitted = walker.walk(
        &cancel.token(),
        &source_root.display().to_string(),
        &dest_root.display().to_string(),
    );

    pool.wait();
    emitted
}

#[test]
fn test_small_tree_migration() {
    // source contains a.txt (3 bytes "abc") and sub/b.txt (0 bytes)
    let src = tempdir().unwrap();
    let dst = tempdir().unwrap();
    fs::write(src.path().join("a.txt"), b"abc").unwrap();
    fs::create_dir(src.path().join("sub")).unwrap();
    fs::write(src.path().join("sub/b.txt"), b"").unwrap();

    let state = tempdir().unwrap();
    let store: Arc<dyn StateStore> =
        Arc::new(SqliteStore::open(state.path().join("state.db")).unwrap());

    let emitted =
        run_migration(src.path(), dst.path(), Arc::clone(&store), 4, false, false).unwrap();
    assert_eq!(emitted, 2);

    // Destination contents are byte-identical
    assert_eq!(fs::read(dst.path().join("a.txt")).unwrap(), b"abc");
    assert_eq!(
        fs::metadata(dst.path().join("sub/b.txt")).unwrap().len(),
        0
    );

    // Two Completed records, keyed by source path
    let a = store
        .get_job(&src.path().join("a.txt").display().to_string())
        .unwrap();
    assert_eq!(a.state, JobState::Completed);
    assert_eq!(a.bytes_transferred, 3);
    assert_eq!(a.total_bytes, 3);

    let b = store
        .get_job(&src.path().join("sub/b.txt").display().to_string())
        .unwrap();
    assert_eq!(b.state, JobState::Completed);
    assert_eq!(b.total_bytes, 0);
}

#[test]
fn test_wide_tree_all_files_arrive() {
    let src = tempdir().unwrap();
    let dst = tempdir().unwrap();

    for d in 0..10 {
        let dir = src.path().join(format!("d{d}"));
        fs::create_dir(&dir).unwrap();
        for f in 0..10 {
            fs::write(dir.join(format!("f{f}.dat")), format!("{d}-{f}")).unwrap();
        }
    }

    let state = tempdir().unwrap();
    let store: Arc<dyn StateStore> =
        Arc::new(SqliteStore::open(state.path().join("state.db")).unwrap());

    let emitted =
        run_migration(src.path(), dst.path(), Arc::clone(&store), 8, false, false).unwrap();
    assert_eq!(emitted, 100);

    for d in 0..10 {
        for f in 0..10 {
            let path = dst.path().join(format!("d{d}/f{f}.dat"));
            assert_eq!(
                fs::read_to_string(&path).unwrap(),
                format!("{d}-{f}"),
                "missing or corrupt {}",
                path.display()
            );
        }
    }
}

#[test]
fn test_checksummed_migration() {
    let src = tempdir().unwrap();
    let dst = tempdir().unwrap();

    // Big enough to cross several copy buffers
    let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    fs::write(src.path().join("blob.bin"), &payload).unwrap();

    let state = tempdir().unwrap();
    let store: Arc<dyn StateStore> =
        Arc::new(SqliteStore::open(state.path().join("state.db")).unwrap());

    run_migration(src.path(), dst.path(), Arc::clone(&store), 2, true, false).unwrap();

    assert_eq!(fs::read(dst.path().join("blob.bin")).unwrap(), payload);
    let record = store
        .get_job(&src.path().join("blob.bin").display().to_string())
        .unwrap();
    assert_eq!(record.state, JobState::Completed);
    assert_eq!(record.bytes_transferred, payload.len() as u64);
}

#[test]
fn test_rerun_with_resume_skips_copies() {
    let src = tempdir().unwrap();
    let dst = tempdir().unwrap();
    fs::write(src.path().join("once.txt"), b"payload").unwrap();

    let state = tempdir().unwrap();
    let store: Arc<dyn StateStore> =
        Arc::new(SqliteStore::open(state.path().join("state.db")).unwrap());

    run_migration(src.path(), dst.path(), Arc::clone(&store), 2, false, false).unwrap();

    // Tamper with the destination; a resumed run must not rewrite it
    fs::write(dst.path().join("once.txt"), b"TAMPERED").unwrap();
    run_migration(src.path(), dst.path(), Arc::clone(&store), 2, false, true).unwrap();

    assert_eq!(fs::read(dst.path().join("once.txt")).unwrap(), b"TAMPERED");
}

#[test]
fn test_nested_tree_preserves_layout() {
    let src = tempdir().unwrap();
    let dst = tempdir().unwrap();

    // 40 levels deep; deep-tree stack behavior at depth 1000 is covered
    // by the walker's unit tests, which are not bounded by PATH_MAX
    let mut dir = src.path().to_path_buf();
    for level in 0..40 {
        dir = dir.join(format!("l{level}"));
    }
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("deep.txt"), b"bottom").unwrap();

    let state = tempdir().unwrap();
    let store: Arc<dyn StateStore> =
        Arc::new(SqliteStore::open(state.path().join("state.db")).unwrap());

    let emitted =
        run_migration(src.path(), dst.path(), Arc::clone(&store), 2, false, false).unwrap();
    assert_eq!(emitted, 1);

    let mut expect = dst.path().to_path_buf();
    for level in 0..40 {
        expect = expect.join(format!("l{level}"));
    }
    assert_eq!(fs::read(expect.join("deep.txt")).unwrap(), b"bottom");
}

#[test]
fn test_failed_job_recorded_and_rest_continue() {
    let src = tempdir().unwrap();
    let dst = tempdir().unwrap();
    fs::write(src.path().join("good.txt"), b"ok").unwrap();
    fs::write(src.path().join("bad.txt"), b"doomed").unwrap();

    let state = tempdir().unwrap();
    let store: Arc<dyn StateStore> =
        Arc::new(SqliteStore::open(state.path().join("state.db")).unwrap());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // Unreadable source file fails its job but not the run
        fs::set_permissions(
            src.path().join("bad.txt"),
            fs::Permissions::from_mode(0o000),
        )
        .unwrap();
    }

    let emitted =
        run_migration(src.path(), dst.path(), Arc::clone(&store), 2, false, false).unwrap();
    assert_eq!(emitted, 2);

    assert_eq!(fs::read(dst.path().join("good.txt")).unwrap(), b"ok");

    #[cfg(unix)]
    if !is_root() {
        let bad = store
            .get_job(&src.path().join("bad.txt").display().to_string())
            .unwrap();
        assert_eq!(bad.state, JobState::Failed);
        assert!(bad.error.is_some());
    }
}

#[cfg(unix)]
fn is_root() -> bool {
    use std::os::unix::fs::MetadataExt;
    // Root ignores permission bits; skip the denial assertion there
    fs::metadata("/proc/self").map(|m| m.uid() == 0).unwrap_or(false)
}

#[test]
fn test_storage_url_routing() {
    assert!(StorageUrl::parse("/plain/path").unwrap() == StorageUrl::Local {
        path: "/plain/path".into()
    });
    assert!(StorageUrl::parse("s3://bucket/pre").unwrap().is_s3());
}

#[test]
fn test_mtime_preserved_end_to_end() {
    use std::time::{Duration, SystemTime};

    let src = tempdir().unwrap();
    let dst = tempdir().unwrap();
    let file = src.path().join("aged.txt");
    fs::write(&file, b"old data").unwrap();

    let past = SystemTime::now() - Duration::from_secs(86_400 * 30);
    filetime::set_file_mtime(&file, filetime::FileTime::from_system_time(past)).unwrap();

    let state = tempdir().unwrap();
    let store: Arc<dyn StateStore> =
        Arc::new(SqliteStore::open(state.path().join("state.db")).unwrap());

    run_migration(src.path(), dst.path(), store, 1, false, false).unwrap();

    let copied = fs::metadata(dst.path().join("aged.txt"))
        .unwrap()
        .modified()
        .unwrap();
    let drift = copied
        .duration_since(past)
        .unwrap_or_else(|e| e.duration());
    assert!(drift < Duration::from_secs(2), "mtime drifted by {drift:?}");
}
