//! fastmig - High-Concurrency Data Migration Engine
//!
//! Entry point for the CLI application: wires the state store, the
//! providers, the walker, and the worker pool together, and owns signal
//! handling (graceful shutdown plus runtime stream scaling).

use anyhow::{bail, Context, Result};
use clap::Parser;
use fastmig::config::{CliArgs, MigrateConfig, StorageUrl};
use fastmig::engine::{
    transfer_file, BufferPool, CancelSource, CheckpointConfig, JobQueue, JobReceiver, JobTracker,
    TransferContext, Walker, WorkerPool,
};
use fastmig::error::MigrateError;
use fastmig::progress::{print_header, print_summary, ProgressReporter, ProgressTracker};
use fastmig::provider::{LocalProvider, MetadataMapper, Provider};
use fastmig::store::{SqliteStore, StateStore};
use signal_hook::consts::{SIGINT, SIGTERM, SIGUSR1, SIGUSR2};
use signal_hook::iterator::Signals;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse();
    setup_logging(args.verbose);

    let config = MigrateConfig::from_args(args).context("Invalid configuration")?;

    if config.show_progress {
        print_header(
            &config.source.to_string(),
            &config.dest.to_string(),
            config.streams,
        );
    }

    // State store lives in <state-dir>/state.db
    std::fs::create_dir_all(&config.state_dir).with_context(|| {
        format!(
            "Failed to create state directory '{}'",
            config.state_dir.display()
        )
    })?;
    let store: Arc<dyn StateStore> = Arc::new(
        SqliteStore::open(config.state_dir.join("state.db"))
            .context("Failed to open state store")?,
    );
    let tracker = Arc::new(JobTracker::new(
        Arc::clone(&store),
        CheckpointConfig::default(),
    ));

    let source = build_provider(&config.source, config.preserve_metadata)
        .context("Failed to create source provider")?;
    let dest = build_provider(&config.dest, config.preserve_metadata)
        .context("Failed to create destination provider")?;

    let buffers = Arc::new(BufferPool::new(config.buffer_size));
    let (job_tx, job_rx) = JobQueue::bounded(config.queue_size);
    let progress = Arc::new(ProgressTracker::new(job_tx.stats()));

    // One scope cancels everything: the walker, blocked queue sends,
    // and in-flight provider operations.
    let cancel = Arc::new(CancelSource::new());

    let ctx = Arc::new(TransferContext {
        source: Arc::clone(&source),
        dest,
        tracker,
        buffers,
        progress: Arc::clone(&progress),
        verify_checksum: config.verify_checksum,
        resume: config.resume,
    });

    let pool = {
        let ctx = Arc::clone(&ctx);
        Arc::new(WorkerPool::new(
            job_rx.clone(),
            Arc::new(move |token, job| transfer_file(&ctx, token, &job)),
        ))
    };
    pool.set_worker_count(config.streams)
        .context("Failed to start worker pool")?;
    progress.set_workers(config.streams, config.streams);

    spawn_signal_handler(Arc::clone(&cancel), Arc::clone(&pool), Arc::clone(&progress))?;

    // The walker owns the queue's only sender; the queue closes when
    // the walk returns.
    let walker_handle = {
        let token = cancel.token();
        let source_root = config.source.root_path().to_string();
        let dest_root = config.dest.root_path().to_string();
        let walker = Walker::new(source, job_tx);
        thread::Builder::new()
            .name("walker".to_string())
            .spawn(move || walker.walk(&token, &source_root, &dest_root))
            .context("Failed to spawn walker")?
    };

    let reporter = if config.show_progress {
        Some(spawn_reporter(Arc::clone(&progress), job_rx))
    } else {
        None
    };

    let walk_result = walker_handle
        .join()
        .unwrap_or(Err(MigrateError::Worker(
            fastmig::error::WorkerError::Panicked { id: 0 },
        )));

    if let Err(e) = &walk_result {
        if !e.is_cancelled() {
            warn!(error = %e, "walker aborted; draining queued jobs");
        }
    }

    // Queue is closed now; workers drain it and exit on their own
    pool.wait();
    progress.finish();

    if let Some(handle) = reporter {
        let _ = handle.join();
    }

    store.close().context("Failed to flush state store")?;

    let snap = progress.snapshot();
    let interrupted = cancel.is_cancelled();
    if config.show_progress {
        print_summary(&snap, interrupted);
    }
    info!(
        completed = snap.completed_files,
        failed = snap.failed_files,
        bytes = snap.completed_bytes,
        "migration finished"
    );

    match walk_result {
        Err(e) if !e.is_cancelled() => Err(anyhow::Error::new(e).context("Walk failed")),
        _ if interrupted => bail!("migration interrupted before completion"),
        _ if snap.failed_files > 0 => {
            bail!("{} transfer(s) failed; see the state store for details", snap.failed_files)
        }
        _ => Ok(()),
    }
}

/// Map a storage URL onto a provider instance
fn build_provider(url: &StorageUrl, preserve_metadata: bool) -> Result<Arc<dyn Provider>> {
    match url {
        StorageUrl::Local { .. } => {
            let mut provider = LocalProvider::new();
            if preserve_metadata {
                provider = provider.with_metadata_mapper(MetadataMapper::new());
            }
            Ok(Arc::new(provider))
        }
        #[cfg(feature = "s3")]
        StorageUrl::S3 { bucket, .. } => {
            // The walker supplies the prefix as its root path
            Ok(Arc::new(fastmig::provider::ObjectProvider::connect(
                bucket.clone(),
                String::new(),
            )?))
        }
        #[cfg(not(feature = "s3"))]
        StorageUrl::S3 { .. } => {
            bail!("this build has no S3 support (enable the 's3' feature)")
        }
    }
}

/// SIGUSR1/SIGUSR2 scale the pool; SIGINT/SIGTERM shut down gracefully,
/// and a second SIGINT forces exit
fn spawn_signal_handler(
    cancel: Arc<CancelSource>,
    pool: Arc<WorkerPool>,
    progress: Arc<ProgressTracker>,
) -> Result<()> {
    let mut signals =
        Signals::new([SIGINT, SIGTERM, SIGUSR1, SIGUSR2]).context("Failed to install signals")?;

    thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            let mut interrupts = 0u32;
            for signal in signals.forever() {
                match signal {
                    SIGUSR1 => {
                        let target = pool.worker_count() + 1;
                        if pool.set_worker_count(target).is_ok() {
                            info!(workers = target, "scaled up on SIGUSR1");
                            progress.set_workers(target, target);
                        }
                    }
                    SIGUSR2 => {
                        let target = pool.worker_count().saturating_sub(1).max(1);
                        if pool.set_worker_count(target).is_ok() {
                            info!(workers = target, "scaled down on SIGUSR2");
                            progress.set_workers(target, target);
                        }
                    }
                    SIGINT | SIGTERM => {
                        interrupts += 1;
                        if interrupts == 1 {
                            eprintln!("\nInterrupt received, shutting down gracefully...");
                            eprintln!("Press Ctrl+C again to force exit immediately.");
                            cancel.cancel();
                            pool.cancel();
                        } else {
                            eprintln!("\nForced exit!");
                            std::process::exit(130);
                        }
                    }
                    _ => {}
                }
            }
        })
        .context("Failed to spawn signal thread")?;

    Ok(())
}

/// Poll the tracker and render the spinner until the run finishes
fn spawn_reporter(progress: Arc<ProgressTracker>, queue: JobReceiver) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let reporter = ProgressReporter::new();
        loop {
            progress.set_queue_depth(queue.len());
            let snap = progress.snapshot();
            if snap.done {
                reporter.finish_and_clear();
                break;
            }
            reporter.update(&snap);
            thread::sleep(Duration::from_millis(200));
        }
    })
}

fn setup_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("fastmig=info,warn")
    } else {
        EnvFilter::new("fastmig=warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
