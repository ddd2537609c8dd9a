//! fastmig - High-Concurrency Data Migration Engine
//!
//! Moves arbitrarily large, deeply-nested file trees between
//! heterogeneous storage backends (local POSIX filesystems and S3-style
//! object stores) with stateful resume, bounded memory, and metadata
//! preservation. Built for multi-terabyte migrations where
//! single-threaded tools are bandwidth-bound.
//!
//! # Features
//!
//! - **Dynamic worker pool**: Scale transfer streams up or down at
//!   runtime (SIGUSR1/SIGUSR2) without interrupting in-flight files.
//!
//! - **Bounded memory**: A bounded job queue applies backpressure from
//!   workers to the walker, so trees with millions of entries never
//!   balloon the process.
//!
//! - **Stateful resume**: Every job is shadowed by a record in an
//!   embedded SQLite state file, checkpointed mid-transfer, so a crashed
//!   or interrupted run picks up where it left off.
//!
//! - **Metadata preservation**: mtime, permission bits, and UID/GID
//!   (through a translation mapper) survive the copy.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     jobs      ┌─────────────────────────────────┐
//! │    Walker    │──────────────▶│        Bounded Job Queue        │
//! │ (stack-based │   (bounded,   │     (crossbeam, capacity 1k)    │
//! │  iterative)  │  backpressure)└───────────────┬─────────────────┘
//! └──────┬───────┘                               │
//!        │ list/stat                             ▼
//!        ▼                        ┌──────────────────────────────┐
//! ┌──────────────┐                │         Worker Pool          │
//! │    Source    │   open_read    │  ┌────────┐     ┌────────┐   │
//! │   Provider   │◀───────────────│  │worker 1│ ... │worker N│   │
//! └──────────────┘                │  └───┬────┘     └───┬────┘   │
//!                                 └──────┼─────────────┼─────────┘
//!                                        │ open_write  │
//!                                        ▼             ▼
//!                                 ┌──────────────────────────────┐
//!                                 │    Destination Provider      │
//!                                 │   (TrackedWriter wraps the   │
//!                                 │    stream and checkpoints)   │
//!                                 └──────────────┬───────────────┘
//!                                                │ JobRecords
//!                                                ▼
//!                                 ┌──────────────────────────────┐
//!                                 │   State Store (state.db)     │
//!                                 └──────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Local to local with 64 streams
//! fastmig --source /data/old --dest /data/new --streams 64
//!
//! # Local to S3 with integrity checking, resuming a prior run
//! fastmig --source /data --dest s3://bucket/prefix --checksum --resume
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod progress;
pub mod provider;
pub mod store;

pub use config::{CliArgs, MigrateConfig, StorageUrl};
pub use engine::{
    BufferPool, CancelSource, CancelToken, CheckpointConfig, JobQueue, JobTracker, TransferJob,
    Walker, WorkerPool,
};
pub use error::{MigrateError, Result};
pub use progress::{ProgressSnapshot, ProgressTracker};
pub use provider::{FileMeta, Provider};
pub use store::{JobRecord, JobState, StateStore};
