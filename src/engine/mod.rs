//! The migration engine
//!
//! Everything between "a tree exists over there" and "its bytes exist
//! over here": the walker producing jobs, the bounded queue carrying
//! them, the worker pool consuming them, and the tracking machinery
//! that makes an interrupted run resumable.

pub mod buffer;
pub mod cancel;
pub mod checksum;
pub mod job;
pub mod pool;
pub mod tracker;
pub mod transfer;
pub mod walker;

pub use buffer::{BufferPool, DEFAULT_BUFFER_SIZE};
pub use cancel::{CancelSource, CancelToken};
pub use checksum::{ChecksumReader, ChecksumWriter};
pub use job::{JobQueue, JobReceiver, JobSender, QueueStats, TransferJob, DEFAULT_QUEUE_CAPACITY};
pub use pool::{JobHandler, WorkerPool};
pub use tracker::{CheckpointConfig, JobTracker, TrackedWriter};
pub use transfer::{transfer_file, TransferContext};
pub use walker::Walker;
