//! Dynamic worker pool
//!
//! Workers consume jobs and invoke a caller-supplied handler. The pool
//! scales up and down at runtime: scaling down is cooperative, so a
//! decommissioned worker always finishes its current job before exiting.
//!
//! Two distinct signals drive the lifecycle:
//! - a private per-worker quit channel, closed to decommission exactly
//!   one worker ("stop this worker")
//! - the pool-wide cancellation scope, observed by every worker and
//!   every blocked queue receive ("stop all workers")

use crate::engine::cancel::{CancelSource, CancelToken};
use crate::engine::job::{JobReceiver, TransferJob};
use crate::error::{Result, WorkerError};
use crossbeam_channel::{bounded, select, Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Job processing function invoked by each worker.
/// Errors are expected to be recorded via the tracker and are ignored
/// at the worker boundary.
pub type JobHandler = Arc<dyn Fn(&CancelToken, TransferJob) -> Result<()> + Send + Sync>;

struct WorkerSlot {
    /// Dropping this sender closes the worker's quit channel
    quit: Sender<()>,
    handle: JoinHandle<()>,
}

struct PoolInner {
    workers: HashMap<usize, WorkerSlot>,
    /// Decommissioned workers still draining their current job;
    /// joined in `stop`/`wait`
    retired: Vec<JoinHandle<()>>,
    next_id: usize,
    target: usize,
}

/// Dynamic set of concurrent transfer workers
pub struct WorkerPool {
    jobs: JobReceiver,
    handler: JobHandler,
    cancel: CancelSource,
    inner: Mutex<PoolInner>,
}

impl WorkerPool {
    pub fn new(jobs: JobReceiver, handler: JobHandler) -> Self {
        Self {
            jobs,
            handler,
            cancel: CancelSource::new(),
            inner: Mutex::new(PoolInner {
                workers: HashMap::new(),
                retired: Vec::new(),
                next_id: 0,
                target: 0,
            }),
        }
    }

    /// Token observing the pool-wide cancellation scope
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.token()
    }

    /// Scale the pool up or down to `count` workers.
    ///
    /// Scaling up spawns workers; scaling down closes one arbitrary
    /// worker's quit channel per step. The selected worker exits after
    /// finishing its current job, never mid-transfer.
    pub fn set_worker_count(&self, count: usize) -> Result<()> {
        let mut inner = self.inner.lock();

        while inner.target < count {
            self.add_worker(&mut inner)?;
        }
        while inner.target > count {
            Self::remove_worker(&mut inner);
        }

        info!(workers = inner.target, "worker pool scaled");
        Ok(())
    }

    /// Current target worker count
    pub fn worker_count(&self) -> usize {
        self.inner.lock().target
    }

    /// Cancel the pool-wide scope without waiting; every worker exits as
    /// soon as its current operation returns
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel the pool-wide scope and wait for every worker to terminate
    pub fn stop(&self) {
        self.cancel.cancel();
        self.wait();
    }

    /// Wait for every worker (active and retired) to terminate without
    /// cancelling; used after the walker has closed the queue so that
    /// workers drain it and exit on their own.
    pub fn wait(&self) {
        let (slots, retired) = {
            let mut inner = self.inner.lock();
            inner.target = 0;
            let slots: Vec<WorkerSlot> = inner.workers.drain().map(|(_, s)| s).collect();
            let retired = std::mem::take(&mut inner.retired);
            (slots, retired)
        };

        for slot in slots {
            if slot.handle.join().is_err() {
                warn!("worker panicked during shutdown");
            }
        }
        for handle in retired {
            if handle.join().is_err() {
                warn!("retired worker panicked during shutdown");
            }
        }
    }

    fn add_worker(&self, inner: &mut PoolInner) -> Result<()> {
        let id = inner.next_id;
        inner.next_id += 1;

        let (quit_tx, quit_rx) = bounded::<()>(0);
        let cancel = self.cancel.token();
        let jobs = self.jobs.clone();
        let handler = Arc::clone(&self.handler);

        let handle = thread::Builder::new()
            .name(format!("transfer-{id}"))
            .spawn(move || worker_loop(id, quit_rx, cancel, jobs, handler))
            .map_err(|e| WorkerError::SpawnFailed {
                id,
                reason: e.to_string(),
            })?;

        inner.workers.insert(
            id,
            WorkerSlot {
                quit: quit_tx,
                handle,
            },
        );
        inner.target += 1;
        Ok(())
    }

    fn remove_worker(inner: &mut PoolInner) {
        // Arbitrary victim; the quit channel closes when its sender drops
        let victim = inner.workers.keys().next().copied();
        if let Some(id) = victim {
            if let Some(slot) = inner.workers.remove(&id) {
                debug!(worker = id, "decommissioning worker");
                drop(slot.quit);
                inner.retired.push(slot.handle);
                inner.target -= 1;
            }
        }
    }
}

/// Per-worker consumer loop.
///
/// The quit and cancel channels never carry messages; their `recv` arms
/// fire only on disconnect, which is the shutdown broadcast.
fn worker_loop(
    id: usize,
    quit: Receiver<()>,
    cancel: CancelToken,
    jobs: JobReceiver,
    handler: JobHandler,
) {
    debug!(worker = id, "worker started");

    loop {
        // Prioritize quit and cancellation over draining more jobs
        if cancel.is_cancelled() {
            break;
        }
        if matches!(quit.try_recv(), Err(TryRecvError::Disconnected)) {
            debug!(worker = id, "worker decommissioned");
            break;
        }

        select! {
            recv(quit) -> _ => {
                debug!(worker = id, "worker decommissioned");
                break;
            }
            recv(cancel.signal()) -> _ => break,
            recv(jobs.chan()) -> msg => match msg {
                Ok(job) => {
                    jobs.stats().record_dequeued();
                    // Handler records failures via the tracker; the
                    // worker never terminates on a job error.
                    let _ = handler(&cancel, job);
                }
                // Queue closed and drained
                Err(_) => break,
            },
        }
    }

    debug!(worker = id, "worker exiting");
}
