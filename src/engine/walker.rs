//! Iterative source-tree walker
//!
//! Produces one [`TransferJob`] per regular file under the source root,
//! using an explicit stack of relative paths instead of recursion so
//! that arbitrarily deep trees cannot overflow the thread stack.
//!
//! The walker owns the queue's only [`JobSender`]; it is consumed by
//! [`Walker::walk`], so the queue closes when the walk returns - on
//! success, on error, and on cancellation alike.

use crate::engine::cancel::CancelToken;
use crate::engine::job::{JobSender, TransferJob};
use crate::error::{MigrateError, Result};
use crate::provider::Provider;
use std::sync::Arc;
use tracing::{debug, info};

/// Iterative depth-first producer of transfer jobs
pub struct Walker {
    source: Arc<dyn Provider>,
    jobs: JobSender,
}

impl Walker {
    pub fn new(source: Arc<dyn Provider>, jobs: JobSender) -> Self {
        Self { source, jobs }
    }

    /// Walk the tree rooted at `source_root`, emitting one job per regular
    /// file with destinations joined under `dest_root`.
    ///
    /// Consumes the walker; the job queue is closed when this returns.
    /// Sibling ordering is unspecified (LIFO stack) - consumers must treat
    /// the job stream as a set.
    pub fn walk(self, cancel: &CancelToken, source_root: &str, dest_root: &str) -> Result<u64> {
        let root = self.source.stat(cancel, source_root)?;

        // A plain file at the root is a single job
        if !root.is_dir {
            let job = TransferJob {
                id: source_root.to_string(),
                source_path: source_root.to_string(),
                destination_path: dest_root.to_string(),
                file_info: root,
                cancel: cancel.clone(),
            };
            self.jobs.send(job, cancel)?;
            return Ok(1);
        }

        // Relative paths keep the stack small: depth bounds memory, not
        // tree width times path length.
        let mut stack: Vec<String> = vec![String::new()];
        let mut emitted = 0u64;

        while let Some(rel) = stack.pop() {
            if cancel.is_cancelled() {
                debug!(emitted, "walk cancelled");
                return Err(MigrateError::Cancelled);
            }

            let dir_path = join_path(source_root, &rel);
            let entries = self.source.list(cancel, &dir_path)?;

            for entry in entries {
                let child_rel = join_path(&rel, &entry.name);

                if entry.is_dir {
                    stack.push(child_rel);
                    continue;
                }

                let source_path = join_path(source_root, &child_rel);
                let job = TransferJob {
                    id: source_path.clone(),
                    source_path,
                    destination_path: join_path(dest_root, &child_rel),
                    file_info: entry,
                    cancel: cancel.clone(),
                };
                self.jobs.send(job, cancel)?;
                emitted += 1;
            }
        }

        info!(emitted, root = source_root, "walk complete");
        Ok(emitted)
    }
}

/// Join path segments with forward slashes, ignoring empty segments
fn join_path(base: &str, rel: &str) -> String {
    if base.is_empty() {
        return rel.to_string();
    }
    if rel.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), rel)
}
