//! Progress tracking and reporting
//!
//! [`ProgressTracker`] is the engine-side aggregation point: shared
//! atomic counters fed by the walker (via the queue stats) and the
//! transfer workers. A UI polls [`ProgressTracker::snapshot`] for a
//! read-only view and never touches engine internals.
//!
//! The built-in reporter renders the snapshot on an indicatif spinner.

use crate::engine::job::QueueStats;
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One in-flight transfer, as seen by the UI
#[derive(Debug, Clone)]
pub struct ActiveStream {
    pub job_id: String,
    pub path: String,
    pub bytes_done: u64,
    pub total_bytes: u64,
    pub bytes_per_sec: f64,
}

/// Read-only view of the migration state for UIs and logging
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub total_files: u64,
    pub total_bytes: u64,
    pub completed_files: u64,
    pub completed_bytes: u64,
    pub failed_files: u64,
    pub skipped_files: u64,
    pub active_streams: Vec<ActiveStream>,
    pub active_workers: usize,
    pub max_workers: usize,
    pub throughput_bytes_per_ms: f64,
    pub queue_depth: usize,
    pub is_running: bool,
    pub done: bool,
    pub elapsed: Duration,
}

struct StreamState {
    path: String,
    bytes_done: u64,
    total_bytes: u64,
    started: Instant,
}

/// Shared progress counters for one migration run
pub struct ProgressTracker {
    queue_stats: Arc<QueueStats>,
    started: Instant,
    completed_files: AtomicU64,
    completed_bytes: AtomicU64,
    failed_files: AtomicU64,
    skipped_files: AtomicU64,
    active_workers: AtomicUsize,
    max_workers: AtomicUsize,
    queue_depth: AtomicUsize,
    running: AtomicBool,
    done: AtomicBool,
    active: Mutex<HashMap<String, StreamState>>,
}

impl ProgressTracker {
    /// The queue stats feed the discovery side (total files/bytes seen
    /// by the walker so far).
    pub fn new(queue_stats: Arc<QueueStats>) -> Self {
        Self {
            queue_stats,
            started: Instant::now(),
            completed_files: AtomicU64::new(0),
            completed_bytes: AtomicU64::new(0),
            failed_files: AtomicU64::new(0),
            skipped_files: AtomicU64::new(0),
            active_workers: AtomicUsize::new(0),
            max_workers: AtomicUsize::new(0),
            queue_depth: AtomicUsize::new(0),
            running: AtomicBool::new(true),
            done: AtomicBool::new(false),
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn stream_started(&self, job_id: &str, path: &str, total_bytes: u64) {
        self.active.lock().insert(
            job_id.to_string(),
            StreamState {
                path: path.to_string(),
                bytes_done: 0,
                total_bytes,
                started: Instant::now(),
            },
        );
    }

    pub fn stream_progressed(&self, job_id: &str, bytes: u64) {
        if let Some(stream) = self.active.lock().get_mut(job_id) {
            stream.bytes_done += bytes;
        }
    }

    pub fn stream_finished(&self, job_id: &str) {
        self.active.lock().remove(job_id);
    }

    pub fn record_completed(&self, bytes: u64) {
        self.completed_files.fetch_add(1, Ordering::Relaxed);
        self.completed_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed_files.fetch_add(1, Ordering::Relaxed);
    }

    /// A job skipped because a prior run already completed it
    pub fn record_skipped(&self, bytes: u64) {
        self.skipped_files.fetch_add(1, Ordering::Relaxed);
        self.completed_files.fetch_add(1, Ordering::Relaxed);
        self.completed_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn set_workers(&self, active: usize, max: usize) {
        self.active_workers.store(active, Ordering::Relaxed);
        let prev_max = self.max_workers.load(Ordering::Relaxed);
        self.max_workers.store(max.max(prev_max), Ordering::Relaxed);
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.store(depth, Ordering::Relaxed);
    }

    pub fn finish(&self) {
        self.running.store(false, Ordering::Relaxed);
        self.done.store(true, Ordering::Relaxed);
    }

    /// Capture a consistent-enough view for display
    pub fn snapshot(&self) -> ProgressSnapshot {
        let elapsed = self.started.elapsed();
        let completed_bytes = self.completed_bytes.load(Ordering::Relaxed);
        let elapsed_ms = elapsed.as_millis().max(1) as f64;

        let active_streams = self
            .active
            .lock()
            .iter()
            .map(|(id, s)| {
                let secs = s.started.elapsed().as_secs_f64();
                ActiveStream {
                    job_id: id.clone(),
                    path: s.path.clone(),
                    bytes_done: s.bytes_done,
                    total_bytes: s.total_bytes,
                    bytes_per_sec: if secs > 0.0 {
                        s.bytes_done as f64 / secs
                    } else {
                        0.0
                    },
                }
            })
            .collect();

        ProgressSnapshot {
            total_files: self.queue_stats.jobs_enqueued(),
            total_bytes: self.queue_stats.bytes_enqueued(),
            completed_files: self.completed_files.load(Ordering::Relaxed),
            completed_bytes,
            failed_files: self.failed_files.load(Ordering::Relaxed),
            skipped_files: self.skipped_files.load(Ordering::Relaxed),
            active_streams,
            active_workers: self.active_workers.load(Ordering::Relaxed),
            max_workers: self.max_workers.load(Ordering::Relaxed),
            throughput_bytes_per_ms: completed_bytes as f64 / elapsed_ms,
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            is_running: self.running.load(Ordering::Relaxed),
            done: self.done.load(Ordering::Relaxed),
            elapsed,
        }
    }
}

/// Spinner-based live progress display
#[derive(Clone)]
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .expect("Invalid progress template")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Render a snapshot onto the spinner line
    pub fn update(&self, snap: &ProgressSnapshot) {
        let speed = snap.throughput_bytes_per_ms * 1000.0;
        let progress = if snap.total_bytes > 0 {
            snap.completed_bytes as f64 / snap.total_bytes as f64
        } else {
            0.0
        };

        let msg = format!(
            "Files: {}/{} | {} / {} | {} | ETA: {} | Workers: {}/{} | Queue: {}",
            format_number(snap.completed_files),
            format_number(snap.total_files),
            format_size(snap.completed_bytes, BINARY),
            format_size(snap.total_bytes, BINARY),
            format_speed(speed),
            format_eta(
                progress,
                snap.throughput_bytes_per_ms,
                snap.total_bytes,
                snap.completed_bytes
            ),
            snap.active_workers,
            snap.max_workers,
            snap.queue_depth,
        );

        self.bar.set_message(msg);
    }

    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a transfer rate like "1.50 MB/s"
pub fn format_speed(bytes_per_sec: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;
    const GB: f64 = 1024.0 * 1024.0 * 1024.0;

    if bytes_per_sec >= GB {
        format!("{:.2} GB/s", bytes_per_sec / GB)
    } else if bytes_per_sec >= MB {
        format!("{:.2} MB/s", bytes_per_sec / MB)
    } else if bytes_per_sec >= KB {
        format!("{:.2} KB/s", bytes_per_sec / KB)
    } else {
        format!("{:.0} B/s", bytes_per_sec)
    }
}

/// Estimate time to completion from the running throughput
pub fn format_eta(
    progress: f64,
    bytes_per_ms: f64,
    total_bytes: u64,
    completed_bytes: u64,
) -> String {
    if progress == 0.0 || bytes_per_ms <= 0.0 || total_bytes == 0 {
        return "Calculating...".to_string();
    }

    let remaining = total_bytes.saturating_sub(completed_bytes);
    if remaining == 0 {
        return "0s".to_string();
    }

    let remaining_ms = remaining as f64 / bytes_per_ms;
    let secs = (remaining_ms / 1000.0).round() as u64;

    if secs > 24 * 3600 {
        return "> 1d".to_string();
    }

    format_duration_secs(secs)
}

/// Compact duration: "5s", "1m30s", "1h0m0s"
fn format_duration_secs(secs: u64) -> String {
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;

    if h > 0 {
        format!("{h}h{m}m{s}s")
    } else if m > 0 {
        format!("{m}m{s}s")
    } else {
        format!("{s}s")
    }
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| {
            chunk
                .iter()
                .rev()
                .map(|&b| b as char)
                .collect::<String>()
        })
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a header at the start of a migration
pub fn print_header(source: &str, dest: &str, streams: usize) {
    println!();
    println!(
        "{} {}",
        style("fastmig").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Source:").bold(), source);
    println!("  {} {}", style("Dest:").bold(), dest);
    println!("  {} {}", style("Streams:").bold(), streams);
    println!();
}

/// Print a summary once the migration finishes
pub fn print_summary(snap: &ProgressSnapshot, interrupted: bool) {
    let duration_secs = snap.elapsed.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        snap.completed_bytes as f64 / duration_secs
    } else {
        0.0
    };

    println!();
    if interrupted {
        println!("{}", style("Migration Interrupted").yellow().bold());
    } else {
        println!("{}", style("Migration Complete").green().bold());
    }
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {} / {}",
        style("Files:").bold(),
        format_number(snap.completed_files),
        format_number(snap.total_files)
    );
    println!(
        "  {} {}",
        style("Transferred:").bold(),
        format_size(snap.completed_bytes, BINARY)
    );
    if snap.skipped_files > 0 {
        println!(
            "  {} {}",
            style("Skipped (resume):").bold(),
            format_number(snap.skipped_files)
        );
    }
    if snap.failed_files > 0 {
        println!(
            "  {} {}",
            style("Failed:").yellow().bold(),
            format_number(snap.failed_files)
        );
    }
    println!(
        "  {} {:.1}s ({})",
        style("Duration:").bold(),
        duration_secs,
        format_speed(rate)
    );
    println!();
}
