//! Cancellation scopes for transfers and pool shutdown
//!
//! A `CancelSource` owns a scope; cloneable `CancelToken`s observe it.
//! Cancellation is broadcast two ways at once: an atomic flag for cheap
//! polling inside tight loops, and a zero-capacity channel whose sender
//! is dropped on cancel so that blocked `select!` arms wake up.
//!
//! Dropping the source cancels the scope.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Owning side of a cancellation scope
pub struct CancelSource {
    flag: Arc<AtomicBool>,
    guard: Mutex<Option<Sender<()>>>,
    token: CancelToken,
}

impl CancelSource {
    /// Create a new, un-cancelled scope
    pub fn new() -> Self {
        let (tx, rx) = bounded::<()>(0);
        let flag = Arc::new(AtomicBool::new(false));
        Self {
            flag: Arc::clone(&flag),
            guard: Mutex::new(Some(tx)),
            token: CancelToken { flag, signal: rx },
        }
    }

    /// Get a token observing this scope
    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    /// Cancel the scope: sets the flag, then closes the signal channel
    /// so every blocked `select!` over it wakes up
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.guard.lock().take();
    }

    /// Check whether the scope has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CancelSource {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Observer side of a cancellation scope
///
/// Cheap to clone; every `TransferJob` carries one.
#[derive(Debug, Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    signal: Receiver<()>,
}

impl CancelToken {
    /// Poll the scope state without blocking
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
            || matches!(self.signal.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Channel that disconnects when the scope is cancelled
    ///
    /// Nothing is ever sent on it; a `recv` arm in `select!` fires only
    /// on cancellation.
    pub fn signal(&self) -> &Receiver<()> {
        &self.signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::select;
    use std::time::Duration;

    #[test]
    fn test_cancel_observed_by_token() {
        let source = CancelSource::new();
        let token = source.token();
        assert!(!token.is_cancelled());

        source.cancel();
        assert!(token.is_cancelled());
        assert!(source.is_cancelled());
    }

    #[test]
    fn test_cancel_wakes_blocked_select() {
        let source = CancelSource::new();
        let token = source.token();

        let handle = std::thread::spawn(move || {
            select! {
                recv(token.signal()) -> _ => true,
                default(Duration::from_secs(5)) => false,
            }
        });

        std::thread::sleep(Duration::from_millis(20));
        source.cancel();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_drop_cancels_scope() {
        let source = CancelSource::new();
        let token = source.token();
        drop(source);
        assert!(token.is_cancelled());
    }
}
