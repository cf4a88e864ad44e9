//! Worker thread plumbing shared by all pipelines.
//!
//! Every active pipeline owns one dedicated thread. Shutdown is cooperative:
//! the controlling side clears an alive flag that the worker checks on every
//! loop iteration, then waits a bounded time for the thread to exit. A
//! worker that overruns the wait is detached (and logged), never joined
//! unboundedly, so `stop()` cannot deadlock against a worker mid-poll.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use log::warn;

/// Shared liveness flag. Lock-free reads; cleared exactly once on stop.
#[derive(Clone, Debug, Default)]
pub struct AliveFlag(Arc<AtomicBool>);

impl AliveFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A spawned pipeline worker plus the handle needed for a bounded join.
pub(crate) struct Worker {
    name: &'static str,
    handle: Option<thread::JoinHandle<()>>,
    done: Receiver<()>,
}

impl Worker {
    /// Spawns `body` on a dedicated thread.
    pub fn spawn(name: &'static str, body: impl FnOnce() + Send + 'static) -> Self {
        let (done_tx, done) = mpsc::channel::<()>();
        let handle = thread::spawn(move || {
            // Dropped on exit (or unwind), which signals `done`.
            let _done_tx = done_tx;
            body();
        });
        Self {
            name,
            handle: Some(handle),
            done,
        }
    }

    /// Waits at most `timeout` for the worker to finish. On timeout the
    /// thread is detached and may leak; callers have already cleared the
    /// alive flag, so this only happens if the worker is wedged in an
    /// external call.
    pub fn join_timeout(mut self, timeout: Duration) -> bool {
        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.handle.take() {
                    let _ = handle.join();
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "{}: worker did not exit within {:?}, detaching it",
                    self.name, timeout
                );
                false
            }
        }
    }
}
