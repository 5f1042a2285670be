use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, error};

use crate::error::NodeError;
use crate::node::NodeInner;

/// Owns the per-node background thread that drives the `PollSet` loop:
/// idle hooks, conditional rebuild, before hooks, an unlocked `poll(2)`
/// wait, wake-fd drain, after hooks. Spawned when the first poll item is
/// added; self-terminates once it observes the `PollSet` empty, rather
/// than being torn down from within its own loop.
pub struct Worker {
    inner: Arc<Mutex<NodeInner>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn(
        inner: Arc<Mutex<NodeInner>>,
        idle_expired: Arc<AtomicBool>,
        on_idle_timeout: Arc<dyn Fn() + Send + Sync>,
    ) -> Result<Worker, NodeError> {
        let running = Arc::new(AtomicBool::new(true));
        let loop_inner = inner.clone();
        let loop_running = running.clone();
        let handle = thread::Builder::new()
            .name("node-worker".into())
            .spawn(move || run(loop_inner, loop_running, idle_expired, on_idle_timeout))
            .map_err(NodeError::WorkerSpawn)?;
        Ok(Worker {
            inner,
            running,
            handle: Some(handle),
        })
    }

    /// Whether the underlying thread has already exited (e.g. because it
    /// observed an empty `PollSet`). Callers use this to decide whether a
    /// stale `Worker` needs replacing rather than reusing.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Clear the running flag and wake the thread so it observes it on its
    /// next iteration. Does not block — safe to call from any thread,
    /// including the worker thread itself.
    pub fn signal_stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Err(e) = self.inner.lock().pollset.wake() {
            error!(error = %e, "failed to wake worker for shutdown");
        }
    }

    /// Signal and block until the thread exits. Must only be called from a
    /// thread other than the worker thread itself.
    pub fn join(&mut self) {
        self.signal_stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.signal_stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run(
    inner: Arc<Mutex<NodeInner>>,
    running: Arc<AtomicBool>,
    idle_expired: Arc<AtomicBool>,
    on_idle_timeout: Arc<dyn Fn() + Send + Sync>,
) {
    debug!("worker thread starting");
    while running.load(Ordering::SeqCst) {
        let mut fds = {
            let mut guard = inner.lock();
            if guard.pollset.is_empty() {
                break;
            }
            while guard.pollset.run_idle() {}
            guard.pollset.rebuild_if_needed();
            guard.pollset.run_before();
            guard.pollset.snapshot_fds()
        };

        if let Err(e) = crate::pollset::wait_on(&mut fds) {
            error!(error = %e, "poll wait failed, worker exiting");
            return;
        }

        if crate::pollset::wake_ready_in(&fds) {
            let guard = inner.lock();
            if let Err(e) = guard.pollset.drain_wake() {
                error!(error = %e, "failed to drain wake eventfd");
            }
        } else {
            inner.lock().pollset.run_after_with(&fds);
        }

        if idle_expired.swap(false, Ordering::SeqCst) {
            on_idle_timeout();
        }
    }
    debug!("worker thread stopping");
}
