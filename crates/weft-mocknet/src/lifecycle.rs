//! Lifecycle scope and background task tracking.
//!
//! A mocknet is bound to an explicit shutdown scope at construction time
//! instead of reading ambient process state. [`ShutdownController`] is held
//! by whoever owns the simulation; [`ShutdownSignal`] is the cloneable
//! observer side threaded into the mocknet. Dropping the controller counts
//! as ending the scope.

use std::future::Future;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Owner side of a lifecycle scope.
///
/// Ending the scope (via [`ShutdownController::shutdown`] or by dropping the
/// controller) forces every conn and stream of the bound mocknet closed and
/// aborts outstanding handler tasks.
#[derive(Debug)]
pub struct ShutdownController {
    tx: watch::Sender<bool>,
}

/// Observer side of a lifecycle scope.
///
/// Cheap to clone; checked at every blocking point inside the mocknet.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownController {
    /// Create a fresh scope, returning the controller and its signal.
    pub fn new() -> (Self, ShutdownSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, ShutdownSignal { rx })
    }

    /// End the scope. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }

    /// Get another signal handle for this scope.
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl ShutdownSignal {
    /// Non-blocking check. A dropped controller counts as an ended scope.
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolve once the scope has ended.
    pub async fn ended(&self) {
        let mut rx = self.rx.clone();
        // wait_for returns Err only when the controller is gone, which is
        // also an ended scope.
        let _ = rx.wait_for(|ended| *ended).await;
    }
}

/// Tracks handler tasks spawned for inbound streams.
///
/// Every task is raced against the registry's shutdown channel, so ending
/// the scope both cancels tasks cooperatively and aborts whatever is left.
#[derive(Debug)]
pub(crate) struct TaskRegistry {
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskRegistry {
    pub(crate) fn new() -> Self {
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);
        Self {
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn a task that is dropped as soon as the registry shuts down.
    pub(crate) fn spawn_cancellable<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            tokio::select! {
                // Biased so a registry that already shut down wins over a
                // ready future; wait_for fires even when shutdown happened
                // before this task got polled for the first time.
                biased;
                res = shutdown_rx.wait_for(|ended| *ended) => {
                    let _ = res;
                }
                _ = fut => {}
            }
        });
        self.handles.lock().push(handle);
    }

    pub(crate) fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
    }
}

impl Drop for TaskRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}
