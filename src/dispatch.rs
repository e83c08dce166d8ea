//! Single ordered execution context for listener callbacks.
//!
//! Every listener notification from every connection is funnelled through
//! one [`Dispatcher`], so listener implementations never run concurrently
//! with themselves or with callbacks from other connections. Jobs execute
//! strictly in submission order.

use tokio::sync::mpsc;

type Job = Box<dyn FnOnce() + Send>;

/// Cloneable handle to the dispatch queue.
///
/// Jobs may be submitted from any task or thread; one dedicated worker
/// task consumes them in FIFO order.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Job>,
}

impl Dispatcher {
    /// Create a dispatcher and spawn its worker task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job();
            }
        });

        Self { tx }
    }

    /// Submit a job for ordered execution.
    ///
    /// Jobs submitted after the worker has shut down are dropped silently;
    /// this only happens when the runtime itself is going away.
    pub fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.tx.send(Box::new(job)).is_err() {
            tracing::debug!("Dispatch queue is gone, dropping job");
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
