//! Single-writer queue for mutating operations.
//!
//! Every write runs on one dedicated worker thread, in the order it was
//! submitted. Callers never block on storage: [`QueueHandle::submit`] only
//! enqueues. A failed write is reported to the [`ErrorSink`] and dropped; the
//! worker moves on to the next request.
//!
//! After each successful write the worker notifies every [`WriteListener`]
//! before answering the write's [`WriteHandle`], so a caller that waits on a
//! handle (or on [`QueueHandle::flush`]) also knows listeners have seen it.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::error::{Result, StoreError};
use crate::storage::TableStore;

/// Name of the worker thread.
pub const WRITER_THREAD_NAME: &str = "wordstore-writer";

/// A queued mutation against the store.
pub type WriteOp<S> = Box<dyn FnOnce(&S) -> Result<()> + Send + 'static>;

/// Receives failures of queued operations.
pub trait ErrorSink: Send + Sync + 'static {
    fn report(&self, op: &str, err: &StoreError);
}

/// Default sink: logs the failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, op: &str, err: &StoreError) {
        error!(op, code = %err.code(), error = %err, "Write failed");
    }
}

/// Notified on the worker thread after each successful write.
pub trait WriteListener: Send + Sync + 'static {
    fn on_write_applied(&self, op: &str);
}

enum Request<S> {
    Write {
        name: &'static str,
        op: WriteOp<S>,
        reply: Sender<Result<()>>,
    },
    Barrier(Sender<()>),
    Shutdown,
}

/// Outcome of one submitted write.
///
/// Dropping the handle is the normal fire-and-forget use; the outcome is
/// still reported to the error sink.
#[derive(Debug)]
pub struct WriteHandle {
    name: &'static str,
    reply: Receiver<Result<()>>,
}

impl WriteHandle {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Block until the write has been applied or rejected.
    ///
    /// # Errors
    ///
    /// Returns the storage error the write failed with, or
    /// [`StoreError::Closed`] if the queue stopped before running it.
    pub fn wait(self) -> Result<()> {
        self.reply.recv().map_err(|_| StoreError::Closed)?
    }

    /// Like [`WriteHandle::wait`], giving up after `timeout`.
    ///
    /// Returns `None` if the write has not finished in time.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<()>> {
        match self.reply.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(StoreError::Closed)),
        }
    }
}

/// Cloneable submit side of a [`WriteQueue`].
pub struct QueueHandle<S> {
    sender: Sender<Request<S>>,
    // Cleared before `Shutdown` is sent; senders hold the read side while
    // enqueueing, so nothing can land behind `Shutdown` and be dropped.
    open: Arc<RwLock<bool>>,
}

impl<S> Clone for QueueHandle<S> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            open: Arc::clone(&self.open),
        }
    }
}

impl<S> fmt::Debug for QueueHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueHandle").finish_non_exhaustive()
    }
}

impl<S: TableStore> QueueHandle<S> {
    /// Enqueue `op` for the worker. Never runs `op` on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] if the queue has shut down.
    pub fn submit<F>(&self, name: &'static str, op: F) -> Result<WriteHandle>
    where
        F: FnOnce(&S) -> Result<()> + Send + 'static,
    {
        let (reply, outcome) = mpsc::channel();
        self.send(Request::Write {
            name,
            op: Box::new(op),
            reply,
        })?;
        debug!(op = name, "Queued write");
        Ok(WriteHandle {
            name,
            reply: outcome,
        })
    }

    /// Block until every write submitted before this call has finished.
    ///
    /// Must not be called from code running on the writer thread.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] if the queue has shut down.
    pub fn flush(&self) -> Result<()> {
        let (reply, done) = mpsc::channel();
        self.send(Request::Barrier(reply))?;
        done.recv().map_err(|_| StoreError::Closed)
    }

    fn send(&self, request: Request<S>) -> Result<()> {
        let open = self.open.read().unwrap_or_else(PoisonError::into_inner);
        if !*open {
            return Err(StoreError::Closed);
        }
        self.sender.send(request).map_err(|_| StoreError::Closed)
    }

    /// Refuse further requests and ask the worker to stop after what is queued.
    fn close(&self) -> Result<()> {
        let mut open = self.open.write().unwrap_or_else(PoisonError::into_inner);
        if !*open {
            return Ok(());
        }
        *open = false;
        self.sender
            .send(Request::Shutdown)
            .map_err(|_| StoreError::Closed)
    }
}

/// The single writer that owns mutation access to a store.
///
/// There is exactly one per database; it is not `Clone`. Extra submitters
/// come from [`WriteQueue::handle`].
pub struct WriteQueue<S: TableStore> {
    handle: QueueHandle<S>,
    thread_handle: Option<JoinHandle<()>>,
}

impl<S: TableStore> fmt::Debug for WriteQueue<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteQueue")
            .field("running", &self.thread_handle.is_some())
            .finish()
    }
}

impl<S: TableStore> WriteQueue<S> {
    /// Spawn the worker thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses to spawn the thread.
    pub fn spawn(
        store: Arc<S>,
        listeners: Vec<Arc<dyn WriteListener>>,
        sink: Arc<dyn ErrorSink>,
    ) -> Result<Self> {
        let (sender, receiver) = mpsc::channel();

        let thread_handle = thread::Builder::new()
            .name(WRITER_THREAD_NAME.to_string())
            .spawn(move || run_writer(store.as_ref(), &receiver, &listeners, sink.as_ref()))?;

        Ok(Self {
            handle: QueueHandle {
                sender,
                open: Arc::new(RwLock::new(true)),
            },
            thread_handle: Some(thread_handle),
        })
    }

    #[must_use]
    pub fn handle(&self) -> QueueHandle<S> {
        self.handle.clone()
    }

    /// See [`QueueHandle::submit`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] if the queue has shut down.
    pub fn submit<F>(&self, name: &'static str, op: F) -> Result<WriteHandle>
    where
        F: FnOnce(&S) -> Result<()> + Send + 'static,
    {
        self.handle.submit(name, op)
    }

    /// See [`QueueHandle::flush`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] if the queue has shut down.
    pub fn flush(&self) -> Result<()> {
        self.handle.flush()
    }

    /// Finish every queued write, then stop the worker.
    ///
    /// Writes submitted through other handles after this call are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] if the worker had already died.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> Result<()> {
        let Some(thread_handle) = self.thread_handle.take() else {
            return Ok(());
        };
        let sent = self.handle.close();
        if thread_handle.join().is_err() {
            return Err(StoreError::Closed);
        }
        debug!("Write queue stopped");
        sent
    }
}

impl<S: TableStore> Drop for WriteQueue<S> {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!(error = %err, "Write queue did not stop cleanly");
        }
    }
}

fn run_writer<S: TableStore>(
    store: &S,
    receiver: &Receiver<Request<S>>,
    listeners: &[Arc<dyn WriteListener>],
    sink: &dyn ErrorSink,
) {
    while let Ok(request) = receiver.recv() {
        match request {
            Request::Write { name, op, reply } => {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| op(store)))
                    .unwrap_or_else(|_| Err(StoreError::OperationPanicked(name.to_string())));

                match outcome {
                    Ok(()) => {
                        debug!(op = name, "Applied write");
                        notify_listeners(listeners, name, sink);
                        let _ = reply.send(Ok(()));
                    }
                    Err(err) => {
                        sink.report(name, &err);
                        let _ = reply.send(Err(err));
                    }
                }
            }
            Request::Barrier(reply) => {
                let _ = reply.send(());
            }
            Request::Shutdown => break,
        }
    }
}

/// The write is committed by now; a panicking listener must not take the
/// worker down with it.
fn notify_listeners(listeners: &[Arc<dyn WriteListener>], name: &str, sink: &dyn ErrorSink) {
    for listener in listeners {
        let notified =
            panic::catch_unwind(AssertUnwindSafe(|| listener.on_write_applied(name)));
        if notified.is_err() {
            warn!(op = name, "Write listener panicked");
            let err = StoreError::subscription(format!("listener panicked after '{name}'"));
            sink.report(name, &err);
        }
    }
}
