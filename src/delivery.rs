//! Delivery contexts for live-query callbacks.
//!
//! A [`Dispatcher`] decides where a subscriber callback runs. The live query
//! only hands it boxed jobs; it never assumes a particular thread.
//!
//! - [`Inline`] runs the job on whichever thread produced it.
//! - [`DedicatedThread`] owns one named thread that drains jobs in order.
//! - [`MainLoop`] queues jobs for a host loop that drains them explicitly
//!   through its [`MainLoopDriver`], the shape a UI event loop has.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Result, StoreError};

/// A unit of delivery work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Schedules callback invocations on some execution context.
pub trait Dispatcher: Send + Sync + 'static {
    /// Schedule `job`. Jobs from one dispatcher must run in dispatch order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] if the context no longer accepts work.
    fn dispatch(&self, job: Job) -> Result<()>;
}

/// Runs jobs immediately on the dispatching thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inline;

impl Dispatcher for Inline {
    fn dispatch(&self, job: Job) -> Result<()> {
        run_job(job);
        Ok(())
    }
}

/// A background thread that runs jobs one at a time, in order.
///
/// The thread is joined when the dispatcher is shut down or dropped; jobs
/// already queued still run.
#[derive(Debug)]
pub struct DedicatedThread {
    name: String,
    sender: Mutex<Option<Sender<Job>>>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
}

impl DedicatedThread {
    /// Spawn the delivery thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses to spawn the thread.
    pub fn spawn(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<Job>();
        let thread_handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    run_job(job);
                }
            })?;

        Ok(Self {
            name,
            sender: Mutex::new(Some(sender)),
            thread_handle: Mutex::new(Some(thread_handle)),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop accepting jobs, run what is already queued and join the thread.
    ///
    /// Calling this from the delivery thread itself only closes the queue.
    pub fn shutdown(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let handle = self
            .thread_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!(name = %self.name, "Delivery thread panicked");
            }
            debug!(name = %self.name, "Delivery thread stopped");
        }
    }
}

impl Dispatcher for DedicatedThread {
    fn dispatch(&self, job: Job) -> Result<()> {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = guard.as_ref().ok_or(StoreError::Closed)?;
        sender.send(job).map_err(|_| StoreError::Closed)
    }
}

impl Drop for DedicatedThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Create a host-driven delivery context.
///
/// The [`MainLoop`] half is handed to the live query; the host keeps the
/// [`MainLoopDriver`] and runs queued callbacks on its own thread.
#[must_use]
pub fn main_loop() -> (MainLoop, MainLoopDriver) {
    let (sender, receiver) = mpsc::channel();
    (MainLoop { sender }, MainLoopDriver { receiver })
}

/// Posting side of a host-driven loop.
#[derive(Debug, Clone)]
pub struct MainLoop {
    sender: Sender<Job>,
}

impl Dispatcher for MainLoop {
    fn dispatch(&self, job: Job) -> Result<()> {
        self.sender.send(job).map_err(|_| StoreError::Closed)
    }
}

/// Draining side of a host-driven loop. Dropping it closes the loop.
#[derive(Debug)]
pub struct MainLoopDriver {
    receiver: Receiver<Job>,
}

impl MainLoopDriver {
    /// Run every job queued right now. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.receiver.try_recv() {
            run_job(job);
            ran += 1;
        }
        ran
    }

    /// Run jobs until none arrives for `idle`. Returns how many ran.
    pub fn run_until_idle(&self, idle: Duration) -> usize {
        let mut ran = 0;
        loop {
            match self.receiver.recv_timeout(idle) {
                Ok(job) => {
                    run_job(job);
                    ran += 1;
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return ran,
            }
        }
    }
}

fn run_job(job: Job) {
    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
        warn!("Subscriber callback panicked");
    }
}
