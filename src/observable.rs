//! Live, push-based view of `select_all`.
//!
//! A [`LiveQuery`] keeps the last delivered snapshot and a set of
//! subscribers. The write queue calls [`LiveQuery::refresh`] after every
//! successful write; the query re-reads the table and, when the result
//! differs from the last snapshot, hands each subscriber an independent copy
//! through that subscriber's [`Dispatcher`].
//!
//! Every evaluation gets a version number under the state lock. Each
//! subscriber owns a delivery slot holding the newest version it has seen
//! plus at most one pending snapshot. Only one invocation of a callback runs
//! at a time; a delivery arriving while it runs (from another thread, or
//! re-entrantly from the callback itself) is parked in the slot and handed
//! over when the running one returns. Older versions are dropped, so a
//! subscriber never goes back in time and intermediate states may coalesce.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, trace, warn};

use crate::delivery::{Dispatcher, Inline};
use crate::error::{Result, StoreError};
use crate::model::Word;
use crate::queue::{ErrorSink, TracingErrorSink, WriteListener};
use crate::storage::TableStore;

/// Identifies one subscription on one live query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

type Callback = dyn Fn(Vec<Word>) + Send + Sync;

#[derive(Default)]
struct DeliverySlot {
    delivered: u64,
    pending: Option<(u64, Arc<Vec<Word>>)>,
    running: bool,
}

struct SubscriberShared {
    id: SubscriptionId,
    callback: Box<Callback>,
    active: AtomicBool,
    slot: Mutex<DeliverySlot>,
}

impl SubscriberShared {
    fn lock_slot(&self) -> MutexGuard<'_, DeliverySlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand `snapshot` to the callback unless something newer already got there.
    fn offer(&self, version: u64, snapshot: Arc<Vec<Word>>) {
        let mut slot = self.lock_slot();
        let newest = slot.pending.as_ref().map_or(slot.delivered, |(v, _)| *v);
        if version <= newest {
            trace!(subscription = %self.id, version, "Dropping stale delivery");
            return;
        }
        slot.pending = Some((version, snapshot));
        if slot.running {
            return;
        }

        slot.running = true;
        loop {
            let Some((version, snapshot)) = slot.pending.take() else {
                slot.running = false;
                return;
            };
            slot.delivered = version;
            drop(slot);

            if self.active.load(Ordering::Acquire) {
                let words = snapshot.as_ref().clone();
                if panic::catch_unwind(AssertUnwindSafe(|| (self.callback)(words))).is_err() {
                    warn!(subscription = %self.id, "Subscriber callback panicked");
                }
            }

            slot = self.lock_slot();
        }
    }
}

#[derive(Clone)]
struct Subscriber {
    shared: Arc<SubscriberShared>,
    dispatcher: Arc<dyn Dispatcher>,
}

#[derive(Default)]
struct State {
    last: Option<Arc<Vec<Word>>>,
    version: u64,
    subscribers: BTreeMap<SubscriptionId, Subscriber>,
}

struct Inner<S> {
    store: Arc<S>,
    default_dispatcher: Arc<dyn Dispatcher>,
    sink: Arc<dyn ErrorSink>,
    next_id: AtomicU64,
    state: Mutex<State>,
}

/// Cloneable handle to the live `SELECT word FROM word_table ORDER BY word` result.
pub struct LiveQuery<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for LiveQuery<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> fmt::Debug for LiveQuery<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("LiveQuery")
            .field("version", &state.version)
            .field("subscribers", &state.subscribers.len())
            .finish_non_exhaustive()
    }
}

impl<S: TableStore> LiveQuery<S> {
    /// Live query delivering inline and logging failures.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self::with_context(store, Arc::new(Inline), Arc::new(TracingErrorSink))
    }

    /// Live query with an explicit default delivery context and error sink.
    #[must_use]
    pub fn with_context(
        store: Arc<S>,
        default_dispatcher: Arc<dyn Dispatcher>,
        sink: Arc<dyn ErrorSink>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                default_dispatcher,
                sink,
                next_id: AtomicU64::new(1),
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Subscribe on the query's default delivery context.
    ///
    /// # Errors
    ///
    /// See [`LiveQuery::subscribe_on`].
    pub fn subscribe<F>(&self, callback: F) -> Result<Subscription>
    where
        F: Fn(Vec<Word>) + Send + Sync + 'static,
    {
        let dispatcher = Arc::clone(&self.inner.default_dispatcher);
        self.subscribe_on(dispatcher, callback)
    }

    /// Subscribe with callbacks scheduled through `dispatcher`.
    ///
    /// The table is read fresh and the result delivered right away (inline
    /// dispatchers run the callback before this returns). If that read
    /// fails, the last good snapshot is delivered instead.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Subscription`] if the read fails and no earlier
    /// snapshot exists, or [`StoreError::Closed`] if `dispatcher` is closed.
    pub fn subscribe_on<F>(&self, dispatcher: Arc<dyn Dispatcher>, callback: F) -> Result<Subscription>
    where
        F: Fn(Vec<Word>) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let subscriber = Subscriber {
            shared: Arc::new(SubscriberShared {
                id,
                callback: Box::new(callback),
                active: AtomicBool::new(true),
                slot: Mutex::new(DeliverySlot::default()),
            }),
            dispatcher,
        };

        let (snapshot, version, targets) = {
            // Read under the state lock so evaluations are versioned in table order.
            let mut state = self.inner.lock_state();
            let changed = match self.inner.store.select_all() {
                Ok(words) => state.replace_if_changed(words),
                Err(err) if state.last.is_some() => {
                    warn!(error = %err, "Initial read failed; delivering last snapshot");
                    false
                }
                Err(err) => {
                    drop(state);
                    let err = StoreError::subscription(format!("initial read failed: {err}"));
                    self.inner.sink.report("subscribe", &err);
                    return Err(err);
                }
            };
            let snapshot = state
                .last
                .clone()
                .ok_or_else(|| StoreError::subscription("no snapshot available"))?;
            state.subscribers.insert(id, subscriber.clone());

            let targets = if changed {
                state.targets()
            } else {
                vec![(id, subscriber)]
            };
            (snapshot, state.version, targets)
        };

        debug!(subscription = %id, words = snapshot.len(), "Subscribed");
        let guard = Subscription {
            id,
            query: Arc::downgrade(&self.inner) as Weak<dyn Detach>,
        };
        let failed = self.inner.deliver(&snapshot, version, targets);
        if failed.contains(&id) {
            guard.unsubscribe();
            return Err(StoreError::Closed);
        }
        Ok(guard)
    }

    /// Stop delivering to `id`. Unknown or already removed ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.detach(id);
    }

    /// Re-read the table and publish the result if it changed.
    ///
    /// With no subscribers this only drops the cached snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Subscription`] if the read fails; the last good
    /// snapshot stays in place and nothing is delivered.
    pub fn refresh(&self) -> Result<()> {
        let mut state = self.inner.lock_state();
        if state.subscribers.is_empty() {
            state.last = None;
            trace!("No subscribers; skipping re-evaluation");
            return Ok(());
        }

        let words = match self.inner.store.select_all() {
            Ok(words) => words,
            Err(err) => {
                drop(state);
                let err = StoreError::subscription(format!("re-evaluation failed: {err}"));
                warn!(error = %err, "Keeping last snapshot");
                self.inner.sink.report("refresh", &err);
                return Err(err);
            }
        };

        if !state.replace_if_changed(words) {
            trace!(version = state.version, "Result unchanged; no delivery");
            return Ok(());
        }

        let Some(snapshot) = state.last.clone() else {
            return Ok(());
        };
        let version = state.version;
        let targets = state.targets();
        drop(state);

        trace!(version, words = snapshot.len(), "Publishing snapshot");
        self.inner.deliver(&snapshot, version, targets);
        Ok(())
    }

    /// The most recent snapshot handed to subscribers, if any is cached.
    #[must_use]
    pub fn snapshot(&self) -> Option<Vec<Word>> {
        self.inner
            .lock_state()
            .last
            .as_ref()
            .map(|words| words.as_ref().clone())
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock_state().subscribers.len()
    }
}

impl<S: TableStore> WriteListener for LiveQuery<S> {
    fn on_write_applied(&self, op: &str) {
        trace!(op, "Write applied; re-evaluating");
        // Failures are already reported and the last snapshot kept.
        let _ = self.refresh();
    }
}

impl State {
    fn replace_if_changed(&mut self, words: Vec<Word>) -> bool {
        if self.last.as_deref() == Some(&words) {
            return false;
        }
        self.version += 1;
        self.last = Some(Arc::new(words));
        true
    }

    fn targets(&self) -> Vec<(SubscriptionId, Subscriber)> {
        self.subscribers
            .iter()
            .map(|(id, subscriber)| (*id, subscriber.clone()))
            .collect()
    }
}

impl<S> Inner<S> {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: Send + Sync> Inner<S> {
    /// Dispatch `snapshot` to every target. Targets whose dispatcher is
    /// closed are removed and returned.
    fn deliver(
        &self,
        snapshot: &Arc<Vec<Word>>,
        version: u64,
        targets: Vec<(SubscriptionId, Subscriber)>,
    ) -> Vec<SubscriptionId> {
        let mut failed = Vec::new();
        for (id, subscriber) in targets {
            let shared = Arc::clone(&subscriber.shared);
            let snapshot = Arc::clone(snapshot);
            let job = Box::new(move || {
                if shared.active.load(Ordering::Acquire) {
                    shared.offer(version, snapshot);
                }
            });
            if subscriber.dispatcher.dispatch(job).is_err() {
                warn!(subscription = %id, "Delivery context closed; unsubscribing");
                failed.push(id);
            }
        }
        if !failed.is_empty() {
            for id in &failed {
                self.detach(*id);
            }
        }
        failed
    }
}

trait Detach: Send + Sync {
    fn detach(&self, id: SubscriptionId);
}

impl<S: Send + Sync> Detach for Inner<S> {
    fn detach(&self, id: SubscriptionId) {
        let removed = self.lock_state().subscribers.remove(&id);
        if let Some(subscriber) = removed {
            subscriber.shared.active.store(false, Ordering::Release);
            debug!(subscription = %id, "Unsubscribed");
        }
    }
}

/// Guard for one subscription. Dropping it unsubscribes.
///
/// Unsubscribing is idempotent and stops all future deliveries; a delivery
/// already running on another thread may still complete.
#[must_use = "dropping the guard unsubscribes"]
pub struct Subscription {
    id: SubscriptionId,
    query: Weak<dyn Detach>,
}

impl Subscription {
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn unsubscribe(&self) {
        if let Some(query) = self.query.upgrade() {
            query.detach(self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
