//! Explicit database handle.
//!
//! A [`WordDatabase`] is built once by the host, owns the storage, the write
//! queue and the single live word query, and must be closed explicitly.
//! There is no process-wide instance; pass the handle (or repositories made
//! from it) to whoever needs it.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::{SeedPolicy, StoreConfig};
use crate::delivery::{Dispatcher, Inline};
use crate::error::Result;
use crate::model::Word;
use crate::observable::LiveQuery;
use crate::queue::{ErrorSink, TracingErrorSink, WriteHandle, WriteListener, WriteQueue};
use crate::repository::WordRepository;
use crate::storage::sqlite::DEFAULT_BUSY_TIMEOUT;
use crate::storage::{OpenKind, SqliteStorage};

/// Hook run on the writer once the database is open.
pub type OpenHook = Box<dyn FnOnce(&SqliteStorage, OpenKind) -> Result<()> + Send + 'static>;

/// Builder for [`WordDatabase`].
pub struct DatabaseBuilder {
    path: Option<PathBuf>,
    busy_timeout: Duration,
    dispatcher: Arc<dyn Dispatcher>,
    sink: Arc<dyn ErrorSink>,
    seed_policy: SeedPolicy,
    seed_words: Vec<Word>,
    on_open: Option<OpenHook>,
}

impl Default for DatabaseBuilder {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            dispatcher: Arc::new(Inline),
            sink: Arc::new(TracingErrorSink),
            seed_policy: SeedPolicy::Never,
            seed_words: Vec::new(),
            on_open: None,
        }
    }
}

impl fmt::Debug for DatabaseBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseBuilder")
            .field("path", &self.path)
            .field("busy_timeout", &self.busy_timeout)
            .field("seed_policy", &self.seed_policy)
            .field("seed_words", &self.seed_words.len())
            .field("on_open", &self.on_open.is_some())
            .finish_non_exhaustive()
    }
}

impl DatabaseBuilder {
    /// Builder pre-filled from resolved configuration.
    #[must_use]
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            path: config.db_path.clone(),
            busy_timeout: config.busy_timeout,
            seed_policy: config.seed_policy,
            seed_words: config.seed_words.clone(),
            ..Self::default()
        }
    }

    /// Store the table in this file instead of memory.
    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub const fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Default delivery context for live-query subscribers.
    #[must_use]
    pub fn delivery(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Where failed writes and failed re-evaluations are reported.
    #[must_use]
    pub fn error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replace the table contents with `words` when `policy` applies.
    #[must_use]
    pub fn seed(mut self, policy: SeedPolicy, words: Vec<Word>) -> Self {
        self.seed_policy = policy;
        self.seed_words = words;
        self
    }

    /// Run `hook` as a queued write after opening (and after seeding).
    #[must_use]
    pub fn on_open<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&SqliteStorage, OpenKind) -> Result<()> + Send + 'static,
    {
        self.on_open = Some(Box::new(hook));
        self
    }

    /// Open storage, start the writer and queue any bootstrap work.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the writer
    /// thread cannot be spawned. Seed and hook failures are reported to the
    /// error sink instead.
    pub fn open(self) -> Result<WordDatabase> {
        let storage = match &self.path {
            Some(path) => SqliteStorage::open_with_timeout(path, self.busy_timeout)?,
            None => SqliteStorage::open_memory()?,
        };
        let open_kind = storage.open_kind();
        let storage = Arc::new(storage);

        let words = LiveQuery::with_context(
            Arc::clone(&storage),
            self.dispatcher,
            Arc::clone(&self.sink),
        );
        let queue = WriteQueue::spawn(
            Arc::clone(&storage),
            vec![Arc::new(words.clone()) as Arc<dyn WriteListener>],
            self.sink,
        )?;

        let mut bootstrap = Vec::new();
        if self.seed_policy.applies_to(open_kind) {
            let seed = self.seed_words;
            info!(policy = %self.seed_policy, words = seed.len(), "Seeding word table");
            bootstrap.push(queue.submit("seed", move |store| {
                store.replace_all(&seed).map(|_| ())
            })?);
        }
        if let Some(hook) = self.on_open {
            bootstrap.push(queue.submit("on_open", move |store| hook(store, open_kind))?);
        }

        debug!(?open_kind, path = ?storage.path(), "Word database ready");
        Ok(WordDatabase {
            storage,
            queue,
            words,
            open_kind,
            bootstrap,
        })
    }
}

/// Owner of one word database.
pub struct WordDatabase {
    storage: Arc<SqliteStorage>,
    queue: WriteQueue<SqliteStorage>,
    words: LiveQuery<SqliteStorage>,
    open_kind: OpenKind,
    bootstrap: Vec<WriteHandle>,
}

impl fmt::Debug for WordDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WordDatabase")
            .field("path", &self.storage.path())
            .field("open_kind", &self.open_kind)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

impl WordDatabase {
    #[must_use]
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::default()
    }

    /// Open using resolved configuration.
    ///
    /// # Errors
    ///
    /// See [`DatabaseBuilder::open`].
    pub fn open(config: &StoreConfig) -> Result<Self> {
        DatabaseBuilder::from_config(config).open()
    }

    /// Open a private in-memory database with default settings.
    ///
    /// # Errors
    ///
    /// See [`DatabaseBuilder::open`].
    pub fn open_in_memory() -> Result<Self> {
        Self::builder().open()
    }

    /// A repository sharing this database's queue and live query.
    #[must_use]
    pub fn repository(&self) -> WordRepository {
        WordRepository::new(self.queue.handle(), self.words.clone())
    }

    #[must_use]
    pub const fn open_kind(&self) -> OpenKind {
        self.open_kind
    }

    /// Wait for the seed and open hook queued by [`DatabaseBuilder::open`].
    ///
    /// # Errors
    ///
    /// Every queued bootstrap job is waited for; the first failure is returned.
    pub fn wait_for_bootstrap(&mut self) -> Result<()> {
        let mut first_err = None;
        for handle in self.bootstrap.drain(..) {
            let name = handle.name();
            if let Err(err) = handle.wait() {
                debug!(op = name, error = %err, "Bootstrap job failed");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Apply every queued write and stop the writer.
    ///
    /// Repositories created from this database reject writes afterwards.
    /// Their live queries keep read access, so the connections are closed
    /// once the last repository and live query are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Closed`] if the writer had already died.
    pub fn close(self) -> Result<()> {
        let path = self.storage.path().map(PathBuf::from);
        self.queue.shutdown()?;
        info!(?path, "Word database closed");
        Ok(())
    }
}
