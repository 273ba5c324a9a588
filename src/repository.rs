//! The façade consumers use.
//!
//! A [`WordRepository`] pairs the live word list with the write queue. It is
//! the only path to mutate the table, which is what lets the live query
//! re-evaluate after every change.

use std::fmt;

use crate::error::Result;
use crate::model::{Word, validate_key};
use crate::observable::LiveQuery;
use crate::queue::{QueueHandle, WriteHandle};
use crate::storage::{SqliteStorage, TableStore};

/// Read side and write side of the word table behind one handle.
///
/// Cloning is cheap; all clones share the same queue and live query.
pub struct WordRepository<S = SqliteStorage> {
    queue: QueueHandle<S>,
    words: LiveQuery<S>,
}

impl<S> Clone for WordRepository<S> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            words: self.words.clone(),
        }
    }
}

impl<S> fmt::Debug for WordRepository<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WordRepository")
            .field("words", &self.words)
            .finish_non_exhaustive()
    }
}

impl<S: TableStore> WordRepository<S> {
    #[must_use]
    pub const fn new(queue: QueueHandle<S>, words: LiveQuery<S>) -> Self {
        Self { queue, words }
    }

    /// The shared live word list, alphabetized.
    #[must_use]
    pub fn get_all(&self) -> LiveQuery<S> {
        self.words.clone()
    }

    /// Queue `word` for insertion. A word already stored is silently kept.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Validation`] for an empty key (nothing is
    /// queued), or [`crate::StoreError::Closed`] after the database closed.
    pub fn insert(&self, word: Word) -> Result<WriteHandle> {
        validate_key(word.as_str())?;
        self.queue.submit("insert", move |store| store.insert(&word))
    }

    /// Build a [`Word`] from `key` and queue it.
    ///
    /// # Errors
    ///
    /// Same as [`WordRepository::insert`].
    pub fn insert_word(&self, key: &str) -> Result<WriteHandle> {
        self.insert(Word::new(key)?)
    }

    /// Queue removal of every word.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Closed`] after the database closed.
    pub fn delete_all(&self) -> Result<WriteHandle> {
        self.queue.submit("delete_all", S::delete_all)
    }

    /// Wait until every write queued so far has been applied and published.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Closed`] after the database closed.
    pub fn flush(&self) -> Result<()> {
        self.queue.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::queue::{TracingErrorSink, WriteListener, WriteQueue};
    use std::sync::{Arc, Mutex};

    fn repository() -> (WriteQueue<SqliteStorage>, WordRepository) {
        let store = Arc::new(SqliteStorage::open_memory().unwrap());
        let words = LiveQuery::new(Arc::clone(&store));
        let queue = WriteQueue::spawn(
            store,
            vec![Arc::new(words.clone()) as Arc<dyn WriteListener>],
            Arc::new(TracingErrorSink),
        )
        .unwrap();
        let repo = WordRepository::new(queue.handle(), words);
        (queue, repo)
    }

    #[test]
    fn insert_publishes_sorted_snapshot() {
        let (_queue, repo) = repository();
        let seen: Arc<Mutex<Vec<Vec<Word>>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let _sub = repo
            .get_all()
            .subscribe(move |words| sink.lock().unwrap().push(words))
            .unwrap();

        repo.insert_word("beta").unwrap();
        repo.insert_word("alpha").unwrap();
        repo.flush().unwrap();

        let last = seen.lock().unwrap().last().cloned().unwrap();
        let keys: Vec<&str> = last.iter().map(Word::as_str).collect();
        assert_eq!(keys, vec!["alpha", "beta"]);
    }

    #[test]
    fn empty_key_fails_before_queueing() {
        let (_queue, repo) = repository();
        let err = repo.insert_word("").unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn delete_all_handle_reports_success() {
        let (_queue, repo) = repository();
        repo.insert_word("gone").unwrap();
        repo.delete_all().unwrap().wait().unwrap();
    }

    #[test]
    fn writes_fail_after_queue_shutdown() {
        let (queue, repo) = repository();
        queue.shutdown().unwrap();
        assert!(matches!(repo.insert_word("late"), Err(StoreError::Closed)));
        assert!(matches!(repo.flush(), Err(StoreError::Closed)));
    }
}
