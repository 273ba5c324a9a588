#![allow(dead_code)]

use std::sync::{Arc, Condvar, Mutex, Once};
use std::time::Duration;

use tempfile::TempDir;
use wordstore::{ErrorSink, StoreError, Word, WordDatabase};

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        wordstore::logging::init_test_logging();
    });
}

pub fn test_db() -> WordDatabase {
    init_test_logging();
    WordDatabase::open_in_memory().expect("Failed to create test database")
}

pub fn test_db_with_dir() -> (WordDatabase, TempDir) {
    init_test_logging();
    let dir = TempDir::new().expect("Failed to create temp dir");
    let db = WordDatabase::builder()
        .path(dir.path().join("words.db"))
        .open()
        .expect("Failed to create test database");
    (db, dir)
}

pub fn words(keys: &[&str]) -> Vec<Word> {
    keys.iter().map(|k| Word::new(*k).unwrap()).collect()
}

pub fn keys(words: &[Word]) -> Vec<String> {
    words.iter().map(|w| w.as_str().to_string()).collect()
}

/// Collects every snapshot a subscriber receives.
#[derive(Clone, Default)]
pub struct Recorder {
    inner: Arc<(Mutex<Vec<Vec<String>>>, Condvar)>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback(&self) -> impl Fn(Vec<Word>) + Send + Sync + 'static {
        let inner = Arc::clone(&self.inner);
        move |words| {
            let (lock, cvar) = &*inner;
            lock.lock().unwrap().push(keys(&words));
            cvar.notify_all();
        }
    }

    pub fn snapshots(&self) -> Vec<Vec<String>> {
        self.inner.0.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<Vec<String>> {
        self.inner.0.lock().unwrap().last().cloned()
    }

    pub fn count(&self) -> usize {
        self.inner.0.lock().unwrap().len()
    }

    /// Block until the latest snapshot equals `expected`.
    pub fn wait_for_last(&self, expected: &[&str], timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().unwrap();
        let (guard, _) = cvar
            .wait_timeout_while(guard, timeout, |seen| {
                seen.last().is_none_or(|last| last != expected)
            })
            .unwrap();
        guard.last().is_some_and(|last| last == expected)
    }
}

/// Error sink remembering every report.
#[derive(Default)]
pub struct CollectingSink {
    reports: Mutex<Vec<(String, String)>>,
}

impl CollectingSink {
    pub fn ops(&self) -> Vec<String> {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .map(|(op, _)| op.clone())
            .collect()
    }

    pub fn codes(&self) -> Vec<String> {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .map(|(_, code)| code.clone())
            .collect()
    }
}

impl ErrorSink for CollectingSink {
    fn report(&self, op: &str, err: &StoreError) {
        self.reports
            .lock()
            .unwrap()
            .push((op.to_string(), err.code().to_string()));
    }
}
