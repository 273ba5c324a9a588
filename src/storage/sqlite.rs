//! `SQLite` storage implementation.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};
use tracing::debug;

use crate::error::Result;
use crate::model::Word;
use crate::storage::TableStore;
use crate::storage::schema::{OpenKind, apply_schema};

/// Default time a connection waits on a locked database before failing.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-based storage backend for `word_table`.
///
/// File databases keep a writer connection and a read-only connection so a
/// long `select_all` never waits behind the writer. In-memory databases are
/// private to one connection, so both roles share it.
#[derive(Debug)]
pub struct SqliteStorage {
    writer: Mutex<Connection>,
    reader: Option<Mutex<Connection>>,
    open_kind: OpenKind,
    path: Option<PathBuf>,
}

impl SqliteStorage {
    /// Open (or create) the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema application fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open the database at `path` with an explicit busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if either connection cannot be established or schema application fails.
    pub fn open_with_timeout(path: &Path, busy_timeout: Duration) -> Result<Self> {
        let writer = Connection::open(path)?;
        writer.busy_timeout(busy_timeout)?;
        let open_kind = apply_schema(&writer)?;

        let reader = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        reader.busy_timeout(busy_timeout)?;

        debug!(path = %path.display(), ?open_kind, "Opened word database");
        Ok(Self {
            writer: Mutex::new(writer),
            reader: Some(Mutex::new(reader)),
            open_kind,
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let open_kind = apply_schema(&conn)?;
        Ok(Self {
            writer: Mutex::new(conn),
            reader: None,
            open_kind,
            path: None,
        })
    }

    /// Whether the schema was freshly created by this open.
    #[must_use]
    pub const fn open_kind(&self) -> OpenKind {
        self.open_kind
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` inside an IMMEDIATE transaction on the writer connection.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. The transaction is rolled back on error.
    pub fn mutate<F, R>(&self, op: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction) -> Result<R>,
    {
        let mut conn = self.writer();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = f(&tx)?;
        tx.commit()?;
        debug!(op, "Committed mutation");
        Ok(result)
    }

    /// Insert every word in one transaction, ignoring keys already present.
    ///
    /// Returns the number of rows actually added.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails; nothing is written in that case.
    pub fn insert_all(&self, words: &[Word]) -> Result<usize> {
        self.mutate("insert_all", |tx| {
            let mut stmt = tx.prepare_cached(INSERT_SQL)?;
            let mut added = 0;
            for word in words {
                added += stmt.execute([word.as_str()])?;
            }
            Ok(added)
        })
    }

    /// Clear the table and insert `words`, atomically.
    ///
    /// Returns the number of rows in the table afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails; the old contents are kept in that case.
    pub fn replace_all(&self, words: &[Word]) -> Result<usize> {
        self.mutate("replace_all", |tx| {
            tx.execute("DELETE FROM word_table", [])?;
            let mut stmt = tx.prepare_cached(INSERT_SQL)?;
            let mut added = 0;
            for word in words {
                added += stmt.execute([word.as_str()])?;
            }
            Ok(added)
        })
    }

    fn writer(&self) -> MutexGuard<'_, Connection> {
        // A panicking holder leaves at most an uncommitted transaction,
        // which rusqlite rolls back on drop.
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reader(&self) -> MutexGuard<'_, Connection> {
        self.reader
            .as_ref()
            .unwrap_or(&self.writer)
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

const INSERT_SQL: &str = "INSERT OR IGNORE INTO word_table (word) VALUES (?)";

impl TableStore for SqliteStorage {
    fn insert(&self, word: &Word) -> Result<()> {
        let added = self.mutate("insert", |tx| {
            Ok(tx.prepare_cached(INSERT_SQL)?.execute([word.as_str()])?)
        })?;
        if added == 0 {
            debug!(word = %word, "Duplicate word ignored");
        }
        Ok(())
    }

    fn delete_all(&self) -> Result<()> {
        let removed = self.mutate("delete_all", |tx| {
            Ok(tx.execute("DELETE FROM word_table", [])?)
        })?;
        debug!(removed, "Deleted all words");
        Ok(())
    }

    fn select_all(&self) -> Result<Vec<Word>> {
        let conn = self.reader();
        let mut stmt = conn.prepare_cached("SELECT word FROM word_table ORDER BY word ASC")?;
        let words = stmt
            .query_map([], |row| row.get::<_, String>(0).map(Word::from_row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(words)
    }

    fn count(&self) -> Result<usize> {
        let conn = self.reader();
        let count: i64 =
            conn.query_row("SELECT count(*) FROM word_table", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}
