//! `SQLite` storage layer for `wordstore`.
//!
//! This module provides the persistence layer using `SQLite` with:
//! - WAL mode so reads run alongside the writer
//! - IMMEDIATE transactions for every mutation
//! - Ignore-on-conflict inserts keyed by the word itself
//!
//! # Submodules
//!
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - Main `SQLite` storage implementation

pub mod schema;
pub mod sqlite;

pub use schema::OpenKind;
pub use sqlite::SqliteStorage;

use crate::error::Result;
use crate::model::Word;

/// Table-level primitives over `word_table`.
///
/// Implementations must give writes a total order and must never let a
/// reader observe a partially applied write. Failures are reported, never
/// retried.
pub trait TableStore: Send + Sync + 'static {
    /// Insert `word`; a key that is already present is a successful no-op.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Storage`] if the engine fails.
    fn insert(&self, word: &Word) -> Result<()>;

    /// Remove every row.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Storage`] if the engine fails.
    fn delete_all(&self) -> Result<()>;

    /// Every row, ordered by key ascending.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Storage`] if the engine fails.
    fn select_all(&self) -> Result<Vec<Word>>;

    /// Number of rows.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Storage`] if the engine fails.
    fn count(&self) -> Result<usize> {
        Ok(self.select_all()?.len())
    }
}
