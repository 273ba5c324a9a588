//! The persisted entity.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// A single row of `word_table`. The word is its own primary key.
///
/// Values are immutable once built; the only way to obtain one is through
/// [`Word::new`], which rejects keys that the table would refuse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Word {
    word: String,
}

impl Word {
    /// Build a word, rejecting empty or whitespace-only keys.
    ///
    /// The key is stored verbatim; surrounding whitespace is not trimmed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] if the key is empty or contains NUL.
    pub fn new(word: impl Into<String>) -> Result<Self> {
        let word = word.into();
        validate_key(&word)?;
        Ok(Self { word })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.word
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.word
    }

    /// Rebuild a word read back from the table, which already enforces the key invariant.
    pub(crate) const fn from_row(word: String) -> Self {
        Self { word }
    }
}

/// Check that `key` is acceptable as a primary key.
///
/// # Errors
///
/// Returns [`StoreError::Validation`] for empty or whitespace-only keys, and
/// for keys containing NUL (SQLite text functions stop at the first one).
pub fn validate_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(StoreError::validation("word must not be empty"));
    }
    if key.contains('\0') {
        return Err(StoreError::validation("word must not contain NUL"));
    }
    Ok(())
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.word)
    }
}

impl AsRef<str> for Word {
    fn as_ref(&self) -> &str {
        &self.word
    }
}

impl TryFrom<String> for Word {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Word {
    type Error = StoreError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Word> for String {
    fn from(word: Word) -> Self {
        word.word
    }
}
