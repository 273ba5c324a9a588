//! Error types for `wordstore`.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors produced by the store, the write queue and live queries.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The caller supplied an entity that can never be stored.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The storage engine rejected or failed an operation.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// A queued operation panicked; the writer caught it and kept running.
    #[error("write operation '{0}' panicked")]
    OperationPanicked(String),

    /// Re-evaluating a live query failed.
    #[error("subscription error: {0}")]
    Subscription(String),

    /// The write queue or a delivery context has been shut down.
    #[error("store is closed")]
    Closed,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    #[must_use]
    pub fn subscription(message: impl Into<String>) -> Self {
        Self::Subscription(message.into())
    }

    /// Stable classification for hosts that map failures to user-facing text.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::Validation,
            Self::Storage(_) | Self::OperationPanicked(_) => ErrorCode::Storage,
            Self::Subscription(_) => ErrorCode::Subscription,
            Self::Closed => ErrorCode::Closed,
            Self::Config(_) | Self::Yaml(_) | Self::Json(_) => ErrorCode::Config,
            Self::Io(_) => ErrorCode::Io,
        }
    }

    /// Whether the failure happened before anything was queued.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Machine-readable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Validation,
    Storage,
    Subscription,
    Closed,
    Config,
    Io,
}

impl ErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION",
            Self::Storage => "STORAGE",
            Self::Subscription => "SUBSCRIPTION",
            Self::Closed => "CLOSED",
            Self::Config => "CONFIG",
            Self::Io => "IO",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
