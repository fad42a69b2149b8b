//! Centralized error types for mboxsync.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mboxsync library.
#[derive(Error, Debug)]
pub enum SyncError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The mailbox archive does not exist.
    #[error("MBOX file not found: {0}")]
    FileNotFound(PathBuf),

    /// The store could not be opened (missing, unreadable or not a database).
    #[error("Cannot open store '{path}': {source}")]
    StoreConnection {
        path: PathBuf,
        source: rusqlite::Error,
    },

    /// A query or transaction against an open store failed.
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// A `Date:` header could not be parsed.
    #[error("Unparseable date header: '{0}'")]
    DateParse(String),

    /// The sender address has no `@domain` part.
    #[error("Sender '{0}' has no domain")]
    MissingDomain(String),

    /// The message body could not be decoded.
    #[error("MIME decoding error: {0}")]
    Decode(String),

    /// A path component derived from message data is unusable.
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

/// Convenience alias for `Result<T, SyncError>`.
pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Map an `io::Error` on opening a file, turning `NotFound` into [`SyncError::FileNotFound`].
    pub fn open(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::FileNotFound(path)
        } else {
            Self::Io { path, source }
        }
    }
}
