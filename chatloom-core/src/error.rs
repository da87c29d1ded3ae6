//! Error types for chatloom-core

use thiserror::Error;

/// Main error type for the chatloom-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Thread not found
    #[error("thread not found: {0}")]
    ThreadNotFound(String),

    /// Thread item not found
    #[error("thread item not found: {item_id} in thread {thread_id}")]
    ItemNotFound {
        thread_id: String,
        item_id: String,
    },

    /// Attachment not found
    #[error("attachment not found: {0}")]
    AttachmentNotFound(String),

    /// Malformed caller input (missing item id, unusable payload source)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Blocking task failed to complete
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl Error {
    /// True for the NotFound family, so a transport layer can map these to a
    /// "missing resource" response without matching every variant.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::ThreadNotFound(_) | Error::ItemNotFound { .. } | Error::AttachmentNotFound(_)
        )
    }
}

/// Result type alias for chatloom-core
pub type Result<T> = std::result::Result<T, Error>;
