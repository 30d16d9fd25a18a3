use std::time::Duration;

/// Boxed error carried verbatim from a storage backend
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by drivers and sessions
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The operation needs full API access, which this session does not hold
    #[error("Not implemented")]
    NotImplemented,

    /// The backend rejected the call. The original error is kept untouched.
    #[error("{0}")]
    Backend(#[source] BoxError),

    /// `next_page` was called on the last page of a listing
    #[error("no next page")]
    NoNextPage,

    /// A delegated POST upload came back with an error payload
    #[error("{0}")]
    UploadRejected(String),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl StorageError {
    pub fn backend(err: impl Into<BoxError>) -> Self {
        StorageError::Backend(err.into())
    }

    /// True when the failure came from the deadline rather than the backend
    pub fn is_timeout(&self) -> bool {
        match self {
            StorageError::Timeout(_) => true,
            StorageError::Transport(e) => e.is_timeout(),
            _ => false,
        }
    }
}
