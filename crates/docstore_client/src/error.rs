//! Error types for the document-store client.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Coarse classification of a [`StoreError`].
///
/// Every error collapses into one of these four kinds, which is what the
/// HTTP edge uses to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Resource, document or collection is absent.
    NotFound,
    /// Caller input is malformed.
    BadRequest,
    /// Cluster, shard, serialization or decode failure.
    Internal,
    /// The ambient cancellation signal or deadline fired.
    Cancelled,
}

/// Errors that can occur while talking to the search cluster.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Document, index or cursor not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller supplied malformed input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The cluster reported an error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Network or connection failure.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// A request body could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Some shards failed while answering a request.
    #[error("{failed} of {total} shards failed: {detail}")]
    ShardFailure {
        /// Number of failed shards.
        failed: u32,
        /// Number of shards queried.
        total: u32,
        /// Serialized response, kept for diagnosis.
        detail: String,
    },

    /// A bulk request reported per-item failures.
    #[error("bulk request has errors. Errors will be listed below:\n{0}")]
    Bulk(String),

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The operation deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl StoreError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a decode error from any displayable cause.
    pub fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode(err.to_string())
    }

    /// Creates a serialization error from any displayable cause.
    pub fn serialization(err: impl std::fmt::Display) -> Self {
        Self::Serialization(err.to_string())
    }

    /// Returns the coarse kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::BadRequest(_) => ErrorKind::BadRequest,
            StoreError::Cancelled | StoreError::DeadlineExceeded => ErrorKind::Cancelled,
            StoreError::Internal(_)
            | StoreError::Transport { .. }
            | StoreError::Serialization(_)
            | StoreError::Decode(_)
            | StoreError::ShardFailure { .. }
            | StoreError::Bulk(_) => ErrorKind::Internal,
        }
    }

    /// Maps this error to an HTTP status code.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::NotFound => 404,
            ErrorKind::BadRequest => 400,
            ErrorKind::Internal | ErrorKind::Cancelled => 500,
        }
    }

    /// Returns true for the not-found kind.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Returns true if the ambient context ended the operation.
    pub fn is_cancellation(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Transport { retryable, .. } => *retryable,
            StoreError::NotFound(_)
            | StoreError::BadRequest(_)
            | StoreError::Serialization(_)
            | StoreError::Cancelled
            | StoreError::DeadlineExceeded => false,
            _ => true,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Decode(err.to_string())
    }
}
