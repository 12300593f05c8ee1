use crate::retry::Transient;

/// Errors from record and object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A preconditioned write found a state that no longer matches.
    ///
    /// This is the optimistic-concurrency signal: some other writer got
    /// there first. Callers re-read and re-classify; they never blanket
    /// retry the same write.
    #[error("precondition failed for {key}")]
    PreconditionFailed { key: String },

    /// A record that the operation requires is absent.
    #[error("record not found: {key}")]
    NotFound { key: String },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The backend is unreachable or failing; retryable with backoff.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
