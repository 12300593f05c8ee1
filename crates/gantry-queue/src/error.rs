use gantry_store::Transient;

/// Errors from queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// An ack or nack referenced a delivery that is not in flight.
    #[error("unknown delivery handle: {0}")]
    UnknownDelivery(u64),

    /// The backend is unreachable or failing; retryable with backoff.
    #[error("queue unavailable: {0}")]
    Unavailable(String),
}

impl Transient for QueueError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Result alias for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;
