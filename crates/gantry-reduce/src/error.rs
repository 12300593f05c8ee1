use gantry_pack::PackError;
use gantry_queue::QueueError;
use gantry_store::StoreError;
use gantry_types::{ContentId, GroupKey};

/// Errors from buffer reduction.
#[derive(Debug, thiserror::Error)]
pub enum ReduceError {
    /// A message's group had no merge partner in the received batch. The
    /// item is failed individually so the queue redelivers just it.
    #[error("no merge partner for group {group} in this batch")]
    UnpairedGroup { group: GroupKey },

    /// A referenced buffer is absent from the object store. The whole
    /// group's merge is abandoned; nothing partial is written.
    #[error("buffer missing from object store: {id}")]
    BufferMissing { id: ContentId },

    /// A stored buffer did not decode, or belongs to a different group
    /// than the message that referenced it.
    #[error("corrupt buffer {id}: {reason}")]
    CorruptBuffer { id: ContentId, reason: String },

    /// Underlying object/record store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Queue failure while re-enqueueing a derived buffer.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// Packing or aggregate persistence failure.
    #[error(transparent)]
    Pack(#[from] PackError),
}

/// Result alias for reducer operations.
pub type ReduceResult<T> = Result<T, ReduceError>;
