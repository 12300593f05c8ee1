use gantry_store::StoreError;
use gantry_types::{ContainerId, ContainerStatus};

/// Errors from accumulator operations.
///
/// The first three variants are the per-call interpretations of a failed
/// conditional write; callers pattern-match on them rather than receiving a
/// generic conflict. `StateConflict` in particular is benign for idempotent
/// transitions (the desired end state already holds) and callers are
/// expected to treat it that way.
#[derive(Debug, thiserror::Error)]
pub enum AccumulatorError {
    /// The batch would push the container past its capacity ceiling.
    /// Retry against a different container, never the same one.
    #[error("append of {batch_size} would overflow container {id} ({size}/{max_size})")]
    CapacityExceeded {
        id: ContainerId,
        size: u64,
        max_size: u64,
        batch_size: u64,
    },

    /// A peer already advanced the container past the expected status.
    #[error("container {id} already advanced to {actual}")]
    StateConflict {
        id: ContainerId,
        actual: ContainerStatus,
    },

    /// Close attempted before the container reached its minimum size.
    /// The container stays open; scheduling logic decides when to retry.
    #[error("container {id} at size {size} is below the minimum {min_size}")]
    InsufficientSize {
        id: ContainerId,
        size: u64,
        min_size: u64,
    },

    /// The requested edge is not part of the forward-only lifecycle.
    #[error("illegal container transition {from} -> {to}")]
    InvalidTransition {
        from: ContainerStatus,
        to: ContainerStatus,
    },

    /// The container record does not exist.
    #[error("container not found: {id}")]
    NotFound { id: ContainerId },

    /// Limits where the floor exceeds the ceiling.
    #[error("invalid capacity limits: min {min_size} exceeds max {max_size}")]
    InvalidLimits { min_size: u64, max_size: u64 },

    /// Lost the conditional-write race repeatedly while the operation kept
    /// being valid. Transient; the call can be retried as a whole.
    #[error("container {id} contended: gave up after {attempts} attempts")]
    Contended { id: ContainerId, attempts: u32 },

    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result alias for accumulator operations.
pub type AccumulatorResult<T> = Result<T, AccumulatorError>;
