use gantry_accumulator::AccumulatorError;
use gantry_store::StoreError;
use gantry_types::PieceId;

/// Errors from packing and aggregate persistence.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    /// Builder capacity must be a power of two at least one leaf wide.
    #[error("invalid builder capacity: {capacity}")]
    InvalidCapacity { capacity: u64 },

    /// A plan with no folded pieces cannot become an aggregate.
    #[error("packing plan folded no pieces")]
    EmptyPlan,

    /// A folded piece has no record to mark included; an upstream stage
    /// failed to register it. Fatal for this commit, not retried blindly.
    #[error("piece record missing: {id}")]
    PieceMissing { id: PieceId },

    /// Repeatedly lost the piece-status race; transient.
    #[error("piece {id} contended while marking included")]
    PieceContended { id: PieceId },

    /// Container state machine failure outside the benign set.
    #[error(transparent)]
    Accumulator(#[from] AccumulatorError),

    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result alias for packing operations.
pub type PackResult<T> = Result<T, PackError>;
