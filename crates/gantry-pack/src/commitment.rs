use gantry_types::PieceId;

use crate::error::PackResult;

/// The finished output of a commitment builder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Commitment {
    /// Content-derived identifier of the packed aggregate.
    pub id: PieceId,
    /// Total packed bytes, including padding and alignment gaps.
    pub size: u64,
}

/// Why a fold attempt was refused.
///
/// Rejection is about the padded layout, not raw bytes: a piece can be
/// refused even though `capacity - size` raw bytes remain, because its
/// padded slot would not fit at its alignment. Rejected pieces stay pending
/// for a future pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("piece {id} rejected: padded slot of {padded_size} at offset {offset} exceeds capacity {capacity}")]
pub struct FoldRejection {
    pub id: PieceId,
    /// The piece's padded footprint.
    pub padded_size: u64,
    /// The aligned offset the piece would have occupied.
    pub offset: u64,
    pub capacity: u64,
}

/// An incremental commitment over pieces folded into a bounded layout.
///
/// Implementations must be pure and deterministic: the same fold sequence
/// against the same capacity always yields the same [`Commitment`], so a
/// crashed run that re-folds the same candidates recomputes the identical
/// aggregate identifier.
pub trait CommitmentBuilder: Send {
    /// Attempt to fold one piece into the layout.
    ///
    /// On rejection the builder state is unchanged; the caller may keep
    /// folding other pieces.
    fn fold(&mut self, id: &PieceId, size: u64) -> Result<(), FoldRejection>;

    /// Bytes folded so far, including padding.
    fn packed_size(&self) -> u64;

    /// Number of pieces folded so far.
    fn piece_count(&self) -> usize;

    /// Finish the layout and produce the aggregate commitment.
    fn finalize(self: Box<Self>) -> Commitment;
}

/// Factory for commitment builders: the seam behind which the actual
/// commitment primitive lives.
pub trait CommitmentScheme: Send + Sync {
    /// Start a builder bounded to `capacity` bytes.
    fn builder(&self, capacity: u64) -> PackResult<Box<dyn CommitmentBuilder>>;
}
