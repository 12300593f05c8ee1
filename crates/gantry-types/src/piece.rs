use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::group::GroupKey;

/// Content-commitment identifier for a piece or an aggregate.
///
/// A `PieceId` is the 32-byte commitment digest over a piece's padded
/// content. Identical content always produces the same `PieceId`, so pieces
/// are deduplicatable and a rebuilt aggregate recomputes the same identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PieceId([u8; 32]);

impl PieceId {
    /// Compute a `PieceId` by hashing raw content bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Create a `PieceId` from a pre-computed commitment digest.
    pub fn from_digest(digest: [u8; 32]) -> Self {
        Self(digest)
    }

    /// Translate a legacy (height-parameterized) piece identifier into the
    /// current scheme.
    ///
    /// The legacy format carried the tree height alongside the digest; the
    /// conversion is a pure function of both, so the same legacy identifier
    /// always maps to the same current identifier.
    pub fn from_legacy(digest: [u8; 32], height: u8) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"gantry-legacy-piece-v1:");
        hasher.update(&[height]);
        hasher.update(&digest);
        Self(*hasher.finalize().as_bytes())
    }

    /// The null piece ID (all zeros). Represents "no piece".
    pub const fn null() -> Self {
        Self([0u8; 32])
    }

    /// Returns `true` if this is the null piece ID.
    pub fn is_null(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// The raw 32-byte digest.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(TypeError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for PieceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PieceId({})", self.short_hex())
    }
}

impl fmt::Display for PieceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 32]> for PieceId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl From<PieceId> for [u8; 32] {
    fn from(id: PieceId) -> Self {
        id.0
    }
}

/// Lifecycle of a piece inside the aggregation pipeline.
///
/// A piece is `Pending` from ingestion until the packing builder folds it
/// into an aggregate, at which point it becomes `Included`. The transition
/// is one-way.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PieceStatus {
    /// Waiting to be folded into an aggregate.
    Pending,
    /// Folded into exactly one aggregate.
    Included,
}

impl fmt::Display for PieceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Included => write!(f, "included"),
        }
    }
}

/// A piece reference: identity plus raw size.
///
/// Buffers carry these instead of full records so merging and packing never
/// need to resolve piece bodies; the id and size are all the builder uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PieceRef {
    pub id: PieceId,
    pub size: u64,
}

impl PieceRef {
    /// Create a piece reference.
    pub fn new(id: PieceId, size: u64) -> Self {
        Self { id, size }
    }
}

impl From<&Piece> for PieceRef {
    fn from(piece: &Piece) -> Self {
        Self {
            id: piece.id,
            size: piece.size,
        }
    }
}

/// A content unit ingested into the pipeline.
///
/// Pieces are immutable once created except for the one-way
/// `Pending -> Included` status transition applied when an aggregate
/// absorbs them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Piece {
    /// Content commitment of this piece.
    pub id: PieceId,
    /// Raw (unpadded) size in bytes.
    pub size: u64,
    /// Partition/tenancy key; pieces only aggregate within one group.
    pub group: GroupKey,
    /// Pipeline lifecycle status.
    pub status: PieceStatus,
    /// Milliseconds since UNIX epoch at ingestion; drives candidate order.
    pub inserted_at: u64,
}

impl Piece {
    /// Create a pending piece as ingestion records it.
    pub fn pending(id: PieceId, size: u64, group: GroupKey, inserted_at: u64) -> Self {
        Self {
            id,
            size,
            group,
            status: PieceStatus::Pending,
            inserted_at,
        }
    }

    /// Returns `true` if the piece has not yet been aggregated.
    pub fn is_pending(&self) -> bool {
        self.status == PieceStatus::Pending
    }
}
