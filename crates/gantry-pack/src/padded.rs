use gantry_types::PieceId;

use crate::commitment::{Commitment, CommitmentBuilder, CommitmentScheme, FoldRejection};
use crate::error::{PackError, PackResult};

/// Smallest slot a piece can occupy, in bytes.
pub const MIN_LEAF_SIZE: u64 = 128;

/// Domain prefix for aggregate commitments.
const COMMITMENT_DOMAIN: &[u8] = b"gantry-aggregate-v1:";

/// Reference commitment builder over a padded binary layout.
///
/// Capacity is a power of two. Each piece occupies a slot padded up to the
/// next power of two (at least [`MIN_LEAF_SIZE`]) and placed at the next
/// offset aligned to that slot size. The commitment is the BLAKE3 hash of
/// the capacity and the ordered `(offset, padded, id)` leaves, so it is a
/// pure function of the folded set and layout.
pub struct PaddedTreeBuilder {
    capacity: u64,
    offset: u64,
    leaves: Vec<Leaf>,
}

struct Leaf {
    id: PieceId,
    offset: u64,
    padded: u64,
}

/// Padded footprint of a piece: next power of two, floored at the minimum
/// leaf size.
pub fn padded_size(size: u64) -> u64 {
    size.next_power_of_two().max(MIN_LEAF_SIZE)
}

impl PaddedTreeBuilder {
    /// Start a builder over a power-of-two capacity.
    pub fn new(capacity: u64) -> PackResult<Self> {
        if capacity < MIN_LEAF_SIZE || !capacity.is_power_of_two() {
            return Err(PackError::InvalidCapacity { capacity });
        }
        Ok(Self {
            capacity,
            offset: 0,
            leaves: Vec::new(),
        })
    }
}

impl CommitmentBuilder for PaddedTreeBuilder {
    fn fold(&mut self, id: &PieceId, size: u64) -> Result<(), FoldRejection> {
        let padded = padded_size(size);
        if padded > self.capacity {
            return Err(FoldRejection {
                id: *id,
                padded_size: padded,
                offset: self.offset,
                capacity: self.capacity,
            });
        }
        // Align up to the slot size; power-of-two arithmetic keeps this exact.
        let aligned = self.offset.div_ceil(padded) * padded;
        if aligned + padded > self.capacity {
            return Err(FoldRejection {
                id: *id,
                padded_size: padded,
                offset: aligned,
                capacity: self.capacity,
            });
        }
        self.leaves.push(Leaf {
            id: *id,
            offset: aligned,
            padded,
        });
        self.offset = aligned + padded;
        Ok(())
    }

    fn packed_size(&self) -> u64 {
        self.offset
    }

    fn piece_count(&self) -> usize {
        self.leaves.len()
    }

    fn finalize(self: Box<Self>) -> Commitment {
        let mut hasher = blake3::Hasher::new();
        hasher.update(COMMITMENT_DOMAIN);
        hasher.update(&self.capacity.to_le_bytes());
        for leaf in &self.leaves {
            hasher.update(&leaf.offset.to_le_bytes());
            hasher.update(&leaf.padded.to_le_bytes());
            hasher.update(leaf.id.as_bytes());
        }
        Commitment {
            id: PieceId::from_digest(*hasher.finalize().as_bytes()),
            size: self.offset,
        }
    }
}

/// The scheme handing out [`PaddedTreeBuilder`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct PaddedTreeScheme;

impl CommitmentScheme for PaddedTreeScheme {
    fn builder(&self, capacity: u64) -> PackResult<Box<dyn CommitmentBuilder>> {
        Ok(Box::new(PaddedTreeBuilder::new(capacity)?))
    }
}
