use tracing::debug;

use gantry_types::PieceRef;

use crate::commitment::{Commitment, CommitmentScheme};
use crate::error::PackResult;

/// The outcome of one packing pass over a candidate set.
#[derive(Clone, Debug)]
pub struct PackPlan {
    /// Pieces folded into the aggregate, in layout order.
    pub folded: Vec<PieceRef>,
    /// Pieces refused by the builder; they remain pending.
    pub rejected: Vec<PieceRef>,
    /// The aggregate commitment over the folded layout.
    pub commitment: Commitment,
    /// Capacity the builder was bounded to.
    pub capacity: u64,
}

impl PackPlan {
    /// Raw (unpadded) bytes across folded pieces.
    pub fn folded_raw_size(&self) -> u64 {
        self.folded.iter().map(|p| p.size).sum()
    }
}

/// Fold a candidate set into one aggregate plan.
///
/// Candidates are sorted ascending by `(size, id)` first (a simple
/// deterministic heuristic, not optimal bin packing), then offered to the
/// builder one by one. A rejected piece is skipped silently and carried in
/// `rejected`; it stays pending for a future pass. Given the same candidate
/// set and capacity, the plan (and therefore the commitment) is identical
/// on every run.
pub fn plan(
    candidates: &[PieceRef],
    scheme: &dyn CommitmentScheme,
    capacity: u64,
) -> PackResult<PackPlan> {
    let mut ordered: Vec<PieceRef> = candidates.to_vec();
    ordered.sort_by(|a, b| (a.size, a.id).cmp(&(b.size, b.id)));

    let mut builder = scheme.builder(capacity)?;
    let mut folded = Vec::new();
    let mut rejected = Vec::new();

    for candidate in ordered {
        match builder.fold(&candidate.id, candidate.size) {
            Ok(()) => folded.push(candidate),
            Err(rejection) => {
                debug!(piece = %candidate.id.short_hex(), %rejection, "piece skipped");
                rejected.push(candidate);
            }
        }
    }

    let commitment = builder.finalize();
    Ok(PackPlan {
        folded,
        rejected,
        commitment,
        capacity,
    })
}
