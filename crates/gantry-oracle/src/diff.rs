//! Snapshot-level diff: what the updated snapshot adds over the previous.
//!
//! The model is append-only. Per piece, only contract entries whose deal id
//! is not already recorded survive into the diff; pieces present only in
//! the previous snapshot are ignored, so deletions never propagate.

use std::collections::{BTreeMap, HashSet};

use gantry_types::PieceId;

use crate::contract::{ContractEntry, DealId};
use crate::snapshot::OracleSnapshot;

/// The additive difference between two snapshots.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    /// New contract entries, grouped per piece.
    pub added: BTreeMap<PieceId, Vec<ContractEntry>>,
}

impl SnapshotDiff {
    /// Create an empty diff.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if nothing is new.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
    }

    /// Total new contract entries.
    pub fn len(&self) -> usize {
        self.added.values().map(Vec::len).sum()
    }

    /// Number of pieces with at least one new entry.
    pub fn piece_count(&self) -> usize {
        self.added.len()
    }

    /// Flatten into `(piece, entry)` work items in deterministic order.
    pub fn into_entries(self) -> Vec<(PieceId, ContractEntry)> {
        self.added
            .into_iter()
            .flat_map(|(piece, entries)| entries.into_iter().map(move |e| (piece, e)))
            .collect()
    }
}

/// Compute what `updated` adds over `previous`.
///
/// `previous = None` means nothing has been recorded for this source yet,
/// so the entire updated snapshot is the diff.
pub fn diff_snapshots(
    previous: Option<&OracleSnapshot>,
    updated: &OracleSnapshot,
) -> SnapshotDiff {
    let mut added: BTreeMap<PieceId, Vec<ContractEntry>> = BTreeMap::new();

    for (piece, entries) in &updated.contracts {
        let known: HashSet<DealId> = previous
            .and_then(|p| p.contracts.get(piece))
            .map(|existing| existing.iter().map(|e| e.deal_id).collect())
            .unwrap_or_default();

        let fresh: Vec<ContractEntry> = entries
            .iter()
            .filter(|e| !known.contains(&e.deal_id))
            .cloned()
            .collect();

        if !fresh.is_empty() {
            added.insert(*piece, fresh);
        }
    }

    SnapshotDiff { added }
}
