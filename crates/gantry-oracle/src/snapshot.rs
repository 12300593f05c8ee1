use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use gantry_store::Record;
use gantry_types::PieceId;

use crate::contract::{ContractEntry, DealId};

/// A piece key as the upstream reports it.
///
/// The oracle still emits identifiers in the retired height-parameterized
/// scheme for old content; those are translated through the deterministic
/// conversion before use, so every local key is a current [`PieceId`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotKey {
    /// Already in the current commitment scheme.
    Current(PieceId),
    /// Legacy identifier: digest plus padded tree height.
    Legacy { digest: [u8; 32], height: u8 },
}

impl SnapshotKey {
    /// Resolve to a current piece id.
    pub fn normalize(&self) -> PieceId {
        match self {
            Self::Current(id) => *id,
            Self::Legacy { digest, height } => PieceId::from_legacy(*digest, *height),
        }
    }
}

/// One contract row as fetched from the oracle, before normalization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawContract {
    pub key: SnapshotKey,
    pub provider: String,
    pub deal_id: DealId,
    pub expiration_epoch: u64,
    pub source: String,
}

/// The oracle's answer, verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSnapshot {
    pub source_id: String,
    /// Upstream's timestamp for this snapshot (milliseconds since epoch).
    pub as_of: u64,
    pub entries: Vec<RawContract>,
}

/// A normalized oracle snapshot: contracts grouped per current piece id.
///
/// Monotonic by convention: once a `(piece, deal_id)` pair has been
/// recorded, no later snapshot removes it from local state. The diff only
/// ever adds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleSnapshot {
    pub source_id: String,
    pub as_of: u64,
    pub contracts: BTreeMap<PieceId, Vec<ContractEntry>>,
}

impl OracleSnapshot {
    /// An empty snapshot for a source.
    pub fn empty(source_id: impl Into<String>, as_of: u64) -> Self {
        Self {
            source_id: source_id.into(),
            as_of,
            contracts: BTreeMap::new(),
        }
    }

    /// Normalize a raw snapshot: translate legacy keys, group entries per
    /// piece, and collapse duplicate deal ids (first occurrence wins).
    pub fn from_raw(raw: RawSnapshot) -> Self {
        let mut contracts: BTreeMap<PieceId, Vec<ContractEntry>> = BTreeMap::new();
        let mut seen: HashSet<(PieceId, DealId)> = HashSet::new();

        for entry in raw.entries {
            let piece = entry.key.normalize();
            if !seen.insert((piece, entry.deal_id)) {
                continue;
            }
            contracts.entry(piece).or_default().push(ContractEntry {
                provider: entry.provider,
                deal_id: entry.deal_id,
                expiration_epoch: entry.expiration_epoch,
                source: entry.source,
            });
        }

        Self {
            source_id: raw.source_id,
            as_of: raw.as_of,
            contracts,
        }
    }

    /// Total contract entries across all pieces.
    pub fn contract_count(&self) -> usize {
        self.contracts.values().map(Vec::len).sum()
    }

    /// Returns `true` if a `(piece, deal_id)` pair is present.
    pub fn contains(&self, piece: &PieceId, deal_id: DealId) -> bool {
        self.contracts
            .get(piece)
            .is_some_and(|entries| entries.iter().any(|e| e.deal_id == deal_id))
    }
}

impl Record for OracleSnapshot {
    fn storage_key(&self) -> String {
        self.source_id.clone()
    }
}
