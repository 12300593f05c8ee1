use serde::{Deserialize, Serialize};

use gantry_store::Record;
use gantry_types::{ContainerId, ContentId, GroupKey, PieceId};

/// A closed container with its resolved, content-derived membership.
///
/// Immutable once built: the id is computed from the packed layout, so any
/// change in membership is a different aggregate. The `container` field
/// links to the state-machine record tracking the offer/settlement
/// lifecycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregate {
    /// Commitment over the packed layout; also the record key.
    pub id: PieceId,
    pub group: GroupKey,
    /// Folded pieces in layout order.
    pub pieces: Vec<PieceId>,
    /// The buffer this aggregate was built from, when built by the reducer.
    pub buffer: Option<ContentId>,
    /// Packed size, including padding and alignment gaps.
    pub size: u64,
    /// Capacity class the aggregate was packed against.
    pub capacity: u64,
    /// The container record carrying this aggregate's deal lifecycle.
    pub container: ContainerId,
    /// Milliseconds since UNIX epoch.
    pub built_at: u64,
}

impl Aggregate {
    /// Number of pieces folded in.
    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }
}

impl Record for Aggregate {
    fn storage_key(&self) -> String {
        self.id.to_hex()
    }

    fn partition_key(&self) -> Option<String> {
        Some(self.group.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_types::epoch_ms;

    #[test]
    fn record_keys() {
        let id = PieceId::from_bytes(b"aggregate");
        let aggregate = Aggregate {
            id,
            group: GroupKey::new("tenant-a").unwrap(),
            pieces: vec![PieceId::from_bytes(b"p1"), PieceId::from_bytes(b"p2")],
            buffer: None,
            size: 1024,
            capacity: 2048,
            container: ContainerId::allocate(),
            built_at: epoch_ms(),
        };
        assert_eq!(aggregate.storage_key(), id.to_hex());
        assert_eq!(aggregate.partition_key().unwrap(), "tenant-a");
        assert_eq!(aggregate.piece_count(), 2);
    }
}
