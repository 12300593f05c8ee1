use std::fmt;

use serde::{Deserialize, Serialize};

use gantry_store::Record;
use gantry_types::PieceId;

/// On-chain deal identifier assigned by the storage network.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DealId(pub u64);

impl fmt::Debug for DealId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DealId({})", self.0)
    }
}

impl fmt::Display for DealId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One active contract for a piece, as the oracle reports it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractEntry {
    /// Storage provider holding the deal.
    pub provider: String,
    pub deal_id: DealId,
    /// Chain epoch at which the deal expires.
    pub expiration_epoch: u64,
    /// Which upstream dataset reported this contract.
    pub source: String,
}

/// Locally recorded deal outcome, one record per `(piece, deal_id)`.
///
/// Derived from snapshot diffs. Never deleted: the oracle model is
/// append-only, so a deal that disappears upstream keeps its record here.
/// `created_at` is fixed at first sight; `updated_at` refreshes whenever a
/// re-sync touches the record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealRecord {
    pub piece: PieceId,
    pub deal_id: DealId,
    pub provider: String,
    pub expiration_epoch: u64,
    pub source: String,
    /// Milliseconds since UNIX epoch.
    pub created_at: u64,
    pub updated_at: u64,
}

impl DealRecord {
    /// The key a `(piece, deal_id)` pair stores under.
    pub fn key_for(piece: &PieceId, deal_id: DealId) -> String {
        format!("{}/{}", piece.to_hex(), deal_id)
    }
}

impl Record for DealRecord {
    fn storage_key(&self) -> String {
        Self::key_for(&self.piece, self.deal_id)
    }

    fn partition_key(&self) -> Option<String> {
        Some(self.piece.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_piece_and_deal() {
        let piece = PieceId::from_bytes(b"p");
        let record = DealRecord {
            piece,
            deal_id: DealId(42),
            provider: "f01234".into(),
            expiration_epoch: 100,
            source: "mainnet".into(),
            created_at: 1,
            updated_at: 1,
        };
        assert_eq!(record.storage_key(), format!("{}/42", piece.to_hex()));
        assert_eq!(record.partition_key().unwrap(), piece.to_hex());
    }

    #[test]
    fn serde_roundtrip() {
        let record = DealRecord {
            piece: PieceId::from_bytes(b"p"),
            deal_id: DealId(7),
            provider: "f0999".into(),
            expiration_epoch: 5000,
            source: "calibnet".into(),
            created_at: 10,
            updated_at: 20,
        };
        let json = serde_json::to_string(&record).unwrap();
        let parsed: DealRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, parsed);
    }
}
