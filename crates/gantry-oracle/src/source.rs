use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{OracleError, OracleResult};
use crate::snapshot::RawSnapshot;

/// The seam to the authoritative deal-state source.
///
/// Implementations wrap whatever transport the deployment uses; any
/// transport or decode failure, including a non-success HTTP status, maps
/// to [`OracleError::UpstreamFetchFailed`] so one tick aborts cleanly.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch the latest authoritative snapshot.
    async fn fetch_latest(&self) -> OracleResult<RawSnapshot>;
}

/// A snapshot source served from memory.
///
/// Used by tests and embedded wirings: set the snapshot the next fetch
/// should return, or clear it to simulate an unreachable upstream.
pub struct StaticSnapshotSource {
    current: RwLock<Option<RawSnapshot>>,
}

impl StaticSnapshotSource {
    /// Create a source with nothing to serve (fetches fail).
    pub fn unreachable() -> Self {
        Self {
            current: RwLock::new(None),
        }
    }

    /// Create a source serving `snapshot`.
    pub fn serving(snapshot: RawSnapshot) -> Self {
        Self {
            current: RwLock::new(Some(snapshot)),
        }
    }

    /// Replace what the source serves.
    pub fn set(&self, snapshot: RawSnapshot) {
        *self.current.write().expect("lock poisoned") = Some(snapshot);
    }

    /// Make subsequent fetches fail.
    pub fn clear(&self) {
        *self.current.write().expect("lock poisoned") = None;
    }
}

#[async_trait]
impl SnapshotSource for StaticSnapshotSource {
    async fn fetch_latest(&self) -> OracleResult<RawSnapshot> {
        self.current
            .read()
            .expect("lock poisoned")
            .clone()
            .ok_or_else(|| OracleError::UpstreamFetchFailed {
                reason: "no snapshot available".into(),
            })
    }
}
