use std::collections::VecDeque;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use gantry_store::{Precondition, RecordStore, StoreError};
use gantry_types::{epoch_ms, PieceId};

use crate::contract::{ContractEntry, DealRecord};
use crate::diff::{diff_snapshots, SnapshotDiff};
use crate::error::{OracleError, OracleResult};
use crate::snapshot::OracleSnapshot;
use crate::source::SnapshotSource;

/// Attempts per deal-record upsert before reporting contention.
const MAX_CAS_ATTEMPTS: u32 = 16;

/// Knobs for the reconciler.
#[derive(Clone, Copy, Debug)]
pub struct ReconcilerConfig {
    /// Concurrent deal-record writes during diff application. Bounds load
    /// on the store without serializing the whole tick.
    pub write_fan_out: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self { write_fan_out: 3 }
    }
}

/// What one tick accomplished.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TickReport {
    pub source_id: String,
    /// New `(piece, deal)` pairs recorded this tick.
    pub new_deals: usize,
    /// Pieces those pairs belong to.
    pub pieces_touched: usize,
    /// `false` when the diff was empty and nothing was written.
    pub applied: bool,
}

/// Periodic pull-diff-merge against the authoritative deal source.
///
/// A tick is all-or-nothing from the snapshot's point of view: the updated
/// snapshot only replaces the recorded one after every diff write landed.
/// A partial failure leaves the old snapshot in place, and the next tick
/// recomputes the same diff. Deal records are keyed by `(piece, deal_id)`,
/// so re-application is idempotent.
pub struct Reconciler {
    source: Arc<dyn SnapshotSource>,
    snapshots: Arc<dyn RecordStore<OracleSnapshot>>,
    deals: Arc<dyn RecordStore<DealRecord>>,
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Create a reconciler over its collaborators.
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        snapshots: Arc<dyn RecordStore<OracleSnapshot>>,
        deals: Arc<dyn RecordStore<DealRecord>>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            source,
            snapshots,
            deals,
            config,
        }
    }

    /// Run one reconciliation tick.
    pub async fn tick(&self) -> OracleResult<TickReport> {
        // 1. Fetch; any upstream failure aborts before local state is read.
        let raw = self.source.fetch_latest().await?;
        let updated = OracleSnapshot::from_raw(raw);
        let source_id = updated.source_id.clone();

        // 2. Absent previous snapshot means the whole fetch is the diff.
        let previous = self.snapshots.get(&source_id).await?;
        let diff = diff_snapshots(previous.as_ref().map(|v| &v.record), &updated);

        if diff.is_empty() {
            debug!(%source_id, "snapshot unchanged, no writes");
            return Ok(TickReport {
                source_id,
                new_deals: 0,
                pieces_touched: 0,
                applied: false,
            });
        }

        let new_deals = diff.len();
        let pieces_touched = diff.piece_count();

        // 3. Apply every diff entry; only then replace the snapshot.
        self.apply(diff).await?;
        self.snapshots.put(Precondition::None, &updated).await?;

        debug!(%source_id, new_deals, pieces_touched, "reconciliation tick applied");
        Ok(TickReport {
            source_id,
            new_deals,
            pieces_touched,
            applied: true,
        })
    }

    /// Write the diff's deal records with bounded concurrency.
    async fn apply(&self, diff: SnapshotDiff) -> OracleResult<()> {
        let fan_out = self.config.write_fan_out.max(1);
        let mut work: VecDeque<(PieceId, ContractEntry)> = diff.into_entries().into();
        let mut in_flight: JoinSet<OracleResult<()>> = JoinSet::new();

        loop {
            while in_flight.len() < fan_out {
                match work.pop_front() {
                    Some((piece, entry)) => {
                        let deals = Arc::clone(&self.deals);
                        in_flight.spawn(async move { upsert_deal(deals, piece, entry).await });
                    }
                    None => break,
                }
            }

            match in_flight.join_next().await {
                None => return Ok(()),
                Some(Ok(Ok(()))) => {}
                Some(Ok(Err(err))) => {
                    warn!(%err, "diff write failed, snapshot will not advance");
                    return Err(err);
                }
                Some(Err(join_err)) => {
                    return Err(OracleError::ApplyAborted {
                        reason: join_err.to_string(),
                    });
                }
            }
        }
    }
}

/// Idempotent `(piece, deal_id)` upsert: first sight fixes `created_at`,
/// re-syncs refresh `updated_at`.
async fn upsert_deal(
    deals: Arc<dyn RecordStore<DealRecord>>,
    piece: PieceId,
    entry: ContractEntry,
) -> OracleResult<()> {
    let key = DealRecord::key_for(&piece, entry.deal_id);
    for _ in 0..MAX_CAS_ATTEMPTS {
        let now = epoch_ms();
        match deals.get(&key).await? {
            None => {
                let record = DealRecord {
                    piece,
                    deal_id: entry.deal_id,
                    provider: entry.provider.clone(),
                    expiration_epoch: entry.expiration_epoch,
                    source: entry.source.clone(),
                    created_at: now,
                    updated_at: now,
                };
                match deals.put(Precondition::Absent, &record).await {
                    Ok(_) => return Ok(()),
                    Err(StoreError::PreconditionFailed { .. }) => continue,
                    Err(err) => return Err(err.into()),
                }
            }
            Some(existing) => {
                let mut next = existing.record.clone();
                next.provider = entry.provider.clone();
                next.expiration_epoch = entry.expiration_epoch;
                next.source = entry.source.clone();
                next.updated_at = now;
                match deals
                    .put(Precondition::Revision(existing.revision), &next)
                    .await
                {
                    Ok(_) => return Ok(()),
                    Err(StoreError::PreconditionFailed { .. }) => continue,
                    Err(err) => return Err(err.into()),
                }
            }
        }
    }
    Err(OracleError::Contended { key })
}
