use std::sync::Arc;

use tracing::debug;

use gantry_accumulator::{Accumulator, AccumulatorError, CapacityLimits, Container};
use gantry_store::{Precondition, RecordStore, StoreError};
use gantry_types::{epoch_ms, ContainerId, ContentId, GroupKey, Piece, PieceStatus};

use crate::aggregate::Aggregate;
use crate::error::{PackError, PackResult};
use crate::plan::PackPlan;

/// Attempts per piece-status flip before reporting contention.
const MAX_CAS_ATTEMPTS: u32 = 16;

/// Persists a finished packing plan.
///
/// Every step is idempotent, so a crashed commit re-runs cleanly: the plan
/// recomputes the same commitment, the aggregate record is content-keyed,
/// the container is derived from the commitment and guarded by its exact
/// final size, and piece inclusion is a one-way flip.
pub struct AggregateWriter {
    aggregates: Arc<dyn RecordStore<Aggregate>>,
    pieces: Arc<dyn RecordStore<Piece>>,
    containers: Arc<dyn RecordStore<Container>>,
}

impl AggregateWriter {
    /// Create a writer over the three record stores it touches.
    pub fn new(
        aggregates: Arc<dyn RecordStore<Aggregate>>,
        pieces: Arc<dyn RecordStore<Piece>>,
        containers: Arc<dyn RecordStore<Container>>,
    ) -> Self {
        Self {
            aggregates,
            pieces,
            containers,
        }
    }

    /// The container id an aggregate's lifecycle record lives under.
    ///
    /// Derived from the commitment so a re-run reclaims the same record
    /// instead of minting a second one.
    pub fn container_id(aggregate: &gantry_types::PieceId) -> ContainerId {
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&aggregate.as_bytes()[..16]);
        ContainerId::from_uuid(uuid::Uuid::from_bytes(bytes))
    }

    /// Persist the aggregate, drive its container to `Closed`, and mark
    /// every folded piece `Included`.
    pub async fn commit(
        &self,
        group: &GroupKey,
        plan: &PackPlan,
        buffer: Option<ContentId>,
    ) -> PackResult<Aggregate> {
        if plan.folded.is_empty() {
            return Err(PackError::EmptyPlan);
        }

        let container_id = Self::container_id(&plan.commitment.id);
        let aggregate = Aggregate {
            id: plan.commitment.id,
            group: group.clone(),
            pieces: plan.folded.iter().map(|p| p.id).collect(),
            buffer,
            size: plan.commitment.size,
            capacity: plan.capacity,
            container: container_id,
            built_at: epoch_ms(),
        };

        // Content-keyed record; a re-run overwrites with identical content.
        self.aggregates
            .put(Precondition::None, &aggregate)
            .await?;

        // The container is born at its final size and sealed in the same
        // pass, so the ceiling is the exact packed size: a duplicate append
        // from a re-run bounces off it instead of double-counting, and the
        // close guard is disabled (min_size 0).
        let limits = CapacityLimits::new(0, plan.commitment.size)?;
        let accumulator = Accumulator::new(self.containers.clone(), limits);
        match accumulator
            .append(container_id, group, plan.commitment.size)
            .await
        {
            Ok(_) => {}
            Err(AccumulatorError::CapacityExceeded { .. })
            | Err(AccumulatorError::StateConflict { .. }) => {
                debug!(container = %container_id, "aggregate container already recorded");
            }
            Err(err) => return Err(err.into()),
        }
        match accumulator.close(container_id).await {
            Ok(_) => {}
            Err(AccumulatorError::StateConflict { .. }) => {
                debug!(container = %container_id, "aggregate container already closed");
            }
            Err(err) => return Err(err.into()),
        }

        for piece in &plan.folded {
            self.mark_included(&piece.id).await?;
        }

        debug!(
            aggregate = %aggregate.id.short_hex(),
            %group,
            pieces = aggregate.pieces.len(),
            size = aggregate.size,
            "aggregate committed"
        );
        Ok(aggregate)
    }

    /// One-way `Pending -> Included` flip; a no-op if already included.
    async fn mark_included(&self, id: &gantry_types::PieceId) -> PackResult<()> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self
                .pieces
                .get(&id.to_hex())
                .await?
                .ok_or(PackError::PieceMissing { id: *id })?;
            if current.record.status == PieceStatus::Included {
                return Ok(());
            }
            let mut next = current.record.clone();
            next.status = PieceStatus::Included;
            match self
                .pieces
                .put(Precondition::Revision(current.revision), &next)
                .await
            {
                Ok(_) => return Ok(()),
                Err(StoreError::PreconditionFailed { .. }) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(PackError::PieceContended { id: *id })
    }
}
