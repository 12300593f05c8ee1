use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use gantry_pack::{plan, Aggregate, AggregateWriter, CommitmentScheme};
use gantry_queue::{Delivery, DeliveryHandle, Queue};
use gantry_store::ObjectStore;
use gantry_types::{GroupKey, PieceRef};

use crate::buffer::{Buffer, BufferMessage};
use crate::error::{ReduceError, ReduceResult};

/// Thresholds the reducer operates under.
#[derive(Clone, Copy, Debug)]
pub struct ReducerConfig {
    /// Merged mass required before the builder is invoked.
    pub min_aggregate_size: u64,
    /// Capacity ceiling handed to the builder.
    pub aggregate_capacity: u64,
}

/// A group of deliveries that failed together.
#[derive(Debug)]
pub struct FailedGroup {
    pub group: GroupKey,
    pub handles: Vec<DeliveryHandle>,
    pub error: ReduceError,
}

/// The outcome of one reduction pass.
#[derive(Debug, Default)]
pub struct ReduceReport {
    /// Deliveries fully processed; the caller acks these.
    pub acked: Vec<DeliveryHandle>,
    /// Buffers merged and re-enqueued (not yet enough mass, or carry-over).
    pub requeued: usize,
    /// Aggregates built this pass.
    pub aggregates: Vec<Aggregate>,
    /// Per-group failures; the caller nacks each listed handle.
    pub failures: Vec<FailedGroup>,
}

impl ReduceReport {
    /// Returns `true` if no delivery failed.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Fan-in reducer over queued buffer messages.
///
/// Queue consumers see small buffers; rather than building an aggregate per
/// batch, the reducer folds same-group buffers together until a group
/// carries enough mass, then invokes the packing builder once. Every piece
/// either lands in exactly one aggregate or is carried forward in exactly
/// one derived buffer; nothing is dropped here.
pub struct Reducer {
    objects: Arc<dyn ObjectStore>,
    queue: Arc<dyn Queue<BufferMessage>>,
    scheme: Arc<dyn CommitmentScheme>,
    writer: AggregateWriter,
    config: ReducerConfig,
}

enum GroupOutcome {
    Requeued,
    Built(Aggregate, bool),
}

impl Reducer {
    /// Create a reducer over its collaborators.
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        queue: Arc<dyn Queue<BufferMessage>>,
        scheme: Arc<dyn CommitmentScheme>,
        writer: AggregateWriter,
        config: ReducerConfig,
    ) -> Self {
        Self {
            objects,
            queue,
            scheme,
            writer,
            config,
        }
    }

    /// Reduce one received batch.
    ///
    /// Deliveries are partitioned by group key; cross-group merges never
    /// happen. A group with a single message in the batch fails that item
    /// individually so the queue redelivers it toward a future, fuller
    /// batch.
    pub async fn handle(&self, batch: Vec<Delivery<BufferMessage>>) -> ReduceReport {
        let mut by_group: BTreeMap<GroupKey, Vec<Delivery<BufferMessage>>> = BTreeMap::new();
        for delivery in batch {
            by_group
                .entry(delivery.partition.clone())
                .or_default()
                .push(delivery);
        }

        let mut report = ReduceReport::default();
        for (group, deliveries) in by_group {
            let handles: Vec<DeliveryHandle> = deliveries.iter().map(|d| d.handle).collect();

            if deliveries.len() < 2 {
                debug!(%group, "unpaired buffer message, returning for redelivery");
                report.failures.push(FailedGroup {
                    group: group.clone(),
                    handles,
                    error: ReduceError::UnpairedGroup { group },
                });
                continue;
            }

            match self.reduce_group(&group, &deliveries).await {
                Ok(GroupOutcome::Requeued) => {
                    report.acked.extend(handles);
                    report.requeued += 1;
                }
                Ok(GroupOutcome::Built(aggregate, carried)) => {
                    report.acked.extend(handles);
                    if carried {
                        report.requeued += 1;
                    }
                    report.aggregates.push(aggregate);
                }
                Err(error) => {
                    warn!(%group, %error, "group reduction failed");
                    report.failures.push(FailedGroup {
                        group,
                        handles,
                        error,
                    });
                }
            }
        }
        report
    }

    /// Merge one group's buffers and either requeue or build.
    async fn reduce_group(
        &self,
        group: &GroupKey,
        deliveries: &[Delivery<BufferMessage>],
    ) -> ReduceResult<GroupOutcome> {
        // Fetch every referenced buffer up front; a missing one fails the
        // whole group before anything is written.
        let mut buffers = Vec::with_capacity(deliveries.len());
        for delivery in deliveries {
            let id = delivery.message.buffer;
            let buffer = Buffer::load(self.objects.as_ref(), &id)
                .await?
                .ok_or(ReduceError::BufferMissing { id })?;
            if buffer.group() != group {
                return Err(ReduceError::CorruptBuffer {
                    id,
                    reason: format!(
                        "buffer belongs to group {}, message claims {group}",
                        buffer.group()
                    ),
                });
            }
            buffers.push(buffer);
        }

        let mut members: Vec<PieceRef> = Vec::new();
        for buffer in &buffers {
            members.extend_from_slice(buffer.members());
        }
        let merged = Buffer::new(group.clone(), members);
        let total = merged.total_size();

        if total < self.config.min_aggregate_size {
            // N small buffers become one larger one; queue depth shrinks.
            let id = self.requeue(&merged).await?;
            debug!(%group, %id, total, "merged below threshold, requeued");
            return Ok(GroupOutcome::Requeued);
        }

        // Enough mass: persist the merged buffer (content-keyed, so a
        // crashed retry re-writes the same object), then build against it.
        let merged_id = merged.store(self.objects.as_ref()).await?;
        let pack_plan = plan(
            merged.members(),
            self.scheme.as_ref(),
            self.config.aggregate_capacity,
        )?;

        if pack_plan.folded.is_empty() {
            // Every piece bounced off the capacity class; carry the merge
            // forward rather than emitting an empty aggregate.
            let message = BufferMessage::describe(&merged, merged_id);
            self.queue.send(&message, group).await?;
            warn!(%group, total, "builder folded nothing, merged buffer requeued");
            return Ok(GroupOutcome::Requeued);
        }

        let aggregate = self
            .writer
            .commit(group, &pack_plan, Some(merged_id))
            .await?;

        let mut carried = false;
        if !pack_plan.rejected.is_empty() {
            let leftover = Buffer::new(group.clone(), pack_plan.rejected.clone());
            let id = self.requeue(&leftover).await?;
            debug!(%group, %id, pieces = leftover.len(), "leftover pieces carried forward");
            carried = true;
        }

        debug!(
            %group,
            aggregate = %aggregate.id.short_hex(),
            folded = aggregate.pieces.len(),
            "aggregate built from merged buffers"
        );
        Ok(GroupOutcome::Built(aggregate, carried))
    }

    /// Store a derived buffer, then enqueue its message. The enqueue is the
    /// only non-idempotent step, so it strictly follows the durable write.
    async fn requeue(&self, buffer: &Buffer) -> ReduceResult<gantry_types::ContentId> {
        let id = buffer.store(self.objects.as_ref()).await?;
        let message = BufferMessage::describe(buffer, id);
        self.queue.send(&message, buffer.group()).await?;
        Ok(id)
    }
}
