use std::sync::Arc;

use tracing::{debug, warn};

use gantry_accumulator::{Accumulator, AccumulatorError, CapacityLimits, Container};
use gantry_oracle::{
    DealRecord, OracleSnapshot, Reconciler, ReconcilerConfig, SnapshotSource, TickReport,
};
use gantry_pack::{Aggregate, AggregateWriter, CommitmentScheme, PaddedTreeScheme};
use gantry_queue::{InMemoryQueue, Queue};
use gantry_reduce::{Buffer, BufferMessage, Reducer, ReducerConfig};
use gantry_store::{
    InMemoryObjectStore, InMemoryRecordStore, ObjectStore, Precondition, RecordStore,
    RetryPolicy, StoreError,
};
use gantry_types::{
    epoch_ms, ContainerId, ContainerStatus, GroupKey, Piece, PieceId, PieceRef, PieceStatus,
};

use crate::config::{ConfigError, PipelineConfig};
use crate::error::{PipelineError, PipelineResult};

/// One piece as ingestion hands it to the pipeline.
#[derive(Clone, Debug)]
pub struct PieceSubmission {
    pub id: PieceId,
    pub size: u64,
    pub group: GroupKey,
}

/// A submission that failed, for the trigger's retry list.
#[derive(Clone, Debug)]
pub struct ItemFailure {
    pub id: String,
    pub error: String,
}

/// Outcome of a batch-triggered stage: how much landed, what to redeliver.
#[derive(Debug, Default)]
pub struct StageReport {
    pub succeeded: usize,
    pub failures: Vec<ItemFailure>,
}

impl StageReport {
    /// Returns `true` if every item landed.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Outcome of one reduction pass.
#[derive(Debug, Default)]
pub struct ReduceSummary {
    /// Deliveries pulled from the queue.
    pub received: usize,
    /// Derived buffers re-enqueued.
    pub requeued: usize,
    /// Aggregates built this pass.
    pub aggregates: Vec<Aggregate>,
    /// Deliveries returned to the queue for redelivery.
    pub retried: usize,
}

/// Everything a pipeline is wired from.
///
/// Adapters for real backends plug in here; [`Pipeline::in_memory`] fills
/// it with the embedded implementations.
pub struct PipelineParts {
    pub pieces: Arc<dyn RecordStore<Piece>>,
    pub containers: Arc<dyn RecordStore<Container>>,
    pub aggregates: Arc<dyn RecordStore<Aggregate>>,
    pub snapshots: Arc<dyn RecordStore<OracleSnapshot>>,
    pub deals: Arc<dyn RecordStore<DealRecord>>,
    pub objects: Arc<dyn ObjectStore>,
    pub queue: Arc<dyn Queue<BufferMessage>>,
    pub scheme: Arc<dyn CommitmentScheme>,
    pub source: Arc<dyn SnapshotSource>,
}

/// The aggregation pipeline: one entry point per stage trigger.
///
/// Stages share no in-process state; everything flows through the stores
/// and the queue, so any number of invocations may run concurrently.
pub struct Pipeline {
    config: PipelineConfig,
    pieces: Arc<dyn RecordStore<Piece>>,
    aggregates: Arc<dyn RecordStore<Aggregate>>,
    objects: Arc<dyn ObjectStore>,
    queue: Arc<dyn Queue<BufferMessage>>,
    ingest: Accumulator,
    reducer: Reducer,
    reconciler: Reconciler,
    retry: RetryPolicy,
}

impl Pipeline {
    /// Wire a pipeline from its parts.
    pub fn assemble(config: PipelineConfig, parts: PipelineParts) -> Result<Self, ConfigError> {
        config.validate()?;
        let limits = CapacityLimits::new(config.container_min_size, config.container_max_size)
            .map_err(|_| ConfigError::ContainerLimitsInverted {
                min: config.container_min_size,
                max: config.container_max_size,
            })?;

        let ingest = Accumulator::new(parts.containers.clone(), limits);
        let writer = AggregateWriter::new(
            parts.aggregates.clone(),
            parts.pieces.clone(),
            parts.containers,
        );
        let reducer = Reducer::new(
            parts.objects.clone(),
            parts.queue.clone(),
            parts.scheme,
            writer,
            ReducerConfig {
                min_aggregate_size: config.min_aggregate_size,
                aggregate_capacity: config.aggregate_capacity,
            },
        );
        let reconciler = Reconciler::new(
            parts.source,
            parts.snapshots,
            parts.deals,
            ReconcilerConfig {
                write_fan_out: config.oracle_write_fan_out,
            },
        );

        let retry = config.retry_policy();
        Ok(Self {
            config,
            pieces: parts.pieces,
            aggregates: parts.aggregates,
            objects: parts.objects,
            queue: parts.queue,
            ingest,
            reducer,
            reconciler,
            retry,
        })
    }

    /// An all-in-memory pipeline for tests and embedding.
    pub fn in_memory(
        config: PipelineConfig,
        source: Arc<dyn SnapshotSource>,
    ) -> Result<Self, ConfigError> {
        Self::assemble(
            config,
            PipelineParts {
                pieces: Arc::new(InMemoryRecordStore::<Piece>::new()),
                containers: Arc::new(InMemoryRecordStore::<Container>::new()),
                aggregates: Arc::new(InMemoryRecordStore::<Aggregate>::new()),
                snapshots: Arc::new(InMemoryRecordStore::<OracleSnapshot>::new()),
                deals: Arc::new(InMemoryRecordStore::<DealRecord>::new()),
                objects: Arc::new(InMemoryObjectStore::new()),
                queue: Arc::new(InMemoryQueue::new()),
                scheme: Arc::new(PaddedTreeScheme),
                source,
            },
        )
    }

    // ---- Queue-triggered stages ----

    /// Register a batch of ingested pieces: record them pending, track
    /// their sizes in the group's open container, and enqueue one
    /// single-piece buffer each. Failures are per item.
    pub async fn submit_pieces(&self, batch: Vec<PieceSubmission>) -> StageReport {
        let mut report = StageReport::default();
        for submission in batch {
            match self.admit(&submission).await {
                Ok(()) => report.succeeded += 1,
                Err(err) => {
                    warn!(piece = %submission.id.short_hex(), %err, "piece submission failed");
                    report.failures.push(ItemFailure {
                        id: submission.id.to_hex(),
                        error: err.to_string(),
                    });
                }
            }
        }
        report
    }

    /// Pull one batch of buffer messages and reduce it, settling each
    /// delivery according to the reducer's per-group verdicts.
    pub async fn reduce_buffers(&self) -> PipelineResult<ReduceSummary> {
        let batch = self.queue.receive(self.config.receive_batch_size).await?;
        let received = batch.len();
        if received == 0 {
            return Ok(ReduceSummary::default());
        }

        let report = self.reducer.handle(batch).await;
        for handle in &report.acked {
            self.queue.ack(*handle).await?;
        }
        let mut retried = 0;
        for failure in &report.failures {
            for handle in &failure.handles {
                self.queue.nack(*handle).await?;
                retried += 1;
            }
        }

        Ok(ReduceSummary {
            received,
            requeued: report.requeued,
            aggregates: report.aggregates,
            retried,
        })
    }

    // ---- Notification-triggered stages ----

    /// Record that an aggregate was offered to a counterparty.
    ///
    /// A peer having already moved the container to `Offered` or beyond is
    /// the desired end state and reported as success.
    pub async fn record_offer(&self, aggregate: &PieceId) -> PipelineResult<ContainerStatus> {
        let container = self.container_of(aggregate).await?;
        match self
            .ingest
            .advance(container, ContainerStatus::Closed, ContainerStatus::Offered)
            .await
        {
            Ok(c) => Ok(c.status),
            Err(AccumulatorError::StateConflict { actual, .. })
                if actual.is_at_or_past(ContainerStatus::Offered) =>
            {
                debug!(aggregate = %aggregate.short_hex(), %actual, "offer already recorded");
                Ok(actual)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Record the counterparty's decision on an offered aggregate.
    ///
    /// Idempotent for the same decision; a conflicting decision surfaces
    /// as the state conflict it is.
    pub async fn settle_offer(
        &self,
        aggregate: &PieceId,
        accepted: bool,
    ) -> PipelineResult<ContainerStatus> {
        let target = if accepted {
            ContainerStatus::Accepted
        } else {
            ContainerStatus::Rejected
        };
        let container = self.container_of(aggregate).await?;
        match self
            .ingest
            .advance(container, ContainerStatus::Offered, target)
            .await
        {
            Ok(c) => Ok(c.status),
            Err(AccumulatorError::StateConflict { actual, .. }) if actual == target => {
                debug!(aggregate = %aggregate.short_hex(), %actual, "settlement already recorded");
                Ok(actual)
            }
            Err(err) => Err(err.into()),
        }
    }

    // ---- Timer-triggered stage ----

    /// Run one oracle reconciliation tick.
    pub async fn reconcile(&self) -> PipelineResult<TickReport> {
        Ok(self.reconciler.tick().await?)
    }

    // ---- Queries ----

    /// One page of a group's pending pieces, in insertion order.
    ///
    /// The candidate feed for a packing pass driven outside the reducer.
    pub async fn pending_pieces(&self, group: &GroupKey) -> PipelineResult<Vec<PieceRef>> {
        let partition = format!("{group}/{}", PieceStatus::Pending);
        let mut records = self.pieces.find_partition(&partition).await?;
        records.sort_by_key(|v| (v.record.inserted_at, v.record.id));
        records.truncate(self.config.candidate_page_size);
        Ok(records.iter().map(|v| PieceRef::from(&v.record)).collect())
    }

    // ---- Internals ----

    async fn admit(&self, submission: &PieceSubmission) -> PipelineResult<()> {
        let piece = Piece::pending(
            submission.id,
            submission.size,
            submission.group.clone(),
            epoch_ms(),
        );
        match self.pieces.put(Precondition::Absent, &piece).await {
            Ok(_) => {}
            // Redelivered submission; the record already exists.
            Err(StoreError::PreconditionFailed { .. }) => {
                debug!(piece = %submission.id.short_hex(), "piece already registered");
            }
            Err(err) => return Err(err.into()),
        }

        self.track_ingestion(&submission.group, submission.size)
            .await?;

        let buffer = Buffer::new(
            submission.group.clone(),
            vec![PieceRef::new(submission.id, submission.size)],
        );
        let id = buffer.store(self.objects.as_ref()).await?;
        let message = BufferMessage::describe(&buffer, id);
        // The enqueue follows the durable object write; transient queue
        // trouble is retried with backoff.
        self.retry
            .run(|| async { self.queue.send(&message, &submission.group).await })
            .await?;
        Ok(())
    }

    /// Account a piece's size in its group's open container, rolling over
    /// to a fresh container when the current one cannot take the batch.
    async fn track_ingestion(
        &self,
        group: &GroupKey,
        size: u64,
    ) -> PipelineResult<ContainerId> {
        let id = self.ingest.open(group).await?;
        match self.ingest.append(id, group, size).await {
            Ok(container) => Ok(container.id),
            Err(AccumulatorError::CapacityExceeded { .. }) => {
                // Seal the full container when it is eligible; a peer
                // having done it first, or the container still being under
                // its minimum, changes nothing for this batch.
                match self.ingest.close(id).await {
                    Ok(_) => debug!(%group, container = %id, "rolled over full container"),
                    Err(AccumulatorError::StateConflict { .. })
                    | Err(AccumulatorError::InsufficientSize { .. }) => {}
                    Err(err) => return Err(err.into()),
                }
                let fresh = ContainerId::allocate();
                Ok(self.ingest.append(fresh, group, size).await?.id)
            }
            Err(AccumulatorError::StateConflict { .. }) => {
                // The resolved container closed under us; take a fresh one.
                let fresh = ContainerId::allocate();
                Ok(self.ingest.append(fresh, group, size).await?.id)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn container_of(&self, aggregate: &PieceId) -> PipelineResult<ContainerId> {
        let stored = self
            .aggregates
            .get(&aggregate.to_hex())
            .await?
            .ok_or_else(|| PipelineError::AggregateNotFound {
                id: aggregate.to_hex(),
            })?;
        Ok(stored.record.container)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_oracle::{DealId, RawContract, RawSnapshot, SnapshotKey, StaticSnapshotSource};
    use gantry_types::PieceStatus;

    struct Fixture {
        pipeline: Pipeline,
        source: Arc<StaticSnapshotSource>,
        pieces: Arc<InMemoryRecordStore<Piece>>,
        containers: Arc<InMemoryRecordStore<Container>>,
        aggregates: Arc<InMemoryRecordStore<Aggregate>>,
        deals: Arc<InMemoryRecordStore<DealRecord>>,
        queue: Arc<InMemoryQueue<BufferMessage>>,
    }

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            container_min_size: 100,
            container_max_size: 2048,
            min_aggregate_size: 100,
            aggregate_capacity: 1024,
            receive_batch_size: 16,
            candidate_page_size: 8,
            oracle_write_fan_out: 3,
            retry_max_attempts: 2,
            retry_base_delay_ms: 1,
            retry_max_delay_ms: 2,
        }
    }

    fn fixture_with(config: PipelineConfig) -> Fixture {
        let source = Arc::new(StaticSnapshotSource::unreachable());
        let pieces = Arc::new(InMemoryRecordStore::<Piece>::new());
        let containers = Arc::new(InMemoryRecordStore::<Container>::new());
        let aggregates = Arc::new(InMemoryRecordStore::<Aggregate>::new());
        let snapshots = Arc::new(InMemoryRecordStore::<OracleSnapshot>::new());
        let deals = Arc::new(InMemoryRecordStore::<DealRecord>::new());
        let queue = Arc::new(InMemoryQueue::new());

        let pipeline = Pipeline::assemble(
            config,
            PipelineParts {
                pieces: pieces.clone(),
                containers: containers.clone(),
                aggregates: aggregates.clone(),
                snapshots,
                deals: deals.clone(),
                objects: Arc::new(InMemoryObjectStore::new()),
                queue: queue.clone(),
                scheme: Arc::new(PaddedTreeScheme),
                source: source.clone(),
            },
        )
        .unwrap();

        Fixture {
            pipeline,
            source,
            pieces,
            containers,
            aggregates,
            deals,
            queue,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(test_config())
    }

    fn group() -> GroupKey {
        GroupKey::new("tenant-a").unwrap()
    }

    fn submission(tag: &[u8], size: u64) -> PieceSubmission {
        PieceSubmission {
            id: PieceId::from_bytes(tag),
            size,
            group: group(),
        }
    }

    // -----------------------------------------------------------------------
    // Ingestion
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn submission_registers_piece_and_enqueues_buffer() {
        let f = fixture();
        let report = f
            .pipeline
            .submit_pieces(vec![submission(b"a", 300)])
            .await;
        assert!(report.is_clean());
        assert_eq!(report.succeeded, 1);

        let piece = f
            .pieces
            .get(&PieceId::from_bytes(b"a").to_hex())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(piece.record.status, PieceStatus::Pending);
        assert_eq!(f.queue.depth(), 1);

        // Size accounted in the group's open container.
        let open = f.containers.find_partition("tenant-a/open").await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].record.size, 300);
    }

    #[tokio::test]
    async fn duplicate_submission_is_tolerated() {
        let f = fixture();
        f.pipeline.submit_pieces(vec![submission(b"a", 300)]).await;
        let report = f
            .pipeline
            .submit_pieces(vec![submission(b"a", 300)])
            .await;
        assert!(report.is_clean());
        // Same content-addressed buffer, but a second queue message.
        assert_eq!(f.queue.depth(), 2);
    }

    #[tokio::test]
    async fn ingestion_rolls_over_full_containers() {
        let mut config = test_config();
        config.container_min_size = 100;
        config.container_max_size = 500;
        let f = fixture_with(config);

        let report = f
            .pipeline
            .submit_pieces(vec![submission(b"a", 300), submission(b"b", 300)])
            .await;
        assert!(report.is_clean());

        let open = f.containers.find_partition("tenant-a/open").await.unwrap();
        let closed = f
            .containers
            .find_partition("tenant-a/closed")
            .await
            .unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].record.size, 300);
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].record.size, 300);
    }

    // -----------------------------------------------------------------------
    // Reduction
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn reduction_builds_an_aggregate_from_submissions() {
        let f = fixture();
        f.pipeline
            .submit_pieces(vec![submission(b"a", 300), submission(b"b", 400)])
            .await;

        let summary = f.pipeline.reduce_buffers().await.unwrap();
        assert_eq!(summary.received, 2);
        assert_eq!(summary.retried, 0);
        assert_eq!(summary.aggregates.len(), 1);

        let aggregate = &summary.aggregates[0];
        assert_eq!(aggregate.pieces.len(), 2);
        assert!(f
            .aggregates
            .get(&aggregate.id.to_hex())
            .await
            .unwrap()
            .is_some());

        // Folded pieces flipped to included.
        for tag in [b"a".as_slice(), b"b"] {
            let piece = f
                .pieces
                .get(&PieceId::from_bytes(tag).to_hex())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(piece.record.status, PieceStatus::Included);
        }
        assert!(f.queue.is_idle());
    }

    #[tokio::test]
    async fn unpaired_delivery_is_returned_for_redelivery() {
        let f = fixture();
        f.pipeline.submit_pieces(vec![submission(b"a", 300)]).await;

        let summary = f.pipeline.reduce_buffers().await.unwrap();
        assert_eq!(summary.received, 1);
        assert_eq!(summary.retried, 1);
        assert!(summary.aggregates.is_empty());
        // Back on the queue with a bumped attempt.
        assert_eq!(f.queue.depth(), 1);
    }

    #[tokio::test]
    async fn empty_queue_reduction_is_a_noop() {
        let f = fixture();
        let summary = f.pipeline.reduce_buffers().await.unwrap();
        assert_eq!(summary.received, 0);
        assert!(summary.aggregates.is_empty());
    }

    // -----------------------------------------------------------------------
    // Offer and settlement
    // -----------------------------------------------------------------------

    async fn built_aggregate(f: &Fixture) -> PieceId {
        f.pipeline
            .submit_pieces(vec![submission(b"a", 300), submission(b"b", 400)])
            .await;
        let summary = f.pipeline.reduce_buffers().await.unwrap();
        summary.aggregates[0].id
    }

    #[tokio::test]
    async fn offer_and_settlement_walk_the_lifecycle() {
        let f = fixture();
        let aggregate = built_aggregate(&f).await;

        assert_eq!(
            f.pipeline.record_offer(&aggregate).await.unwrap(),
            ContainerStatus::Offered
        );
        assert_eq!(
            f.pipeline.settle_offer(&aggregate, true).await.unwrap(),
            ContainerStatus::Accepted
        );
    }

    #[tokio::test]
    async fn repeated_offer_and_settlement_are_benign() {
        let f = fixture();
        let aggregate = built_aggregate(&f).await;

        f.pipeline.record_offer(&aggregate).await.unwrap();
        // A peer already recorded the offer; this is success.
        assert_eq!(
            f.pipeline.record_offer(&aggregate).await.unwrap(),
            ContainerStatus::Offered
        );

        f.pipeline.settle_offer(&aggregate, false).await.unwrap();
        assert_eq!(
            f.pipeline.settle_offer(&aggregate, false).await.unwrap(),
            ContainerStatus::Rejected
        );
    }

    #[tokio::test]
    async fn conflicting_settlement_surfaces() {
        let f = fixture();
        let aggregate = built_aggregate(&f).await;
        f.pipeline.record_offer(&aggregate).await.unwrap();
        f.pipeline.settle_offer(&aggregate, true).await.unwrap();

        let err = f
            .pipeline
            .settle_offer(&aggregate, false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Accumulator(AccumulatorError::StateConflict { .. })
        ));
    }

    #[tokio::test]
    async fn settling_an_unknown_aggregate_fails() {
        let f = fixture();
        let ghost = PieceId::from_bytes(b"ghost");
        let err = f.pipeline.record_offer(&ghost).await.unwrap_err();
        assert!(matches!(err, PipelineError::AggregateNotFound { .. }));
    }

    // -----------------------------------------------------------------------
    // Pending-candidate pages
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn pending_pieces_follow_insertion_order_and_page_bound() {
        let mut config = test_config();
        config.candidate_page_size = 2;
        let f = fixture_with(config);

        f.pipeline.submit_pieces(vec![submission(b"a", 10)]).await;
        f.pipeline.submit_pieces(vec![submission(b"b", 20)]).await;
        f.pipeline.submit_pieces(vec![submission(b"c", 30)]).await;

        let page = f.pipeline.pending_pieces(&group()).await.unwrap();
        assert_eq!(page.len(), 2);
    }

    #[tokio::test]
    async fn pending_pieces_exclude_the_included() {
        let f = fixture();
        built_aggregate(&f).await;
        // Both submissions folded; nothing is pending.
        assert!(f.pipeline.pending_pieces(&group()).await.unwrap().is_empty());
    }

    // -----------------------------------------------------------------------
    // Reconciliation
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn reconcile_populates_deal_records_for_aggregates() {
        let f = fixture();
        let aggregate = built_aggregate(&f).await;
        f.pipeline.record_offer(&aggregate).await.unwrap();
        f.pipeline.settle_offer(&aggregate, true).await.unwrap();

        f.source.set(RawSnapshot {
            source_id: "oracle-main".into(),
            as_of: epoch_ms(),
            entries: vec![RawContract {
                key: SnapshotKey::Current(aggregate),
                provider: "f01234".into(),
                deal_id: DealId(42),
                expiration_epoch: 100_000,
                source: "mainnet".into(),
            }],
        });

        let report = f.pipeline.reconcile().await.unwrap();
        assert!(report.applied);
        assert_eq!(report.new_deals, 1);

        let key = DealRecord::key_for(&aggregate, DealId(42));
        let record = f.deals.get(&key).await.unwrap().unwrap();
        assert_eq!(record.record.provider, "f01234");
    }

    #[tokio::test]
    async fn reconcile_propagates_fetch_failures() {
        let f = fixture();
        let err = f.pipeline.reconcile().await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Oracle(gantry_oracle::OracleError::UpstreamFetchFailed { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Wiring
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn in_memory_pipeline_assembles_with_defaults() {
        let source = Arc::new(StaticSnapshotSource::unreachable());
        let pipeline = Pipeline::in_memory(PipelineConfig::default(), source).unwrap();
        let summary = pipeline.reduce_buffers().await.unwrap();
        assert_eq!(summary.received, 0);
    }

    #[tokio::test]
    async fn assemble_rejects_invalid_config() {
        let source = Arc::new(StaticSnapshotSource::unreachable());
        let mut config = test_config();
        config.aggregate_capacity = 1000;
        assert!(Pipeline::in_memory(config, source).is_err());
    }
}
