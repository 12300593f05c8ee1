use std::sync::Arc;

use tracing::debug;

use gantry_store::{Precondition, RecordStore, StoreError};
use gantry_types::{epoch_ms, ContainerId, ContainerStatus, GroupKey};

use crate::container::{status_partition, CapacityLimits, Container};
use crate::error::{AccumulatorError, AccumulatorResult};

/// Attempts per operation before reporting contention. Each attempt re-reads
/// and re-validates, so only a benign lost race reaches the next iteration.
const MAX_CAS_ATTEMPTS: u32 = 16;

/// The capacity-bounded accumulator.
///
/// Every operation is expressed as read, validate locally, then one
/// preconditioned write. Two workers racing on the same container can never
/// both succeed destructively: the store admits exactly one writer per
/// revision and the loser re-reads to find out what its failure means
/// (`CapacityExceeded`, `StateConflict`, or a benign retry).
pub struct Accumulator {
    store: Arc<dyn RecordStore<Container>>,
    limits: CapacityLimits,
}

impl Accumulator {
    /// Create an accumulator that opens containers with the given limits.
    pub fn new(store: Arc<dyn RecordStore<Container>>, limits: CapacityLimits) -> Self {
        Self { store, limits }
    }

    /// The limits newly created containers receive.
    pub fn limits(&self) -> CapacityLimits {
        self.limits
    }

    /// Resolve the container to append into for a group.
    ///
    /// Returns the id of an existing `Open` container (lowest id wins, so
    /// concurrent resolvers converge), or allocates a fresh time-ordered id.
    /// The fresh id is a hint, not a claim: no record is written until the
    /// first `append`, which creates it idempotently.
    pub async fn open(&self, group: &GroupKey) -> AccumulatorResult<ContainerId> {
        let partition = status_partition(group, ContainerStatus::Open);
        let open = self.store.find_partition(&partition).await?;
        if let Some(existing) = open.first() {
            return Ok(existing.record.id);
        }
        let id = ContainerId::allocate();
        debug!(%group, %id, "allocated container hint");
        Ok(id)
    }

    /// Atomically add a whole batch to a container, creating it if absent.
    ///
    /// Either the entire `batch_size` lands or nothing does. Overflow is
    /// `CapacityExceeded` (pick another container); a concurrent status
    /// advance is `StateConflict`; a lost race that leaves the operation
    /// valid is retried internally.
    pub async fn append(
        &self,
        id: ContainerId,
        group: &GroupKey,
        batch_size: u64,
    ) -> AccumulatorResult<Container> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            match self.store.get(&id.to_string()).await? {
                None => {
                    if batch_size > self.limits.max_size {
                        return Err(AccumulatorError::CapacityExceeded {
                            id,
                            size: 0,
                            max_size: self.limits.max_size,
                            batch_size,
                        });
                    }
                    let now = epoch_ms();
                    let container = Container {
                        id,
                        group: group.clone(),
                        status: ContainerStatus::Open,
                        size: batch_size,
                        min_size: self.limits.min_size,
                        max_size: self.limits.max_size,
                        created_at: now,
                        updated_at: now,
                    };
                    match self.store.put(Precondition::Absent, &container).await {
                        Ok(stored) => {
                            debug!(%id, %group, size = batch_size, "container created");
                            return Ok(stored.record);
                        }
                        // Lost the creation race; re-read and append instead.
                        Err(StoreError::PreconditionFailed { .. }) => continue,
                        Err(err) => return Err(err.into()),
                    }
                }
                Some(current) => {
                    let container = &current.record;
                    if container.status != ContainerStatus::Open {
                        return Err(AccumulatorError::StateConflict {
                            id,
                            actual: container.status,
                        });
                    }
                    if container.size.saturating_add(batch_size) > container.max_size {
                        return Err(AccumulatorError::CapacityExceeded {
                            id,
                            size: container.size,
                            max_size: container.max_size,
                            batch_size,
                        });
                    }
                    let mut next = container.clone();
                    next.size += batch_size;
                    next.updated_at = epoch_ms();
                    match self
                        .store
                        .put(Precondition::Revision(current.revision), &next)
                        .await
                    {
                        Ok(stored) => {
                            debug!(%id, size = stored.record.size, "container appended");
                            return Ok(stored.record);
                        }
                        Err(StoreError::PreconditionFailed { .. }) => continue,
                        Err(err) => return Err(err.into()),
                    }
                }
            }
        }
        Err(AccumulatorError::Contended {
            id,
            attempts: MAX_CAS_ATTEMPTS,
        })
    }

    /// Seal a container: `Open -> Closed`, guarded by its minimum size.
    ///
    /// A container below `min_size` stays open (`InsufficientSize`, no
    /// effect). A container already past `Open` yields `StateConflict`,
    /// which callers of idempotent close treat as success.
    pub async fn close(&self, id: ContainerId) -> AccumulatorResult<Container> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self
                .store
                .get(&id.to_string())
                .await?
                .ok_or(AccumulatorError::NotFound { id })?;
            let container = &current.record;

            if container.status != ContainerStatus::Open {
                return Err(AccumulatorError::StateConflict {
                    id,
                    actual: container.status,
                });
            }
            if container.size < container.min_size {
                return Err(AccumulatorError::InsufficientSize {
                    id,
                    size: container.size,
                    min_size: container.min_size,
                });
            }

            let mut next = container.clone();
            next.status = ContainerStatus::Closed;
            next.updated_at = epoch_ms();
            match self
                .store
                .put(Precondition::Revision(current.revision), &next)
                .await
            {
                Ok(stored) => {
                    debug!(%id, size = stored.record.size, "container closed");
                    return Ok(stored.record);
                }
                Err(StoreError::PreconditionFailed { .. }) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(AccumulatorError::Contended {
            id,
            attempts: MAX_CAS_ATTEMPTS,
        })
    }

    /// Advance a container along the post-close lifecycle:
    /// `Closed -> Offered -> {Accepted | Rejected}`.
    ///
    /// The same guarded compare-and-swap as `close`, generalized: the edge
    /// must be a legal forward transition and the container must currently
    /// sit at `from`; anything else a peer already did is `StateConflict`.
    pub async fn advance(
        &self,
        id: ContainerId,
        from: ContainerStatus,
        to: ContainerStatus,
    ) -> AccumulatorResult<Container> {
        if !from.can_advance_to(to) {
            return Err(AccumulatorError::InvalidTransition { from, to });
        }

        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self
                .store
                .get(&id.to_string())
                .await?
                .ok_or(AccumulatorError::NotFound { id })?;
            let container = &current.record;

            if container.status != from {
                return Err(AccumulatorError::StateConflict {
                    id,
                    actual: container.status,
                });
            }

            let mut next = container.clone();
            next.status = to;
            next.updated_at = epoch_ms();
            match self
                .store
                .put(Precondition::Revision(current.revision), &next)
                .await
            {
                Ok(stored) => {
                    debug!(%id, from = %from, to = %to, "container advanced");
                    return Ok(stored.record);
                }
                Err(StoreError::PreconditionFailed { .. }) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(AccumulatorError::Contended {
            id,
            attempts: MAX_CAS_ATTEMPTS,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_store::InMemoryRecordStore;

    fn group(name: &str) -> GroupKey {
        GroupKey::new(name).unwrap()
    }

    fn accumulator(min: u64, max: u64) -> (Accumulator, Arc<InMemoryRecordStore<Container>>) {
        let store = Arc::new(InMemoryRecordStore::new());
        let acc = Accumulator::new(
            store.clone(),
            CapacityLimits::new(min, max).unwrap(),
        );
        (acc, store)
    }

    // -----------------------------------------------------------------------
    // open()
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn open_allocates_then_finds_existing() {
        let (acc, _store) = accumulator(500, 1000);
        let g = group("tenant-a");

        let hint = acc.open(&g).await.unwrap();
        // No record yet: a second open may hand out a different hint.
        acc.append(hint, &g, 100).await.unwrap();

        // Now the open container is discoverable.
        assert_eq!(acc.open(&g).await.unwrap(), hint);
    }

    #[tokio::test]
    async fn open_is_per_group() {
        let (acc, _store) = accumulator(500, 1000);
        let a = group("tenant-a");
        let b = group("tenant-b");

        let id_a = acc.open(&a).await.unwrap();
        acc.append(id_a, &a, 100).await.unwrap();

        let id_b = acc.open(&b).await.unwrap();
        assert_ne!(id_a, id_b);
    }

    #[tokio::test]
    async fn open_skips_closed_containers() {
        let (acc, _store) = accumulator(100, 1000);
        let g = group("tenant-a");

        let first = acc.open(&g).await.unwrap();
        acc.append(first, &g, 500).await.unwrap();
        acc.close(first).await.unwrap();

        let second = acc.open(&g).await.unwrap();
        assert_ne!(first, second);
    }

    // -----------------------------------------------------------------------
    // append(): creation, growth, overflow
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn append_creates_on_first_use() {
        let (acc, _store) = accumulator(500, 1000);
        let g = group("tenant-a");
        let id = ContainerId::allocate();

        let container = acc.append(id, &g, 300).await.unwrap();
        assert_eq!(container.size, 300);
        assert_eq!(container.status, ContainerStatus::Open);
        assert_eq!(container.min_size, 500);
        assert_eq!(container.max_size, 1000);
    }

    #[tokio::test]
    async fn append_accumulates_batches() {
        // Spec scenario: 300 + 300 + 300 into a 1000-ceiling container.
        let (acc, _store) = accumulator(500, 1000);
        let g = group("tenant-a");
        let id = ContainerId::allocate();

        acc.append(id, &g, 300).await.unwrap();
        acc.append(id, &g, 300).await.unwrap();
        let container = acc.append(id, &g, 300).await.unwrap();
        assert_eq!(container.size, 900);
        assert_eq!(container.status, ContainerStatus::Open);
    }

    #[tokio::test]
    async fn append_overflow_is_rejected_without_effect() {
        // Spec scenario: at size 900/1000, a 200 batch must bounce.
        let (acc, store) = accumulator(500, 1000);
        let g = group("tenant-a");
        let id = ContainerId::allocate();

        for _ in 0..3 {
            acc.append(id, &g, 300).await.unwrap();
        }
        let before = store.get(&id.to_string()).await.unwrap().unwrap();

        let err = acc.append(id, &g, 200).await.unwrap_err();
        assert!(matches!(err, AccumulatorError::CapacityExceeded { size: 900, .. }));

        // Byte-for-byte unchanged, same revision.
        let after = store.get(&id.to_string()).await.unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn append_rejects_oversized_creation() {
        let (acc, store) = accumulator(0, 100);
        let g = group("tenant-a");
        let id = ContainerId::allocate();

        let err = acc.append(id, &g, 101).await.unwrap_err();
        assert!(matches!(err, AccumulatorError::CapacityExceeded { size: 0, .. }));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn append_to_exact_capacity_is_allowed() {
        let (acc, _store) = accumulator(0, 100);
        let g = group("tenant-a");
        let id = ContainerId::allocate();

        acc.append(id, &g, 60).await.unwrap();
        let container = acc.append(id, &g, 40).await.unwrap();
        assert_eq!(container.size, 100);
    }

    #[tokio::test]
    async fn append_after_close_is_state_conflict() {
        let (acc, _store) = accumulator(100, 1000);
        let g = group("tenant-a");
        let id = ContainerId::allocate();

        acc.append(id, &g, 500).await.unwrap();
        acc.close(id).await.unwrap();

        let err = acc.append(id, &g, 10).await.unwrap_err();
        assert!(matches!(
            err,
            AccumulatorError::StateConflict {
                actual: ContainerStatus::Closed,
                ..
            }
        ));
    }

    // -----------------------------------------------------------------------
    // append(): concurrency
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn concurrent_appends_all_land_when_they_fit() {
        let (acc, store) = accumulator(0, 1000);
        let acc = Arc::new(acc);
        let g = group("tenant-a");
        let id = ContainerId::allocate();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let acc = Arc::clone(&acc);
            let g = g.clone();
            handles.push(tokio::spawn(async move { acc.append(id, &g, 30).await }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let final_state = store.get(&id.to_string()).await.unwrap().unwrap();
        assert_eq!(final_state.record.size, 300);
    }

    #[tokio::test]
    async fn concurrent_appends_past_capacity_reject_the_excess() {
        // 6 batches of 30 against a ceiling of 100: exactly 3 fit.
        let (acc, store) = accumulator(0, 100);
        let acc = Arc::new(acc);
        let g = group("tenant-a");
        let id = ContainerId::allocate();

        let mut handles = Vec::new();
        for _ in 0..6 {
            let acc = Arc::clone(&acc);
            let g = g.clone();
            handles.push(tokio::spawn(async move { acc.append(id, &g, 30).await }));
        }

        let mut accepted = 0;
        let mut rejected = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(AccumulatorError::CapacityExceeded { .. }) => rejected += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(accepted, 3);
        assert_eq!(rejected, 3);

        let final_state = store.get(&id.to_string()).await.unwrap().unwrap();
        assert_eq!(final_state.record.size, 90);
    }

    // -----------------------------------------------------------------------
    // close()
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn close_lifecycle_scenario() {
        // Spec scenario 7: 300,300,300 -> close ok -> second close conflicts.
        let (acc, _store) = accumulator(500, 1000);
        let g = group("tenant-a");
        let id = ContainerId::allocate();

        for _ in 0..3 {
            acc.append(id, &g, 300).await.unwrap();
        }

        let closed = acc.close(id).await.unwrap();
        assert_eq!(closed.status, ContainerStatus::Closed);
        assert_eq!(closed.size, 900);

        let err = acc.close(id).await.unwrap_err();
        assert!(matches!(
            err,
            AccumulatorError::StateConflict {
                actual: ContainerStatus::Closed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn close_below_min_size_has_no_effect() {
        let (acc, store) = accumulator(500, 1000);
        let g = group("tenant-a");
        let id = ContainerId::allocate();

        acc.append(id, &g, 300).await.unwrap();
        let before = store.get(&id.to_string()).await.unwrap().unwrap();

        let err = acc.close(id).await.unwrap_err();
        assert!(matches!(
            err,
            AccumulatorError::InsufficientSize { size: 300, min_size: 500, .. }
        ));

        let after = store.get(&id.to_string()).await.unwrap().unwrap();
        assert_eq!(before, after);
        assert_eq!(after.record.status, ContainerStatus::Open);
    }

    #[tokio::test]
    async fn close_missing_container_is_not_found() {
        let (acc, _store) = accumulator(0, 100);
        let err = acc.close(ContainerId::allocate()).await.unwrap_err();
        assert!(matches!(err, AccumulatorError::NotFound { .. }));
    }

    #[tokio::test]
    async fn concurrent_close_has_exactly_one_winner() {
        let (acc, store) = accumulator(100, 1000);
        let acc = Arc::new(acc);
        let g = group("tenant-a");
        let id = ContainerId::allocate();
        acc.append(id, &g, 500).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..2 {
            let acc = Arc::clone(&acc);
            handles.push(tokio::spawn(async move { acc.close(id).await }));
        }

        let mut wins = 0;
        let mut conflicts = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(c) => {
                    assert_eq!(c.status, ContainerStatus::Closed);
                    wins += 1;
                }
                Err(AccumulatorError::StateConflict { actual, .. }) => {
                    assert_eq!(actual, ContainerStatus::Closed);
                    conflicts += 1;
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(conflicts, 1);

        let final_state = store.get(&id.to_string()).await.unwrap().unwrap();
        assert_eq!(final_state.record.status, ContainerStatus::Closed);
    }

    // -----------------------------------------------------------------------
    // advance()
    // -----------------------------------------------------------------------

    async fn closed_container(acc: &Accumulator) -> ContainerId {
        let g = group("tenant-a");
        let id = ContainerId::allocate();
        acc.append(id, &g, 500).await.unwrap();
        acc.close(id).await.unwrap();
        id
    }

    #[tokio::test]
    async fn advance_walks_the_offer_lifecycle() {
        let (acc, _store) = accumulator(100, 1000);
        let id = closed_container(&acc).await;

        let offered = acc
            .advance(id, ContainerStatus::Closed, ContainerStatus::Offered)
            .await
            .unwrap();
        assert_eq!(offered.status, ContainerStatus::Offered);

        let accepted = acc
            .advance(id, ContainerStatus::Offered, ContainerStatus::Accepted)
            .await
            .unwrap();
        assert_eq!(accepted.status, ContainerStatus::Accepted);
    }

    #[tokio::test]
    async fn advance_rejects_illegal_edges() {
        let (acc, _store) = accumulator(100, 1000);
        let id = closed_container(&acc).await;

        let err = acc
            .advance(id, ContainerStatus::Closed, ContainerStatus::Accepted)
            .await
            .unwrap_err();
        assert!(matches!(err, AccumulatorError::InvalidTransition { .. }));

        let err = acc
            .advance(id, ContainerStatus::Closed, ContainerStatus::Open)
            .await
            .unwrap_err();
        assert!(matches!(err, AccumulatorError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn advance_from_wrong_state_is_conflict() {
        let (acc, _store) = accumulator(100, 1000);
        let id = closed_container(&acc).await;

        // Still Closed; claiming it is Offered must conflict.
        let err = acc
            .advance(id, ContainerStatus::Offered, ContainerStatus::Accepted)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AccumulatorError::StateConflict {
                actual: ContainerStatus::Closed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn concurrent_settlement_has_one_winner() {
        let (acc, store) = accumulator(100, 1000);
        let acc = Arc::new(acc);
        let id = closed_container(&acc).await;
        acc.advance(id, ContainerStatus::Closed, ContainerStatus::Offered)
            .await
            .unwrap();

        let accept = {
            let acc = Arc::clone(&acc);
            tokio::spawn(async move {
                acc.advance(id, ContainerStatus::Offered, ContainerStatus::Accepted)
                    .await
            })
        };
        let reject = {
            let acc = Arc::clone(&acc);
            tokio::spawn(async move {
                acc.advance(id, ContainerStatus::Offered, ContainerStatus::Rejected)
                    .await
            })
        };

        let outcomes = [accept.await.unwrap(), reject.await.unwrap()];
        let wins = outcomes.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);

        let final_status = store
            .get(&id.to_string())
            .await
            .unwrap()
            .unwrap()
            .record
            .status;
        assert!(final_status.is_terminal());
    }
}
