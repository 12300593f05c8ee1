use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::RwLock;

use async_trait::async_trait;
use gantry_types::GroupKey;
use tracing::debug;

use crate::error::{QueueError, QueueResult};
use crate::traits::{Delivery, DeliveryHandle, Queue};

/// In-memory, FIFO-per-partition queue.
///
/// Intended for tests and embedding. Messages move from their partition's
/// queue to an in-flight table on receive; `ack` drops them, `nack` pushes
/// them back with an incremented attempt counter. There is no visibility
/// timeout: an in-flight message that is never settled stays in flight, as
/// a crashed consumer's messages would until the broker's timeout fires.
pub struct InMemoryQueue<M> {
    inner: RwLock<QueueState<M>>,
}

struct QueueState<M> {
    next_handle: u64,
    // BTreeMap so receive drains partitions in a stable order.
    partitions: BTreeMap<GroupKey, VecDeque<Pending<M>>>,
    in_flight: HashMap<u64, InFlight<M>>,
}

struct Pending<M> {
    message: M,
    attempt: u32,
}

struct InFlight<M> {
    partition: GroupKey,
    message: M,
    attempt: u32,
}

impl<M: Clone + Send + Sync + 'static> InMemoryQueue<M> {
    /// Create a new empty queue.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(QueueState {
                next_handle: 0,
                partitions: BTreeMap::new(),
                in_flight: HashMap::new(),
            }),
        }
    }

    /// Messages waiting across all partitions (not counting in-flight).
    pub fn depth(&self) -> usize {
        let state = self.inner.read().expect("lock poisoned");
        state.partitions.values().map(VecDeque::len).sum()
    }

    /// Messages currently received but not yet settled.
    pub fn in_flight(&self) -> usize {
        self.inner.read().expect("lock poisoned").in_flight.len()
    }

    /// Returns `true` if nothing is queued or in flight.
    pub fn is_idle(&self) -> bool {
        let state = self.inner.read().expect("lock poisoned");
        state.in_flight.is_empty() && state.partitions.values().all(VecDeque::is_empty)
    }
}

impl<M: Clone + Send + Sync + 'static> Default for InMemoryQueue<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<M: Clone + Send + Sync + 'static> Queue<M> for InMemoryQueue<M> {
    async fn send(&self, message: &M, partition: &GroupKey) -> QueueResult<()> {
        let mut state = self.inner.write().expect("lock poisoned");
        state
            .partitions
            .entry(partition.clone())
            .or_default()
            .push_back(Pending {
                message: message.clone(),
                attempt: 0,
            });
        Ok(())
    }

    async fn receive(&self, max: usize) -> QueueResult<Vec<Delivery<M>>> {
        let mut state = self.inner.write().expect("lock poisoned");
        let state = &mut *state;
        let mut out = Vec::new();

        'outer: for (partition, pending) in state.partitions.iter_mut() {
            while let Some(next) = pending.pop_front() {
                let handle = DeliveryHandle(state.next_handle);
                state.next_handle += 1;
                let attempt = next.attempt + 1;
                state.in_flight.insert(
                    handle.0,
                    InFlight {
                        partition: partition.clone(),
                        message: next.message.clone(),
                        attempt,
                    },
                );
                out.push(Delivery {
                    handle,
                    partition: partition.clone(),
                    attempt,
                    message: next.message,
                });
                if out.len() == max {
                    break 'outer;
                }
            }
        }

        Ok(out)
    }

    async fn ack(&self, handle: DeliveryHandle) -> QueueResult<()> {
        let mut state = self.inner.write().expect("lock poisoned");
        state
            .in_flight
            .remove(&handle.0)
            .map(|_| ())
            .ok_or(QueueError::UnknownDelivery(handle.0))
    }

    async fn nack(&self, handle: DeliveryHandle) -> QueueResult<()> {
        let mut state = self.inner.write().expect("lock poisoned");
        let entry = state
            .in_flight
            .remove(&handle.0)
            .ok_or(QueueError::UnknownDelivery(handle.0))?;
        debug!(partition = %entry.partition, attempt = entry.attempt, "redelivering message");
        state
            .partitions
            .entry(entry.partition)
            .or_default()
            .push_back(Pending {
                message: entry.message,
                attempt: entry.attempt,
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(name: &str) -> GroupKey {
        GroupKey::new(name).unwrap()
    }

    // -----------------------------------------------------------------------
    // Send / receive
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn send_and_receive_roundtrip() {
        let queue = InMemoryQueue::new();
        queue.send(&"m1".to_string(), &group("a")).await.unwrap();

        let batch = queue.receive(10).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].message, "m1");
        assert_eq!(batch[0].partition, group("a"));
        assert_eq!(batch[0].attempt, 1);
    }

    #[tokio::test]
    async fn receive_respects_max() {
        let queue = InMemoryQueue::new();
        for i in 0..5 {
            queue.send(&format!("m{i}"), &group("a")).await.unwrap();
        }
        let batch = queue.receive(3).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(queue.depth(), 2);
        assert_eq!(queue.in_flight(), 3);
    }

    #[tokio::test]
    async fn partitions_carry_their_key() {
        let queue = InMemoryQueue::new();
        queue.send(&"a1".to_string(), &group("a")).await.unwrap();
        queue.send(&"b1".to_string(), &group("b")).await.unwrap();

        let batch = queue.receive(10).await.unwrap();
        assert_eq!(batch.len(), 2);
        let partitions: Vec<_> = batch.iter().map(|d| d.partition.clone()).collect();
        assert!(partitions.contains(&group("a")));
        assert!(partitions.contains(&group("b")));
    }

    #[tokio::test]
    async fn fifo_within_partition() {
        let queue = InMemoryQueue::new();
        queue.send(&"first".to_string(), &group("a")).await.unwrap();
        queue.send(&"second".to_string(), &group("a")).await.unwrap();

        let batch = queue.receive(10).await.unwrap();
        assert_eq!(batch[0].message, "first");
        assert_eq!(batch[1].message, "second");
    }

    // -----------------------------------------------------------------------
    // Ack / nack
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn ack_settles_for_good() {
        let queue = InMemoryQueue::new();
        queue.send(&"m".to_string(), &group("a")).await.unwrap();
        let batch = queue.receive(1).await.unwrap();
        queue.ack(batch[0].handle).await.unwrap();

        assert!(queue.is_idle());
        assert!(queue.receive(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn nack_redelivers_with_bumped_attempt() {
        let queue = InMemoryQueue::new();
        queue.send(&"m".to_string(), &group("a")).await.unwrap();

        let first = queue.receive(1).await.unwrap();
        assert_eq!(first[0].attempt, 1);
        queue.nack(first[0].handle).await.unwrap();

        let second = queue.receive(1).await.unwrap();
        assert_eq!(second[0].attempt, 2);
        assert_eq!(second[0].message, "m");
    }

    #[tokio::test]
    async fn double_settle_is_an_error() {
        let queue = InMemoryQueue::new();
        queue.send(&"m".to_string(), &group("a")).await.unwrap();
        let batch = queue.receive(1).await.unwrap();
        queue.ack(batch[0].handle).await.unwrap();

        let err = queue.ack(batch[0].handle).await.unwrap_err();
        assert!(matches!(err, QueueError::UnknownDelivery(_)));
        let err = queue.nack(batch[0].handle).await.unwrap_err();
        assert!(matches!(err, QueueError::UnknownDelivery(_)));
    }

    #[tokio::test]
    async fn unsettled_messages_stay_in_flight() {
        let queue = InMemoryQueue::new();
        queue.send(&"m".to_string(), &group("a")).await.unwrap();
        let _batch = queue.receive(1).await.unwrap();

        // Not acked, not nacked: nothing to receive, not idle.
        assert!(queue.receive(1).await.unwrap().is_empty());
        assert!(!queue.is_idle());
        assert_eq!(queue.in_flight(), 1);
    }
}
