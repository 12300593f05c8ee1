use std::fmt;

use async_trait::async_trait;
use gantry_types::GroupKey;

use crate::error::QueueResult;

/// Opaque handle identifying one in-flight delivery.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeliveryHandle(pub(crate) u64);

impl DeliveryHandle {
    /// The raw handle value (diagnostics only).
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for DeliveryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeliveryHandle({})", self.0)
    }
}

/// One message handed to a consumer.
#[derive(Clone, Debug)]
pub struct Delivery<M> {
    /// Handle to ack or nack this delivery.
    pub handle: DeliveryHandle,
    /// Partition the message was sent under.
    pub partition: GroupKey,
    /// Delivery attempt, starting at 1 and incremented on redelivery.
    pub attempt: u32,
    /// The message payload.
    pub message: M,
}

/// At-least-once, partition-keyed message queue.
///
/// Delivery guarantees:
/// - A sent message is delivered at least once; consumers must tolerate
///   duplicates.
/// - No ordering across partitions. Within a partition delivery is FIFO per
///   attempt, but redeliveries interleave arbitrarily.
/// - A received message stays in flight until acked (gone for good) or
///   nacked (redelivered with `attempt + 1`).
#[async_trait]
pub trait Queue<M: Clone + Send + Sync + 'static>: Send + Sync {
    /// Enqueue a message under a partition key.
    async fn send(&self, message: &M, partition: &GroupKey) -> QueueResult<()>;

    /// Receive up to `max` messages across partitions.
    async fn receive(&self, max: usize) -> QueueResult<Vec<Delivery<M>>>;

    /// Settle a delivery as processed; it is never redelivered.
    async fn ack(&self, handle: DeliveryHandle) -> QueueResult<()>;

    /// Return a delivery to its partition for redelivery.
    async fn nack(&self, handle: DeliveryHandle) -> QueueResult<()>;
}
