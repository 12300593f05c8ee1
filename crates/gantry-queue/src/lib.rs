//! At-least-once, partition-keyed message queue abstraction for Gantry.
//!
//! The buffer-reduction stage is queue-driven: ingestion enqueues one
//! message per buffer, and consumers receive batches, merge what pairs up,
//! and nack what doesn't so the broker redelivers only the failed items.
//! [`Queue`] captures exactly the guarantees the reducer relies on
//! (at-least-once delivery, per-message partition key, per-item settlement)
//! and nothing more.
//!
//! [`InMemoryQueue`] is the embedded implementation used by tests and the
//! in-memory pipeline wiring.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{QueueError, QueueResult};
pub use memory::InMemoryQueue;
pub use traits::{Delivery, DeliveryHandle, Queue};
