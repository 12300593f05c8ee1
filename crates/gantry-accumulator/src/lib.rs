//! Capacity-bounded accumulator for Gantry.
//!
//! A [`Container`] is the generic "open container accumulates bounded-size
//! batches, then irreversibly closes" entity: the pending aggregate on its
//! way to a storage deal. All coordination between concurrent pipeline
//! invocations happens through the container's preconditioned writes;
//! there is no lock manager anywhere in the system.
//!
//! # Lifecycle
//!
//! ```text
//! Open --close--> Closed --offer--> Offered --settle--> Accepted | Rejected
//! ```
//!
//! `append` grows an `Open` container up to its ceiling; `close` seals it
//! once the minimum size is reached; `advance` carries the sealed aggregate
//! through the offer/settlement handshake. Every failed guard is a tagged
//! error variant ([`AccumulatorError`]) the caller interprets per call:
//! an overflow means "pick a new container", a state conflict on an
//! idempotent transition means "already done, move on".

pub mod accumulator;
pub mod container;
pub mod error;

pub use accumulator::Accumulator;
pub use container::{CapacityLimits, Container};
pub use error::{AccumulatorError, AccumulatorResult};
