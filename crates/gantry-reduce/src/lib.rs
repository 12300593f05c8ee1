//! Buffer reducer for Gantry.
//!
//! Ingestion produces many small [`Buffer`]s of piece references; building
//! an aggregate per small batch would waste capacity. The [`Reducer`]
//! fan-ins same-group buffers from the queue: below the mass threshold, N
//! messages become one bigger buffer and one message; at the threshold, the
//! packing builder runs once and anything it refuses is carried forward in
//! a fresh buffer. Buffers are content-addressed, so redelivered work
//! re-writes identical objects and merge order never changes identity.

pub mod buffer;
pub mod error;
pub mod reducer;

pub use buffer::{Buffer, BufferMessage};
pub use error::{ReduceError, ReduceResult};
pub use reducer::{FailedGroup, ReduceReport, Reducer, ReducerConfig};
