//! Packing and commitment builder for Gantry.
//!
//! One packing pass takes a set of pending piece references, folds as many
//! as fit into a capacity-bounded padded layout, and produces an
//! [`Aggregate`] whose identifier is derived from the layout itself. The
//! pass is pure until [`AggregateWriter::commit`], so a crash anywhere
//! before persistence just recomputes the identical aggregate.
//!
//! The commitment primitive sits behind [`CommitmentScheme`] /
//! [`CommitmentBuilder`]; [`PaddedTreeScheme`] is the deterministic
//! reference implementation.

pub mod aggregate;
pub mod commitment;
pub mod error;
pub mod padded;
pub mod plan;
pub mod writer;

pub use aggregate::Aggregate;
pub use commitment::{Commitment, CommitmentBuilder, CommitmentScheme, FoldRejection};
pub use error::{PackError, PackResult};
pub use padded::{padded_size, PaddedTreeBuilder, PaddedTreeScheme, MIN_LEAF_SIZE};
pub use plan::{plan, PackPlan};
pub use writer::AggregateWriter;
