//! Oracle reconciler for Gantry.
//!
//! Deal outcomes are owned by an external authority. On a timer, the
//! [`Reconciler`] pulls that authority's snapshot, diffs it against the
//! snapshot recorded from the last successful tick, applies only the new
//! `(piece, deal)` pairs to the [`DealRecord`] store with a bounded write
//! fan-out, and finally advances the recorded snapshot. History already
//! recorded is never re-applied and never deleted; the model is strictly
//! append-only.

pub mod contract;
pub mod diff;
pub mod error;
pub mod reconciler;
pub mod snapshot;
pub mod source;

pub use contract::{ContractEntry, DealId, DealRecord};
pub use diff::{diff_snapshots, SnapshotDiff};
pub use error::{OracleError, OracleResult};
pub use reconciler::{Reconciler, ReconcilerConfig, TickReport};
pub use snapshot::{OracleSnapshot, RawContract, RawSnapshot, SnapshotKey};
pub use source::{SnapshotSource, StaticSnapshotSource};
