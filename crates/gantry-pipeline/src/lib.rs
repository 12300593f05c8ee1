//! Stage orchestration for Gantry.
//!
//! Each pipeline stage is a stateless entry point on [`Pipeline`], mapped
//! one-to-one onto its trigger:
//!
//! - `submit_pieces` — ingestion batches (queue-triggered, per-item retry)
//! - `reduce_buffers` — buffer fan-in (queue-triggered, per-item retry)
//! - `record_offer` / `settle_offer` — deal handshake notifications
//! - `reconcile` — the oracle timer tick (all-or-nothing)
//!
//! The pipeline holds no mutable state of its own; coordination lives
//! entirely in the record store's preconditioned writes, so concurrent
//! invocations of any stage are safe by construction.
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use gantry_oracle::StaticSnapshotSource;
//! use gantry_pipeline::{Pipeline, PipelineConfig};
//!
//! let source = Arc::new(StaticSnapshotSource::unreachable());
//! let pipeline = Pipeline::in_memory(PipelineConfig::default(), source).unwrap();
//! ```

pub mod config;
pub mod error;
pub mod pipeline;

pub use config::{ConfigError, PipelineConfig};
pub use error::{PipelineError, PipelineResult};
pub use pipeline::{
    ItemFailure, PieceSubmission, Pipeline, PipelineParts, ReduceSummary, StageReport,
};
