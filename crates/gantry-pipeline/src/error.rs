use gantry_accumulator::AccumulatorError;
use gantry_oracle::OracleError;
use gantry_queue::QueueError;
use gantry_reduce::ReduceError;
use gantry_store::StoreError;

use crate::config::ConfigError;

/// Errors from pipeline stage entry points.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A settlement referenced an aggregate this pipeline never recorded.
    #[error("aggregate not found: {id}")]
    AggregateNotFound { id: String },

    #[error(transparent)]
    Accumulator(#[from] AccumulatorError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Reduce(#[from] ReduceError),

    #[error(transparent)]
    Oracle(#[from] OracleError),
}

/// Result alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
