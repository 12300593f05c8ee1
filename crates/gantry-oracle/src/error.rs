use gantry_store::StoreError;

/// Errors from oracle reconciliation.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// The snapshot source was unreachable or answered with a non-success.
    /// The whole tick aborts with no local mutation; the next scheduled
    /// tick retries.
    #[error("upstream snapshot fetch failed: {reason}")]
    UpstreamFetchFailed { reason: String },

    /// Repeatedly lost the deal-record write race; transient.
    #[error("deal record {key} contended")]
    Contended { key: String },

    /// A diff-application task died before reporting a result.
    #[error("diff application aborted: {reason}")]
    ApplyAborted { reason: String },

    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result alias for oracle operations.
pub type OracleResult<T> = Result<T, OracleError>;
