use std::time::Duration;

use serde::Deserialize;

use gantry_store::RetryPolicy;

/// Errors from configuration parsing and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration parse error: {0}")]
    Parse(String),

    #[error("aggregate capacity {capacity} is not a power of two")]
    CapacityNotPowerOfTwo { capacity: u64 },

    #[error("min aggregate size {min} exceeds capacity {capacity}")]
    ThresholdAboveCapacity { min: u64, capacity: u64 },

    #[error("container min size {min} exceeds max size {max}")]
    ContainerLimitsInverted { min: u64, max: u64 },

    #[error("{field} must be positive")]
    ZeroField { field: &'static str },
}

/// Pipeline configuration, loadable from TOML.
///
/// Every field has a production default, so a partial file only overrides
/// what it names.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Ingestion containers may not close below this size.
    pub container_min_size: u64,
    /// Ingestion container ceiling.
    pub container_max_size: u64,
    /// Merged buffer mass required before an aggregate is built.
    pub min_aggregate_size: u64,
    /// Capacity class aggregates are packed against; a power of two.
    pub aggregate_capacity: u64,
    /// Messages pulled per reduction pass.
    pub receive_batch_size: usize,
    /// Pending pieces fetched per candidate page.
    pub candidate_page_size: usize,
    /// Concurrent deal-record writes during reconciliation.
    pub oracle_write_fan_out: usize,
    /// Attempts for transient store/queue failures, including the first.
    pub retry_max_attempts: u32,
    /// Base backoff in milliseconds; doubles per retry.
    pub retry_base_delay_ms: u64,
    /// Backoff ceiling in milliseconds.
    pub retry_max_delay_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            // 32 GiB deals, offered once half the class is filled.
            container_min_size: 1 << 34,
            container_max_size: 1 << 35,
            min_aggregate_size: 1 << 34,
            aggregate_capacity: 1 << 35,
            receive_batch_size: 16,
            candidate_page_size: 128,
            oracle_write_fan_out: 3,
            retry_max_attempts: 4,
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 5_000,
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.aggregate_capacity.is_power_of_two() {
            return Err(ConfigError::CapacityNotPowerOfTwo {
                capacity: self.aggregate_capacity,
            });
        }
        if self.min_aggregate_size > self.aggregate_capacity {
            return Err(ConfigError::ThresholdAboveCapacity {
                min: self.min_aggregate_size,
                capacity: self.aggregate_capacity,
            });
        }
        if self.container_min_size > self.container_max_size {
            return Err(ConfigError::ContainerLimitsInverted {
                min: self.container_min_size,
                max: self.container_max_size,
            });
        }
        if self.receive_batch_size == 0 {
            return Err(ConfigError::ZeroField {
                field: "receive_batch_size",
            });
        }
        if self.candidate_page_size == 0 {
            return Err(ConfigError::ZeroField {
                field: "candidate_page_size",
            });
        }
        if self.oracle_write_fan_out == 0 {
            return Err(ConfigError::ZeroField {
                field: "oracle_write_fan_out",
            });
        }
        if self.retry_max_attempts == 0 {
            return Err(ConfigError::ZeroField {
                field: "retry_max_attempts",
            });
        }
        Ok(())
    }

    /// The retry policy the stage entry points apply to transient failures.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }
}
