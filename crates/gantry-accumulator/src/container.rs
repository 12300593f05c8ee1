use serde::{Deserialize, Serialize};

use gantry_store::Record;
use gantry_types::{ContainerId, ContainerStatus, GroupKey};

use crate::error::{AccumulatorError, AccumulatorResult};

/// Size bounds a container is created with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityLimits {
    /// A container may not close below this size. Zero disables the guard
    /// (used for containers born at their final size).
    pub min_size: u64,
    /// Hard ceiling; `size <= max_size` holds at all times.
    pub max_size: u64,
}

impl CapacityLimits {
    /// Create validated limits.
    pub fn new(min_size: u64, max_size: u64) -> AccumulatorResult<Self> {
        if min_size > max_size {
            return Err(AccumulatorError::InvalidLimits { min_size, max_size });
        }
        Ok(Self { min_size, max_size })
    }
}

/// A capacity-bounded, state-machined accumulator record.
///
/// Containers are the synchronization point of the pipeline: every mutation
/// is a preconditioned write, so `size <= max_size` and the forward-only
/// status lifecycle hold under any number of concurrent writers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    pub group: GroupKey,
    pub status: ContainerStatus,
    /// Accumulated bytes; append-only while `Open`, frozen afterwards.
    pub size: u64,
    pub min_size: u64,
    pub max_size: u64,
    /// Milliseconds since UNIX epoch.
    pub created_at: u64,
    pub updated_at: u64,
}

impl Container {
    /// Bytes still available below the ceiling.
    pub fn remaining(&self) -> u64 {
        self.max_size.saturating_sub(self.size)
    }

    /// Returns `true` if the container may close at its current size.
    pub fn can_close(&self) -> bool {
        self.status == ContainerStatus::Open && self.size >= self.min_size
    }
}

/// Secondary-index key for `(group, status)` lookups.
pub(crate) fn status_partition(group: &GroupKey, status: ContainerStatus) -> String {
    format!("{group}/{status}")
}

impl Record for Container {
    fn storage_key(&self) -> String {
        self.id.to_string()
    }

    fn partition_key(&self) -> Option<String> {
        Some(status_partition(&self.group, self.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_types::epoch_ms;

    fn container(status: ContainerStatus, size: u64) -> Container {
        let now = epoch_ms();
        Container {
            id: ContainerId::allocate(),
            group: GroupKey::new("tenant-a").unwrap(),
            status,
            size,
            min_size: 500,
            max_size: 1000,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn limits_reject_min_above_max() {
        assert!(CapacityLimits::new(10, 5).is_err());
        assert!(CapacityLimits::new(5, 10).is_ok());
        assert!(CapacityLimits::new(0, 0).is_ok());
    }

    #[test]
    fn remaining_saturates() {
        let c = container(ContainerStatus::Open, 900);
        assert_eq!(c.remaining(), 100);
    }

    #[test]
    fn can_close_requires_open_and_min_size() {
        assert!(container(ContainerStatus::Open, 500).can_close());
        assert!(!container(ContainerStatus::Open, 499).can_close());
        assert!(!container(ContainerStatus::Closed, 900).can_close());
    }

    #[test]
    fn partition_key_tracks_group_and_status() {
        let c = container(ContainerStatus::Open, 0);
        assert_eq!(c.partition_key().unwrap(), "tenant-a/open");
        let c = container(ContainerStatus::Offered, 900);
        assert_eq!(c.partition_key().unwrap(), "tenant-a/offered");
    }

    #[test]
    fn serde_roundtrip() {
        let c = container(ContainerStatus::Open, 42);
        let json = serde_json::to_string(&c).unwrap();
        let parsed: Container = serde_json::from_str(&json).unwrap();
        assert_eq!(c, parsed);
    }
}
