use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a container (UUID v7 for time-ordering).
///
/// Allocation is only a hint: the id distinguishes concurrent allocators by
/// timestamp, but actual creation happens through a preconditioned write, so
/// a hint that loses its race is simply discarded.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerId(uuid::Uuid);

impl ContainerId {
    /// Allocate a new time-ordered container ID (UUID v7).
    pub fn allocate() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }

    /// Short representation (first 8 characters of UUID).
    pub fn short_id(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl fmt::Debug for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContainerId({})", self.short_id())
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a capacity-bounded container.
///
/// Status only ever advances forward:
/// `Open -> Closed -> Offered -> {Accepted | Rejected}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerStatus {
    /// Accepting appends up to the capacity ceiling.
    Open,
    /// Irreversibly sealed; size is final.
    Closed,
    /// Offered to a deal counterparty; awaiting their decision.
    Offered,
    /// Counterparty accepted the offer.
    Accepted,
    /// Counterparty rejected the offer.
    Rejected,
}

impl ContainerStatus {
    /// Position along the forward-only lifecycle. Terminal states share the
    /// final rank.
    fn rank(self) -> u8 {
        match self {
            Self::Open => 0,
            Self::Closed => 1,
            Self::Offered => 2,
            Self::Accepted | Self::Rejected => 3,
        }
    }

    /// Returns `true` if `self -> next` is a legal single transition.
    pub fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Open, Self::Closed)
                | (Self::Closed, Self::Offered)
                | (Self::Offered, Self::Accepted)
                | (Self::Offered, Self::Rejected)
        )
    }

    /// Returns `true` if this status is at or past `other` in the lifecycle.
    pub fn is_at_or_past(self, other: Self) -> bool {
        self.rank() >= other.rank()
    }

    /// Returns `true` for the two terminal states.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected)
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Offered => "offered",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        };
        write!(f, "{s}")
    }
}
