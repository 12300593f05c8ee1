/// A value that can live in a [`RecordStore`](crate::RecordStore).
///
/// Records know their own primary key and, optionally, a partition key that
/// the store maintains as a secondary index (for example
/// `"{group}/{status}"` so "the open container for this group" is one
/// lookup instead of a scan).
pub trait Record: Clone + Send + Sync + 'static {
    /// Primary key the record is stored under.
    fn storage_key(&self) -> String;

    /// Secondary-index key, if the record participates in one.
    fn partition_key(&self) -> Option<String> {
        None
    }
}

/// Pieces are keyed by commitment hex and indexed by `"{group}/{status}"`,
/// so the pending candidates of a group are one partition lookup.
impl Record for gantry_types::Piece {
    fn storage_key(&self) -> String {
        self.id.to_hex()
    }

    fn partition_key(&self) -> Option<String> {
        Some(format!("{}/{}", self.group, self.status))
    }
}

/// A stored record together with its revision.
///
/// Revisions increase by one on every successful put and are the
/// compare-and-swap token for [`Precondition::Revision`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Versioned<R> {
    pub record: R,
    pub revision: u64,
}

impl<R> Versioned<R> {
    /// Pair a record with its revision.
    pub fn new(record: R, revision: u64) -> Self {
        Self { record, revision }
    }
}

/// Precondition on the current state required for a put to take effect.
///
/// This is the only synchronization primitive in the system: every domain
/// transition is expressed as read, validate locally, then put with the
/// revision that was read. Exactly one of two racing writers observes
/// success.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Precondition {
    /// Unconditional upsert (last writer wins). Only for records whose
    /// merge semantics make that safe, such as latest-snapshot slots.
    None,
    /// The record must not exist yet (create).
    Absent,
    /// The record must currently be at exactly this revision.
    Revision(u64),
}
