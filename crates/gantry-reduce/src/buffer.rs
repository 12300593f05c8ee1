use bytes::Bytes;
use serde::{Deserialize, Serialize};

use gantry_store::ObjectStore;
use gantry_types::{ContentId, GroupKey, PieceRef};

use crate::error::{ReduceError, ReduceResult};

/// An immutable, content-addressed batch of piece references.
///
/// Membership is kept sorted and deduplicated, so identity is independent
/// of merge order and of at-least-once redelivery handing the same buffer
/// to one merge twice. The buffer's [`ContentId`] is the hash of its
/// canonical encoding: identical membership, identical object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buffer {
    group: GroupKey,
    members: Vec<PieceRef>,
}

impl Buffer {
    /// Build a buffer, canonicalizing membership.
    pub fn new(group: GroupKey, mut members: Vec<PieceRef>) -> Self {
        members.sort();
        members.dedup();
        Self { group, members }
    }

    /// The buffer's partition key.
    pub fn group(&self) -> &GroupKey {
        &self.group
    }

    /// Members in canonical order.
    pub fn members(&self) -> &[PieceRef] {
        &self.members
    }

    /// Number of member pieces.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns `true` if the buffer has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Sum of raw member sizes.
    pub fn total_size(&self) -> u64 {
        self.members.iter().map(|p| p.size).sum()
    }

    /// Merge this buffer with others of the same group.
    pub fn merge(self, others: impl IntoIterator<Item = Buffer>) -> Self {
        let group = self.group.clone();
        let mut members = self.members;
        for other in others {
            members.extend(other.members);
        }
        Self::new(group, members)
    }

    /// Canonical encoding stored in the object store.
    pub fn to_bytes(&self) -> ReduceResult<Bytes> {
        let encoded = bincode::serialize(self)
            .map_err(|e| ReduceError::Store(gantry_store::StoreError::Serialization(e.to_string())))?;
        Ok(Bytes::from(encoded))
    }

    /// The content id this buffer stores under.
    pub fn content_id(&self) -> ReduceResult<ContentId> {
        Ok(ContentId::from_bytes(&self.to_bytes()?))
    }

    /// Write the buffer to the object store and return its key.
    pub async fn store(&self, objects: &dyn ObjectStore) -> ReduceResult<ContentId> {
        Ok(objects.put(self.to_bytes()?).await?)
    }

    /// Load and decode a buffer; `Ok(None)` if the object is absent.
    pub async fn load(
        objects: &dyn ObjectStore,
        id: &ContentId,
    ) -> ReduceResult<Option<Buffer>> {
        let Some(bytes) = objects.get(id).await? else {
            return Ok(None);
        };
        let buffer = bincode::deserialize(&bytes).map_err(|e| ReduceError::CorruptBuffer {
            id: *id,
            reason: e.to_string(),
        })?;
        Ok(Some(buffer))
    }
}

/// Queue message referencing one stored buffer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferMessage {
    /// Object-store key of the buffer.
    pub buffer: ContentId,
    /// Partition the buffer belongs to; also the queue partition key.
    pub group: GroupKey,
    /// Sum of raw member sizes, carried so consumers can gauge mass
    /// without fetching the object.
    pub total_size: u64,
}

impl BufferMessage {
    /// Describe a stored buffer.
    pub fn describe(buffer: &Buffer, id: ContentId) -> Self {
        Self {
            buffer: id,
            group: buffer.group().clone(),
            total_size: buffer.total_size(),
        }
    }
}
