use async_trait::async_trait;
use bytes::Bytes;
use gantry_types::ContentId;

use crate::error::{StoreError, StoreResult};
use crate::record::{Precondition, Record, Versioned};

/// Keyed record store with preconditioned writes.
///
/// All implementations must satisfy these invariants:
/// - A put with [`Precondition::Absent`] or [`Precondition::Revision`]
///   either applies atomically or fails with
///   [`StoreError::PreconditionFailed`] and leaves the record untouched.
///   No partial effect is ever visible.
/// - Revisions are per-key, start at 1, and increase by one per applied put.
/// - The secondary index tracks [`Record::partition_key`] and is updated in
///   the same atomic step as the record itself.
/// - All I/O errors are propagated, never silently ignored.
#[async_trait]
pub trait RecordStore<R: Record>: Send + Sync {
    /// Read a record by key.
    ///
    /// Returns `Ok(None)` if the record does not exist.
    async fn get(&self, key: &str) -> StoreResult<Option<Versioned<R>>>;

    /// Write a record, guarded by `expected`.
    ///
    /// The key is taken from [`Record::storage_key`]. Returns the stored
    /// record with its new revision.
    async fn put(&self, expected: Precondition, record: &R) -> StoreResult<Versioned<R>>;

    /// All records whose partition key equals `partition`, sorted by
    /// primary key for deterministic iteration.
    async fn find_partition(&self, partition: &str) -> StoreResult<Vec<Versioned<R>>>;

    /// Read a record that the caller requires to exist.
    async fn get_required(&self, key: &str) -> StoreResult<Versioned<R>> {
        self.get(key).await?.ok_or_else(|| StoreError::NotFound {
            key: key.to_string(),
        })
    }
}

/// Content-addressed byte store.
///
/// Objects are immutable once written: the key is the BLAKE3 hash of the
/// bytes, so writing identical bytes twice is a no-op and concurrent reads
/// are always safe. The store never interprets object contents.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write bytes and return their content-addressed key.
    async fn put(&self, bytes: Bytes) -> StoreResult<ContentId>;

    /// Read an object by key. Returns `Ok(None)` if absent.
    async fn get(&self, id: &ContentId) -> StoreResult<Option<Bytes>>;

    /// Check whether an object exists.
    async fn exists(&self, id: &ContentId) -> StoreResult<bool>;
}
