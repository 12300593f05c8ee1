use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use gantry_types::ContentId;

use crate::error::{StoreError, StoreResult};
use crate::record::{Precondition, Record, Versioned};
use crate::traits::{ObjectStore, RecordStore};

/// In-memory, HashMap-based record store.
///
/// Intended for tests and embedding. Records are held behind a `RwLock`;
/// every preconditioned put takes the write lock, so puts are linearizable
/// per key exactly as a real conditional-write backend would be.
pub struct InMemoryRecordStore<R: Record> {
    inner: RwLock<RecordState<R>>,
}

struct RecordState<R> {
    records: HashMap<String, Versioned<R>>,
    partitions: HashMap<String, BTreeSet<String>>,
}

impl<R: Record> InMemoryRecordStore<R> {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RecordState {
                records: HashMap::new(),
                partitions: HashMap::new(),
            }),
        }
    }

    /// Number of records currently stored.
    pub fn len(&self) -> usize {
        self.inner.read().expect("lock poisoned").records.len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().expect("lock poisoned").records.is_empty()
    }

    /// Return a sorted list of all record keys.
    pub fn all_keys(&self) -> Vec<String> {
        let state = self.inner.read().expect("lock poisoned");
        let mut keys: Vec<String> = state.records.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl<R: Record> Default for InMemoryRecordStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

fn index_remove(partitions: &mut HashMap<String, BTreeSet<String>>, partition: &str, key: &str) {
    if let Some(set) = partitions.get_mut(partition) {
        set.remove(key);
        if set.is_empty() {
            partitions.remove(partition);
        }
    }
}

#[async_trait]
impl<R: Record> RecordStore<R> for InMemoryRecordStore<R> {
    async fn get(&self, key: &str) -> StoreResult<Option<Versioned<R>>> {
        let state = self.inner.read().expect("lock poisoned");
        Ok(state.records.get(key).cloned())
    }

    async fn put(&self, expected: Precondition, record: &R) -> StoreResult<Versioned<R>> {
        let key = record.storage_key();
        let mut state = self.inner.write().expect("lock poisoned");

        let current = state.records.get(&key);
        let revision = match (expected, current) {
            (Precondition::None, existing) => existing.map(|v| v.revision).unwrap_or(0) + 1,
            (Precondition::Absent, None) => 1,
            (Precondition::Absent, Some(_)) => {
                return Err(StoreError::PreconditionFailed { key });
            }
            (Precondition::Revision(rev), Some(existing)) if existing.revision == rev => rev + 1,
            (Precondition::Revision(_), _) => {
                return Err(StoreError::PreconditionFailed { key });
            }
        };

        // Record and secondary index move in the same atomic step.
        let old_partition = state
            .records
            .get(&key)
            .and_then(|old| old.record.partition_key());
        if let Some(old_partition) = old_partition {
            index_remove(&mut state.partitions, &old_partition, &key);
        }
        if let Some(partition) = record.partition_key() {
            state
                .partitions
                .entry(partition)
                .or_default()
                .insert(key.clone());
        }

        let stored = Versioned::new(record.clone(), revision);
        state.records.insert(key, stored.clone());
        Ok(stored)
    }

    async fn find_partition(&self, partition: &str) -> StoreResult<Vec<Versioned<R>>> {
        let state = self.inner.read().expect("lock poisoned");
        let Some(keys) = state.partitions.get(partition) else {
            return Ok(Vec::new());
        };
        // BTreeSet iteration gives the sorted-by-key order the trait promises.
        Ok(keys
            .iter()
            .filter_map(|k| state.records.get(k).cloned())
            .collect())
    }
}

/// In-memory, HashMap-based object store.
///
/// Objects are cloned on read; `Bytes` makes that a refcount bump.
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<ContentId, Bytes>>,
}

impl InMemoryObjectStore {
    /// Create a new empty object store.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored objects.
    pub fn total_bytes(&self) -> u64 {
        self.objects
            .read()
            .expect("lock poisoned")
            .values()
            .map(|b| b.len() as u64)
            .sum()
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(&self, bytes: Bytes) -> StoreResult<ContentId> {
        let id = ContentId::from_bytes(&bytes);
        let mut map = self.objects.write().expect("lock poisoned");
        // Idempotent: content-addressing guarantees the same key always maps
        // to the same bytes.
        map.entry(id).or_insert(bytes);
        Ok(id)
    }

    async fn get(&self, id: &ContentId) -> StoreResult<Option<Bytes>> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.get(id).cloned())
    }

    async fn exists(&self, id: &ContentId) -> StoreResult<bool> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.contains_key(id))
    }
}
