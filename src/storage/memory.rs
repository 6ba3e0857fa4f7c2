//! In-memory storage engine
//!
//! Backing store for tests and ephemeral nodes. Buckets are ordered maps
//! behind a read/write lock; a batch is validated in full before any
//! mutation lands, so a rejected batch leaves the store untouched.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::kv::{BatchOp, KvStore, StorageError, WriteBatch};

/// Bucket map shared by the map-backed engines.
pub(crate) type Buckets = BTreeMap<String, BTreeMap<Vec<u8>, Vec<u8>>>;

/// Storage engine holding all buckets in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    buckets: RwLock<Buckets>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Buckets>, StorageError> {
        self.buckets
            .read()
            .map_err(|_| StorageError::BackendError("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Buckets>, StorageError> {
        self.buckets
            .write()
            .map_err(|_| StorageError::BackendError("lock poisoned".to_string()))
    }
}

impl KvStore for MemoryStore {
    fn create_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        let mut buckets = self.write()?;
        buckets.entry(bucket.to_string()).or_default();
        Ok(())
    }

    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let buckets = self.read()?;
        Ok(bucket_of(&buckets, bucket)?.get(key).cloned())
    }

    fn scan(&self, bucket: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let buckets = self.read()?;
        Ok(bucket_of(&buckets, bucket)?
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn apply(&self, batch: WriteBatch) -> Result<(), StorageError> {
        let mut buckets = self.write()?;
        apply_to_buckets(&mut buckets, batch)
    }
}

/// Look up a bucket or fail with [`StorageError::BucketNotFound`].
pub(crate) fn bucket_of<'a>(
    buckets: &'a Buckets,
    name: &str,
) -> Result<&'a BTreeMap<Vec<u8>, Vec<u8>>, StorageError> {
    buckets
        .get(name)
        .ok_or_else(|| StorageError::BucketNotFound(name.to_string()))
}

/// Apply a batch to a bucket map. Validates every operation against the
/// bucket set as it evolves through the batch before touching the map, so
/// a failing batch changes nothing.
pub(crate) fn apply_to_buckets(buckets: &mut Buckets, batch: WriteBatch) -> Result<(), StorageError> {
    let mut present: BTreeSet<String> = buckets.keys().cloned().collect();
    for op in batch.ops() {
        match op {
            BatchOp::CreateBucket { bucket } => {
                present.insert(bucket.clone());
            }
            BatchOp::DeleteBucket { bucket } => {
                present.remove(bucket);
            }
            BatchOp::Put { bucket, .. } | BatchOp::Delete { bucket, .. } => {
                if !present.contains(bucket) {
                    return Err(StorageError::BucketNotFound(bucket.clone()));
                }
            }
        }
    }

    for op in batch.into_ops() {
        match op {
            BatchOp::CreateBucket { bucket } => {
                buckets.entry(bucket).or_default();
            }
            BatchOp::DeleteBucket { bucket } => {
                buckets.remove(&bucket);
            }
            BatchOp::Put { bucket, key, value } => {
                if let Some(map) = buckets.get_mut(&bucket) {
                    map.insert(key, value);
                }
            }
            BatchOp::Delete { bucket, key } => {
                if let Some(map) = buckets.get_mut(&bucket) {
                    map.remove(&key);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_bucket_is_idempotent() {
        let store = MemoryStore::new();
        store.create_bucket("b").unwrap();

        let mut batch = WriteBatch::new();
        batch.put("b", b"k".to_vec(), b"v".to_vec());
        store.apply(batch).unwrap();

        store.create_bucket("b").unwrap();
        assert_eq!(store.get("b", b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_get_missing_bucket_fails() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get("nope", b"k"),
            Err(StorageError::BucketNotFound(_))
        ));
    }

    #[test]
    fn test_scan_returns_key_order() {
        let store = MemoryStore::new();
        store.create_bucket("b").unwrap();

        let mut batch = WriteBatch::new();
        batch.put("b", vec![3], b"c".to_vec());
        batch.put("b", vec![1], b"a".to_vec());
        batch.put("b", vec![2], b"b".to_vec());
        store.apply(batch).unwrap();

        let keys: Vec<Vec<u8>> = store.scan("b").unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![vec![1], vec![2], vec![3]]);
    }

    #[test]
    fn test_batch_aborts_whole_on_missing_bucket() {
        let store = MemoryStore::new();
        store.create_bucket("b").unwrap();

        let mut batch = WriteBatch::new();
        batch.put("b", b"k".to_vec(), b"v".to_vec());
        batch.put("missing", b"k".to_vec(), b"v".to_vec());
        assert!(store.apply(batch).is_err());

        // The first put must not have landed
        assert_eq!(store.get("b", b"k").unwrap(), None);
    }

    #[test]
    fn test_batch_can_create_then_fill_bucket() {
        let store = MemoryStore::new();

        let mut batch = WriteBatch::new();
        batch.create_bucket("fresh");
        batch.put("fresh", b"k".to_vec(), b"v".to_vec());
        store.apply(batch).unwrap();

        assert_eq!(store.get("fresh", b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_batch_rebuilds_bucket_atomically() {
        let store = MemoryStore::new();
        store.create_bucket("b").unwrap();

        let mut fill = WriteBatch::new();
        fill.put("b", b"old".to_vec(), b"1".to_vec());
        store.apply(fill).unwrap();

        let mut rebuild = WriteBatch::new();
        rebuild.delete_bucket("b");
        rebuild.create_bucket("b");
        rebuild.put("b", b"new".to_vec(), b"2".to_vec());
        store.apply(rebuild).unwrap();

        assert_eq!(store.get("b", b"old").unwrap(), None);
        assert_eq!(store.get("b", b"new").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_delete_key_is_noop_when_absent() {
        let store = MemoryStore::new();
        store.create_bucket("b").unwrap();

        let mut batch = WriteBatch::new();
        batch.delete("b", b"ghost".to_vec());
        store.apply(batch).unwrap();
    }
}
