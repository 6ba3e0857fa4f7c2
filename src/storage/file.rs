//! File-backed storage engine
//!
//! Persists the bucket map as a single binary snapshot. Every committed
//! batch rewrites the snapshot through a temporary file followed by an
//! atomic rename, so a crash leaves either the old state or the new one,
//! never a torn file.

use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::debug;

use super::kv::{KvStore, StorageError, WriteBatch};
use super::memory::{apply_to_buckets, bucket_of, Buckets};

/// Storage engine snapshotting all buckets to one file.
pub struct FileStore {
    path: PathBuf,
    buckets: RwLock<Buckets>,
}

impl FileStore {
    /// Open a store at `path`, loading the existing snapshot if present.
    /// The parent directory is created when missing.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }

        let buckets = if path.exists() {
            let file = fs::File::open(&path)?;
            let reader = BufReader::new(file);
            bincode::deserialize_from(reader)?
        } else {
            Buckets::new()
        };

        debug!("Opened file store at {}", path.display());
        Ok(Self {
            path,
            buckets: RwLock::new(buckets),
        })
    }

    /// Write the snapshot to a temporary file, then rename over the live
    /// one.
    fn persist(&self, buckets: &Buckets) -> Result<(), StorageError> {
        let temp_path = self.path.with_extension("tmp");
        let file = fs::File::create(&temp_path)?;
        let writer = BufWriter::new(file);
        bincode::serialize_into(writer, buckets)?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
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

impl KvStore for FileStore {
    fn create_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        let mut batch = WriteBatch::new();
        batch.create_bucket(bucket);
        self.apply(batch)
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

    /// The batch lands on a copy of the map, the copy goes to disk, and
    /// only then is it swapped in, so memory and file never disagree.
    fn apply(&self, batch: WriteBatch) -> Result<(), StorageError> {
        let mut guard = self.write()?;
        let mut next = guard.clone();
        apply_to_buckets(&mut next, batch)?;
        self.persist(&next)?;
        *guard = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reopen_restores_state() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("store.db");

        {
            let store = FileStore::open(&path).unwrap();
            store.create_bucket("b").unwrap();
            let mut batch = WriteBatch::new();
            batch.put("b", b"k".to_vec(), b"v".to_vec());
            store.apply(batch).unwrap();
        }

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("b", b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("dir").join("store.db");

        let store = FileStore::open(&path).unwrap();
        store.create_bucket("b").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_rejected_batch_changes_nothing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("store.db");

        let store = FileStore::open(&path).unwrap();
        store.create_bucket("b").unwrap();

        let mut batch = WriteBatch::new();
        batch.put("b", b"k".to_vec(), b"v".to_vec());
        batch.put("missing", b"k".to_vec(), b"v".to_vec());
        assert!(store.apply(batch).is_err());
        assert_eq!(store.get("b", b"k").unwrap(), None);

        // The on-disk snapshot must agree
        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("b", b"k").unwrap(), None);
    }

    #[test]
    fn test_scan_returns_key_order_after_reload() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("store.db");

        {
            let store = FileStore::open(&path).unwrap();
            store.create_bucket("b").unwrap();
            let mut batch = WriteBatch::new();
            batch.put("b", vec![9], b"z".to_vec());
            batch.put("b", vec![1], b"a".to_vec());
            store.apply(batch).unwrap();
        }

        let reopened = FileStore::open(&path).unwrap();
        let keys: Vec<Vec<u8>> = reopened
            .scan("b")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![vec![1], vec![9]]);
    }
}
