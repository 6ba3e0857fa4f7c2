//! Key-value storage contract
//!
//! All durable state (blocks, UTXO entries, wallets) lives behind the
//! [`KvStore`] trait: named buckets of byte keys and values, with atomic
//! multi-operation writes. Engines are swappable; tests run against the
//! in-memory store and the CLI runs against the file-backed one.

use thiserror::Error;

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] bincode::Error),
    #[error("Backend error: {0}")]
    BackendError(String),
}

/// A single operation inside a [`WriteBatch`].
#[derive(Debug, Clone)]
pub enum BatchOp {
    Put {
        bucket: String,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        bucket: String,
        key: Vec<u8>,
    },
    CreateBucket {
        bucket: String,
    },
    DeleteBucket {
        bucket: String,
    },
}

/// An ordered group of operations committed atomically.
///
/// Either every operation lands or none do. A batch may create and delete
/// buckets, so a full index rebuild is a single commit.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a put into `bucket`.
    pub fn put(&mut self, bucket: &str, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put {
            bucket: bucket.to_string(),
            key,
            value,
        });
    }

    /// Queue a key deletion. Deleting an absent key is a no-op.
    pub fn delete(&mut self, bucket: &str, key: Vec<u8>) {
        self.ops.push(BatchOp::Delete {
            bucket: bucket.to_string(),
            key,
        });
    }

    /// Queue an idempotent bucket creation.
    pub fn create_bucket(&mut self, bucket: &str) {
        self.ops.push(BatchOp::CreateBucket {
            bucket: bucket.to_string(),
        });
    }

    /// Queue a bucket drop with all its contents. Dropping an absent
    /// bucket is a no-op.
    pub fn delete_bucket(&mut self, bucket: &str) {
        self.ops.push(BatchOp::DeleteBucket {
            bucket: bucket.to_string(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Operations in queue order, for engines validating before applying.
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Consume the batch for application.
    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

/// Contract every storage engine implements.
///
/// Semantics: bucket creation is idempotent; `get` and `scan` on a missing
/// bucket fail with [`StorageError::BucketNotFound`]; `scan` returns a
/// consistent snapshot in ascending key order; `apply` commits the whole
/// batch or nothing.
pub trait KvStore: Send + Sync {
    /// Create a bucket if it does not exist yet.
    fn create_bucket(&self, bucket: &str) -> Result<(), StorageError>;

    /// Fetch a value; `Ok(None)` when the key is absent.
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Snapshot of every pair in the bucket, ascending by key.
    fn scan(&self, bucket: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError>;

    /// Apply a batch atomically.
    fn apply(&self, batch: WriteBatch) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_accumulates_ops_in_order() {
        let mut batch = WriteBatch::new();
        assert!(batch.is_empty());

        batch.create_bucket("a");
        batch.put("a", b"k".to_vec(), b"v".to_vec());
        batch.delete("a", b"k".to_vec());
        batch.delete_bucket("a");

        assert_eq!(batch.len(), 4);
        assert!(matches!(batch.ops()[0], BatchOp::CreateBucket { .. }));
        assert!(matches!(batch.ops()[3], BatchOp::DeleteBucket { .. }));
    }
}
