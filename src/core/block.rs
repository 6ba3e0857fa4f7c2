//! Block structure
//!
//! Blocks chain by content hash: each one commits to its predecessor's
//! hash, a flat digest of its transaction ids, its timestamp, and the
//! difficulty in force when it was mined.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::core::transaction::Transaction;
use crate::crypto::hash::sha256;
use crate::storage::StorageError;

/// A block in the chain. `hash` and `nonce` are stamped by the
/// proof-of-work engine; everything else is fixed at construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    /// Block creation time, Unix seconds
    pub timestamp: i64,
    /// Ordered transactions; the coinbase sits first by convention
    pub transactions: Vec<Transaction>,
    /// Hash of the predecessor block; empty only for genesis
    pub prev_hash: Vec<u8>,
    /// Content hash satisfying the difficulty target
    pub hash: Vec<u8>,
    /// Nonce found by the proof-of-work search
    pub nonce: u64,
}

impl Block {
    /// Create an unmined block candidate stamped with the current time
    pub fn new(transactions: Vec<Transaction>, prev_hash: Vec<u8>) -> Self {
        Self {
            timestamp: Utc::now().timestamp(),
            transactions,
            prev_hash,
            hash: Vec::new(),
            nonce: 0,
        }
    }

    /// Flat SHA-256 over the concatenated transaction ids, in list order
    pub fn transactions_digest(&self) -> Vec<u8> {
        let mut data = Vec::new();
        for tx in &self.transactions {
            data.extend_from_slice(&tx.id);
        }
        sha256(&data)
    }

    /// True for the first block of the chain
    pub fn is_genesis(&self) -> bool {
        self.prev_hash.is_empty()
    }

    /// Binary encoding for storage
    pub fn encode(&self) -> Result<Vec<u8>, StorageError> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode a stored block
    pub fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
        Ok(bincode::deserialize(bytes)?)
    }
}
