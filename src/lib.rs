//! Minicoin: a single-node UTXO ledger in Rust
//!
//! This crate provides a compact coin ledger featuring:
//! - Hash-chained block store over a pluggable key-value store
//! - Simplified proof of work (leading-zero-bit difficulty target)
//! - UTXO transaction model with per-input ECDSA (P-256) signatures
//! - Base58 addresses derived from SHA-256 + RIPEMD-160 key hashes
//! - Persistent unspent-output index that is rebuilt on every open
//! - Wallet storage sharing the ledger's backing store
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use minicoin::core::LedgerConfig;
//! use minicoin::node::Node;
//! use minicoin::storage::MemoryStore;
//!
//! // Open a node over an in-memory store; an empty store is
//! // bootstrapped with a wallet holding the genesis subsidy
//! let node = Node::open(Arc::new(MemoryStore::new()), LedgerConfig::default()).unwrap();
//! let owner = node.wallet_addresses().unwrap()[0].clone();
//!
//! // Pay a new wallet; this mines a block
//! let friend = node.create_wallet().unwrap();
//! node.send(&owner, &friend, 100).unwrap();
//!
//! assert_eq!(node.get_balance(&friend).unwrap(), 100);
//! assert_eq!(node.height().unwrap(), 2);
//! ```

pub mod core;
pub mod crypto;
pub mod node;
pub mod storage;
pub mod wallet;

// Re-export commonly used types
pub use core::{
    Block, Ledger, LedgerConfig, Transaction, TxInput, TxOutput, UtxoIndex, DEFAULT_TARGET_BITS,
    SUBSIDY,
};
pub use crypto::KeyPair;
pub use node::{Node, NodeError};
pub use storage::{FileStore, KvStore, MemoryStore, WriteBatch};
pub use wallet::{Wallet, WalletStore};
