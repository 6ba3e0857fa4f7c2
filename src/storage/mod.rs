//! Storage engines behind the key-value contract
//!
//! This module provides:
//! - The [`KvStore`] trait and atomic [`WriteBatch`]
//! - An in-memory engine for tests and ephemeral nodes
//! - A file-backed engine with atomic snapshot replacement

pub mod file;
pub mod kv;
pub mod memory;

pub use file::FileStore;
pub use kv::{BatchOp, KvStore, StorageError, WriteBatch};
pub use memory::MemoryStore;
