//! Wallet key storage
//!
//! A wallet is a key pair addressed by the base58 hash of its public
//! key. Records are kept in their own bucket keyed by address, so the
//! same store backs wallets, blocks, and the UTXO index.

use std::sync::Arc;

use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::keys::KeyPair;
use crate::storage::{KvStore, StorageError, WriteBatch};

/// Bucket holding wallet records keyed by address
pub const WALLETS_BUCKET: &str = "wallets";

/// Wallet-related errors
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Corrupt wallet record: {0}")]
    CorruptRecord(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Serialized form of one wallet
#[derive(Debug, Serialize, Deserialize)]
struct WalletRecord {
    private_key: Vec<u8>,
    public_key: Vec<u8>,
}

/// A key pair together with its derived address
#[derive(Clone)]
pub struct Wallet {
    key_pair: KeyPair,
    address: String,
}

impl Wallet {
    /// Create a wallet with a fresh key pair
    pub fn new() -> Self {
        Self::from_key_pair(KeyPair::generate())
    }

    pub fn from_key_pair(key_pair: KeyPair) -> Self {
        let address = key_pair.address();
        Self { key_pair, address }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn public_key(&self) -> &[u8] {
        self.key_pair.public_key()
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

/// Persistent collection of wallets
pub struct WalletStore {
    store: Arc<dyn KvStore>,
}

impl WalletStore {
    /// Open the wallet store, creating its bucket if needed
    pub fn open(store: Arc<dyn KvStore>) -> Result<Self, WalletError> {
        store.create_bucket(WALLETS_BUCKET)?;
        Ok(Self { store })
    }

    /// Generate a wallet, persist it, and return its address
    pub fn create_wallet(&self) -> Result<String, WalletError> {
        let wallet = Wallet::new();
        let record = WalletRecord {
            private_key: wallet.key_pair().private_key_bytes(),
            public_key: wallet.public_key().to_vec(),
        };

        let mut batch = WriteBatch::new();
        batch.put(
            WALLETS_BUCKET,
            wallet.address().as_bytes().to_vec(),
            bincode::serialize(&record)?,
        );
        self.store.apply(batch)?;
        info!("Created wallet {}", wallet.address());
        Ok(wallet.address().to_string())
    }

    /// Load the wallet stored under `address`, if any
    ///
    /// A record that fails to decode, or whose key no longer derives
    /// the address it is stored under, is reported as corrupt.
    pub fn get(&self, address: &str) -> Result<Option<Wallet>, WalletError> {
        let bytes = match self.store.get(WALLETS_BUCKET, address.as_bytes())? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        let record: WalletRecord = bincode::deserialize(&bytes)
            .map_err(|err| WalletError::CorruptRecord(err.to_string()))?;
        let key_pair = KeyPair::from_private_key_bytes(&record.private_key)
            .map_err(|err| WalletError::CorruptRecord(err.to_string()))?;
        let wallet = Wallet::from_key_pair(key_pair);
        if wallet.address() != address {
            return Err(WalletError::CorruptRecord(format!(
                "record stored under {} derives address {}",
                address,
                wallet.address()
            )));
        }
        Ok(Some(wallet))
    }

    /// All stored addresses in sorted order
    pub fn addresses(&self) -> Result<Vec<String>, WalletError> {
        let mut addresses = Vec::new();
        for (key, _) in self.store.scan(WALLETS_BUCKET)? {
            addresses.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(addresses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash::sha256;
    use crate::crypto::keys::verify_signature;
    use crate::storage::MemoryStore;

    fn open_store() -> WalletStore {
        WalletStore::open(Arc::new(MemoryStore::new())).unwrap()
    }

    #[test]
    fn test_create_and_get_round_trip() {
        let wallets = open_store();
        let address = wallets.create_wallet().unwrap();
        let wallet = wallets.get(&address).unwrap().unwrap();
        assert_eq!(wallet.address(), address);

        let digest = sha256(b"spend authorization");
        let signature = wallet.key_pair().sign_digest(&digest).unwrap();
        assert!(verify_signature(wallet.public_key(), &digest, &signature));
    }

    #[test]
    fn test_get_unknown_address() {
        let wallets = open_store();
        assert!(wallets.get("no-such-wallet").unwrap().is_none());
    }

    #[test]
    fn test_addresses_are_sorted() {
        let wallets = open_store();
        let mut created = vec![
            wallets.create_wallet().unwrap(),
            wallets.create_wallet().unwrap(),
            wallets.create_wallet().unwrap(),
        ];
        created.sort();
        assert_eq!(wallets.addresses().unwrap(), created);
    }

    #[test]
    fn test_corrupt_record_is_rejected() {
        let wallets = open_store();
        let mut batch = WriteBatch::new();
        batch.put(WALLETS_BUCKET, b"bogus".to_vec(), b"not a record".to_vec());
        wallets.store.apply(batch).unwrap();

        assert!(matches!(
            wallets.get("bogus"),
            Err(WalletError::CorruptRecord(_))
        ));
    }

    #[test]
    fn test_record_under_wrong_address_is_rejected() {
        let wallets = open_store();
        let stray = Wallet::new();
        let record = WalletRecord {
            private_key: stray.key_pair().private_key_bytes(),
            public_key: stray.public_key().to_vec(),
        };
        let mut batch = WriteBatch::new();
        batch.put(
            WALLETS_BUCKET,
            b"someone-else".to_vec(),
            bincode::serialize(&record).unwrap(),
        );
        wallets.store.apply(batch).unwrap();

        assert!(matches!(
            wallets.get("someone-else"),
            Err(WalletError::CorruptRecord(_))
        ));
    }
}
