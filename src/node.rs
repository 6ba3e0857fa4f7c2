//! Single-process node facade
//!
//! Wires the ledger, UTXO index, and wallet store behind one handle
//! over a shared key-value store. Opening an empty store bootstraps a
//! wallet and a genesis block; every open rebuilds the UTXO index so
//! it can never lag the chain across restarts. Sends go through a
//! mutex so the mined tip and the index always move together.

use std::sync::{Arc, Mutex, MutexGuard};

use log::info;
use thiserror::Error;

use crate::core::{
    Block, Ledger, LedgerConfig, LedgerError, Transaction, TransactionError, UtxoError, UtxoIndex,
};
use crate::crypto::address::validate_address;
use crate::storage::KvStore;
use crate::wallet::{WalletError, WalletStore};

/// Errors surfaced by node operations
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("No wallet stored for address {0}")]
    UnknownWallet(String),
    #[error("Ledger lock poisoned")]
    LockPoisoned,
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),
    #[error("UTXO index error: {0}")]
    Utxo(#[from] UtxoError),
    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),
}

/// A ledger, UTXO index, and wallet store over one backing store
pub struct Node {
    ledger: Mutex<Ledger>,
    utxo: UtxoIndex,
    wallets: WalletStore,
}

impl Node {
    /// Open a node over `store`, bootstrapping an empty ledger
    ///
    /// A store without a genesis block gets a fresh wallet and a
    /// genesis paying it the subsidy. The UTXO index is rebuilt from
    /// the chain on every open.
    pub fn open(store: Arc<dyn KvStore>, config: LedgerConfig) -> Result<Self, NodeError> {
        let wallets = WalletStore::open(store.clone())?;
        let mut ledger = Ledger::open(store.clone(), config)?;
        if !ledger.is_initialized() {
            let address = wallets.create_wallet()?;
            ledger.create_genesis(&address)?;
            info!("Bootstrapped ledger with wallet {}", address);
        }
        let utxo = UtxoIndex::open(store)?;

        let node = Self {
            ledger: Mutex::new(ledger),
            utxo,
            wallets,
        };
        node.reindex()?;
        Ok(node)
    }

    /// Generate and persist a new wallet, returning its address
    pub fn create_wallet(&self) -> Result<String, NodeError> {
        Ok(self.wallets.create_wallet()?)
    }

    /// Addresses of every stored wallet
    pub fn wallet_addresses(&self) -> Result<Vec<String>, NodeError> {
        Ok(self.wallets.addresses()?)
    }

    /// Balance of `address`, which need not belong to a local wallet
    pub fn get_balance(&self, address: &str) -> Result<u64, NodeError> {
        if !validate_address(address) {
            return Err(NodeError::InvalidAddress(address.to_string()));
        }
        Ok(self.utxo.get_balance(address)?)
    }

    /// Transfer `amount` from a local wallet to any valid address
    ///
    /// Builds and signs the transaction, mines it into a block, and
    /// folds the block into the UTXO index.
    pub fn send(&self, from: &str, to: &str, amount: u64) -> Result<Transaction, NodeError> {
        if !validate_address(from) {
            return Err(NodeError::InvalidAddress(from.to_string()));
        }
        if !validate_address(to) {
            return Err(NodeError::InvalidAddress(to.to_string()));
        }
        let wallet = self
            .wallets
            .get(from)?
            .ok_or_else(|| NodeError::UnknownWallet(from.to_string()))?;

        let mut ledger = self.lock_ledger()?;
        let tx =
            Transaction::new_transfer(wallet.key_pair(), from, to, amount, &self.utxo, &*ledger)?;
        let block = ledger.append(vec![tx.clone()])?;
        self.utxo.update(&block)?;
        info!(
            "Sent {} from {} to {} in block {}",
            amount,
            from,
            to,
            hex::encode(&block.hash)
        );
        Ok(tx)
    }

    /// Rebuild the UTXO index from the chain, returning the entry count
    pub fn reindex(&self) -> Result<usize, NodeError> {
        let ledger = self.lock_ledger()?;
        Ok(self.utxo.reindex(&ledger)?)
    }

    /// Number of blocks in the chain
    pub fn height(&self) -> Result<u64, NodeError> {
        Ok(self.lock_ledger()?.height()?)
    }

    /// All blocks from newest to oldest
    pub fn blocks(&self) -> Result<Vec<Block>, NodeError> {
        let ledger = self.lock_ledger()?;
        let blocks = ledger.iter().collect::<Result<Vec<_>, _>>()?;
        Ok(blocks)
    }

    fn lock_ledger(&self) -> Result<MutexGuard<'_, Ledger>, NodeError> {
        self.ledger.lock().map_err(|_| NodeError::LockPoisoned)
    }
}
