//! Hash-chained block store
//!
//! Blocks live in a single bucket keyed by hash, with a sentinel key
//! holding the hash of the newest block. Appending verifies every
//! transaction, mines a proof-of-work nonce, and commits the block and
//! the new tip in one batch. Reads replay the integrity checks so that
//! on-disk tampering surfaces as an error instead of bad data.

use std::sync::Arc;

use log::info;
use thiserror::Error;

use crate::core::block::Block;
use crate::core::pow::{mine_block, PowError, ProofOfWork, DEFAULT_TARGET_BITS};
use crate::core::transaction::{PriorTxLookup, Transaction, TransactionError};
use crate::crypto::hash::meets_difficulty;
use crate::storage::{KvStore, StorageError, WriteBatch};

/// Bucket holding serialized blocks keyed by hash
pub const BLOCKS_BUCKET: &str = "blocks";

/// Sentinel key holding the hash of the newest block
pub const TIP_KEY: &[u8] = b"tip";

/// Memo embedded in the genesis coinbase
pub const GENESIS_MEMO: &str = "Genesis block";

/// Tunable ledger parameters
#[derive(Debug, Clone, Copy)]
pub struct LedgerConfig {
    /// Difficulty in leading zero bits
    pub target_bits: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            target_bits: DEFAULT_TARGET_BITS,
        }
    }
}

/// Errors raised by ledger operations
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Ledger has no genesis block yet")]
    NotInitialized,
    #[error("Refusing to append a block with no transactions")]
    EmptyBlock,
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),
    #[error("Block not found")]
    BlockNotFound,
    #[error("Stored block fails integrity checks")]
    TamperedBlock,
    #[error("Transaction not found")]
    TransactionNotFound,
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),
    #[error("Mining error: {0}")]
    Mining(#[from] PowError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// The block chain: an append-only sequence of mined blocks
pub struct Ledger {
    store: Arc<dyn KvStore>,
    config: LedgerConfig,
    tip: Option<Vec<u8>>,
}

impl Ledger {
    /// Open the ledger, creating the blocks bucket and loading the tip
    pub fn open(store: Arc<dyn KvStore>, config: LedgerConfig) -> Result<Self, LedgerError> {
        store.create_bucket(BLOCKS_BUCKET)?;
        let tip = store.get(BLOCKS_BUCKET, TIP_KEY)?;
        Ok(Self { store, config, tip })
    }

    /// True once a genesis block exists
    pub fn is_initialized(&self) -> bool {
        self.tip.is_some()
    }

    /// Hash of the newest block, if any
    pub fn tip(&self) -> Option<&[u8]> {
        self.tip.as_deref()
    }

    /// Mine the genesis block paying the subsidy to `address`
    ///
    /// Calling this on an initialized ledger returns the existing
    /// genesis chain head instead of minting again.
    pub fn create_genesis(&mut self, address: &str) -> Result<Block, LedgerError> {
        if let Some(tip) = self.tip.clone() {
            return self.read_block(&tip);
        }
        let coinbase = Transaction::new_coinbase(address, Some(GENESIS_MEMO))?;
        let block = mine_block(vec![coinbase], Vec::new(), self.config.target_bits)?;
        self.commit_block(&block)?;
        self.tip = Some(block.hash.clone());
        info!("Created genesis block {}", hex::encode(&block.hash));
        Ok(block)
    }

    /// Verify `transactions`, mine them into a block on the current
    /// tip, and commit it
    pub fn append(&mut self, transactions: Vec<Transaction>) -> Result<Block, LedgerError> {
        let tip = self.tip.clone().ok_or(LedgerError::NotInitialized)?;
        if transactions.is_empty() {
            return Err(LedgerError::EmptyBlock);
        }
        for tx in &transactions {
            if !tx.is_coinbase() && tx.inputs.is_empty() {
                return Err(LedgerError::InvalidTransaction(format!(
                    "{} has no inputs",
                    hex::encode(&tx.id)
                )));
            }
            // Signatures cover the trimmed content, not the stored id,
            // so an id that drifted from the content must be caught
            // here; read_block would refuse the block afterwards
            if !tx.id_matches_content()? {
                return Err(LedgerError::InvalidTransaction(format!(
                    "{} does not match its content",
                    hex::encode(&tx.id)
                )));
            }
            if !tx.verify(self)? {
                return Err(LedgerError::InvalidTransaction(format!(
                    "{} failed signature verification",
                    hex::encode(&tx.id)
                )));
            }
        }
        let block = mine_block(transactions, tip, self.config.target_bits)?;
        self.commit_block(&block)?;
        self.tip = Some(block.hash.clone());
        Ok(block)
    }

    /// Iterate blocks from the tip back to genesis
    pub fn iter(&self) -> ChainIterator<'_> {
        ChainIterator {
            ledger: self,
            next_hash: self.tip.clone(),
        }
    }

    /// Number of blocks in the chain
    pub fn height(&self) -> Result<u64, LedgerError> {
        let mut height = 0;
        for block in self.iter() {
            block?;
            height += 1;
        }
        Ok(height)
    }

    /// Scan the chain for the transaction with the given id
    pub fn find_transaction(&self, txid: &[u8]) -> Result<Transaction, LedgerError> {
        for block in self.iter() {
            for tx in block?.transactions {
                if tx.id.as_slice() == txid {
                    return Ok(tx);
                }
            }
        }
        Err(LedgerError::TransactionNotFound)
    }

    /// Load a block by hash, rejecting anything that fails integrity
    /// checks
    ///
    /// The proof-of-work digest covers transaction ids rather than full
    /// payloads, so each transaction id is also re-checked against its
    /// content here.
    pub fn read_block(&self, hash: &[u8]) -> Result<Block, LedgerError> {
        let bytes = self
            .store
            .get(BLOCKS_BUCKET, hash)?
            .ok_or(LedgerError::BlockNotFound)?;
        let block = Block::decode(&bytes)?;

        let recomputed = ProofOfWork::new(&block, self.config.target_bits).hash_for(block.nonce);
        if block.hash.as_slice() != hash
            || recomputed != block.hash
            || !meets_difficulty(&recomputed, self.config.target_bits)
        {
            return Err(LedgerError::TamperedBlock);
        }
        for tx in &block.transactions {
            if !tx.id_matches_content()? {
                return Err(LedgerError::TamperedBlock);
            }
        }
        Ok(block)
    }

    /// Write the block and the moved tip in one batch
    fn commit_block(&self, block: &Block) -> Result<(), LedgerError> {
        let mut batch = WriteBatch::new();
        batch.put(BLOCKS_BUCKET, block.hash.clone(), block.encode()?);
        batch.put(BLOCKS_BUCKET, TIP_KEY.to_vec(), block.hash.clone());
        self.store.apply(batch)?;
        Ok(())
    }
}

impl PriorTxLookup for Ledger {
    fn find_prior_tx(&self, txid: &[u8]) -> Result<Option<Transaction>, TransactionError> {
        match self.find_transaction(txid) {
            Ok(tx) => Ok(Some(tx)),
            Err(LedgerError::TransactionNotFound) => Ok(None),
            Err(LedgerError::Storage(err)) => Err(TransactionError::Storage(err)),
            Err(LedgerError::Transaction(err)) => Err(err),
            Err(other) => Err(TransactionError::PriorLookup(other.to_string())),
        }
    }
}

/// Iterator walking the chain from newest to oldest block
pub struct ChainIterator<'a> {
    ledger: &'a Ledger,
    next_hash: Option<Vec<u8>>,
}

impl Iterator for ChainIterator<'_> {
    type Item = Result<Block, LedgerError>;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.next_hash.take()?;
        match self.ledger.read_block(&hash) {
            Ok(block) => {
                if !block.is_genesis() {
                    self.next_hash = Some(block.prev_hash.clone());
                }
                Some(Ok(block))
            }
            Err(err) => Some(Err(err)),
        }
    }
}
