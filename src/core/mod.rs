//! Core ledger components
//!
//! This module contains the fundamental building blocks:
//! - Transactions (UTXO model with per-input ECDSA authorization)
//! - Blocks (timestamped transaction batches linked by hash)
//! - Proof of work (nonce search below a difficulty target)
//! - Ledger (hash-chained block store with integrity checks)
//! - UTXO index (persistent unspent-output lookup)

pub mod block;
pub mod ledger;
pub mod pow;
pub mod transaction;
pub mod utxo_index;

pub use block::Block;
pub use ledger::{
    ChainIterator, Ledger, LedgerConfig, LedgerError, BLOCKS_BUCKET, GENESIS_MEMO, TIP_KEY,
};
pub use pow::{mine_block, PowError, ProofOfWork, DEFAULT_TARGET_BITS, MAX_NONCE};
pub use transaction::{
    OutPoint, PriorTxLookup, SpendableLookup, Transaction, TransactionError, TxInput, TxOutput,
    COINBASE_FILLER_LEN, SUBSIDY,
};
pub use utxo_index::{UtxoEntry, UtxoError, UtxoIndex, UTXO_BUCKET};
