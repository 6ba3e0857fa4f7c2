//! UTXO transactions
//!
//! A transaction consumes outputs of prior transactions and creates new
//! ones locked to recipient key hashes:
//! - Coinbase transactions mint the block subsidy with no prior output
//! - Transfers are authorized per input with an ECDSA signature over a
//!   trimmed copy of the transaction
//! - The id is a SHA-256 digest of the transaction content, assigned
//!   before signing

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::address::{address_to_pub_key_hash, AddressError};
use crate::crypto::hash::sha256;
use crate::crypto::keys::{verify_signature, KeyError, KeyPair};
use crate::storage::StorageError;

// =============================================================================
// Constants
// =============================================================================

/// Coins minted by a coinbase transaction
pub const SUBSIDY: u64 = 1000;

/// Random bytes generated for a coinbase without an explicit memo
pub const COINBASE_FILLER_LEN: usize = 20;

// =============================================================================
// Error Types
// =============================================================================

/// Transaction-related errors
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: u64, available: u64 },
    #[error("Prior transaction {0} not found")]
    UnknownPriorTransaction(String),
    #[error("Prior transaction {txid} has no output {vout}")]
    MissingPriorOutput { txid: String, vout: u32 },
    #[error("Prior transaction lookup failed: {0}")]
    PriorLookup(String),
    #[error("Address error: {0}")]
    Address(#[from] AddressError),
    #[error("Key error: {0}")]
    Key(#[from] KeyError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

// =============================================================================
// Inputs and Outputs
// =============================================================================

/// Reference to one output of a prior transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutPoint {
    pub txid: Vec<u8>,
    pub vout: u32,
}

/// Transaction input
///
/// A coinbase input carries only an arbitrary payload. A spend input
/// names the prior output it consumes and proves ownership with a raw
/// 64-byte signature and the spender's uncompressed public key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TxInput {
    Coinbase {
        payload: Vec<u8>,
    },
    Spend {
        prev_txid: Vec<u8>,
        prev_vout: u32,
        signature: Vec<u8>,
        pub_key: Vec<u8>,
    },
}

/// Transaction output locked to a public key hash
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxOutput {
    pub value: u64,
    pub pub_key_hash: Vec<u8>,
}

impl TxOutput {
    /// Create an output locked to the key hash behind `address`
    pub fn locked_to(value: u64, address: &str) -> Result<Self, AddressError> {
        Ok(Self {
            value,
            pub_key_hash: address_to_pub_key_hash(address)?,
        })
    }

    /// Check whether this output can be spent with the given key hash
    pub fn is_locked_with(&self, pub_key_hash: &[u8]) -> bool {
        self.pub_key_hash == pub_key_hash
    }
}

// =============================================================================
// Lookup Traits
// =============================================================================

/// Source of prior transactions referenced by spend inputs
pub trait PriorTxLookup {
    fn find_prior_tx(&self, txid: &[u8]) -> Result<Option<Transaction>, TransactionError>;
}

/// Source of unspent outputs usable to fund a transfer
pub trait SpendableLookup {
    /// Collect outputs locked to `address` until `amount` is covered,
    /// returning the accumulated value and the chosen outpoints
    fn spendable_outputs(
        &self,
        address: &str,
        amount: u64,
    ) -> Result<(u64, Vec<OutPoint>), TransactionError>;
}

// =============================================================================
// Transaction
// =============================================================================

/// A coinbase or transfer transaction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub id: Vec<u8>,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// Create a coinbase minting the subsidy to `to`
    ///
    /// Without a memo the payload is filled with random hex so that two
    /// coinbases for the same recipient never collide on id.
    pub fn new_coinbase(to: &str, memo: Option<&str>) -> Result<Self, TransactionError> {
        let payload = match memo {
            Some(memo) => memo.as_bytes().to_vec(),
            None => {
                let mut filler = [0u8; COINBASE_FILLER_LEN];
                rand::thread_rng().fill(&mut filler[..]);
                hex::encode(filler).into_bytes()
            }
        };
        let mut tx = Self {
            id: Vec::new(),
            inputs: vec![TxInput::Coinbase { payload }],
            outputs: vec![TxOutput::locked_to(SUBSIDY, to)?],
        };
        tx.id = tx.digest()?;
        Ok(tx)
    }

    /// Create and sign a transfer of `amount` from `from` to `to`
    ///
    /// Funding outputs come from `spendable`; any excess over `amount`
    /// returns to the sender as a change output.
    pub fn new_transfer(
        key_pair: &KeyPair,
        from: &str,
        to: &str,
        amount: u64,
        spendable: &impl SpendableLookup,
        prior: &impl PriorTxLookup,
    ) -> Result<Self, TransactionError> {
        let (accumulated, outpoints) = spendable.spendable_outputs(from, amount)?;
        if accumulated < amount {
            return Err(TransactionError::InsufficientFunds {
                requested: amount,
                available: accumulated,
            });
        }

        let inputs = outpoints
            .into_iter()
            .map(|outpoint| TxInput::Spend {
                prev_txid: outpoint.txid,
                prev_vout: outpoint.vout,
                signature: Vec::new(),
                pub_key: key_pair.public_key().to_vec(),
            })
            .collect();

        let mut outputs = vec![TxOutput::locked_to(amount, to)?];
        if accumulated > amount {
            outputs.push(TxOutput::locked_to(accumulated - amount, from)?);
        }

        let mut tx = Self {
            id: Vec::new(),
            inputs,
            outputs,
        };
        tx.id = tx.digest()?;
        tx.sign(key_pair, prior)?;
        Ok(tx)
    }

    /// True iff this transaction mints coins instead of spending them
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && matches!(self.inputs[0], TxInput::Coinbase { .. })
    }

    /// SHA-256 over the serialized transaction with the id zeroed
    pub fn digest(&self) -> Result<Vec<u8>, TransactionError> {
        let mut scratch = self.clone();
        scratch.id = Vec::new();
        Ok(sha256(&bincode::serialize(&scratch)?))
    }

    /// Check that the stored id still matches the transaction content
    ///
    /// Ids are assigned before signing, so spend signatures are cleared
    /// before the digest is recomputed.
    pub fn id_matches_content(&self) -> Result<bool, TransactionError> {
        let mut scratch = self.clone();
        scratch.id = Vec::new();
        for input in &mut scratch.inputs {
            if let TxInput::Spend { signature, .. } = input {
                signature.clear();
            }
        }
        Ok(sha256(&bincode::serialize(&scratch)?) == self.id)
    }

    /// Copy with all spend signatures and public keys cleared, used as
    /// the base of every signing digest
    fn trimmed_copy(&self) -> Self {
        let mut trimmed = self.clone();
        for input in &mut trimmed.inputs {
            if let TxInput::Spend {
                signature, pub_key, ..
            } = input
            {
                signature.clear();
                pub_key.clear();
            }
        }
        trimmed
    }

    /// Fetch every prior transaction referenced by a spend input
    fn resolve_prior(
        &self,
        lookup: &impl PriorTxLookup,
    ) -> Result<HashMap<Vec<u8>, Transaction>, TransactionError> {
        let mut prior = HashMap::new();
        for input in &self.inputs {
            if let TxInput::Spend { prev_txid, .. } = input {
                if prior.contains_key(prev_txid) {
                    continue;
                }
                let tx = lookup.find_prior_tx(prev_txid)?.ok_or_else(|| {
                    TransactionError::UnknownPriorTransaction(hex::encode(prev_txid))
                })?;
                prior.insert(prev_txid.clone(), tx);
            }
        }
        Ok(prior)
    }

    /// Sign every spend input with `key_pair`
    ///
    /// Each input is signed over the trimmed copy with that input's
    /// public key slot holding the key hash locking the prior output.
    pub fn sign(
        &mut self,
        key_pair: &KeyPair,
        prior: &impl PriorTxLookup,
    ) -> Result<(), TransactionError> {
        if self.is_coinbase() {
            return Ok(());
        }
        let prior_map = self.resolve_prior(prior)?;
        let mut trimmed = self.trimmed_copy();

        for index in 0..self.inputs.len() {
            let (prev_txid, prev_vout) = match &self.inputs[index] {
                TxInput::Spend {
                    prev_txid,
                    prev_vout,
                    ..
                } => (prev_txid.clone(), *prev_vout),
                TxInput::Coinbase { .. } => continue,
            };
            let output = prior_output(&prior_map, &prev_txid, prev_vout)?;
            let digest = input_digest(&mut trimmed, index, &output.pub_key_hash)?;
            let signature = key_pair.sign_digest(&digest)?;
            if let TxInput::Spend { signature: slot, .. } = &mut self.inputs[index] {
                *slot = signature;
            }
        }
        Ok(())
    }

    /// Verify every spend input signature
    ///
    /// Coinbases verify trivially. A coinbase input inside a transfer,
    /// a missing signature or public key, or a signature that does not
    /// match the reconstructed digest all fail verification.
    pub fn verify(&self, prior: &impl PriorTxLookup) -> Result<bool, TransactionError> {
        if self.is_coinbase() {
            return Ok(true);
        }
        let prior_map = self.resolve_prior(prior)?;
        let mut trimmed = self.trimmed_copy();

        for index in 0..self.inputs.len() {
            let (prev_txid, prev_vout, signature, pub_key) = match &self.inputs[index] {
                TxInput::Spend {
                    prev_txid,
                    prev_vout,
                    signature,
                    pub_key,
                } => (prev_txid.clone(), *prev_vout, signature.clone(), pub_key.clone()),
                TxInput::Coinbase { .. } => return Ok(false),
            };
            if signature.is_empty() || pub_key.is_empty() {
                return Ok(false);
            }
            let output = prior_output(&prior_map, &prev_txid, prev_vout)?;
            let digest = input_digest(&mut trimmed, index, &output.pub_key_hash)?;
            if !verify_signature(&pub_key, &digest, &signature) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Digest of `scratch` with input `index` temporarily holding the key
/// hash that locks the referenced prior output
fn input_digest(
    scratch: &mut Transaction,
    index: usize,
    lock_hash: &[u8],
) -> Result<Vec<u8>, TransactionError> {
    if let TxInput::Spend { pub_key, .. } = &mut scratch.inputs[index] {
        *pub_key = lock_hash.to_vec();
    }
    let digest = scratch.digest();
    if let TxInput::Spend { pub_key, .. } = &mut scratch.inputs[index] {
        pub_key.clear();
    }
    digest
}

/// Output `vout` of transaction `txid` in the resolved prior map
fn prior_output(
    prior: &HashMap<Vec<u8>, Transaction>,
    txid: &[u8],
    vout: u32,
) -> Result<TxOutput, TransactionError> {
    let tx = prior
        .get(txid)
        .ok_or_else(|| TransactionError::UnknownPriorTransaction(hex::encode(txid)))?;
    tx.outputs
        .get(vout as usize)
        .cloned()
        .ok_or_else(|| TransactionError::MissingPriorOutput {
            txid: hex::encode(txid),
            vout,
        })
}

// =============================================================================
// Tests
// =============================================================================
