//! Proof-of-work engine
//!
//! A block is admitted when the SHA-256 over its pre-hash material and a
//! nonce falls strictly below the target `2^(256 - target_bits)`. Mining
//! searches nonces from zero; validation replays the stored nonce.

use log::{debug, info};
use thiserror::Error;

use crate::core::block::Block;
use crate::core::transaction::Transaction;
use crate::crypto::hash::{meets_difficulty, sha256};

/// Default difficulty in leading zero bits
pub const DEFAULT_TARGET_BITS: u32 = 8;

/// Upper bound of the nonce search
pub const MAX_NONCE: u64 = u64::MAX;

/// Errors that can occur while mining
#[derive(Error, Debug)]
pub enum PowError {
    #[error("Nonce space exhausted without meeting the target")]
    MiningExhausted,
}

/// Nonce search over one block's pre-hash material
pub struct ProofOfWork<'a> {
    block: &'a Block,
    target_bits: u32,
}

impl<'a> ProofOfWork<'a> {
    pub fn new(block: &'a Block, target_bits: u32) -> Self {
        Self { block, target_bits }
    }

    /// Hash input: prev_hash, tx digest, timestamp, target bits, and
    /// nonce in order, numeric fields as fixed-width big-endian
    fn message(&self, nonce: u64) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&self.block.prev_hash);
        data.extend_from_slice(&self.block.transactions_digest());
        data.extend_from_slice(&self.block.timestamp.to_be_bytes());
        data.extend_from_slice(&u64::from(self.target_bits).to_be_bytes());
        data.extend_from_slice(&nonce.to_be_bytes());
        data
    }

    /// Candidate hash for one nonce
    pub fn hash_for(&self, nonce: u64) -> Vec<u8> {
        sha256(&self.message(nonce))
    }

    /// Search for a nonce whose hash falls below the target
    pub fn run(&self) -> Result<(u64, Vec<u8>), PowError> {
        debug!(
            "Mining with a target of {} leading zero bits",
            self.target_bits
        );
        for nonce in 0..MAX_NONCE {
            let hash = self.hash_for(nonce);
            if meets_difficulty(&hash, self.target_bits) {
                debug!("Found nonce {} after {} attempts", nonce, nonce + 1);
                return Ok((nonce, hash));
            }
        }
        Err(PowError::MiningExhausted)
    }

    /// True iff the block's stored nonce produces a hash below the target
    pub fn validate(&self) -> bool {
        meets_difficulty(&self.hash_for(self.block.nonce), self.target_bits)
    }
}

/// Mine a block carrying `transactions` on top of `prev_hash`
pub fn mine_block(
    transactions: Vec<Transaction>,
    prev_hash: Vec<u8>,
    target_bits: u32,
) -> Result<Block, PowError> {
    let mut block = Block::new(transactions, prev_hash);
    let (nonce, hash) = ProofOfWork::new(&block, target_bits).run()?;
    block.nonce = nonce;
    block.hash = hash;
    info!(
        "Mined block {} with nonce {}",
        hex::encode(&block.hash),
        block.nonce
    );
    Ok(block)
}
