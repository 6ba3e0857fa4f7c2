//! Unspent output index
//!
//! Balance and spendable-output queries would otherwise need a full
//! chain scan, so unspent outputs are kept in their own bucket keyed by
//! transaction id. Each entry maps original output indexes to the
//! outputs that survive, which keeps spend references stable as
//! siblings are consumed. The index can always be rebuilt from the
//! chain, and is updated incrementally as blocks land.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::block::Block;
use crate::core::ledger::{Ledger, LedgerError};
use crate::core::transaction::{
    OutPoint, SpendableLookup, TransactionError, TxInput, TxOutput,
};
use crate::crypto::address::{address_to_pub_key_hash, AddressError};
use crate::storage::{KvStore, StorageError, WriteBatch};

/// Bucket holding unspent outputs keyed by transaction id
pub const UTXO_BUCKET: &str = "utxo";

/// Errors raised by index operations
#[derive(Error, Debug)]
pub enum UtxoError {
    #[error("No index entry for transaction {0}")]
    EntryNotFound(String),
    #[error("Chain error: {0}")]
    Chain(#[from] LedgerError),
    #[error("Address error: {0}")]
    Address(#[from] AddressError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Unspent outputs of one transaction, keyed by original output index
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UtxoEntry {
    pub outputs: BTreeMap<u32, TxOutput>,
}

impl UtxoEntry {
    /// Entry covering every output of a fresh transaction
    pub fn from_outputs(outputs: &[TxOutput]) -> Self {
        Self {
            outputs: outputs
                .iter()
                .enumerate()
                .map(|(vout, output)| (vout as u32, output.clone()))
                .collect(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, StorageError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Persistent index of unspent outputs
pub struct UtxoIndex {
    store: Arc<dyn KvStore>,
}

impl UtxoIndex {
    /// Open the index, creating its bucket if needed
    pub fn open(store: Arc<dyn KvStore>) -> Result<Self, UtxoError> {
        store.create_bucket(UTXO_BUCKET)?;
        Ok(Self { store })
    }

    /// Rebuild the index from a full chain scan
    ///
    /// The old bucket is dropped and the fresh entries written in the
    /// same batch, so a crash cannot leave a half-rebuilt index.
    pub fn reindex(&self, ledger: &Ledger) -> Result<usize, UtxoError> {
        let unspent = collect_unspent(ledger)?;
        let count = unspent.len();

        let mut batch = WriteBatch::new();
        batch.delete_bucket(UTXO_BUCKET);
        batch.create_bucket(UTXO_BUCKET);
        for (txid, entry) in unspent {
            batch.put(UTXO_BUCKET, txid, entry.encode()?);
        }
        self.store.apply(batch)?;
        info!("Rebuilt UTXO index with {} entries", count);
        Ok(count)
    }

    /// Fold one freshly appended block into the index
    ///
    /// Spent outputs are removed from their entries, emptied entries
    /// are deleted, and every transaction in the block contributes a
    /// new entry. All changes land in one batch.
    pub fn update(&self, block: &Block) -> Result<(), UtxoError> {
        let mut touched: BTreeMap<Vec<u8>, Option<UtxoEntry>> = BTreeMap::new();

        for tx in &block.transactions {
            for input in &tx.inputs {
                if let TxInput::Spend {
                    prev_txid,
                    prev_vout,
                    ..
                } = input
                {
                    let mut entry = match touched.get(prev_txid) {
                        Some(Some(entry)) => entry.clone(),
                        Some(None) => {
                            return Err(UtxoError::EntryNotFound(hex::encode(prev_txid)))
                        }
                        None => self.read_entry(prev_txid)?,
                    };
                    entry.outputs.remove(prev_vout);
                    let survivors = if entry.outputs.is_empty() {
                        None
                    } else {
                        Some(entry)
                    };
                    touched.insert(prev_txid.clone(), survivors);
                }
            }
            touched.insert(tx.id.clone(), Some(UtxoEntry::from_outputs(&tx.outputs)));
        }

        let mut batch = WriteBatch::new();
        for (txid, entry) in touched {
            match entry {
                Some(entry) => batch.put(UTXO_BUCKET, txid, entry.encode()?),
                None => batch.delete(UTXO_BUCKET, txid),
            }
        }
        self.store.apply(batch)?;
        debug!("Updated UTXO index for block {}", hex::encode(&block.hash));
        Ok(())
    }

    /// Sum of unspent output values locked to `address`
    pub fn get_balance(&self, address: &str) -> Result<u64, UtxoError> {
        let pub_key_hash = address_to_pub_key_hash(address)?;
        let mut balance = 0;
        for (_, entry) in self.entries()? {
            for output in entry.outputs.values() {
                if output.is_locked_with(&pub_key_hash) {
                    balance += output.value;
                }
            }
        }
        Ok(balance)
    }

    /// Snapshot of every index entry keyed by transaction id
    pub fn entries(&self) -> Result<BTreeMap<Vec<u8>, UtxoEntry>, UtxoError> {
        let mut entries = BTreeMap::new();
        for (txid, bytes) in self.store.scan(UTXO_BUCKET)? {
            entries.insert(txid, UtxoEntry::decode(&bytes)?);
        }
        Ok(entries)
    }

    /// Entry for one transaction id
    pub fn read_entry(&self, txid: &[u8]) -> Result<UtxoEntry, UtxoError> {
        let bytes = self
            .store
            .get(UTXO_BUCKET, txid)?
            .ok_or_else(|| UtxoError::EntryNotFound(hex::encode(txid)))?;
        Ok(UtxoEntry::decode(&bytes)?)
    }
}

impl SpendableLookup for UtxoIndex {
    /// Walk entries in key order, collecting outputs locked to
    /// `address` until `amount` is covered
    fn spendable_outputs(
        &self,
        address: &str,
        amount: u64,
    ) -> Result<(u64, Vec<OutPoint>), TransactionError> {
        let pub_key_hash = address_to_pub_key_hash(address)?;
        let mut accumulated = 0;
        let mut outpoints = Vec::new();

        'scan: for (txid, bytes) in self.store.scan(UTXO_BUCKET)? {
            let entry = UtxoEntry::decode(&bytes)?;
            for (vout, output) in &entry.outputs {
                if accumulated >= amount {
                    break 'scan;
                }
                if output.is_locked_with(&pub_key_hash) {
                    accumulated += output.value;
                    outpoints.push(OutPoint {
                        txid: txid.clone(),
                        vout: *vout,
                    });
                }
            }
        }
        Ok((accumulated, outpoints))
    }
}

/// Scan the whole chain and collect the outputs no input consumes
///
/// Spend references are gathered for each block before its outputs are
/// considered, so a transfer funded by an output minted in the same
/// block still resolves. If a transaction id was ever re-created, the
/// newest instance wins.
fn collect_unspent(ledger: &Ledger) -> Result<BTreeMap<Vec<u8>, UtxoEntry>, UtxoError> {
    let mut unspent: BTreeMap<Vec<u8>, UtxoEntry> = BTreeMap::new();
    let mut spent: HashMap<Vec<u8>, HashSet<u32>> = HashMap::new();
    let mut seen: HashSet<Vec<u8>> = HashSet::new();

    for block in ledger.iter() {
        let block = block?;
        for tx in &block.transactions {
            for input in &tx.inputs {
                if let TxInput::Spend {
                    prev_txid,
                    prev_vout,
                    ..
                } = input
                {
                    spent.entry(prev_txid.clone()).or_default().insert(*prev_vout);
                }
            }
        }
        for tx in &block.transactions {
            if !seen.insert(tx.id.clone()) {
                continue;
            }
            let spent_here = spent.get(&tx.id);
            let mut entry = UtxoEntry::default();
            for (vout, output) in tx.outputs.iter().enumerate() {
                let vout = vout as u32;
                if spent_here.map_or(false, |set| set.contains(&vout)) {
                    continue;
                }
                entry.outputs.insert(vout, output.clone());
            }
            if !entry.outputs.is_empty() {
                unspent.insert(tx.id.clone(), entry);
            }
        }
    }
    Ok(unspent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ledger::LedgerConfig;
    use crate::core::transaction::{Transaction, SUBSIDY};
    use crate::crypto::keys::KeyPair;
    use crate::storage::MemoryStore;

    fn setup() -> (KeyPair, Ledger, UtxoIndex) {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let owner = KeyPair::generate();
        let mut ledger = Ledger::open(store.clone(), LedgerConfig::default()).unwrap();
        ledger.create_genesis(&owner.address()).unwrap();
        let utxo = UtxoIndex::open(store).unwrap();
        utxo.reindex(&ledger).unwrap();
        (owner, ledger, utxo)
    }

    fn transfer(
        ledger: &mut Ledger,
        utxo: &UtxoIndex,
        from: &KeyPair,
        to: &str,
        amount: u64,
    ) -> Block {
        let tx =
            Transaction::new_transfer(from, &from.address(), to, amount, utxo, &*ledger).unwrap();
        let block = ledger.append(vec![tx]).unwrap();
        utxo.update(&block).unwrap();
        block
    }

    #[test]
    fn test_reindex_after_genesis() {
        let (owner, _ledger, utxo) = setup();
        let other = KeyPair::generate();
        assert_eq!(utxo.entries().unwrap().len(), 1);
        assert_eq!(utxo.get_balance(&owner.address()).unwrap(), SUBSIDY);
        assert_eq!(utxo.get_balance(&other.address()).unwrap(), 0);
    }

    #[test]
    fn test_update_matches_reindex() {
        let (owner, mut ledger, utxo) = setup();
        let recipient = KeyPair::generate();
        transfer(&mut ledger, &utxo, &owner, &recipient.address(), 100);

        assert_eq!(utxo.get_balance(&owner.address()).unwrap(), SUBSIDY - 100);
        assert_eq!(utxo.get_balance(&recipient.address()).unwrap(), 100);

        let incremental = utxo.entries().unwrap();
        utxo.reindex(&ledger).unwrap();
        assert_eq!(utxo.entries().unwrap(), incremental);
    }

    #[test]
    fn test_reindex_is_idempotent() {
        let (owner, mut ledger, utxo) = setup();
        let recipient = KeyPair::generate();
        transfer(&mut ledger, &utxo, &owner, &recipient.address(), 250);

        let first = utxo.reindex(&ledger).unwrap();
        let snapshot = utxo.entries().unwrap();
        let second = utxo.reindex(&ledger).unwrap();
        assert_eq!(first, second);
        assert_eq!(utxo.entries().unwrap(), snapshot);
    }

    #[test]
    fn test_full_spend_deletes_entry() {
        let (owner, mut ledger, utxo) = setup();
        let recipient = KeyPair::generate();
        let genesis_txid = {
            let entries = utxo.entries().unwrap();
            entries.keys().next().unwrap().clone()
        };
        transfer(&mut ledger, &utxo, &owner, &recipient.address(), SUBSIDY);

        assert!(matches!(
            utxo.read_entry(&genesis_txid),
            Err(UtxoError::EntryNotFound(_))
        ));
        assert_eq!(utxo.get_balance(&owner.address()).unwrap(), 0);
        assert_eq!(utxo.get_balance(&recipient.address()).unwrap(), SUBSIDY);
        assert_eq!(utxo.entries().unwrap().len(), 1);
    }

    #[test]
    fn test_surviving_outputs_keep_original_indexes() {
        let (owner, mut ledger, utxo) = setup();
        let friend = KeyPair::generate();
        let shop = KeyPair::generate();

        // First transfer leaves change at index 1; spending that change
        // must not renumber the recipient's output at index 0
        let first = transfer(&mut ledger, &utxo, &owner, &friend.address(), 100);
        transfer(&mut ledger, &utxo, &owner, &shop.address(), 200);

        let entry = utxo.read_entry(&first.transactions[0].id).unwrap();
        let indexes: Vec<u32> = entry.outputs.keys().copied().collect();
        assert_eq!(indexes, vec![0]);
        assert_eq!(entry.outputs[&0].value, 100);

        assert_eq!(utxo.get_balance(&owner.address()).unwrap(), SUBSIDY - 300);
        assert_eq!(utxo.get_balance(&friend.address()).unwrap(), 100);
        assert_eq!(utxo.get_balance(&shop.address()).unwrap(), 200);
    }

    #[test]
    fn test_update_rejects_unknown_entry() {
        let (owner, _ledger, utxo) = setup();
        let recipient = KeyPair::generate();

        let mut tx = Transaction {
            id: Vec::new(),
            inputs: vec![TxInput::Spend {
                prev_txid: vec![9; 32],
                prev_vout: 0,
                signature: vec![1],
                pub_key: owner.public_key().to_vec(),
            }],
            outputs: vec![TxOutput::locked_to(1, &recipient.address()).unwrap()],
        };
        tx.id = tx.digest().unwrap();
        let block = Block::new(vec![tx], vec![0; 32]);

        assert!(matches!(
            utxo.update(&block),
            Err(UtxoError::EntryNotFound(_))
        ));
    }

    #[test]
    fn test_spendable_outputs_accumulate() {
        let (owner, _ledger, utxo) = setup();
        let other = KeyPair::generate();

        let (accumulated, outpoints) = utxo.spendable_outputs(&owner.address(), 500).unwrap();
        assert_eq!(accumulated, SUBSIDY);
        assert_eq!(outpoints.len(), 1);

        let (accumulated, outpoints) = utxo.spendable_outputs(&other.address(), 100).unwrap();
        assert_eq!(accumulated, 0);
        assert!(outpoints.is_empty());

        let (accumulated, outpoints) = utxo.spendable_outputs(&owner.address(), 0).unwrap();
        assert_eq!(accumulated, 0);
        assert!(outpoints.is_empty());
    }
}
