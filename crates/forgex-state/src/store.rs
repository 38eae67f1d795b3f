//! Durable chain store backed by sled (pure-Rust, no C dependencies).
//!
//! Named trees:
//!   blocks       — height u64 BE bytes → bincode(Block)
//!   transactions — TxId bytes         → bincode(Transaction)
//!   meta         — utf8 key bytes     → raw bytes
//!
//! Writes are best-effort-synchronous per block: the pipeline persists each
//! block as it is applied and deletes the tail entry during fork recovery.

use std::path::Path;

use forgex_core::block::Block;
use forgex_core::error::ForgexError;
use forgex_core::transaction::Transaction;
use forgex_core::types::TxId;

pub struct ChainDb {
    _db: sled::Db,
    blocks: sled::Tree,
    transactions: sled::Tree,
    meta: sled::Tree,
}

impl ChainDb {
    /// Open or create the chain database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ForgexError> {
        let db = sled::open(path).map_err(|e| ForgexError::Storage(e.to_string()))?;
        let blocks = db
            .open_tree("blocks")
            .map_err(|e| ForgexError::Storage(e.to_string()))?;
        let transactions = db
            .open_tree("transactions")
            .map_err(|e| ForgexError::Storage(e.to_string()))?;
        let meta = db
            .open_tree("meta")
            .map_err(|e| ForgexError::Storage(e.to_string()))?;
        Ok(Self {
            _db: db,
            blocks,
            transactions,
            meta,
        })
    }

    // ── Blocks ───────────────────────────────────────────────────────────────

    pub fn save_block(&self, block: &Block) -> Result<(), ForgexError> {
        let bytes =
            bincode::serialize(block).map_err(|e| ForgexError::Serialization(e.to_string()))?;
        self.blocks
            .insert(block.height.to_be_bytes(), bytes)
            .map_err(|e| ForgexError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn delete_block(&self, height: u64) -> Result<(), ForgexError> {
        self.blocks
            .remove(height.to_be_bytes())
            .map_err(|e| ForgexError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn get_block(&self, height: u64) -> Result<Option<Block>, ForgexError> {
        match self
            .blocks
            .get(height.to_be_bytes())
            .map_err(|e| ForgexError::Storage(e.to_string()))?
        {
            Some(bytes) => {
                let block = bincode::deserialize(&bytes)
                    .map_err(|e| ForgexError::Serialization(e.to_string()))?;
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }

    /// Highest block in the store, if any. Height keys are big-endian so the
    /// last tree entry is the chain head.
    pub fn get_last_block(&self) -> Result<Option<Block>, ForgexError> {
        match self
            .blocks
            .last()
            .map_err(|e| ForgexError::Storage(e.to_string()))?
        {
            Some((_, bytes)) => {
                let block = bincode::deserialize(&bytes)
                    .map_err(|e| ForgexError::Serialization(e.to_string()))?;
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }

    pub fn count_blocks(&self) -> u64 {
        self.blocks.len() as u64
    }

    // ── Transactions ─────────────────────────────────────────────────────────

    pub fn save_or_update_tx(&self, tx: &Transaction) -> Result<(), ForgexError> {
        let bytes =
            bincode::serialize(tx).map_err(|e| ForgexError::Serialization(e.to_string()))?;
        self.transactions
            .insert(tx.id.as_bytes(), bytes)
            .map_err(|e| ForgexError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn delete_tx_by_id(&self, id: &TxId) -> Result<(), ForgexError> {
        self.transactions
            .remove(id.as_bytes())
            .map_err(|e| ForgexError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn get_tx(&self, id: &TxId) -> Result<Option<Transaction>, ForgexError> {
        match self
            .transactions
            .get(id.as_bytes())
            .map_err(|e| ForgexError::Storage(e.to_string()))?
        {
            Some(bytes) => {
                let tx = bincode::deserialize(&bytes)
                    .map_err(|e| ForgexError::Serialization(e.to_string()))?;
                Ok(Some(tx))
            }
            None => Ok(None),
        }
    }

    // ── Meta ─────────────────────────────────────────────────────────────────

    pub fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), ForgexError> {
        self.meta
            .insert(key.as_bytes(), value)
            .map_err(|e| ForgexError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, ForgexError> {
        self.meta
            .get(key.as_bytes())
            .map(|v| v.map(|iv| iv.to_vec()))
            .map_err(|e| ForgexError::Storage(e.to_string()))
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), ForgexError> {
        self._db
            .flush()
            .map_err(|e| ForgexError::Storage(e.to_string()))?;
        Ok(())
    }
}
