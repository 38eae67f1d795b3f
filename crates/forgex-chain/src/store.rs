//! In-memory ring of recent blocks with a durable mirror.

use std::collections::VecDeque;
use std::sync::Arc;

use forgex_core::block::Block;
use forgex_core::constants::CHAIN_RING_EXTRA;
use forgex_core::error::ForgexError;
use forgex_core::types::{BlockId, TxId};
use forgex_state::ChainDb;

/// Last-N blocks kept in memory (N ≥ activeDelegates + 2, the short-range
/// fork window) plus the durable store handle. Writes mirror to the store
/// per block.
pub struct ChainStore {
    ring: VecDeque<Block>,
    depth: usize,
    db: Arc<ChainDb>,
}

impl ChainStore {
    pub fn new(db: Arc<ChainDb>, active_delegates: usize) -> Self {
        Self {
            ring: VecDeque::new(),
            depth: active_delegates + CHAIN_RING_EXTRA,
            db,
        }
    }

    /// Reload the ring tail from the durable store (node restart).
    pub fn load_tail(&mut self) -> Result<(), ForgexError> {
        self.ring.clear();
        if let Some(last) = self.db.get_last_block()? {
            let from = last.height.saturating_sub(self.depth as u64 - 1).max(1);
            for height in from..=last.height {
                if let Some(block) = self.db.get_block(height)? {
                    self.ring.push_back(block);
                }
            }
        }
        Ok(())
    }

    pub fn last_block(&self) -> Option<&Block> {
        self.ring.back()
    }

    pub fn height(&self) -> u64 {
        self.ring.back().map(|b| b.height).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Ids of the ring blocks, newest first (peer `blocks/common` lookups).
    pub fn recent_ids(&self) -> Vec<BlockId> {
        self.ring.iter().rev().map(|b| b.id).collect()
    }

    pub fn get_by_id(&self, id: &BlockId) -> Option<&Block> {
        self.ring.iter().find(|b| b.id == *id)
    }

    /// Is `id` confirmed in any ring block?
    pub fn contains_tx(&self, id: &TxId) -> bool {
        self.ring
            .iter()
            .any(|b| b.transactions.iter().any(|tx| tx.id == *id))
    }

    /// Append a block; mirrors to the durable store when `save` is set.
    /// Returns the id of the block evicted from the ring, if any.
    pub fn push_block(&mut self, block: Block, save: bool) -> Result<Option<BlockId>, ForgexError> {
        if save {
            self.db.save_block(&block)?;
        }
        self.ring.push_back(block);
        let evicted = if self.ring.len() > self.depth {
            self.ring.pop_front().map(|b| b.id)
        } else {
            None
        };
        Ok(evicted)
    }

    /// Guard checks for [`delete_last_block`](Self::delete_last_block)
    /// without mutating anything, so callers can undo account state first.
    pub fn can_delete_last(&self) -> Result<(), ForgexError> {
        if self.ring.len() < 2 {
            return Err(ForgexError::ChainDivergent(
                "fork window exhausted, cannot delete below the in-memory tail".into(),
            ));
        }
        if self.ring.back().map(|b| b.is_genesis()).unwrap_or(true) {
            return Err(ForgexError::ChainDivergent(
                "refusing to delete the genesis block".into(),
            ));
        }
        Ok(())
    }

    /// Pop the chain head and remove it from the durable store. Refuses to
    /// pop the genesis block or to empty the fork window.
    pub fn delete_last_block(&mut self) -> Result<Block, ForgexError> {
        if self.ring.len() < 2 {
            return Err(ForgexError::ChainDivergent(
                "fork window exhausted, cannot delete below the in-memory tail".into(),
            ));
        }
        let block = self.ring.pop_back().expect("checked non-empty");
        if block.is_genesis() {
            self.ring.push_back(block);
            return Err(ForgexError::ChainDivergent(
                "refusing to delete the genesis block".into(),
            ));
        }
        self.db.delete_block(block.height)?;
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgex_core::constants::BLOCK_VERSION;
    use forgex_core::types::{PublicKey, Signature};

    fn temp_db(tag: &str) -> Arc<ChainDb> {
        let dir = std::env::temp_dir().join(format!("forgex_chain_{}_{}", tag, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        Arc::new(ChainDb::open(&dir).unwrap())
    }

    fn block_at(height: u64, prev: BlockId) -> Block {
        Block {
            id: BlockId::from_bytes([height as u8; 32]),
            version: BLOCK_VERSION,
            height,
            previous_block_id: prev,
            created_at: height as u32 * 10,
            generator_public_key: PublicKey([1u8; 32]),
            signature: Signature::ZERO,
            transactions: Vec::new(),
            transaction_count: 0,
            amount: 0,
            fee: 0,
            payload_hash: [0u8; 32],
        }
    }

    #[test]
    fn ring_evicts_beyond_depth() {
        let mut chain = ChainStore::new(temp_db("evict"), 1); // depth 3
        let mut prev = BlockId::ZERO;
        let mut evictions = Vec::new();
        for h in 1..=5u64 {
            let block = block_at(h, prev);
            prev = block.id;
            if let Some(evicted) = chain.push_block(block, true).unwrap() {
                evictions.push(evicted);
            }
        }
        assert_eq!(evictions.len(), 2);
        assert_eq!(chain.height(), 5);
        // The durable mirror still holds everything.
        assert_eq!(chain.db.count_blocks(), 5);
    }

    #[test]
    fn delete_last_block_pops_and_unmirrors() {
        let mut chain = ChainStore::new(temp_db("delete"), 3);
        let genesis = block_at(1, BlockId::ZERO);
        let b2 = block_at(2, genesis.id);
        chain.push_block(genesis, true).unwrap();
        chain.push_block(b2.clone(), true).unwrap();

        let popped = chain.delete_last_block().unwrap();
        assert_eq!(popped.id, b2.id);
        assert_eq!(chain.height(), 1);
        assert!(chain.db.get_block(2).unwrap().is_none());

        // Genesis is not deletable.
        assert!(chain.delete_last_block().is_err());
    }

    #[test]
    fn load_tail_restores_ring() {
        let db = temp_db("reload");
        {
            let mut chain = ChainStore::new(Arc::clone(&db), 3);
            let mut prev = BlockId::ZERO;
            for h in 1..=4u64 {
                let block = block_at(h, prev);
                prev = block.id;
                chain.push_block(block, true).unwrap();
            }
        }
        let mut chain = ChainStore::new(db, 3);
        chain.load_tail().unwrap();
        assert_eq!(chain.height(), 4);
        assert!(chain.last_block().is_some());
    }
}
