use serde::{Deserialize, Serialize};

use crate::transaction::Transaction;
use crate::types::{BlockId, PublicKey, Signature};

/// A chain block: an ordered list of signed transactions forged by the
/// delegate elected for the block's slot.
///
/// `payload_hash` commits to the concatenated canonical bytes of every
/// transaction in order; `id` is SHA-256 of the canonical block bytes.
/// Invariants: `height == previous.height + 1`; `created_at` is the slot
/// time of the block's slot; `generator_public_key` is the delegate elected
/// for that slot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub version: u32,
    pub height: u64,
    pub previous_block_id: BlockId,
    /// Epoch seconds; always a slot boundary.
    pub created_at: u32,
    pub generator_public_key: PublicKey,
    pub signature: Signature,
    pub transactions: Vec<Transaction>,
    pub transaction_count: u32,
    /// Sum of transferred amounts across `transactions`.
    pub amount: i64,
    /// Sum of fees across `transactions`.
    pub fee: i64,
    pub payload_hash: [u8; 32],
}

impl Block {
    /// True for the block seated at the bottom of the chain (height 1,
    /// zeroed parent reference).
    pub fn is_genesis(&self) -> bool {
        self.height == 1 && self.previous_block_id == BlockId::ZERO
    }

    /// Sum of transfer amounts in `txs`, saturating on overflow.
    pub fn total_amount(txs: &[Transaction]) -> i64 {
        txs.iter().fold(0i64, |acc, tx| acc.saturating_add(tx.amount()))
    }

    /// Sum of fees in `txs`, saturating on overflow.
    pub fn total_fee(txs: &[Transaction]) -> i64 {
        txs.iter().fold(0i64, |acc, tx| acc.saturating_add(tx.fee))
    }
}
