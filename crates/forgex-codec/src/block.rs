//! Canonical block bytes.
//!
//! `version(u32) || createdAt(u32) || previousBlockId(32B) ||
//! transactionCount(u32) || amount(u64) || fee(u64) || payloadHash(32B) ||
//! generatorPublicKey(32B) || signature(64B, zero if unsigned)`,
//! integers little-endian. The block id is SHA-256 of these bytes.

use forgex_core::block::Block;
use forgex_core::constants::BLOCK_BYTES_LEN;
use forgex_core::transaction::Transaction;
use forgex_core::types::BlockId;
use forgex_crypto::hash::{block_id_from_bytes, sha256};

use crate::tx::transaction_bytes;

/// Canonical block bytes. With `include_signature` false the signature slot
/// is zero-filled, which is the form the generator signs.
pub fn block_bytes(block: &Block, include_signature: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(BLOCK_BYTES_LEN);
    out.extend_from_slice(&block.version.to_le_bytes());
    out.extend_from_slice(&block.created_at.to_le_bytes());
    out.extend_from_slice(block.previous_block_id.as_bytes());
    out.extend_from_slice(&block.transaction_count.to_le_bytes());
    out.extend_from_slice(&(block.amount as u64).to_le_bytes());
    out.extend_from_slice(&(block.fee as u64).to_le_bytes());
    out.extend_from_slice(&block.payload_hash);
    out.extend_from_slice(block.generator_public_key.as_bytes());
    if include_signature {
        out.extend_from_slice(block.signature.as_bytes());
    } else {
        out.extend_from_slice(&[0u8; 64]);
    }
    out
}

/// Hash the generator signs: canonical bytes with a zeroed signature slot.
pub fn block_signing_hash(block: &Block) -> [u8; 32] {
    sha256(&block_bytes(block, false))
}

/// Block id: SHA-256 over the full canonical bytes.
pub fn block_id(block: &Block) -> BlockId {
    block_id_from_bytes(&block_bytes(block, true))
}

/// Payload hash: SHA-256 over the concatenated canonical bytes of every
/// transaction, in block order.
pub fn payload_hash(transactions: &[Transaction]) -> [u8; 32] {
    let mut payload = Vec::new();
    for tx in transactions {
        payload.extend_from_slice(&transaction_bytes(tx, true, true));
    }
    sha256(&payload)
}

/// Total canonical-encoded size of the transactions, for the block size cap.
pub fn payload_len(transactions: &[Transaction]) -> usize {
    transactions
        .iter()
        .map(|tx| transaction_bytes(tx, true, true).len())
        .sum()
}
