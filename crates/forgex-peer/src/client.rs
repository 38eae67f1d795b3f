use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, warn};

use forgex_core::block::Block;
use forgex_core::constants::BLOCK_VERSION;
use forgex_core::error::ForgexError;
use forgex_core::types::BlockId;

/// Validation failures tolerated before a peer is banned.
const MAX_VALIDATION_STRIKES: u32 = 3;

/// The most recent block shared with a peer, from `GET /blocks/common`.
#[derive(Debug, Clone, Deserialize)]
pub struct CommonBlockInfo {
    pub id: BlockId,
    #[serde(rename = "previousBlock")]
    pub previous_block: BlockId,
    pub height: u64,
}

#[derive(Debug, Deserialize)]
struct CommonResponse {
    common: CommonBlockInfo,
}

/// HTTP JSON client for peer block loading.
///
/// Uses raw reqwest + serde_json — the peer protocol subset the core needs
/// is two GET endpoints, not worth a heavier RPC stack.
pub struct PeerClient {
    client: reqwest::Client,
    banned: Mutex<HashSet<String>>,
    strikes: Mutex<HashMap<String, u32>>,
}

impl Default for PeerClient {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            banned: Mutex::new(HashSet::new()),
            strikes: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_banned(&self, peer: &str) -> bool {
        self.banned.lock().contains(peer)
    }

    /// Ban a peer outright (e.g. it served a block with a bad signature).
    pub fn ban(&self, peer: &str) {
        warn!(peer, "peer banned");
        self.banned.lock().insert(peer.to_string());
    }

    /// Record a validation failure; bans after repeated strikes.
    fn strike(&self, peer: &str) {
        let mut strikes = self.strikes.lock();
        let count = strikes.entry(peer.to_string()).or_insert(0);
        *count += 1;
        debug!(peer, strikes = *count, "peer validation failure");
        if *count >= MAX_VALIDATION_STRIKES {
            drop(strikes);
            self.ban(peer);
        }
    }

    fn ensure_usable(&self, peer: &str) -> Result<(), ForgexError> {
        if self.is_banned(peer) {
            return Err(ForgexError::Transport(format!("peer {peer} is banned")));
        }
        Ok(())
    }

    /// Blocks after `last_block_id`, in ascending height order.
    pub async fn get_blocks(
        &self,
        peer: &str,
        last_block_id: &BlockId,
    ) -> Result<Vec<Block>, ForgexError> {
        self.ensure_usable(peer)?;
        let url = format!("{peer}/blocks?lastBlockId={last_block_id}");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ForgexError::Transport(format!("GET {url}: {e}")))?;

        let blocks: Vec<Block> = match resp.json().await {
            Ok(blocks) => blocks,
            Err(e) => {
                self.strike(peer);
                return Err(ForgexError::Malformed(format!("blocks payload: {e}")));
            }
        };

        for block in &blocks {
            if let Err(reason) = validate_block_schema(block) {
                self.strike(peer);
                return Err(ForgexError::Malformed(format!(
                    "block {} failed schema validation: {reason}",
                    block.id
                )));
            }
        }
        Ok(blocks)
    }

    /// The most recent block of `ids` that the peer also has.
    pub async fn get_common_block(
        &self,
        peer: &str,
        ids: &[BlockId],
    ) -> Result<CommonBlockInfo, ForgexError> {
        self.ensure_usable(peer)?;
        let joined = ids
            .iter()
            .map(BlockId::to_hex)
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("{peer}/blocks/common?ids={joined}");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ForgexError::Transport(format!("GET {url}: {e}")))?;

        match resp.json::<CommonResponse>().await {
            Ok(body) => Ok(body.common),
            Err(e) => {
                self.strike(peer);
                Err(ForgexError::Malformed(format!("common payload: {e}")))
            }
        }
    }
}

/// Structural checks applied to every peer-supplied block before it is
/// handed to the pipeline (which re-verifies hashes and signatures).
fn validate_block_schema(block: &Block) -> Result<(), String> {
    if block.version != BLOCK_VERSION {
        return Err(format!("unsupported version {}", block.version));
    }
    if block.transaction_count as usize != block.transactions.len() {
        return Err(format!(
            "transaction count {} does not match payload length {}",
            block.transaction_count,
            block.transactions.len()
        ));
    }
    if block.height == 0 {
        return Err("height must be positive".into());
    }
    for tx in &block.transactions {
        if tx.asset.tx_type() != tx.tx_type {
            return Err(format!("transaction {} asset/type mismatch", tx.id));
        }
        if tx.fee < 0 {
            return Err(format!("transaction {} carries a negative fee", tx.id));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgex_core::types::{PublicKey, Signature};

    fn block(height: u64, count: u32) -> Block {
        Block {
            id: BlockId::from_bytes([1u8; 32]),
            version: BLOCK_VERSION,
            height,
            previous_block_id: BlockId::ZERO,
            created_at: 10,
            generator_public_key: PublicKey([0u8; 32]),
            signature: Signature::ZERO,
            transactions: Vec::new(),
            transaction_count: count,
            amount: 0,
            fee: 0,
            payload_hash: [0u8; 32],
        }
    }

    #[test]
    fn schema_accepts_well_formed_blocks() {
        assert!(validate_block_schema(&block(2, 0)).is_ok());
    }

    #[test]
    fn schema_rejects_count_mismatch_and_bad_version() {
        assert!(validate_block_schema(&block(2, 3)).is_err());
        let mut bad = block(2, 0);
        bad.version = 99;
        assert!(validate_block_schema(&bad).is_err());
        let mut zero = block(0, 0);
        zero.height = 0;
        assert!(validate_block_schema(&zero).is_err());
    }

    #[test]
    fn repeated_strikes_ban_the_peer() {
        let client = PeerClient::new();
        assert!(!client.is_banned("http://peer"));
        for _ in 0..MAX_VALIDATION_STRIKES {
            client.strike("http://peer");
        }
        assert!(client.is_banned("http://peer"));
    }

    #[test]
    fn blocks_payload_round_trips_as_json() {
        let blocks = vec![block(2, 0), block(3, 0)];
        let json = serde_json::to_string(&blocks).unwrap();
        let back: Vec<Block> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, blocks);
    }
}
