//! Genesis: seed balances and the founding block.
//!
//! Genesis writes accounts directly — no signatures, no balance checks, no
//! slot validation. It is the one place value enters the ledger.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use forgex_codec::{block_id, payload_hash};
use forgex_core::block::Block;
use forgex_core::constants::BLOCK_VERSION;
use forgex_core::error::ForgexError;
use forgex_core::types::{BlockId, PublicKey, Signature};
use forgex_crypto::hash::address_from_public_key;
use forgex_state::AccountRepository;

use crate::roster::{delegate_info, DelegateInfo, DelegateRoster};
use crate::store::ChainStore;

/// A genesis delegate seat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisDelegate {
    pub public_key: PublicKey,
    pub username: String,
}

/// A genesis balance allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisAllocation {
    pub public_key: PublicKey,
    pub amount: i64,
}

/// Parameters of the founding block, loaded from a JSON file shared by
/// every node of the network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisParams {
    /// Epoch seconds of the genesis slot (normally 0).
    pub created_at: u32,
    pub delegates: Vec<GenesisDelegate>,
    pub allocations: Vec<GenesisAllocation>,
    /// Expected id of the founding block; nodes with different params must
    /// not join the same network.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_block_id: Option<BlockId>,
}

impl GenesisParams {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ForgexError> {
        let json = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ForgexError::Storage(format!("reading genesis params: {e}")))?;
        serde_json::from_str(&json)
            .map_err(|e| ForgexError::Malformed(format!("genesis params JSON: {e}")))
    }
}

/// Build the founding block: height 1, zeroed parent, unsigned.
pub fn genesis_block(params: &GenesisParams) -> Block {
    let mut block = Block {
        id: BlockId::ZERO,
        version: BLOCK_VERSION,
        height: 1,
        previous_block_id: BlockId::ZERO,
        created_at: params.created_at,
        generator_public_key: PublicKey::ZERO,
        signature: Signature::ZERO,
        transactions: Vec::new(),
        transaction_count: 0,
        amount: 0,
        fee: 0,
        payload_hash: payload_hash(&[]),
    };
    block.id = block_id(&block);
    block
}

/// Seed the account map from genesis params: allocations credited without
/// balance checks, delegates registered. Used on first boot and when
/// rebuilding in-memory state on restart.
pub fn seed_state(
    params: &GenesisParams,
    repo: &mut AccountRepository,
) -> Result<DelegateRoster, ForgexError> {
    for allocation in &params.allocations {
        let address = address_from_public_key(&allocation.public_key);
        repo.seed_account(address, allocation.public_key, allocation.amount);
    }

    let mut seats: Vec<DelegateInfo> = Vec::with_capacity(params.delegates.len());
    for delegate in &params.delegates {
        let address = address_from_public_key(&delegate.public_key);
        if repo.get(address).is_none() {
            repo.seed_account(address, delegate.public_key, 0);
        }
        repo.register_delegate(address, &delegate.username)?;
        seats.push(delegate_info(delegate.public_key, delegate.username.clone()));
    }
    Ok(DelegateRoster::new(seats))
}

/// Seed accounts, register delegates and seat the founding block.
///
/// Only valid on a fresh chain; fails if a chain head already exists.
pub fn apply_genesis(
    params: &GenesisParams,
    repo: &mut AccountRepository,
    chain: &mut ChainStore,
) -> Result<DelegateRoster, ForgexError> {
    if !chain.is_empty() {
        return Err(ForgexError::InvariantViolated(
            "genesis may only be applied to a fresh chain".into(),
        ));
    }

    let block = genesis_block(params);
    if let Some(expected) = params.expected_block_id {
        if block.id != expected {
            return Err(ForgexError::ChainDivergent(format!(
                "genesis id mismatch: expected {expected}, computed {}",
                block.id
            )));
        }
    }

    let roster = seed_state(params, repo)?;
    chain.push_block(block.clone(), true)?;
    info!(id = %block.id, delegates = roster.len(), "genesis applied");
    Ok(roster)
}
