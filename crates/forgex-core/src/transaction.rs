use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{Address, BlockId, PublicKey, Salt, Signature, TxId};

// ── TransactionType ──────────────────────────────────────────────────────────

/// Wire discriminant for each transaction kind. The set is sealed: adding a
/// kind means adding a variant here, an [`Asset`] variant, and a service arm —
/// all compile-time changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    Send = 10,
    SecondSignature = 20,
    Delegate = 30,
    Stake = 40,
    Vote = 60,
}

impl TransactionType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            10 => Some(Self::Send),
            20 => Some(Self::SecondSignature),
            30 => Some(Self::Delegate),
            40 => Some(Self::Stake),
            60 => Some(Self::Vote),
            _ => None,
        }
    }
}

// ── Asset ────────────────────────────────────────────────────────────────────

/// Which way a ballot swings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BallotDirection {
    /// `+` — cast a vote for the delegate.
    Apply,
    /// `-` — withdraw a previously cast vote.
    Remove,
}

impl BallotDirection {
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Apply => b'+',
            Self::Remove => b'-',
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'+' => Some(Self::Apply),
            b'-' => Some(Self::Remove),
            _ => None,
        }
    }
}

/// A single vote / unvote entry inside a vote transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub direction: BallotDirection,
    pub delegate: Address,
}

/// Sponsor rewards distributed alongside a vote. The map is ordered by
/// address so the canonical encoding is deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AirdropReward {
    pub sponsors: BTreeMap<Address, i64>,
}

/// Per-type payload. One variant per [`TransactionType`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Asset {
    /// Move `amount` frg to `recipient_address`.
    Transfer {
        recipient_address: Address,
        amount: i64,
    },

    /// Register an independent second signing key on the sender's account.
    /// Every later transaction from this sender must carry a second
    /// signature made with it.
    SecondSignature { public_key: PublicKey },

    /// Register the sender as a forging delegate under `username`.
    Delegate { username: String },

    /// Freeze `amount` frg of the sender's balance as stake.
    Stake { amount: i64, start_time: u32 },

    /// Cast and withdraw votes for delegates, carrying the reward and
    /// unstake settlement plus sponsor airdrops computed at creation time.
    Vote {
        votes: Vec<Ballot>,
        reward: i64,
        unstake: i64,
        airdrop_reward: AirdropReward,
    },
}

impl Asset {
    /// The wire type this payload belongs to.
    pub fn tx_type(&self) -> TransactionType {
        match self {
            Asset::Transfer { .. } => TransactionType::Send,
            Asset::SecondSignature { .. } => TransactionType::SecondSignature,
            Asset::Delegate { .. } => TransactionType::Delegate,
            Asset::Stake { .. } => TransactionType::Stake,
            Asset::Vote { .. } => TransactionType::Vote,
        }
    }
}

// ── Transaction ──────────────────────────────────────────────────────────────

/// A signed ForgeX transaction.
///
/// `id` is SHA-256 of the canonical byte encoding (signature fields
/// included); any change to an encoded field mandates recomputing it. A
/// transaction is confirmed once `block_id` names a block in the chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxId,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    /// Epoch seconds at creation (slot clock time, not wall time).
    pub created_at: u32,
    pub sender_public_key: PublicKey,
    pub sender_address: Address,
    pub signature: Signature,
    // Options stay materialised in the encoding: these records pass through
    // bincode, which is not self-describing.
    #[serde(default)]
    pub second_signature: Option<Signature>,
    pub salt: Salt,
    pub fee: i64,
    /// Set once the transaction is included in an applied block.
    #[serde(default)]
    pub block_id: Option<BlockId>,
    pub asset: Asset,
}

impl Transaction {
    /// Recipient address for transfers; `None` for every other type.
    pub fn recipient_address(&self) -> Option<Address> {
        match &self.asset {
            Asset::Transfer {
                recipient_address, ..
            } => Some(*recipient_address),
            _ => None,
        }
    }

    /// Transferred amount for transfers; zero for every other type.
    pub fn amount(&self) -> i64 {
        match &self.asset {
            Asset::Transfer { amount, .. } => *amount,
            _ => 0,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.block_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_discriminants_round_trip() {
        for t in [
            TransactionType::Send,
            TransactionType::SecondSignature,
            TransactionType::Delegate,
            TransactionType::Stake,
            TransactionType::Vote,
        ] {
            assert_eq!(TransactionType::from_u8(t.as_u8()), Some(t));
        }
        assert_eq!(TransactionType::from_u8(0), None);
        assert_eq!(TransactionType::from_u8(50), None);
    }

    #[test]
    fn ballot_direction_bytes() {
        assert_eq!(BallotDirection::Apply.as_byte(), 0x2b);
        assert_eq!(BallotDirection::Remove.as_byte(), 0x2d);
        assert_eq!(BallotDirection::from_byte(b'+'), Some(BallotDirection::Apply));
        assert_eq!(BallotDirection::from_byte(b'x'), None);
    }

    #[test]
    fn asset_maps_to_type() {
        let asset = Asset::Transfer {
            recipient_address: Address(7),
            amount: 100,
        };
        assert_eq!(asset.tx_type(), TransactionType::Send);
        assert_eq!(
            Asset::Vote {
                votes: vec![],
                reward: 0,
                unstake: 0,
                airdrop_reward: AirdropReward::default(),
            }
            .tx_type(),
            TransactionType::Vote
        );
    }
}
