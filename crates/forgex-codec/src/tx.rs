//! Canonical transaction bytes.
//!
//! Layout: a 197-byte fixed prefix followed by a per-type asset tail.
//!
//! | Off | Len | Field                                        |
//! |-----|-----|----------------------------------------------|
//! | 0   | 16  | salt                                         |
//! | 16  | 1   | type                                         |
//! | 17  | 4   | createdAt (u32 LE)                           |
//! | 21  | 32  | senderPublicKey                              |
//! | 53  | 8   | recipientAddress (u64 LE; zero unless Send)  |
//! | 61  | 8   | amount (u64 LE; zero unless Send)            |
//! | 69  | 64  | signature (zero when computing signing hash) |
//! | 133 | 64  | secondSignature (zero when absent/skipped)   |
//! | 197 | …   | asset tail                                   |

use forgex_core::constants::TX_PREFIX_BYTES;
use forgex_core::error::ForgexError;
use forgex_core::transaction::{
    AirdropReward, Asset, Ballot, BallotDirection, Transaction, TransactionType,
};
use forgex_core::types::{Address, PublicKey, Salt, Signature, TxId};
use forgex_crypto::hash::{address_from_public_key, sha256, tx_id_from_bytes};

// ── Encode ───────────────────────────────────────────────────────────────────

/// Serialise the per-type asset tail.
pub fn asset_bytes(asset: &Asset) -> Vec<u8> {
    match asset {
        // Recipient and amount already live in the fixed prefix.
        Asset::Transfer { .. } => Vec::new(),

        Asset::SecondSignature { public_key } => public_key.as_bytes().to_vec(),

        // The tail is the last field, so the username length is implicit.
        Asset::Delegate { username } => username.as_bytes().to_vec(),

        Asset::Stake { amount, start_time } => {
            let mut out = Vec::with_capacity(12);
            out.extend_from_slice(&(*amount as u64).to_le_bytes());
            out.extend_from_slice(&start_time.to_le_bytes());
            out
        }

        Asset::Vote {
            votes,
            reward,
            unstake,
            airdrop_reward,
        } => {
            let mut out = Vec::with_capacity(2 + votes.len() * 9 + 16);
            out.extend_from_slice(&(votes.len() as u16).to_le_bytes());
            for ballot in votes {
                out.push(ballot.direction.as_byte());
                out.extend_from_slice(&ballot.delegate.as_u64().to_le_bytes());
            }
            out.extend_from_slice(&reward.to_le_bytes());
            out.extend_from_slice(&unstake.to_le_bytes());
            out.extend_from_slice(&(airdrop_reward.sponsors.len() as u16).to_le_bytes());
            // BTreeMap iterates in address order — deterministic.
            for (sponsor, amount) in &airdrop_reward.sponsors {
                out.extend_from_slice(&sponsor.as_u64().to_le_bytes());
                out.extend_from_slice(&amount.to_le_bytes());
            }
            out
        }
    }
}

/// Canonical transaction bytes. `include_signature` /
/// `include_second_signature` select which signature slots are filled;
/// skipped slots stay zeroed so the layout never shifts.
pub fn transaction_bytes(
    tx: &Transaction,
    include_signature: bool,
    include_second_signature: bool,
) -> Vec<u8> {
    let tail = asset_bytes(&tx.asset);
    let mut out = Vec::with_capacity(TX_PREFIX_BYTES + tail.len());

    out.extend_from_slice(tx.salt.as_bytes());
    out.push(tx.tx_type.as_u8());
    out.extend_from_slice(&tx.created_at.to_le_bytes());
    out.extend_from_slice(tx.sender_public_key.as_bytes());
    out.extend_from_slice(
        &tx.recipient_address()
            .map(Address::as_u64)
            .unwrap_or(0)
            .to_le_bytes(),
    );
    out.extend_from_slice(&(tx.amount() as u64).to_le_bytes());

    if include_signature {
        out.extend_from_slice(tx.signature.as_bytes());
    } else {
        out.extend_from_slice(&[0u8; 64]);
    }
    match (&tx.second_signature, include_second_signature) {
        (Some(sig), true) => out.extend_from_slice(sig.as_bytes()),
        _ => out.extend_from_slice(&[0u8; 64]),
    }

    out.extend_from_slice(&tail);
    out
}

/// Hash signed by the sender's primary key: both signature slots zeroed.
pub fn tx_signing_hash(tx: &Transaction) -> [u8; 32] {
    sha256(&transaction_bytes(tx, false, false))
}

/// Hash signed by the registered second key: primary signature included,
/// second slot zeroed.
pub fn tx_second_signing_hash(tx: &Transaction) -> [u8; 32] {
    sha256(&transaction_bytes(tx, true, false))
}

/// Transaction id: SHA-256 over the full canonical bytes, signatures
/// included. Any encoded-field change alters the id.
pub fn tx_id(tx: &Transaction) -> TxId {
    tx_id_from_bytes(&transaction_bytes(tx, true, true))
}

// ── Decode ───────────────────────────────────────────────────────────────────

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ForgexError> {
        if self.pos + n > self.bytes.len() {
            return Err(ForgexError::Malformed(format!(
                "transaction bytes truncated at offset {}",
                self.pos
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, ForgexError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, ForgexError> {
        let mut arr = [0u8; 2];
        arr.copy_from_slice(self.take(2)?);
        Ok(u16::from_le_bytes(arr))
    }

    fn u32(&mut self) -> Result<u32, ForgexError> {
        let mut arr = [0u8; 4];
        arr.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(arr))
    }

    fn u64(&mut self) -> Result<u64, ForgexError> {
        let mut arr = [0u8; 8];
        arr.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(arr))
    }

    fn i64(&mut self) -> Result<i64, ForgexError> {
        Ok(self.u64()? as i64)
    }

    fn rest(&mut self) -> &'a [u8] {
        let slice = &self.bytes[self.pos..];
        self.pos = self.bytes.len();
        slice
    }
}

/// Decode canonical transaction bytes back into a [`Transaction`].
///
/// The id is recomputed from the bytes; the sender address is derived from
/// the sender public key. `fee` and `block_id` are transport-level fields
/// not present in the canonical encoding: the fee comes back through the
/// stateless schedule during verification (and is zero here for types whose
/// fee depends on sender state), `block_id` comes back as `None`.
pub fn decode_transaction(bytes: &[u8]) -> Result<Transaction, ForgexError> {
    let mut r = Reader::new(bytes);

    let mut salt = [0u8; 16];
    salt.copy_from_slice(r.take(16)?);

    let type_byte = r.u8()?;
    let tx_type = TransactionType::from_u8(type_byte)
        .ok_or_else(|| ForgexError::Malformed(format!("unknown transaction type {type_byte}")))?;

    let created_at = r.u32()?;

    let mut pk = [0u8; 32];
    pk.copy_from_slice(r.take(32)?);
    let sender_public_key = PublicKey(pk);

    let recipient = Address(r.u64()?);
    let amount = r.i64()?;

    let mut sig = [0u8; 64];
    sig.copy_from_slice(r.take(64)?);
    let signature = Signature(sig);

    let mut second = [0u8; 64];
    second.copy_from_slice(r.take(64)?);
    let second_signature = Signature(second);

    let asset = match tx_type {
        TransactionType::Send => {
            if amount < 0 {
                return Err(ForgexError::Malformed("negative transfer amount".into()));
            }
            Asset::Transfer {
                recipient_address: recipient,
                amount,
            }
        }
        TransactionType::SecondSignature => {
            let mut key = [0u8; 32];
            key.copy_from_slice(r.take(32)?);
            Asset::SecondSignature {
                public_key: PublicKey(key),
            }
        }
        TransactionType::Delegate => {
            let username = String::from_utf8(r.rest().to_vec())
                .map_err(|_| ForgexError::Malformed("username is not valid UTF-8".into()))?;
            Asset::Delegate { username }
        }
        TransactionType::Stake => {
            let amount = r.i64()?;
            let start_time = r.u32()?;
            Asset::Stake { amount, start_time }
        }
        TransactionType::Vote => {
            let ballot_count = r.u16()?;
            let mut votes = Vec::with_capacity(ballot_count as usize);
            for _ in 0..ballot_count {
                let direction = BallotDirection::from_byte(r.u8()?).ok_or_else(|| {
                    ForgexError::Malformed("ballot direction must be '+' or '-'".into())
                })?;
                let delegate = Address(r.u64()?);
                votes.push(Ballot {
                    direction,
                    delegate,
                });
            }
            let reward = r.i64()?;
            let unstake = r.i64()?;
            let sponsor_count = r.u16()?;
            let mut airdrop_reward = AirdropReward::default();
            for _ in 0..sponsor_count {
                let sponsor = Address(r.u64()?);
                let amount = r.i64()?;
                airdrop_reward.sponsors.insert(sponsor, amount);
            }
            Asset::Vote {
                votes,
                reward,
                unstake,
                airdrop_reward,
            }
        }
    };

    if r.pos != bytes.len() {
        return Err(ForgexError::Malformed(format!(
            "{} trailing bytes after asset tail",
            bytes.len() - r.pos
        )));
    }

    Ok(Transaction {
        id: tx_id_from_bytes(bytes),
        tx_type,
        created_at,
        sender_address: address_from_public_key(&sender_public_key),
        sender_public_key,
        signature,
        second_signature: if second_signature.is_zero() {
            None
        } else {
            Some(second_signature)
        },
        salt: Salt(salt),
        fee: stateless_fee(&asset),
        block_id: None,
        asset,
    })
}

/// The portion of the fee schedule derivable from the encoding alone. Types
/// whose fee depends on sender state (Vote) come back as zero and are
/// recomputed during verification.
fn stateless_fee(asset: &Asset) -> i64 {
    use forgex_core::constants::{
        DELEGATE_FEE, MIN_PROPORTIONAL_FEE, SECOND_SIGNATURE_FEE, SEND_FEE_BPS, STAKE_FEE_BPS,
    };
    match asset {
        Asset::Transfer { amount, .. } => (amount * SEND_FEE_BPS / 10_000).max(MIN_PROPORTIONAL_FEE),
        Asset::SecondSignature { .. } => SECOND_SIGNATURE_FEE,
        Asset::Delegate { .. } => DELEGATE_FEE,
        Asset::Stake { amount, .. } => (amount * STAKE_FEE_BPS / 10_000).max(MIN_PROPORTIONAL_FEE),
        Asset::Vote { .. } => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgex_core::constants::{TX_SECOND_SIGNATURE_OFFSET, TX_SIGNATURE_OFFSET};
    use forgex_crypto::KeyPair;

    fn transfer_fixture() -> Transaction {
        let kp = KeyPair::from_seed([1u8; 32]);
        let mut tx = Transaction {
            id: TxId::from_bytes([0u8; 32]),
            tx_type: TransactionType::Send,
            created_at: 25,
            sender_public_key: kp.public_key,
            sender_address: kp.address,
            signature: Signature::ZERO,
            second_signature: None,
            salt: Salt([0x11; 16]),
            fee: 1,
            block_id: None,
            asset: Asset::Transfer {
                recipient_address: Address(0x0102030405060708),
                amount: 9_000,
            },
        };
        tx.signature = kp.sign(&tx_signing_hash(&tx));
        tx.id = tx_id(&tx);
        tx
    }

    #[test]
    fn transfer_prefix_layout_is_fixed() {
        let tx = transfer_fixture();
        let bytes = transaction_bytes(&tx, true, true);
        assert_eq!(bytes.len(), TX_PREFIX_BYTES); // empty tail for transfers

        // Hand-built expectation, field by field.
        let mut expected = Vec::new();
        expected.extend_from_slice(&[0x11; 16]);
        expected.push(10);
        expected.extend_from_slice(&25u32.to_le_bytes());
        expected.extend_from_slice(tx.sender_public_key.as_bytes());
        expected.extend_from_slice(&0x0102030405060708u64.to_le_bytes());
        expected.extend_from_slice(&9_000u64.to_le_bytes());
        expected.extend_from_slice(tx.signature.as_bytes());
        expected.extend_from_slice(&[0u8; 64]);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn signing_bytes_zero_the_signature_slots() {
        let tx = transfer_fixture();
        let unsigned = transaction_bytes(&tx, false, false);
        assert!(unsigned[TX_SIGNATURE_OFFSET..TX_SIGNATURE_OFFSET + 64]
            .iter()
            .all(|b| *b == 0));
        assert!(unsigned[TX_SECOND_SIGNATURE_OFFSET..TX_SECOND_SIGNATURE_OFFSET + 64]
            .iter()
            .all(|b| *b == 0));
        // Everything before the signature slot is unaffected.
        let signed = transaction_bytes(&tx, true, true);
        assert_eq!(unsigned[..TX_SIGNATURE_OFFSET], signed[..TX_SIGNATURE_OFFSET]);
    }

    #[test]
    fn encoding_is_deterministic() {
        let tx = transfer_fixture();
        assert_eq!(
            transaction_bytes(&tx, true, true),
            transaction_bytes(&tx, true, true)
        );
    }

    #[test]
    fn id_changes_when_any_field_changes() {
        let tx = transfer_fixture();
        let original = tx_id(&tx);

        let mut changed = tx.clone();
        changed.created_at += 1;
        assert_ne!(tx_id(&changed), original);

        let mut changed = tx.clone();
        changed.salt = Salt([0x12; 16]);
        assert_ne!(tx_id(&changed), original);

        let mut changed = tx;
        changed.asset = Asset::Transfer {
            recipient_address: Address(0x0102030405060708),
            amount: 9_001,
        };
        assert_ne!(tx_id(&changed), original);
    }

    #[test]
    fn transfer_round_trip() {
        let tx = transfer_fixture();
        let decoded = decode_transaction(&transaction_bytes(&tx, true, true)).unwrap();
        assert_eq!(decoded, tx);
    }

    #[test]
    fn stake_round_trip_with_hand_built_tail() {
        let kp = KeyPair::from_seed([2u8; 32]);
        let mut tx = Transaction {
            id: TxId::from_bytes([0u8; 32]),
            tx_type: TransactionType::Stake,
            created_at: 40,
            sender_public_key: kp.public_key,
            sender_address: kp.address,
            signature: Signature::ZERO,
            second_signature: None,
            salt: Salt([0x22; 16]),
            fee: 5, // 1 bp of 50,000
            block_id: None,
            asset: Asset::Stake {
                amount: 50_000,
                start_time: 40,
            },
        };
        tx.signature = kp.sign(&tx_signing_hash(&tx));
        tx.id = tx_id(&tx);

        let bytes = transaction_bytes(&tx, true, true);
        assert_eq!(bytes.len(), TX_PREFIX_BYTES + 12);
        let mut tail = Vec::new();
        tail.extend_from_slice(&50_000u64.to_le_bytes());
        tail.extend_from_slice(&40u32.to_le_bytes());
        assert_eq!(&bytes[TX_PREFIX_BYTES..], &tail[..]);

        assert_eq!(decode_transaction(&bytes).unwrap(), tx);
    }

    #[test]
    fn vote_tail_orders_sponsors_by_address() {
        let kp = KeyPair::from_seed([3u8; 32]);
        let mut airdrop = AirdropReward::default();
        airdrop.sponsors.insert(Address(500), 10);
        airdrop.sponsors.insert(Address(2), 30);
        let mut tx = Transaction {
            id: TxId::from_bytes([0u8; 32]),
            tx_type: TransactionType::Vote,
            created_at: 60,
            sender_public_key: kp.public_key,
            sender_address: kp.address,
            signature: Signature::ZERO,
            second_signature: None,
            salt: Salt([0x33; 16]),
            fee: 0,
            block_id: None,
            asset: Asset::Vote {
                votes: vec![
                    Ballot {
                        direction: BallotDirection::Apply,
                        delegate: Address(77),
                    },
                    Ballot {
                        direction: BallotDirection::Remove,
                        delegate: Address(88),
                    },
                ],
                reward: 5,
                unstake: 3,
                airdrop_reward: airdrop,
            },
        };
        tx.signature = kp.sign(&tx_signing_hash(&tx));
        tx.id = tx_id(&tx);

        let bytes = transaction_bytes(&tx, true, true);
        let tail = &bytes[TX_PREFIX_BYTES..];

        let mut expected = Vec::new();
        expected.extend_from_slice(&2u16.to_le_bytes());
        expected.push(b'+');
        expected.extend_from_slice(&77u64.to_le_bytes());
        expected.push(b'-');
        expected.extend_from_slice(&88u64.to_le_bytes());
        expected.extend_from_slice(&5i64.to_le_bytes());
        expected.extend_from_slice(&3i64.to_le_bytes());
        expected.extend_from_slice(&2u16.to_le_bytes());
        expected.extend_from_slice(&2u64.to_le_bytes()); // Address(2) first
        expected.extend_from_slice(&30i64.to_le_bytes());
        expected.extend_from_slice(&500u64.to_le_bytes());
        expected.extend_from_slice(&10i64.to_le_bytes());
        assert_eq!(tail, &expected[..]);

        assert_eq!(decode_transaction(&bytes).unwrap(), tx);
    }

    #[test]
    fn delegate_and_second_signature_round_trip() {
        let kp = KeyPair::from_seed([4u8; 32]);
        let second = KeyPair::from_seed([5u8; 32]);

        for asset in [
            Asset::Delegate {
                username: "forger_one".into(),
            },
            Asset::SecondSignature {
                public_key: second.public_key,
            },
        ] {
            let fee = match asset {
                Asset::Delegate { .. } => forgex_core::constants::DELEGATE_FEE,
                _ => forgex_core::constants::SECOND_SIGNATURE_FEE,
            };
            let mut tx = Transaction {
                id: TxId::from_bytes([0u8; 32]),
                tx_type: asset.tx_type(),
                created_at: 7,
                sender_public_key: kp.public_key,
                sender_address: kp.address,
                signature: Signature::ZERO,
                second_signature: None,
                salt: Salt([0x44; 16]),
                fee,
                block_id: None,
                asset,
            };
            tx.signature = kp.sign(&tx_signing_hash(&tx));
            tx.second_signature = Some(second.sign(&tx_second_signing_hash(&tx)));
            tx.id = tx_id(&tx);

            let decoded = decode_transaction(&transaction_bytes(&tx, true, true)).unwrap();
            assert_eq!(decoded, tx);
        }
    }

    #[test]
    fn decode_rejects_truncated_and_trailing_bytes() {
        let tx = transfer_fixture();
        let bytes = transaction_bytes(&tx, true, true);
        assert!(decode_transaction(&bytes[..bytes.len() - 1]).is_err());

        let mut padded = bytes;
        padded.push(0);
        assert!(decode_transaction(&padded).is_err());
    }

    #[test]
    fn decode_rejects_unknown_type() {
        let tx = transfer_fixture();
        let mut bytes = transaction_bytes(&tx, true, true);
        bytes[16] = 99;
        assert!(decode_transaction(&bytes).is_err());
    }
}
