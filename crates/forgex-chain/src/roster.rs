//! The forging roster: which delegate owns which slot.
//!
//! A round is `active_delegates` consecutive slots. At each round boundary
//! the roster is reshuffled deterministically — every node sorts the
//! delegates by `SHA-256(round_le || public_key)` and gets the same order.

use forgex_core::types::{Address, PublicKey};
use forgex_crypto::hash::{address_from_public_key, sha256};

/// Information about one seated delegate.
#[derive(Debug, Clone)]
pub struct DelegateInfo {
    pub address: Address,
    pub public_key: PublicKey,
    pub username: String,
}

/// The active delegate set for slot election.
#[derive(Debug, Clone, Default)]
pub struct DelegateRoster {
    delegates: Vec<DelegateInfo>,
}

impl DelegateRoster {
    pub fn new(delegates: Vec<DelegateInfo>) -> Self {
        Self { delegates }
    }

    pub fn len(&self) -> usize {
        self.delegates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delegates.is_empty()
    }

    pub fn contains(&self, public_key: &PublicKey) -> bool {
        self.delegates.iter().any(|d| d.public_key == *public_key)
    }

    /// The delegate elected to forge `slot`, or `None` while the roster is
    /// empty.
    pub fn delegate_for_slot(&self, slot: u32) -> Option<&DelegateInfo> {
        if self.delegates.is_empty() {
            return None;
        }
        let round = slot / self.delegates.len() as u32;
        let order = self.shuffled(round);
        let seat = slot as usize % self.delegates.len();
        Some(&self.delegates[order[seat]])
    }

    /// Deterministic per-round order: indexes sorted by the shuffle seed
    /// hash.
    fn shuffled(&self, round: u32) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.delegates.len()).collect();
        order.sort_by_key(|i| {
            let mut seed = Vec::with_capacity(4 + 32);
            seed.extend_from_slice(&round.to_le_bytes());
            seed.extend_from_slice(self.delegates[*i].public_key.as_bytes());
            sha256(&seed)
        });
        order
    }
}

/// Build a roster entry from a raw public key.
pub fn delegate_info(public_key: PublicKey, username: impl Into<String>) -> DelegateInfo {
    DelegateInfo {
        address: address_from_public_key(&public_key),
        public_key,
        username: username.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster_of(n: u8) -> DelegateRoster {
        DelegateRoster::new(
            (1..=n)
                .map(|i| delegate_info(PublicKey([i; 32]), format!("delegate_{i}")))
                .collect(),
        )
    }

    #[test]
    fn every_delegate_forges_once_per_round() {
        let roster = roster_of(3);
        for round in [0u32, 1, 7] {
            let mut seen = std::collections::HashSet::new();
            for seat in 0..3u32 {
                let slot = round * 3 + seat;
                seen.insert(roster.delegate_for_slot(slot).unwrap().public_key);
            }
            assert_eq!(seen.len(), 3);
        }
    }

    #[test]
    fn election_is_deterministic() {
        let a = roster_of(5);
        let b = roster_of(5);
        for slot in 0..25u32 {
            assert_eq!(
                a.delegate_for_slot(slot).unwrap().public_key,
                b.delegate_for_slot(slot).unwrap().public_key
            );
        }
    }

    #[test]
    fn rounds_reshuffle_the_order() {
        let roster = roster_of(5);
        // Orders across many rounds should not all be identical.
        let order_of = |round: u32| -> Vec<PublicKey> {
            (0..5u32)
                .map(|seat| roster.delegate_for_slot(round * 5 + seat).unwrap().public_key)
                .collect()
        };
        let first = order_of(0);
        assert!((1..10).any(|r| order_of(r) != first));
    }

    #[test]
    fn empty_roster_elects_nobody() {
        assert!(DelegateRoster::default().delegate_for_slot(0).is_none());
    }
}
