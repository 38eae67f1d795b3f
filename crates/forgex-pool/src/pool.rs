//! Verified unconfirmed transactions, indexed for block formation.

use std::collections::HashMap;

use forgex_core::transaction::Transaction;
use forgex_core::types::{Address, TxId};

/// Keyed map `id → tx` with secondary per-address indexes.
///
/// Per-address lists are ordered by (createdAt asc, id asc). Global
/// ordering for block formation is (fee desc, createdAt asc, id asc).
/// Preconditions for [`add`](Self::add): the transaction passed the full
/// verification chain and its account mutation is applied.
#[derive(Default)]
pub struct TransactionPool {
    by_id: HashMap<TxId, Transaction>,
    by_sender: HashMap<Address, Vec<(u32, TxId)>>,
    by_recipient: HashMap<Address, Vec<(u32, TxId)>>,
}

fn insert_ordered(list: &mut Vec<(u32, TxId)>, entry: (u32, TxId)) {
    let pos = list.partition_point(|e| *e <= entry);
    list.insert(pos, entry);
}

fn remove_entry(list: &mut Vec<(u32, TxId)>, id: &TxId) {
    list.retain(|(_, e)| e != id);
}

impl TransactionPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &TxId) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn get(&self, id: &TxId) -> Option<&Transaction> {
        self.by_id.get(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Insert a verified, already-applied transaction. Re-adding a known id
    /// is a no-op.
    pub fn add(&mut self, tx: Transaction) {
        if self.by_id.contains_key(&tx.id) {
            return;
        }
        let entry = (tx.created_at, tx.id);
        insert_ordered(self.by_sender.entry(tx.sender_address).or_default(), entry);
        if let Some(recipient) = tx.recipient_address() {
            insert_ordered(self.by_recipient.entry(recipient).or_default(), entry);
        }
        self.by_id.insert(tx.id, tx);
    }

    /// Remove a transaction by id; the caller decides whether to undo its
    /// account mutation.
    pub fn remove(&mut self, id: &TxId) -> Option<Transaction> {
        let tx = self.by_id.remove(id)?;
        if let Some(list) = self.by_sender.get_mut(&tx.sender_address) {
            remove_entry(list, id);
            if list.is_empty() {
                self.by_sender.remove(&tx.sender_address);
            }
        }
        if let Some(recipient) = tx.recipient_address() {
            if let Some(list) = self.by_recipient.get_mut(&recipient) {
                remove_entry(list, id);
                if list.is_empty() {
                    self.by_recipient.remove(&recipient);
                }
            }
        }
        Some(tx)
    }

    /// Does `address` currently have pooled outgoing transactions?
    pub fn has_sender(&self, address: Address) -> bool {
        self.by_sender.contains_key(&address)
    }

    /// Pooled transactions sent by `address`, ordered (createdAt asc, id asc).
    pub fn get_by_sender(&self, address: Address) -> Vec<Transaction> {
        self.by_sender
            .get(&address)
            .map(|list| {
                list.iter()
                    .filter_map(|(_, id)| self.by_id.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Pooled transfers paying `address`, ordered (createdAt asc, id asc).
    pub fn get_by_recipient(&self, address: Address) -> Vec<Transaction> {
        self.by_recipient
            .get(&address)
            .map(|list| {
                list.iter()
                    .filter_map(|(_, id)| self.by_id.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Up to `limit` transactions in block-formation order
    /// (fee desc, createdAt asc, id asc). Non-destructive: removal happens
    /// on successful block apply.
    pub fn sorted_unconfirmed(&self, limit: usize) -> Vec<Transaction> {
        let mut txs: Vec<&Transaction> = self.by_id.values().collect();
        txs.sort_by(|a, b| {
            b.fee
                .cmp(&a.fee)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        txs.into_iter().take(limit).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgex_core::transaction::{Asset, TransactionType};
    use forgex_core::types::{PublicKey, Salt, Signature};

    fn tx(id: u8, sender: u64, recipient: u64, fee: i64, created_at: u32) -> Transaction {
        Transaction {
            id: TxId::from_bytes([id; 32]),
            tx_type: TransactionType::Send,
            created_at,
            sender_public_key: PublicKey([sender as u8; 32]),
            sender_address: Address(sender),
            signature: Signature::ZERO,
            second_signature: None,
            salt: Salt([id; 16]),
            fee,
            block_id: None,
            asset: Asset::Transfer {
                recipient_address: Address(recipient),
                amount: 10,
            },
        }
    }

    #[test]
    fn block_formation_order() {
        let mut pool = TransactionPool::new();
        pool.add(tx(1, 1, 2, 5, 100));
        pool.add(tx(2, 1, 2, 9, 200)); // highest fee wins despite later creation
        pool.add(tx(3, 2, 3, 5, 50)); // same fee as tx 1, earlier creation
        pool.add(tx(4, 3, 4, 5, 50)); // ties with tx 3 → smaller id first

        let order: Vec<u8> = pool
            .sorted_unconfirmed(10)
            .iter()
            .map(|t| t.id.as_bytes()[0])
            .collect();
        assert_eq!(order, vec![2, 3, 4, 1]);

        assert_eq!(pool.sorted_unconfirmed(2).len(), 2);
        assert_eq!(pool.len(), 4); // non-destructive
    }

    #[test]
    fn per_address_indexes_ordered_by_creation() {
        let mut pool = TransactionPool::new();
        pool.add(tx(1, 1, 9, 1, 300));
        pool.add(tx(2, 1, 9, 1, 100));
        pool.add(tx(3, 1, 8, 1, 200));

        let sent: Vec<u8> = pool
            .get_by_sender(Address(1))
            .iter()
            .map(|t| t.id.as_bytes()[0])
            .collect();
        assert_eq!(sent, vec![2, 3, 1]);

        let received: Vec<u8> = pool
            .get_by_recipient(Address(9))
            .iter()
            .map(|t| t.id.as_bytes()[0])
            .collect();
        assert_eq!(received, vec![2, 1]);
    }

    #[test]
    fn remove_clears_indexes() {
        let mut pool = TransactionPool::new();
        pool.add(tx(1, 1, 2, 1, 100));
        pool.remove(&TxId::from_bytes([1; 32])).unwrap();
        assert!(pool.is_empty());
        assert!(!pool.has_sender(Address(1)));
        assert!(pool.get_by_recipient(Address(2)).is_empty());
    }

    #[test]
    fn duplicate_add_is_noop() {
        let mut pool = TransactionPool::new();
        pool.add(tx(1, 1, 2, 1, 100));
        pool.add(tx(1, 1, 2, 1, 100));
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.get_by_sender(Address(1)).len(), 1);
    }
}
