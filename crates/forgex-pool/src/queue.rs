//! Inbound, not-yet-verified transactions.

use std::collections::{HashSet, VecDeque};

use forgex_core::transaction::Transaction;
use forgex_core::types::TxId;

/// FIFO buffer of transactions awaiting verification. Pushing an id that is
/// already queued is a no-op; the mempool additionally skips ids that are
/// already pooled.
#[derive(Default)]
pub struct TransactionQueue {
    entries: VecDeque<Transaction>,
    queued: HashSet<TxId>,
}

impl TransactionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &TxId) -> bool {
        self.queued.contains(id)
    }

    /// Append unless already queued. Returns whether the entry was accepted.
    pub fn push(&mut self, tx: Transaction) -> bool {
        if !self.queued.insert(tx.id) {
            return false;
        }
        self.entries.push_back(tx);
        true
    }

    pub fn pop(&mut self) -> Option<Transaction> {
        let tx = self.entries.pop_front()?;
        self.queued.remove(&tx.id);
        Some(tx)
    }
}
