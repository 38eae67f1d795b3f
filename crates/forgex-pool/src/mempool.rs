//! The pool and queue as one unit.
//!
//! The block pipeline reshapes both structures atomically around each block,
//! so they live behind a single lock (owned by the pipeline). All methods
//! here assume that lock is held.

use std::collections::{BTreeSet, HashSet};

use tracing::{debug, warn};

use forgex_codec::tx_id;
use forgex_core::error::ForgexError;
use forgex_core::transaction::Transaction;
use forgex_core::types::{Address, TxId};
use forgex_state::repository::AccountRepository;
use forgex_state::services;

#[derive(Default)]
pub struct Mempool {
    pub pool: crate::pool::TransactionPool,
    pub queue: crate::queue::TransactionQueue,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept an inbound transaction into the queue. Ids already queued or
    /// pooled are ignored.
    pub fn enqueue(&mut self, tx: Transaction) -> bool {
        if self.pool.contains(&tx.id) {
            return false;
        }
        self.queue.push(tx)
    }

    /// Single-pass verifier: drain the queue, promoting each transaction
    /// into the pool or dropping it with a reason. The fee is recomputed
    /// against current sender state before verification, and the id
    /// refreshed whenever the fee changed. Returns the number promoted.
    pub fn process_queue<F>(&mut self, repo: &mut AccountRepository, is_confirmed: F) -> usize
    where
        F: Fn(&TxId) -> bool,
    {
        let mut promoted = 0;
        while let Some(mut tx) = self.queue.pop() {
            if self.pool.contains(&tx.id) {
                continue;
            }
            if is_confirmed(&tx.id) {
                debug!(id = %tx.id, "queued transaction already confirmed");
                continue;
            }

            let expected_fee = services::calculate_fee(&tx, repo.get(tx.sender_address));
            if tx.fee != expected_fee {
                tx.fee = expected_fee;
                tx.id = tx_id(&tx);
            }

            match services::verify_transaction(&tx, repo) {
                Ok(()) => match services::apply_unconfirmed(&tx, repo) {
                    Ok(()) => {
                        self.pool.add(tx);
                        promoted += 1;
                    }
                    Err(e) => debug!(id = %tx.id, error = %e, "apply failed, dropping"),
                },
                Err(e) => debug!(id = %tx.id, error = %e, "verification failed, dropping"),
            }
        }
        promoted
    }

    /// Remove `id` from the pool, undoing its account mutation.
    pub fn remove_with_undo(
        &mut self,
        id: &TxId,
        repo: &mut AccountRepository,
    ) -> Result<Option<Transaction>, ForgexError> {
        match self.pool.remove(id) {
            Some(tx) => {
                services::undo_unconfirmed(&tx, repo)?;
                Ok(Some(tx))
            }
            None => Ok(None),
        }
    }

    /// Undo and remove every pooled transaction sent by the given senders,
    /// returning them in re-application order (createdAt asc, id asc).
    ///
    /// The block pipeline calls this before applying a block so the block's
    /// transactions meet clean sender state; non-block entries are handed
    /// back through [`restore_displaced`](Self::restore_displaced). A
    /// recipient that already spent a displaced credit has its own pool
    /// entries unwound into the queue first (see
    /// [`cascade_undo`](Self::cascade_undo)).
    pub fn displace_senders(
        &mut self,
        senders: &BTreeSet<Address>,
        repo: &mut AccountRepository,
    ) -> Result<Vec<Transaction>, ForgexError> {
        let mut displaced = Vec::new();
        let mut in_flight = HashSet::new();
        for sender in senders {
            let txs = self.pool.get_by_sender(*sender);
            // Undo newest-first so each inverse meets the state it mutated.
            for tx in txs.iter().rev() {
                self.cascade_undo(tx, repo, &mut in_flight)?;
                self.pool.remove(&tx.id);
            }
            displaced.extend(txs);
        }
        displaced.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(displaced)
    }

    /// Undo one pooled transaction, unwinding recipient spends that stand in
    /// the way. When the plain inverse fails because the credited recipient
    /// already spent the funds, the recipient's own pool entries are undone
    /// newest-first and moved to the queue for re-entry, then the inverse is
    /// retried. `in_flight` breaks dependency cycles.
    fn cascade_undo(
        &mut self,
        tx: &Transaction,
        repo: &mut AccountRepository,
        in_flight: &mut HashSet<TxId>,
    ) -> Result<(), ForgexError> {
        if !in_flight.insert(tx.id) {
            return Err(ForgexError::InvariantViolated(
                "circular dependency between pooled transactions".into(),
            ));
        }
        if services::undo_unconfirmed(tx, repo).is_ok() {
            return Ok(());
        }
        let recipient = tx.recipient_address().ok_or_else(|| {
            ForgexError::InvariantViolated("pooled transaction cannot be undone".into())
        })?;
        for rtx in self.pool.get_by_sender(recipient).iter().rev() {
            if in_flight.contains(&rtx.id) {
                continue;
            }
            self.cascade_undo(rtx, repo, in_flight)?;
            self.pool.remove(&rtx.id);
            debug!(id = %rtx.id, "dependent spend unwound to queue");
            self.queue.push(rtx.clone());
        }
        services::undo_unconfirmed(tx, repo)
    }

    /// Re-admit displaced transactions after a block landed. Entries in
    /// `skip` (the block's own transactions) are dropped — they are
    /// confirmed now. Entries that no longer verify are routed back to the
    /// queue, and senders downstream of a failed transfer go through
    /// sender-conflict resolution.
    pub fn restore_displaced(
        &mut self,
        displaced: Vec<Transaction>,
        skip: &HashSet<TxId>,
        repo: &mut AccountRepository,
    ) {
        let mut visited = HashSet::new();
        for tx in displaced {
            if skip.contains(&tx.id) {
                continue;
            }
            match services::verify_transaction(&tx, repo)
                .and_then(|_| services::apply_unconfirmed(&tx, repo))
            {
                Ok(()) => self.pool.add(tx),
                Err(e) => {
                    debug!(id = %tx.id, error = %e, "displaced transaction requeued");
                    let recipient = tx.recipient_address();
                    self.queue.push(tx);
                    if let Some(recipient) = recipient {
                        if self.pool.has_sender(recipient) {
                            self.check_sender_transactions(recipient, repo, &mut visited);
                        }
                    }
                }
            }
        }
    }

    /// Sender-conflict resolution.
    ///
    /// The sender's pooled transactions are undone exactly once each
    /// (newest first, cascading into dependent recipients), then
    /// re-verified and re-applied in order. A transaction that fails
    /// re-verification leaves the pool for the queue; when it was a
    /// transfer, the recipient — if itself a pool sender — is resolved
    /// recursively. The visited set guarantees termination: every recursion
    /// consumes one unvisited address.
    pub fn check_sender_transactions(
        &mut self,
        sender: Address,
        repo: &mut AccountRepository,
        visited: &mut HashSet<Address>,
    ) {
        if !visited.insert(sender) {
            return;
        }

        let mut in_flight = HashSet::new();
        for tx in self.pool.get_by_sender(sender).iter().rev() {
            if let Err(e) = self.cascade_undo(tx, repo, &mut in_flight) {
                warn!(id = %tx.id, error = %e, "could not undo pooled transaction, dropping");
                self.pool.remove(&tx.id);
            }
        }

        for tx in self.pool.get_by_sender(sender) {
            match services::verify_transaction(&tx, repo)
                .and_then(|_| services::apply_unconfirmed(&tx, repo))
            {
                Ok(()) => {}
                Err(e) => {
                    debug!(id = %tx.id, sender = %sender, error = %e, "conflicting transaction requeued");
                    self.pool.remove(&tx.id);
                    let recipient = tx.recipient_address();
                    self.queue.push(tx);
                    if let Some(recipient) = recipient {
                        if self.pool.has_sender(recipient) {
                            self.check_sender_transactions(recipient, repo, visited);
                        }
                    }
                }
            }
        }
    }
}
