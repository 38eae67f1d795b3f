//! The block pipeline: generate, verify, apply, undo.
//!
//! Chain-mutating operations (`generate_block`, `receive_block`,
//! `delete_last_block`, batch load) are serialized by a single sequence
//! mutex — the node is single-writer. Pool and queue are reshaped
//! atomically around each block under their own lock; lock order is always
//! sequence → mempool. Suspension points inside the sequence hold the turn.

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use forgex_codec::{block_id, block_signing_hash, payload_hash, payload_len};
use forgex_core::block::Block;
use forgex_core::constants::{BLOCK_VERSION, MAX_BLOCK_BYTES, MAX_TX_PER_BLOCK};
use forgex_core::error::ForgexError;
use forgex_core::slots::SlotClock;
use forgex_core::transaction::Transaction;
use forgex_core::types::{Address, BlockId, Signature, TxId};
use forgex_crypto::{verify_signature, KeyPair};
use forgex_pool::Mempool;
use forgex_state::repository::AccountRepository;
use forgex_state::{services, ChainDb};

use crate::fork::{classify, incoming_wins, ForkKind};
use crate::roster::DelegateRoster;
use crate::store::ChainStore;

/// Limits applied during block formation and verification.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_tx_per_block: usize,
    pub max_block_bytes: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_tx_per_block: MAX_TX_PER_BLOCK,
            max_block_bytes: MAX_BLOCK_BYTES,
        }
    }
}

/// Outcome of [`BlockPipeline::receive_block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReceipt {
    /// Appended to the chain.
    Applied,
    /// The current head arrived again; nothing to do.
    AlreadyKnown,
    /// Lost a tie-break or had an unusable shape; dropped with a log entry.
    Discarded,
    /// Fork-1 recovery: the head (and its parent) were rolled back; the
    /// incoming block was not applied — the next blocks establish the new
    /// suffix.
    RolledBack,
}

/// Everything the single writer mutates: chain ring, account state,
/// roster and clock, plus the durable store handle.
struct ChainState {
    chain: ChainStore,
    repo: AccountRepository,
    roster: DelegateRoster,
    clock: SlotClock,
    db: Arc<ChainDb>,
}

pub struct BlockPipeline {
    /// The global sequence: holders are the only writers of chain state.
    sequence: Mutex<ChainState>,
    mempool: Arc<RwLock<Mempool>>,
    config: PipelineConfig,
    is_cleaning: AtomicBool,
    broadcast: RwLock<Option<mpsc::UnboundedSender<Block>>>,
}

impl BlockPipeline {
    pub fn new(
        chain: ChainStore,
        repo: AccountRepository,
        roster: DelegateRoster,
        clock: SlotClock,
        db: Arc<ChainDb>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            sequence: Mutex::new(ChainState {
                chain,
                repo,
                roster,
                clock,
                db,
            }),
            mempool: Arc::new(RwLock::new(Mempool::new())),
            config,
            is_cleaning: AtomicBool::new(false),
            broadcast: RwLock::new(None),
        }
    }

    /// Shared handle to the pool+queue lock (RPC readers take shared views).
    pub fn mempool(&self) -> Arc<RwLock<Mempool>> {
        Arc::clone(&self.mempool)
    }

    /// Locally generated blocks are emitted here after successful apply.
    pub fn set_broadcast(&self, sender: mpsc::UnboundedSender<Block>) {
        *self.broadcast.write() = Some(sender);
    }

    /// Request cooperative shutdown: in-flight batches stop at the next
    /// checkpoint.
    pub fn shutdown(&self) {
        self.is_cleaning.store(true, Ordering::SeqCst);
    }

    pub fn is_cleaning(&self) -> bool {
        self.is_cleaning.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> Result<(), ForgexError> {
        if self.is_cleaning() {
            Err(ForgexError::Shutdown)
        } else {
            Ok(())
        }
    }

    /// Current head (id, height).
    pub async fn head(&self) -> Option<(BlockId, u64)> {
        let state = self.sequence.lock().await;
        state.chain.last_block().map(|b| (b.id, b.height))
    }

    /// Ids of recent blocks, newest first (for `blocks/common` exchanges).
    pub async fn recent_block_ids(&self) -> Vec<BlockId> {
        let state = self.sequence.lock().await;
        state.chain.recent_ids()
    }

    /// Public key of the delegate elected to forge `slot`.
    pub async fn elected_delegate(&self, slot: u32) -> Option<forgex_core::types::PublicKey> {
        let state = self.sequence.lock().await;
        state.roster.delegate_for_slot(slot).map(|d| d.public_key)
    }

    /// Balance view for status surfaces.
    pub async fn account_balance(&self, address: Address) -> Option<i64> {
        let state = self.sequence.lock().await;
        state.repo.get(address).map(|a| a.actual_balance)
    }

    /// Accept an inbound transaction into the queue.
    pub fn submit_transaction(&self, tx: Transaction) -> bool {
        self.mempool.write().enqueue(tx)
    }

    /// Drain the queue through the verifier, promoting into the pool.
    pub async fn process_queue(&self) -> usize {
        let mut state = self.sequence.lock().await;
        let ChainState { chain, repo, .. } = &mut *state;
        let mut mempool = self.mempool.write();
        mempool.process_queue(repo, |id| chain.contains_tx(id))
    }

    // ── Generate ─────────────────────────────────────────────────────────────

    /// Forge a block for `slot` from the best pooled transactions.
    ///
    /// Drains the pool under the mempool lock, builds and signs the block,
    /// then runs it through the same verify/apply path as a received block.
    /// On failure the drained transactions return to the pool.
    pub async fn generate_block(
        &self,
        keypair: &KeyPair,
        slot: u32,
    ) -> Result<Block, ForgexError> {
        self.ensure_running()?;
        let mut state = self.sequence.lock().await;
        let state = &mut *state;
        let mut mempool = self.mempool.write();

        let head = state
            .chain
            .last_block()
            .cloned()
            .ok_or_else(|| ForgexError::ChainDivergent("no chain head".into()))?;

        let mut txs = mempool.pool.sorted_unconfirmed(self.config.max_tx_per_block);
        while payload_len(&txs) > self.config.max_block_bytes {
            txs.pop();
        }

        let mut block = Block {
            id: BlockId::ZERO,
            version: BLOCK_VERSION,
            height: head.height + 1,
            previous_block_id: head.id,
            created_at: state.clock.slot_time(slot),
            generator_public_key: keypair.public_key,
            signature: Signature::ZERO,
            transaction_count: txs.len() as u32,
            amount: Block::total_amount(&txs),
            fee: Block::total_fee(&txs),
            payload_hash: payload_hash(&txs),
            transactions: txs,
        };
        block.signature = keypair.sign(&block_signing_hash(&block));
        block.id = block_id(&block);

        let confirmed =
            Self::apply_block(state, &mut mempool, &block, &self.config, &self.is_cleaning, true)?;

        if let Some(sender) = self.broadcast.read().as_ref() {
            let _ = sender.send(confirmed.clone());
        }
        info!(height = confirmed.height, id = %confirmed.id, txs = confirmed.transaction_count,
              "block generated");
        Ok(confirmed)
    }

    // ── Receive ──────────────────────────────────────────────────────────────

    /// Classify an inbound block against the head and route it to normal
    /// append, fork-1 or fork-5 recovery.
    pub async fn receive_block(&self, block: Block) -> Result<BlockReceipt, ForgexError> {
        self.ensure_running()?;
        let mut state = self.sequence.lock().await;
        let state = &mut *state;
        let head = state
            .chain
            .last_block()
            .cloned()
            .ok_or_else(|| ForgexError::ChainDivergent("no chain head".into()))?;

        match classify(&block, &head) {
            ForkKind::SameAsHead => {
                info!(id = %block.id, "received current head again");
                Ok(BlockReceipt::AlreadyKnown)
            }

            ForkKind::NormalAppend => {
                let mut mempool = self.mempool.write();
                Self::apply_block(
                    state,
                    &mut mempool,
                    &block,
                    &self.config,
                    &self.is_cleaning,
                    true,
                )?;
                info!(height = block.height, id = %block.id, "block received");
                Ok(BlockReceipt::Applied)
            }

            ForkKind::Fork1 => {
                if !incoming_wins(&block, &head) {
                    info!(id = %block.id, "fork-1 sibling lost tie-break, discarded");
                    return Ok(BlockReceipt::Discarded);
                }
                // The incoming chain wins. Validate the block before tearing
                // down our suffix, but do not apply it: its parent is not
                // ours. Dropping head and parent lets the winning chain
                // re-establish the suffix.
                Self::verify_receipt(state, &block)?;
                let mut mempool = self.mempool.write();
                Self::delete_last(state, &mut mempool)?;
                Self::delete_last(state, &mut mempool)?;
                warn!(id = %block.id, height = block.height, "fork-1: rolled back two blocks");
                Ok(BlockReceipt::RolledBack)
            }

            ForkKind::Fork5 => {
                if !incoming_wins(&block, &head) {
                    info!(id = %block.id, "fork-5 sibling lost tie-break, discarded");
                    return Ok(BlockReceipt::Discarded);
                }
                let mut mempool = self.mempool.write();
                Self::delete_last(state, &mut mempool)?;
                Self::apply_block(
                    state,
                    &mut mempool,
                    &block,
                    &self.config,
                    &self.is_cleaning,
                    true,
                )?;
                warn!(id = %block.id, height = block.height, "fork-5: sibling replaced head");
                Ok(BlockReceipt::Applied)
            }

            ForkKind::Orphan => {
                warn!(
                    id = %block.id,
                    height = block.height,
                    head_height = head.height,
                    "discarding block with no usable relation to the head"
                );
                Ok(BlockReceipt::Discarded)
            }
        }
    }

    /// Apply a batch of peer-loaded blocks in order, stopping at the first
    /// failure or at a shutdown checkpoint between blocks.
    pub async fn apply_block_batch(&self, blocks: Vec<Block>) -> Result<usize, ForgexError> {
        let mut applied = 0;
        for block in blocks {
            if self.is_cleaning() {
                warn!(applied, "batch load interrupted by shutdown");
                break;
            }
            match self.receive_block(block).await? {
                BlockReceipt::Applied => applied += 1,
                receipt => {
                    debug!(?receipt, applied, "batch load stopped");
                    break;
                }
            }
        }
        Ok(applied)
    }

    /// Roll back the chain head, returning its transactions to the queue.
    pub async fn delete_last_block(&self) -> Result<Block, ForgexError> {
        self.ensure_running()?;
        let mut state = self.sequence.lock().await;
        let state = &mut *state;
        let mut mempool = self.mempool.write();
        Self::delete_last(state, &mut mempool)
    }

    // ── Internals (sequence held) ────────────────────────────────────────────

    /// Receipt-level verification: everything checkable without the parent
    /// link. Signature failure is reported as `SignatureInvalid` (peers are
    /// banned on it); all other findings are collected into one
    /// `BlockVerification` failure.
    fn verify_receipt(state: &ChainState, block: &Block) -> Result<(), ForgexError> {
        verify_signature(
            &block.generator_public_key,
            &block_signing_hash(block),
            &block.signature,
        )
        .map_err(|_| ForgexError::SignatureInvalid)?;

        let mut errors = Vec::new();
        if block.version != BLOCK_VERSION {
            errors.push(format!("unsupported block version {}", block.version));
        }
        if block_id(block) != block.id {
            errors.push("block id does not match canonical bytes".into());
        }
        if payload_hash(&block.transactions) != block.payload_hash {
            errors.push("payload hash does not match transactions".into());
        }
        if block.transaction_count as usize != block.transactions.len() {
            errors.push(format!(
                "transaction count {} does not match payload length {}",
                block.transaction_count,
                block.transactions.len()
            ));
        }

        let slot = state.clock.slot_number(block.created_at);
        if state.clock.slot_time(slot) != block.created_at {
            errors.push(format!(
                "created_at {} is not on a slot boundary",
                block.created_at
            ));
        }
        if !state.roster.contains(&block.generator_public_key) {
            errors.push("generator is not in the elected delegate set".into());
        }
        if !errors.is_empty() {
            return Err(ForgexError::BlockVerification(errors));
        }

        match state.roster.delegate_for_slot(slot) {
            Some(elected) if elected.public_key == block.generator_public_key => Ok(()),
            Some(_) => Err(ForgexError::SlotMismatch { slot }),
            None => Err(ForgexError::BlockVerification(vec![
                "delegate roster is empty".into(),
            ])),
        }
    }

    /// Chain-level verification against the current head.
    fn verify_block(
        state: &ChainState,
        block: &Block,
        config: &PipelineConfig,
    ) -> Result<(), ForgexError> {
        let head = state
            .chain
            .last_block()
            .ok_or_else(|| ForgexError::ChainDivergent("no chain head".into()))?;

        let mut errors = Vec::new();
        if block.previous_block_id != head.id {
            errors.push(format!(
                "previous block id {} does not match head {}",
                block.previous_block_id, head.id
            ));
        }
        if block.height != head.height + 1 {
            errors.push(format!(
                "height {} does not follow head height {}",
                block.height, head.height
            ));
        }
        if block.created_at <= head.created_at {
            errors.push(format!(
                "created_at {} is not after head created_at {}",
                block.created_at, head.created_at
            ));
        }
        if block.transactions.len() > config.max_tx_per_block {
            errors.push(format!(
                "{} transactions exceed the per-block limit {}",
                block.transactions.len(),
                config.max_tx_per_block
            ));
        }
        if payload_len(&block.transactions) > config.max_block_bytes {
            errors.push("encoded transactions exceed the block byte limit".into());
        }
        let mut ids = HashSet::new();
        for tx in &block.transactions {
            if !ids.insert(tx.id) {
                errors.push(format!("duplicate transaction id {}", tx.id));
            }
        }
        if Block::total_amount(&block.transactions) != block.amount {
            errors.push("block amount does not match transaction sum".into());
        }
        if Block::total_fee(&block.transactions) != block.fee {
            errors.push("block fee does not match transaction sum".into());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ForgexError::BlockVerification(errors))
        }
    }

    /// Verify and apply one block: receipt checks, chain checks, then each
    /// transaction in listed order. Pool entries of the block's senders are
    /// displaced first so the block meets clean state; displaced entries
    /// not in the block are re-admitted afterwards (or routed through
    /// conflict resolution). A mid-apply failure undoes every applied
    /// transaction in reverse order and restores the pool.
    fn apply_block(
        state: &mut ChainState,
        mempool: &mut Mempool,
        block: &Block,
        config: &PipelineConfig,
        is_cleaning: &AtomicBool,
        save: bool,
    ) -> Result<Block, ForgexError> {
        Self::verify_receipt(state, block)?;
        Self::verify_block(state, block, config)?;

        for tx in &block.transactions {
            if state.chain.contains_tx(&tx.id) {
                info!(id = %tx.id, "transaction already confirmed");
                return Err(ForgexError::AlreadyConfirmed(tx.id.to_hex()));
            }
        }

        let senders: BTreeSet<Address> = block
            .transactions
            .iter()
            .map(|tx| tx.sender_address)
            .collect();
        let displaced = mempool.displace_senders(&senders, &mut state.repo)?;

        state.repo.begin_diary(block.id);
        let mut confirmed_txs = Vec::with_capacity(block.transactions.len());
        let mut saved: Vec<TxId> = Vec::new();
        let mut failure: Option<ForgexError> = None;

        for tx in &block.transactions {
            // Cooperative cancellation checkpoint between transactions.
            if is_cleaning.load(Ordering::SeqCst) {
                failure = Some(ForgexError::Shutdown);
                break;
            }
            if let Err(e) = services::verify_transaction(tx, &state.repo) {
                failure = Some(e);
                break;
            }
            if let Err(e) = services::apply_unconfirmed(tx, &mut state.repo) {
                failure = Some(e);
                break;
            }
            let mut confirmed = tx.clone();
            confirmed.block_id = Some(block.id);
            if save {
                if let Err(e) = state.db.save_or_update_tx(&confirmed) {
                    failure = Some(e);
                    break;
                }
                saved.push(confirmed.id);
            }
            confirmed_txs.push(confirmed);
        }

        if let Some(e) = failure {
            warn!(id = %block.id, error = %e, "block apply failed, undoing");
            state.repo.undo_open_diary()?;
            for id in &saved {
                let _ = state.db.delete_tx_by_id(id);
            }
            mempool.restore_displaced(displaced, &HashSet::new(), &mut state.repo);
            return Err(e);
        }

        state.repo.commit_diary();

        let mut confirmed_block = block.clone();
        confirmed_block.transactions = confirmed_txs;
        if let Some(evicted) = state.chain.push_block(confirmed_block.clone(), save)? {
            state.repo.prune_diary(&evicted);
        }

        let in_block: HashSet<TxId> = block.transactions.iter().map(|tx| tx.id).collect();
        mempool.restore_displaced(displaced, &in_block, &mut state.repo);

        Ok(confirmed_block)
    }

    /// Undo the head block's account mutations, return its transactions to
    /// the queue, and drop it from ring and durable store.
    fn delete_last(state: &mut ChainState, mempool: &mut Mempool) -> Result<Block, ForgexError> {
        let head = state
            .chain
            .last_block()
            .cloned()
            .ok_or_else(|| ForgexError::ChainDivergent("no chain head".into()))?;

        state.chain.can_delete_last()?;
        state.repo.undo_block(&head.id)?;
        let popped = state.chain.delete_last_block()?;

        for tx in popped.transactions.iter().rev() {
            state.db.delete_tx_by_id(&tx.id)?;
            let mut tx = tx.clone();
            tx.block_id = None;
            mempool.queue.push(tx);
        }
        info!(height = popped.height, id = %popped.id, "head rolled back");
        Ok(popped)
    }
}
