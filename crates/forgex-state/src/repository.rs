//! In-memory account state with a per-block mutation diary.
//!
//! Every mutation goes through a typed method that preserves the account
//! invariants (`actual_balance >= 0`, stake never exceeds balance bookkeeping).
//! While a diary is open, each applied mutation is appended to the open
//! block's entry; [`AccountRepository::undo_block`] replays the entry in
//! reverse with exact inverses, restoring the account map to its prior state.

use std::collections::HashMap;

use forgex_core::account::{Account, Stake};
use forgex_core::error::ForgexError;
use forgex_core::types::{Address, BlockId, PublicKey};

/// One recorded state mutation. Inverses are derivable without snapshots:
/// operations that destroy information carry the destroyed value with them.
#[derive(Debug, Clone)]
enum StateOp {
    Created { address: Address },
    Credit { address: Address, amount: i64 },
    Debit { address: Address, amount: i64 },
    StakeFreeze { address: Address, amount: i64, start_time: u32 },
    UnstakeTotal { address: Address, amount: i64 },
    AddVote { address: Address, delegate: Address },
    RemoveVote { address: Address, delegate: Address },
    SetSecondKey { address: Address },
    RegisterDelegate { address: Address },
}

/// Address → Account map plus the per-block diaries still inside the fork
/// window.
#[derive(Default)]
pub struct AccountRepository {
    accounts: HashMap<Address, Account>,
    /// Delegate username uniqueness index.
    usernames: HashMap<String, Address>,
    /// Completed diaries for blocks still in the in-memory chain ring.
    diaries: HashMap<BlockId, Vec<StateOp>>,
    /// Diary currently being written (one block applies at a time).
    open: Option<(BlockId, Vec<StateOp>)>,
}

impl AccountRepository {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Reads ────────────────────────────────────────────────────────────────

    pub fn get(&self, address: Address) -> Option<&Account> {
        self.accounts.get(&address)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn username_taken(&self, username: &str) -> bool {
        self.usernames.contains_key(username)
    }

    /// Clone of the full account map, for state comparison in tests and
    /// status snapshots.
    pub fn snapshot(&self) -> HashMap<Address, Account> {
        self.accounts.clone()
    }

    // ── Diary control ────────────────────────────────────────────────────────

    /// Open a diary for `block_id`. Subsequent mutations are recorded until
    /// [`commit_diary`](Self::commit_diary) or
    /// [`discard_diary`](Self::discard_diary).
    pub fn begin_diary(&mut self, block_id: BlockId) {
        debug_assert!(self.open.is_none(), "a block diary is already open");
        self.open = Some((block_id, Vec::new()));
    }

    /// Keep the open diary for later [`undo_block`](Self::undo_block).
    pub fn commit_diary(&mut self) {
        if let Some((block_id, ops)) = self.open.take() {
            self.diaries.insert(block_id, ops);
        }
    }

    /// Drop the open diary without keeping it (mutations were already
    /// reversed by the caller).
    pub fn discard_diary(&mut self) {
        self.open = None;
    }

    /// Reverse every mutation recorded for `block_id`, newest first.
    pub fn undo_block(&mut self, block_id: &BlockId) -> Result<(), ForgexError> {
        let ops = self.diaries.remove(block_id).ok_or_else(|| {
            ForgexError::ChainDivergent(format!("no diary for block {block_id}"))
        })?;
        for op in ops.iter().rev() {
            self.revert(op)?;
        }
        Ok(())
    }

    /// Reverse the partially written open diary (mid-apply failure).
    pub fn undo_open_diary(&mut self) -> Result<(), ForgexError> {
        if let Some((_, ops)) = self.open.take() {
            for op in ops.iter().rev() {
                self.revert(op)?;
            }
        }
        Ok(())
    }

    /// Forget the diary of a block that left the in-memory ring; it can no
    /// longer be undone in place.
    pub fn prune_diary(&mut self, block_id: &BlockId) {
        self.diaries.remove(block_id);
    }

    fn record(&mut self, op: StateOp) {
        if let Some((_, ops)) = self.open.as_mut() {
            ops.push(op);
        }
    }

    // ── Typed mutations ──────────────────────────────────────────────────────

    /// Register a genesis-seeded account with a known key. Bypasses the
    /// diary: genesis is never undone.
    pub fn seed_account(&mut self, address: Address, public_key: PublicKey, balance: i64) {
        let mut account = Account::new(address, public_key);
        account.actual_balance = balance;
        self.accounts.insert(address, account);
    }

    /// Add `amount` to the account's balance, creating the account with a
    /// placeholder key if it has never been seen.
    pub fn credit(&mut self, address: Address, amount: i64) -> Result<(), ForgexError> {
        if amount < 0 {
            return Err(ForgexError::InvariantViolated("negative credit".into()));
        }
        if !self.accounts.contains_key(&address) {
            self.accounts
                .insert(address, Account::new(address, PublicKey::ZERO));
            self.record(StateOp::Created { address });
        }
        let account = self.accounts.get_mut(&address).expect("just inserted");
        account.actual_balance = account
            .actual_balance
            .checked_add(amount)
            .ok_or(ForgexError::AmountOverflow)?;
        self.record(StateOp::Credit { address, amount });
        Ok(())
    }

    /// Remove `amount` from the account's balance. Fails rather than let
    /// `actual_balance` go negative.
    pub fn debit(&mut self, address: Address, amount: i64) -> Result<(), ForgexError> {
        if amount < 0 {
            return Err(ForgexError::InvariantViolated("negative debit".into()));
        }
        let account = self
            .accounts
            .get_mut(&address)
            .ok_or(ForgexError::UnknownAccount(address))?;
        if account.actual_balance < amount {
            return Err(ForgexError::InsufficientBalance {
                need: amount,
                have: account.actual_balance,
            });
        }
        account.actual_balance -= amount;
        self.record(StateOp::Debit { address, amount });
        Ok(())
    }

    /// Freeze `amount` of the balance as a new stake tranche.
    pub fn stake_freeze(
        &mut self,
        address: Address,
        amount: i64,
        start_time: u32,
    ) -> Result<(), ForgexError> {
        let account = self
            .accounts
            .get_mut(&address)
            .ok_or(ForgexError::UnknownAccount(address))?;
        let frozen = account
            .total_staked_amount
            .checked_add(amount)
            .ok_or(ForgexError::AmountOverflow)?;
        if frozen > account.actual_balance {
            return Err(ForgexError::InsufficientBalance {
                need: frozen,
                have: account.actual_balance,
            });
        }
        account.total_staked_amount = frozen;
        account.stakes.push(Stake {
            amount,
            start_time,
            active: true,
        });
        self.record(StateOp::StakeFreeze {
            address,
            amount,
            start_time,
        });
        Ok(())
    }

    /// Release `amount` from the frozen total (vote settlement).
    pub fn unstake_total(&mut self, address: Address, amount: i64) -> Result<(), ForgexError> {
        let account = self
            .accounts
            .get_mut(&address)
            .ok_or(ForgexError::UnknownAccount(address))?;
        if account.total_staked_amount < amount {
            return Err(ForgexError::InsufficientStake {
                need: amount,
                have: account.total_staked_amount,
            });
        }
        account.total_staked_amount -= amount;
        self.record(StateOp::UnstakeTotal { address, amount });
        Ok(())
    }

    pub fn add_vote(&mut self, address: Address, delegate: Address) -> Result<(), ForgexError> {
        let account = self
            .accounts
            .get_mut(&address)
            .ok_or(ForgexError::UnknownAccount(address))?;
        if !account.votes.insert(delegate) {
            return Err(ForgexError::DuplicateVote(delegate));
        }
        self.record(StateOp::AddVote { address, delegate });
        Ok(())
    }

    pub fn remove_vote(&mut self, address: Address, delegate: Address) -> Result<(), ForgexError> {
        let account = self
            .accounts
            .get_mut(&address)
            .ok_or(ForgexError::UnknownAccount(address))?;
        if !account.votes.remove(&delegate) {
            return Err(ForgexError::VoteNotFound(delegate));
        }
        self.record(StateOp::RemoveVote { address, delegate });
        Ok(())
    }

    /// Register an independent second signing key. Rejected when one is
    /// already present, so the inverse is always "clear".
    pub fn set_second_public_key(
        &mut self,
        address: Address,
        key: PublicKey,
    ) -> Result<(), ForgexError> {
        let account = self
            .accounts
            .get_mut(&address)
            .ok_or(ForgexError::UnknownAccount(address))?;
        if account.second_public_key.is_some() {
            return Err(ForgexError::SecondKeyAlreadyRegistered);
        }
        account.second_public_key = Some(key);
        self.record(StateOp::SetSecondKey { address });
        Ok(())
    }

    /// Mark the account as a forging delegate under `username`.
    pub fn register_delegate(
        &mut self,
        address: Address,
        username: &str,
    ) -> Result<(), ForgexError> {
        if let Some(holder) = self.usernames.get(username) {
            return Err(ForgexError::InvalidUsername(format!(
                "username already registered to {holder}"
            )));
        }
        let account = self
            .accounts
            .get_mut(&address)
            .ok_or(ForgexError::UnknownAccount(address))?;
        if account.is_delegate {
            return Err(ForgexError::AlreadyDelegate(address));
        }
        account.is_delegate = true;
        account.username = Some(username.to_string());
        self.usernames.insert(username.to_string(), address);
        self.record(StateOp::RegisterDelegate { address });
        Ok(())
    }

    // ── Undo-side mutations ──────────────────────────────────────────────────
    //
    // Exact inverses of the typed mutations above, used by the per-type
    // service undo. They run outside any diary: service-level undo reverses
    // pool effects, never block effects.

    /// Inverse of [`set_second_public_key`](Self::set_second_public_key).
    pub fn clear_second_public_key(&mut self, address: Address) -> Result<(), ForgexError> {
        debug_assert!(self.open.is_none());
        let account = self
            .accounts
            .get_mut(&address)
            .ok_or(ForgexError::UnknownAccount(address))?;
        account.second_public_key = None;
        Ok(())
    }

    /// Inverse of [`register_delegate`](Self::register_delegate).
    pub fn unregister_delegate(&mut self, address: Address) -> Result<(), ForgexError> {
        debug_assert!(self.open.is_none());
        let account = self
            .accounts
            .get_mut(&address)
            .ok_or(ForgexError::UnknownAccount(address))?;
        account.is_delegate = false;
        if let Some(username) = account.username.take() {
            self.usernames.remove(&username);
        }
        Ok(())
    }

    /// Inverse of [`stake_freeze`](Self::stake_freeze): drops the newest
    /// matching tranche and releases its amount.
    pub fn stake_unfreeze(
        &mut self,
        address: Address,
        amount: i64,
        start_time: u32,
    ) -> Result<(), ForgexError> {
        debug_assert!(self.open.is_none());
        let account = self
            .accounts
            .get_mut(&address)
            .ok_or(ForgexError::UnknownAccount(address))?;
        let pos = account
            .stakes
            .iter()
            .rposition(|s| s.amount == amount && s.start_time == start_time)
            .ok_or_else(|| {
                ForgexError::InvariantViolated("no matching stake tranche to release".into())
            })?;
        account.stakes.remove(pos);
        account.total_staked_amount -= amount;
        Ok(())
    }

    /// Inverse of [`unstake_total`](Self::unstake_total).
    pub fn refreeze_total(&mut self, address: Address, amount: i64) -> Result<(), ForgexError> {
        debug_assert!(self.open.is_none());
        let account = self
            .accounts
            .get_mut(&address)
            .ok_or(ForgexError::UnknownAccount(address))?;
        account.total_staked_amount += amount;
        Ok(())
    }

    // ── Inverses ─────────────────────────────────────────────────────────────

    fn revert(&mut self, op: &StateOp) -> Result<(), ForgexError> {
        match op {
            StateOp::Created { address } => {
                self.accounts.remove(address);
            }
            StateOp::Credit { address, amount } => {
                let account = self
                    .accounts
                    .get_mut(address)
                    .ok_or(ForgexError::UnknownAccount(*address))?;
                account.actual_balance -= amount;
            }
            StateOp::Debit { address, amount } => {
                let account = self
                    .accounts
                    .get_mut(address)
                    .ok_or(ForgexError::UnknownAccount(*address))?;
                account.actual_balance += amount;
            }
            StateOp::StakeFreeze {
                address,
                amount,
                start_time,
            } => {
                let account = self
                    .accounts
                    .get_mut(address)
                    .ok_or(ForgexError::UnknownAccount(*address))?;
                account.total_staked_amount -= amount;
                // The tranche pushed by the forward op is the last matching one.
                if let Some(pos) = account
                    .stakes
                    .iter()
                    .rposition(|s| s.amount == *amount && s.start_time == *start_time)
                {
                    account.stakes.remove(pos);
                }
            }
            StateOp::UnstakeTotal { address, amount } => {
                let account = self
                    .accounts
                    .get_mut(address)
                    .ok_or(ForgexError::UnknownAccount(*address))?;
                account.total_staked_amount += amount;
            }
            StateOp::AddVote { address, delegate } => {
                let account = self
                    .accounts
                    .get_mut(address)
                    .ok_or(ForgexError::UnknownAccount(*address))?;
                account.votes.remove(delegate);
            }
            StateOp::RemoveVote { address, delegate } => {
                let account = self
                    .accounts
                    .get_mut(address)
                    .ok_or(ForgexError::UnknownAccount(*address))?;
                account.votes.insert(*delegate);
            }
            StateOp::SetSecondKey { address } => {
                let account = self
                    .accounts
                    .get_mut(address)
                    .ok_or(ForgexError::UnknownAccount(*address))?;
                account.second_public_key = None;
            }
            StateOp::RegisterDelegate { address } => {
                let account = self
                    .accounts
                    .get_mut(address)
                    .ok_or(ForgexError::UnknownAccount(*address))?;
                account.is_delegate = false;
                if let Some(username) = account.username.take() {
                    self.usernames.remove(&username);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> AccountRepository {
        let mut repo = AccountRepository::new();
        repo.seed_account(Address(1), PublicKey([1u8; 32]), 1_000);
        repo
    }

    #[test]
    fn debit_never_goes_negative() {
        let mut repo = seeded();
        let err = repo.debit(Address(1), 1_001).unwrap_err();
        assert!(matches!(err, ForgexError::InsufficientBalance { .. }));
        assert_eq!(repo.get(Address(1)).unwrap().actual_balance, 1_000);
    }

    #[test]
    fn credit_creates_placeholder_account() {
        let mut repo = seeded();
        repo.credit(Address(2), 50).unwrap();
        let account = repo.get(Address(2)).unwrap();
        assert_eq!(account.public_key, PublicKey::ZERO);
        assert_eq!(account.actual_balance, 50);
    }

    #[test]
    fn apply_then_undo_restores_exact_state() {
        let mut repo = seeded();
        repo.seed_account(Address(9), PublicKey([9u8; 32]), 500);
        let before = repo.snapshot();

        let block = BlockId::from_bytes([0xaa; 32]);
        repo.begin_diary(block);
        repo.debit(Address(1), 300).unwrap();
        repo.credit(Address(2), 250).unwrap(); // creates Address(2)
        repo.stake_freeze(Address(9), 100, 40).unwrap();
        repo.add_vote(Address(9), Address(1)).unwrap();
        repo.register_delegate(Address(1), "forger_one").unwrap();
        repo.commit_diary();

        assert_ne!(repo.snapshot(), before);
        repo.undo_block(&block).unwrap();
        assert_eq!(repo.snapshot(), before);
        assert!(!repo.username_taken("forger_one"));
    }

    #[test]
    fn partial_diary_reverts_on_failure() {
        let mut repo = seeded();
        let before = repo.snapshot();

        repo.begin_diary(BlockId::from_bytes([0xbb; 32]));
        repo.debit(Address(1), 100).unwrap();
        repo.credit(Address(3), 100).unwrap();
        // Third mutation fails; caller reverts the open diary.
        assert!(repo.debit(Address(1), 10_000).is_err());
        repo.undo_open_diary().unwrap();

        assert_eq!(repo.snapshot(), before);
    }

    #[test]
    fn duplicate_vote_rejected() {
        let mut repo = seeded();
        repo.add_vote(Address(1), Address(7)).unwrap();
        assert!(matches!(
            repo.add_vote(Address(1), Address(7)),
            Err(ForgexError::DuplicateVote(_))
        ));
    }

    #[test]
    fn username_uniqueness_enforced() {
        let mut repo = seeded();
        repo.seed_account(Address(2), PublicKey([2u8; 32]), 0);
        repo.register_delegate(Address(1), "alpha").unwrap();
        assert!(repo.register_delegate(Address(2), "alpha").is_err());
    }
}
