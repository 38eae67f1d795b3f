use thiserror::Error;

use crate::types::Address;

#[derive(Debug, Error)]
pub enum ForgexError {
    // ── Decode / schema ──────────────────────────────────────────────────────
    #[error("malformed input: {0}")]
    Malformed(String),

    // ── Invariants ───────────────────────────────────────────────────────────
    #[error("invariant violated: {0}")]
    InvariantViolated(String),

    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("amount overflow")]
    AmountOverflow,

    // ── Signatures ───────────────────────────────────────────────────────────
    #[error("invalid signature")]
    SignatureInvalid,

    #[error("second signature required but absent")]
    SecondSignatureMissing,

    // ── Balances / accounts ──────────────────────────────────────────────────
    #[error("insufficient balance: need {need} frg, have {have}")]
    InsufficientBalance { need: i64, have: i64 },

    #[error("insufficient stake: need {need} frg, have {have}")]
    InsufficientStake { need: i64, have: i64 },

    #[error("unknown account: {0}")]
    UnknownAccount(Address),

    #[error("unknown delegate: {0}")]
    UnknownDelegate(Address),

    #[error("account is already a delegate: {0}")]
    AlreadyDelegate(Address),

    #[error("already voted for delegate {0}")]
    DuplicateVote(Address),

    #[error("no vote to remove for delegate {0}")]
    VoteNotFound(Address),

    #[error("second public key already registered")]
    SecondKeyAlreadyRegistered,

    #[error("invalid username: {0}")]
    InvalidUsername(String),

    // ── Slots / consensus ────────────────────────────────────────────────────
    #[error("wrong delegate for slot {slot}")]
    SlotMismatch { slot: u32 },

    #[error("transaction already confirmed: {0}")]
    AlreadyConfirmed(String),

    #[error("chain divergent: {0}")]
    ChainDivergent(String),

    #[error("block verification failed: {}", .0.join("; "))]
    BlockVerification(Vec<String>),

    // ── Collaborators ────────────────────────────────────────────────────────
    #[error("storage error: {0}")]
    Storage(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    // ── Lifecycle ────────────────────────────────────────────────────────────
    #[error("node is shutting down")]
    Shutdown,

    #[error("{0}")]
    Other(String),
}
