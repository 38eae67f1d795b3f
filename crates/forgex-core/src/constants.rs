//! ─── ForgeX Protocol Constants ──────────────────────────────────────────────
//!
//! Delegated-proof-of-stake ledger with ten-second forging slots.
//!
//! Base unit: 1 FX = 100,000,000 frg (8 decimal places, integer arithmetic
//! only — amounts and fees are i64 frg throughout).

// ── Units ────────────────────────────────────────────────────────────────────

/// 1 FX expressed in frg.
pub const FRG_PER_FX: i64 = 100_000_000;

// ── Epoch / slots ────────────────────────────────────────────────────────────

/// Epoch anchor: 2026-01-01 00:00:00 UTC, in milliseconds.
/// All transaction and block `created_at` fields are seconds since this point.
pub const EPOCH_START_MS: i64 = 1_767_225_600_000;

/// Seconds per forging slot. One delegate is elected per slot.
pub const SLOT_INTERVAL_SECS: u32 = 10;

/// Delegates forging per round. A round is this many consecutive slots;
/// the roster is reshuffled at every round boundary.
pub const ACTIVE_DELEGATES: usize = 3;

// ── Block limits ─────────────────────────────────────────────────────────────

/// Current block format version.
pub const BLOCK_VERSION: u32 = 1;

/// Maximum transactions drained from the pool into one block.
pub const MAX_TX_PER_BLOCK: usize = 250;

/// Maximum total canonical-encoded size of a block's transactions.
pub const MAX_BLOCK_BYTES: usize = 1_048_576;

/// In-memory chain ring keeps at least this many blocks beyond the
/// fork window (`ACTIVE_DELEGATES`), so short-range recovery never has to
/// read the durable store.
pub const CHAIN_RING_EXTRA: usize = 2;

// ── Canonical transaction layout ─────────────────────────────────────────────

/// Random salt prepended to every transaction's canonical bytes.
pub const SALT_LENGTH: usize = 16;

/// Length of the fixed transaction prefix: salt(16) + type(1) +
/// createdAt(4) + senderPublicKey(32) + recipientAddress(8) + amount(8) +
/// signature(64) + secondSignature(64). The asset tail follows.
pub const TX_PREFIX_BYTES: usize = 197;

/// Offset of the first signature slot inside the prefix.
pub const TX_SIGNATURE_OFFSET: usize = 69;

/// Offset of the second signature slot inside the prefix.
pub const TX_SECOND_SIGNATURE_OFFSET: usize = 133;

/// Length of the canonical block header encoding: version(4) +
/// createdAt(4) + previousBlockId(32) + transactionCount(4) + amount(8) +
/// fee(8) + payloadHash(32) + generatorPublicKey(32) + signature(64).
pub const BLOCK_BYTES_LEN: usize = 188;

// ── Fees (frg) ───────────────────────────────────────────────────────────────

/// Send fee: basis points of the transferred amount (1 bp = 0.01%).
pub const SEND_FEE_BPS: i64 = 1;

/// Stake fee: basis points of the staked amount.
pub const STAKE_FEE_BPS: i64 = 1;

/// Vote fee: basis points of the sender's total staked amount at
/// verification time. Recomputed during queue verification; an id
/// recomputation follows whenever the fee changed.
pub const VOTE_FEE_BPS: i64 = 1;

/// Flat fee for registering a second signing key.
pub const SECOND_SIGNATURE_FEE: i64 = FRG_PER_FX;

/// Flat fee for registering as a delegate.
pub const DELEGATE_FEE: i64 = 10 * FRG_PER_FX;

/// Minimum fee charged by the proportional schedules.
pub const MIN_PROPORTIONAL_FEE: i64 = 1;

// ── Transaction validation ───────────────────────────────────────────────────

/// Maximum ballots (vote / unvote entries) in a single vote transaction.
pub const MAX_BALLOTS_PER_TX: usize = 33;

/// Maximum delegate username length in bytes.
pub const MAX_USERNAME_LENGTH: usize = 20;

/// Maximum airdrop sponsors attached to a vote transaction.
pub const MAX_AIRDROP_SPONSORS: usize = 15;
