//! Deterministic binary layouts for transactions and blocks.
//!
//! These byte encodings are consensus-critical: ids and signatures are
//! SHA-256 over exactly these bytes, so any layout change is a hard fork.
//! Fixed-width fields, little-endian integers, no map iteration order
//! dependence (ordered maps only).

pub mod block;
pub mod tx;

pub use block::{block_bytes, block_id, block_signing_hash, payload_hash, payload_len};
pub use tx::{
    asset_bytes, decode_transaction, transaction_bytes, tx_id, tx_second_signing_hash,
    tx_signing_hash,
};
