pub mod ed25519;
pub mod hash;
pub mod keypair;

pub use ed25519::{verify_signature, SignatureError};
pub use hash::{address_from_public_key, block_id_from_bytes, sha256, tx_id_from_bytes};
pub use keypair::KeyPair;
