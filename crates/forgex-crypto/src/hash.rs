use sha2::{Digest, Sha256};

use forgex_core::types::{Address, BlockId, PublicKey, TxId};

/// Compute SHA-256 of arbitrary bytes → 32-byte array.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let digest = Sha256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Derive an Address from a raw public key: the first 8 bytes of
/// SHA-256(public key), interpreted little-endian.
pub fn address_from_public_key(public_key: &PublicKey) -> Address {
    let digest = sha256(public_key.as_bytes());
    let mut first = [0u8; 8];
    first.copy_from_slice(&digest[..8]);
    Address(u64::from_le_bytes(first))
}

/// Derive a TxId from canonical transaction bytes.
pub fn tx_id_from_bytes(bytes: &[u8]) -> TxId {
    TxId::from_bytes(sha256(bytes))
}

/// Derive a BlockId from canonical block bytes.
pub fn block_id_from_bytes(bytes: &[u8]) -> BlockId {
    BlockId::from_bytes(sha256(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        // SHA-256 of the empty string.
        assert_eq!(
            hex::encode(sha256(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn address_is_first_eight_digest_bytes_le() {
        let pk = PublicKey([7u8; 32]);
        let digest = sha256(pk.as_bytes());
        let mut first = [0u8; 8];
        first.copy_from_slice(&digest[..8]);
        assert_eq!(address_from_public_key(&pk).as_u64(), u64::from_le_bytes(first));
    }

    #[test]
    fn distinct_keys_distinct_addresses() {
        let a = address_from_public_key(&PublicKey([1u8; 32]));
        let b = address_from_public_key(&PublicKey([2u8; 32]));
        assert_ne!(a, b);
    }
}
