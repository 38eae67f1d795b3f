use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use forgex_core::types::{Address, PublicKey, Signature};

use crate::hash::address_from_public_key;

/// A ForgeX keypair: Ed25519 signing key with the derived public key and
/// address.
///
/// Seed bytes passed through [`KeyPair::from_seed`] are wrapped in
/// `Zeroizing` so intermediate copies are wiped.
pub struct KeyPair {
    pub address: Address,
    pub public_key: PublicKey,
    signing_key: SigningKey,
}

impl KeyPair {
    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        Self::from_signing_key(signing_key)
    }

    /// Restore a keypair from a 32-byte seed (e.g. loaded from a forging
    /// secret file).
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let seed = Zeroizing::new(seed);
        Self::from_signing_key(SigningKey::from_bytes(&seed))
    }

    /// Restore a keypair from a hex-encoded 32-byte seed.
    pub fn from_seed_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&bytes);
        Ok(Self::from_seed(seed))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let public_key = PublicKey(signing_key.verifying_key().to_bytes());
        let address = address_from_public_key(&public_key);
        Self {
            address,
            public_key,
            signing_key,
        }
    }

    /// Sign `message` (normally a 32-byte hash) with this keypair.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing_key.sign(message).to_bytes())
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyPair {{ address: {:?} }}", self.address)
    }
}
