use ed25519_dalek::{Signature as DalekSignature, Verifier, VerifyingKey};
use thiserror::Error;

use forgex_core::types::{PublicKey, Signature};

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid public key")]
    InvalidPublicKey,
}

/// Verify a detached Ed25519 signature over `message` (normally a 32-byte
/// SHA-256 hash of canonical bytes).
pub fn verify_signature(
    public_key: &PublicKey,
    message: &[u8],
    signature: &Signature,
) -> Result<(), SignatureError> {
    let vk = VerifyingKey::from_bytes(public_key.as_bytes())
        .map_err(|_| SignatureError::InvalidPublicKey)?;
    let sig = DalekSignature::from_bytes(signature.as_bytes());
    vk.verify(message, &sig)
        .map_err(|_| SignatureError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypair::KeyPair;

    #[test]
    fn sign_verify_round_trip() {
        let kp = KeyPair::generate();
        let message = crate::hash::sha256(b"ten second slots");
        let sig = kp.sign(&message);
        assert!(verify_signature(&kp.public_key, &message, &sig).is_ok());
    }

    #[test]
    fn tampered_message_fails() {
        let kp = KeyPair::generate();
        let sig = kp.sign(&crate::hash::sha256(b"original"));
        let err = verify_signature(&kp.public_key, &crate::hash::sha256(b"tampered"), &sig);
        assert!(err.is_err());
    }

    #[test]
    fn foreign_key_fails() {
        let kp = KeyPair::generate();
        let other = KeyPair::generate();
        let message = crate::hash::sha256(b"message");
        let sig = kp.sign(&message);
        assert!(verify_signature(&other.public_key, &message, &sig).is_err());
    }
}
