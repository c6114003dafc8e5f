//! Signing key material.

use crate::constants::SIGNATURE_SIZE;
use crate::{CoreError, PublicKey};
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use rand::RngCore;

/// A secp256r1 key pair held by a validator account.
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
    public_key: PublicKey,
}

impl KeyPair {
    /// Builds a key pair from a 32-byte private scalar.
    pub fn from_private_key(private_key: &[u8]) -> Result<Self, CoreError> {
        let signing_key = SigningKey::from_slice(private_key)
            .map_err(|e| CoreError::InvalidKey(e.to_string()))?;
        let encoded = signing_key.verifying_key().to_encoded_point(true);
        let public_key = PublicKey::from_bytes(encoded.as_bytes())?;
        Ok(Self {
            signing_key,
            public_key,
        })
    }

    /// Generates a fresh random key pair.
    pub fn generate() -> Result<Self, CoreError> {
        let mut private_key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut private_key);
        Self::from_private_key(&private_key)
    }

    /// The compressed public key.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Signs `message` (SHA-256 digested) and returns the raw 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
        let signature: Signature = self.signing_key.sign(message);
        signature.to_bytes().into()
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the private scalar.
        write!(f, "KeyPair({})", self.public_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_public_key() {
        let a = KeyPair::from_private_key(&[3u8; 32]).unwrap();
        let b = KeyPair::from_private_key(&[3u8; 32]).unwrap();
        assert_eq!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_generate_distinct() {
        let a = KeyPair::generate().unwrap();
        let b = KeyPair::generate().unwrap();
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_rejects_zero_scalar() {
        assert!(KeyPair::from_private_key(&[0u8; 32]).is_err());
    }
}
