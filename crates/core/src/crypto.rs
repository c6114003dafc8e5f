//! Hashing and ECDSA primitives.
//!
//! Entity hashes are double SHA-256; script hashes are RIPEMD-160 over
//! SHA-256. Signatures are secp256r1 ECDSA in raw 64-byte (r ‖ s) form.

use crate::constants::SIGNATURE_SIZE;
use crate::{UInt160, UInt256};
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Double SHA-256, the entity hash used for payloads, transactions and headers.
pub fn hash256(data: &[u8]) -> UInt256 {
    UInt256::from(<[u8; 32]>::from(Sha256::digest(Sha256::digest(data))))
}

/// RIPEMD-160 over SHA-256, the script-hash used for addresses.
pub fn hash160(data: &[u8]) -> UInt160 {
    let sha = Sha256::digest(data);
    UInt160::from(<[u8; 20]>::from(Ripemd160::digest(sha)))
}

/// Verifies a raw 64-byte secp256r1 signature over `message`.
///
/// Malformed keys or signatures verify as false rather than erroring; a
/// peer that sends garbage gets the same answer as one that signs wrongly.
pub fn verify_signature(message: &[u8], signature: &[u8], compressed_key: &[u8]) -> bool {
    if signature.len() != SIGNATURE_SIZE {
        return false;
    }
    let Ok(key) = VerifyingKey::from_sec1_bytes(compressed_key) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    key.verify(message, &signature).is_ok()
}
