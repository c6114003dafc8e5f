//! Protocol constants.

/// Size of a 256-bit hash in bytes.
pub const HASH_SIZE: usize = 32;

/// Size of a 160-bit address hash in bytes.
pub const ADDRESS_SIZE: usize = 20;

/// Size of a compressed secp256r1 public key in bytes.
pub const COMPRESSED_KEY_SIZE: usize = 33;

/// Size of a raw ECDSA signature (r ‖ s) in bytes.
pub const SIGNATURE_SIZE: usize = 64;

/// Maximum number of transactions a block proposal may carry.
pub const MAX_TRANSACTIONS_PER_BLOCK: usize = 512;

/// Maximum number of validators a consensus round may involve.
/// A full 21-member committee witness stays within the verification
/// script budget: 1 + 21 * 35 + 2 + 1 + 27 = 766 bytes.
pub const MAX_VALIDATORS: usize = 21;

/// Maximum serialized block size in bytes.
pub const MAX_BLOCK_SIZE: usize = 1_048_576;

/// Maximum serialized transaction script size in bytes.
pub const MAX_SCRIPT_SIZE: usize = 65536;

/// Maximum witness invocation script size in bytes.
pub const MAX_INVOCATION_SCRIPT: usize = 1024;

/// Maximum witness verification script size in bytes.
pub const MAX_VERIFICATION_SCRIPT: usize = 1024;
