//! Merkle root computation.

use crate::{crypto, UInt256};
use dbft_io::SerializableExt;

/// Merkle tree over 256-bit hashes.
///
/// Combines pairs with double SHA-256 of the concatenated little-endian
/// encodings; an odd node at any level is paired with itself.
pub struct MerkleTree;

impl MerkleTree {
    /// Computes the root of the given leaves.
    ///
    /// An empty slice yields the zero hash; a single leaf is its own root.
    pub fn compute_root(hashes: &[UInt256]) -> UInt256 {
        match hashes {
            [] => UInt256::zero(),
            [single] => *single,
            _ => {
                let mut level: Vec<UInt256> = hashes.to_vec();
                while level.len() > 1 {
                    level = level
                        .chunks(2)
                        .map(|pair| {
                            let left = pair[0];
                            let right = *pair.last().unwrap_or(&left);
                            let mut combined = left.to_array();
                            combined.extend_from_slice(&right.to_array());
                            crypto::hash256(&combined)
                        })
                        .collect();
                }
                level[0]
            }
        }
    }
}
