//! Quorum arithmetic and leader rotation.

/// Number of Byzantine faults `n` validators tolerate: `f = (n - 1) / 3`.
pub fn byzantine_threshold(n: usize) -> usize {
    n.saturating_sub(1) / 3
}

/// Signatures forming a quorum: `m = n - f`, which is at least `2f + 1`.
pub fn quorum_threshold(n: usize) -> usize {
    n - byzantine_threshold(n)
}

/// The primary (leader) slot for a given height and view.
///
/// Rotates backwards through the validator list as the view number climbs,
/// so every honest node derives the same leader from the same pair.
pub fn primary_index(block_index: u32, view_number: u8, validator_count: usize) -> u32 {
    let n = validator_count as i64;
    let p = (block_index as i64 - view_number as i64) % n;
    (if p >= 0 { p } else { p + n }) as u32
}
