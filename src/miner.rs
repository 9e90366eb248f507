//! Proof-of-work sealing for ledger entries

use crate::blockchain::Entry;
use crate::crypto::meets_difficulty;
use tracing::debug;

/// Search for the smallest nonce whose digest has `difficulty` leading hex
/// zeros. CPU-bound with no I/O; callers should not hold unrelated locks
/// while this runs.
pub fn seal(mut entry: Entry, difficulty: usize) -> Entry {
    entry.nonce = 0;
    entry.digest = entry.compute_digest();

    while !meets_difficulty(&entry.digest, difficulty) {
        entry.nonce += 1;
        entry.digest = entry.compute_digest();
    }

    debug!(
        position = entry.position,
        nonce = entry.nonce,
        digest = %entry.digest,
        "entry sealed"
    );
    entry
}

/// Expected number of digest attempts for a difficulty.
pub fn expected_attempts(difficulty: usize) -> u64 {
    16u64.saturating_pow(difficulty as u32)
}
