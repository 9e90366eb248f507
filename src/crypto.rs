//! Digest primitives for BallotChain

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of arbitrary bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// One-way digest of a voter identifier. This is the only form in which a
/// voter ever appears on the ledger.
pub fn hash_voter_id(voter_id: &str) -> String {
    sha256_hex(voter_id.as_bytes())
}

/// Returns true when `digest` starts with at least `difficulty` `'0'` characters.
pub fn meets_difficulty(digest: &str, difficulty: usize) -> bool {
    digest.bytes().take_while(|b| *b == b'0').count() >= difficulty
}

/// First `len` characters of a digest for display, with an ellipsis when cut.
/// Counts characters, not bytes, so a tampered digest cannot split a code point.
pub fn short_digest(digest: &str, len: usize) -> String {
    let mut chars = digest.chars();
    let head: String = chars.by_ref().take(len).collect();
    if chars.next().is_some() {
        format!("{}…", head)
    } else {
        head
    }
}
