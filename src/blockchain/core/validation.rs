use crate::crypto::meets_difficulty;
use thiserror::Error;

use super::chain::{Entry, ORIGIN_PREVIOUS_DIGEST};

/// First broken invariant found while walking the chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityViolation {
    #[error("chain holds no entries")]
    EmptyChain,
    #[error("entry 0 is not a well-formed origin entry")]
    MalformedOrigin,
    #[error("entry at index {index} has position {found}, expected {expected}")]
    PositionGap { index: usize, expected: u64, found: u64 },
    #[error("entry {position} does not link to the digest of its predecessor")]
    BrokenLink { position: u64 },
    #[error("entry {position} carries an origin payload")]
    MisplacedOrigin { position: u64 },
    #[error("entry {position} digest does not match its contents")]
    DigestMismatch { position: u64 },
    #[error("entry {position} digest lacks {difficulty} leading zeros")]
    InsufficientWork { position: u64, difficulty: usize },
}

/// Walk `entries` once, recomputing each digest from the stored nonce.
/// Proof-of-work is never re-run.
pub fn validate_chain(entries: &[Entry], difficulty: usize) -> Result<(), IntegrityViolation> {
    let origin = entries.first().ok_or(IntegrityViolation::EmptyChain)?;
    if !origin.is_origin()
        || origin.position != 0
        || origin.previous_digest != ORIGIN_PREVIOUS_DIGEST
        || origin.digest != origin.compute_digest()
    {
        return Err(IntegrityViolation::MalformedOrigin);
    }

    for (index, pair) in entries.windows(2).enumerate() {
        let (previous, current) = (&pair[0], &pair[1]);

        if current.position != previous.position + 1 {
            return Err(IntegrityViolation::PositionGap {
                index: index + 1,
                expected: previous.position + 1,
                found: current.position,
            });
        }

        if current.previous_digest != previous.digest {
            return Err(IntegrityViolation::BrokenLink {
                position: current.position,
            });
        }

        if current.is_origin() {
            return Err(IntegrityViolation::MisplacedOrigin {
                position: current.position,
            });
        }

        if current.digest != current.compute_digest() {
            return Err(IntegrityViolation::DigestMismatch {
                position: current.position,
            });
        }

        if !meets_difficulty(&current.digest, difficulty) {
            return Err(IntegrityViolation::InsufficientWork {
                position: current.position,
                difficulty,
            });
        }
    }

    Ok(())
}
