use std::collections::HashMap;

use super::chain::Entry;

/// Incrementally maintained view over the ledger's votes. It must always
/// equal [`VoteIndex::rebuild`] over the same entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoteIndex {
    voters: HashMap<String, u64>,
    tallies: HashMap<String, u64>,
}

impl VoteIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full scan over `entries`, skipping the origin entry.
    pub fn rebuild(entries: &[Entry]) -> Self {
        let mut index = Self::new();
        for entry in entries {
            index.record(entry);
        }
        index
    }

    pub fn record(&mut self, entry: &Entry) {
        if let Some(vote) = entry.vote() {
            // first recorded position wins if a voter appears twice
            self.voters
                .entry(vote.hashed_voter_id.clone())
                .or_insert(entry.position);
            *self.tallies.entry(vote.candidate_id.clone()).or_insert(0) += 1;
        }
    }

    pub fn contains_voter(&self, hashed_voter_id: &str) -> bool {
        self.voters.contains_key(hashed_voter_id)
    }

    pub fn voter_position(&self, hashed_voter_id: &str) -> Option<u64> {
        self.voters.get(hashed_voter_id).copied()
    }

    pub fn tallies(&self) -> &HashMap<String, u64> {
        &self.tallies
    }

    pub fn total_votes(&self) -> u64 {
        self.tallies.values().sum()
    }
}
