use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateResult {
    pub candidate_id: String,
    pub vote_count: u64,
    /// Share of the election's votes, rounded to two decimals.
    pub percentage: f64,
}

/// Tally of a single election, highest count first.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionResults {
    pub election_id: String,
    pub total_votes: u64,
    pub results: Vec<CandidateResult>,
}

impl ElectionResults {
    pub fn from_counts(election_id: &str, counts: HashMap<String, u64>) -> Self {
        let total_votes: u64 = counts.values().sum();

        let mut results: Vec<CandidateResult> = counts
            .into_iter()
            .map(|(candidate_id, vote_count)| CandidateResult {
                candidate_id,
                vote_count,
                percentage: percentage(vote_count, total_votes),
            })
            .collect();

        results.sort_by(|a, b| {
            b.vote_count
                .cmp(&a.vote_count)
                .then_with(|| a.candidate_id.cmp(&b.candidate_id))
        });

        Self {
            election_id: election_id.to_string(),
            total_votes,
            results,
        }
    }

    pub fn winner(&self) -> Option<&CandidateResult> {
        let first = self.results.first()?;
        let tied = self
            .results
            .get(1)
            .is_some_and(|second| second.vote_count == first.vote_count);
        (!tied).then_some(first)
    }
}

fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (count as f64 / total as f64 * 10_000.0).round() / 100.0
}
