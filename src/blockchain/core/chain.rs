use crate::config::check_difficulty;
use crate::crypto::{hash_voter_id, meets_difficulty};
use crate::error::ChainError;
use crate::miner::seal;
use crate::persistence::Persistence;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::{info, warn};

use super::results::ElectionResults;
use super::state::VoteIndex;
use super::validation::{validate_chain, IntegrityViolation};

/// `previousDigest` carried by the origin entry.
pub const ORIGIN_PREVIOUS_DIGEST: &str = "0";

/// A vote as it is recorded on the ledger. The voter is only ever present
/// as a digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRecord {
    pub hashed_voter_id: String,
    pub candidate_id: String,
    pub election_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Payload {
    Origin,
    Vote(VoteRecord),
}

impl Payload {
    pub fn as_vote(&self) -> Option<&VoteRecord> {
        match self {
            Payload::Vote(vote) => Some(vote),
            Payload::Origin => None,
        }
    }

    fn hash_into(&self, hasher: &mut Sha256) {
        match self {
            Payload::Origin => hasher.update([0u8]),
            Payload::Vote(vote) => {
                hasher.update([1u8]);
                update_str(hasher, &vote.hashed_voter_id);
                update_str(hasher, &vote.candidate_id);
                update_str(hasher, &vote.election_id);
            }
        }
    }
}

fn update_str(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

/// Raw vote event submitted by the vote-casting service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteEvent {
    pub voter_id: String,
    pub candidate_id: String,
    pub election_id: String,
}

impl VoteEvent {
    pub fn new(
        voter_id: impl Into<String>,
        candidate_id: impl Into<String>,
        election_id: impl Into<String>,
    ) -> Self {
        Self {
            voter_id: voter_id.into(),
            candidate_id: candidate_id.into(),
            election_id: election_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub position: u64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub payload: Payload,
    pub previous_digest: String,
    pub digest: String,
    pub nonce: u64,
}

impl Entry {
    /// Build an unsealed entry (nonce 0) with its digest filled in.
    pub fn new(position: u64, timestamp: u64, payload: Payload, previous_digest: String) -> Self {
        let mut entry = Entry {
            position,
            timestamp,
            payload,
            previous_digest,
            digest: String::new(),
            nonce: 0,
        };
        entry.digest = entry.compute_digest();
        entry
    }

    pub fn origin(timestamp: u64) -> Self {
        Entry::new(0, timestamp, Payload::Origin, ORIGIN_PREVIOUS_DIGEST.to_string())
    }

    /// Digest over position, timestamp, payload, previous digest and nonce.
    /// Integers are little-endian and strings are length-prefixed, so the
    /// encoding is unambiguous and stable across processes.
    pub fn compute_digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.position.to_le_bytes());
        hasher.update(self.timestamp.to_le_bytes());
        self.payload.hash_into(&mut hasher);
        update_str(&mut hasher, &self.previous_digest);
        hasher.update(self.nonce.to_le_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_origin(&self) -> bool {
        matches!(self.payload, Payload::Origin)
    }

    pub fn vote(&self) -> Option<&VoteRecord> {
        self.payload.as_vote()
    }
}

fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Append-only vote ledger. Single-threaded; see [`crate::node::LedgerHandle`]
/// for the shared, single-writer wrapper.
#[derive(Debug, Clone)]
pub struct Ledger {
    entries: Vec<Entry>,
    difficulty: usize,
    index: VoteIndex,
}

impl Ledger {
    /// Create an origin-only ledger. `difficulty` must not exceed
    /// [`crate::config::MAX_DIFFICULTY`] or appends will not finish sealing;
    /// use [`Ledger::try_new`] for values that have not been validated.
    pub fn new(difficulty: usize) -> Self {
        Self {
            entries: vec![Entry::origin(now_millis())],
            difficulty,
            index: VoteIndex::default(),
        }
    }

    /// Like [`Ledger::new`], but rejects a difficulty above the cap.
    pub fn try_new(difficulty: usize) -> Result<Self, ChainError> {
        check_difficulty(difficulty)?;
        Ok(Self::new(difficulty))
    }

    /// Rebuild a ledger from stored entries. Digests and nonces are taken as
    /// stored; only the shape of the sequence is checked here, integrity is
    /// left to [`Ledger::is_valid`].
    pub fn from_entries(entries: Vec<Entry>, difficulty: usize) -> Result<Self, ChainError> {
        check_difficulty(difficulty)?;
        let origin = entries
            .first()
            .ok_or_else(|| ChainError::CorruptSnapshot("snapshot holds no entries".to_string()))?;

        if !origin.is_origin() || origin.position != 0 {
            return Err(ChainError::CorruptSnapshot(format!(
                "first entry must be the origin entry at position 0, got position {}",
                origin.position
            )));
        }

        let index = VoteIndex::rebuild(&entries);
        Ok(Self {
            entries,
            difficulty,
            index,
        })
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    pub fn chain(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// A ledger always holds its origin entry.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn origin(&self) -> &Entry {
        &self.entries[0]
    }

    pub fn tail(&self) -> &Entry {
        // entries is never empty: constructors guarantee the origin entry
        &self.entries[self.entries.len() - 1]
    }

    /// Build the unsealed entry that would follow the current tail.
    pub fn prepare(&self, event: &VoteEvent) -> Entry {
        let tail = self.tail();
        let payload = Payload::Vote(VoteRecord {
            hashed_voter_id: hash_voter_id(&event.voter_id),
            candidate_id: event.candidate_id.clone(),
            election_id: event.election_id.clone(),
        });
        let timestamp = now_millis().max(tail.timestamp);
        Entry::new(tail.position + 1, timestamp, payload, tail.digest.clone())
    }

    /// Record a vote: hash the voter, link to the tail, seal and append.
    /// Whether the voter may vote is the caller's decision (see
    /// [`Ledger::has_voted`]).
    pub fn append(&mut self, event: &VoteEvent) -> Entry {
        let sealed = seal(self.prepare(event), self.difficulty);
        self.push(sealed.clone());
        sealed
    }

    /// Append an entry sealed elsewhere, after checking it extends the tail.
    pub fn push_sealed(&mut self, entry: Entry) -> Result<Entry, ChainError> {
        let tail = self.tail();

        if entry.position != tail.position + 1 {
            return Err(ChainError::InvalidEntry(format!(
                "Invalid position. Expected {}, but got {}.",
                tail.position + 1,
                entry.position
            )));
        }

        if entry.previous_digest != tail.digest {
            return Err(ChainError::InvalidEntry(format!(
                "Invalid previous digest. Expected {}, but got {}.",
                tail.digest, entry.previous_digest
            )));
        }

        if entry.vote().is_none() {
            return Err(ChainError::InvalidEntry(
                "Only vote entries can follow the origin entry.".to_string(),
            ));
        }

        if entry.digest != entry.compute_digest() {
            return Err(ChainError::InvalidEntry(format!(
                "Digest mismatch at position {}.",
                entry.position
            )));
        }

        if !meets_difficulty(&entry.digest, self.difficulty) {
            return Err(ChainError::InvalidEntry(format!(
                "Digest {} does not meet difficulty {}.",
                entry.digest, self.difficulty
            )));
        }

        self.push(entry.clone());
        Ok(entry)
    }

    fn push(&mut self, entry: Entry) {
        info!(position = entry.position, digest = %entry.digest, "appended vote entry");
        self.index.record(&entry);
        self.entries.push(entry);
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Like [`Ledger::is_valid`] but names the first broken invariant.
    pub fn validate(&self) -> Result<(), IntegrityViolation> {
        validate_chain(&self.entries, self.difficulty)
    }

    pub fn has_voted(&self, voter_id: &str) -> bool {
        self.index.contains_voter(&hash_voter_id(voter_id))
    }

    /// The entry holding `voter_id`'s vote, if one was recorded.
    pub fn voter_entry(&self, voter_id: &str) -> Option<&Entry> {
        self.index
            .voter_position(&hash_voter_id(voter_id))
            .and_then(|position| self.entries.get(position as usize))
    }

    /// Per-candidate tally across every election.
    pub fn vote_counts(&self) -> HashMap<String, u64> {
        self.index.tallies().clone()
    }

    pub fn votes_for_election<'a>(&'a self, election_id: &'a str) -> impl Iterator<Item = &'a Entry> + 'a {
        self.entries
            .iter()
            .filter(move |entry| entry.vote().is_some_and(|vote| vote.election_id == election_id))
    }

    pub fn vote_counts_for_election(&self, election_id: &str) -> HashMap<String, u64> {
        let mut counts = HashMap::new();
        for vote in self.votes_for_election(election_id).filter_map(Entry::vote) {
            *counts.entry(vote.candidate_id.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn election_results(&self, election_id: &str) -> ElectionResults {
        ElectionResults::from_counts(election_id, self.vote_counts_for_election(election_id))
    }

    /// Drop every vote, keeping the existing origin entry.
    pub fn clear(&mut self) {
        warn!(discarded = self.entries.len() - 1, "clearing all votes from the ledger");
        self.entries.truncate(1);
        self.index = VoteIndex::default();
    }

    pub fn save(&self, persistence: &dyn Persistence) -> Result<(), ChainError> {
        persistence.save_chain(&self.entries)?;
        info!(entries = self.entries.len(), target = %persistence.describe(), "ledger saved");
        Ok(())
    }

    /// Replace the in-memory chain with the stored snapshot. On any error the
    /// ledger is left untouched.
    pub fn load(&mut self, persistence: &dyn Persistence) -> Result<(), ChainError> {
        let entries = persistence.load_chain()?;
        *self = Ledger::from_entries(entries, self.difficulty)?;
        info!(entries = self.entries.len(), source = %persistence.describe(), "ledger loaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryPersistence;

    fn ledger_with_votes(votes: &[(&str, &str, &str)]) -> Ledger {
        let mut ledger = Ledger::new(1);
        for (voter, candidate, election) in votes {
            ledger.append(&VoteEvent::new(*voter, *candidate, *election));
        }
        ledger
    }

    #[test]
    fn test_new_ledger_has_origin_only() {
        let ledger = Ledger::new(2);
        assert_eq!(ledger.len(), 1);
        let origin = ledger.origin();
        assert_eq!(origin.position, 0);
        assert_eq!(origin.payload, Payload::Origin);
        assert_eq!(origin.previous_digest, ORIGIN_PREVIOUS_DIGEST);
        assert_eq!(origin.nonce, 0);
        assert_eq!(origin.digest, origin.compute_digest());
        assert!(ledger.is_valid());
    }

    #[test]
    fn test_digest_is_deterministic() {
        let payload = Payload::Vote(VoteRecord {
            hashed_voter_id: hash_voter_id("V1"),
            candidate_id: "C1".into(),
            election_id: "E1".into(),
        });
        let a = Entry::new(3, 1_700_000_000_000, payload.clone(), "ab".into());
        let b = Entry::new(3, 1_700_000_000_000, payload, "ab".into());
        assert_eq!(a.digest, b.digest);
        assert_eq!(a.compute_digest(), a.compute_digest());
    }

    #[test]
    fn test_digest_known_answer() {
        // Pins the byte encoding so snapshots written by earlier builds still verify.
        let payload = Payload::Vote(VoteRecord {
            hashed_voter_id: "h1".into(),
            candidate_id: "C1".into(),
            election_id: "E1".into(),
        });
        let entry = Entry::new(1, 1_700_000_000_000, payload, "ab".into());
        assert_eq!(
            entry.digest,
            "d147cb1ae18c7cb701717bfb11c526862adfc2172fbead5e3973480dcc0be65a"
        );

        assert_eq!(
            Entry::origin(1_700_000_000_000).digest,
            "2ab8a40f75980dde3ad5763e399aff698d1180a2f49ffae3cc9f6ab0d85538e7"
        );
    }

    #[test]
    fn test_digest_fields_do_not_run_together() {
        let a = Payload::Vote(VoteRecord {
            hashed_voter_id: "h".into(),
            candidate_id: "C1".into(),
            election_id: "E".into(),
        });
        let b = Payload::Vote(VoteRecord {
            hashed_voter_id: "h".into(),
            candidate_id: "C".into(),
            election_id: "1E".into(),
        });
        assert_ne!(
            Entry::new(1, 0, a, "x".into()).digest,
            Entry::new(1, 0, b, "x".into()).digest
        );
    }

    #[test]
    fn test_append_links_and_seals() {
        let ledger = ledger_with_votes(&[("V1", "C1", "E1"), ("V2", "C2", "E1"), ("V3", "C1", "E1")]);
        let chain = ledger.chain();
        assert_eq!(chain.len(), 4);
        for i in 1..chain.len() {
            assert_eq!(chain[i].position, chain[i - 1].position + 1);
            assert_eq!(chain[i].previous_digest, chain[i - 1].digest);
            assert!(chain[i].timestamp >= chain[i - 1].timestamp);
            assert!(meets_difficulty(&chain[i].digest, 1));
        }
        assert!(ledger.is_valid());
    }

    #[test]
    fn test_append_stores_only_hashed_voter() {
        let mut ledger = Ledger::new(1);
        let entry = ledger.append(&VoteEvent::new("alice-123", "C1", "E1"));
        let vote = entry.vote().unwrap();
        assert_eq!(vote.hashed_voter_id, hash_voter_id("alice-123"));
        let json = serde_json::to_string(ledger.chain()).unwrap();
        assert!(!json.contains("alice-123"));
    }

    #[test]
    fn test_has_voted() {
        let ledger = ledger_with_votes(&[("V1", "C1", "E1")]);
        assert!(ledger.has_voted("V1"));
        assert!(!ledger.has_voted("V2"));
        assert_eq!(ledger.voter_entry("V1").map(|e| e.position), Some(1));
        assert!(ledger.voter_entry("V2").is_none());
    }

    #[test]
    fn test_vote_counts() {
        let ledger = ledger_with_votes(&[("V1", "C1", "E1"), ("V2", "C1", "E1"), ("V3", "C2", "E1")]);
        let counts = ledger.vote_counts();
        assert_eq!(counts.len(), 2);
        assert_eq!(counts["C1"], 2);
        assert_eq!(counts["C2"], 1);
    }

    #[test]
    fn test_vote_counts_for_election_filters() {
        let ledger = ledger_with_votes(&[("V1", "C1", "E1"), ("V2", "C1", "E2"), ("V3", "C2", "E1")]);
        let e1 = ledger.vote_counts_for_election("E1");
        assert_eq!(e1.get("C1"), Some(&1));
        assert_eq!(e1.get("C2"), Some(&1));
        let e2 = ledger.vote_counts_for_election("E2");
        assert_eq!(e2.len(), 1);
        assert_eq!(ledger.votes_for_election("E3").count(), 0);
        assert_eq!(ledger.vote_counts()["C1"], 2);
    }

    #[test]
    fn test_tamper_detection_on_each_field() {
        let ledger = ledger_with_votes(&[("V1", "C1", "E1"), ("V2", "C2", "E1")]);
        let original = ledger.chain().to_vec();

        let tamper: Vec<Box<dyn Fn(&mut Entry)>> = vec![
            Box::new(|e: &mut Entry| e.position += 5),
            Box::new(|e: &mut Entry| e.timestamp += 1),
            Box::new(|e: &mut Entry| {
                if let Payload::Vote(v) = &mut e.payload {
                    v.candidate_id = "C9".into();
                }
            }),
            Box::new(|e: &mut Entry| e.previous_digest = "00ff".into()),
            Box::new(|e: &mut Entry| e.digest = "0".repeat(64)),
            Box::new(|e: &mut Entry| e.nonce += 1),
        ];

        for mutate in &tamper {
            let mut entries = original.clone();
            mutate(&mut entries[1]);
            assert_ne!(entries[1], original[1]);
            let tampered = Ledger::from_entries(entries, 1).unwrap();
            assert!(!tampered.is_valid());
        }
    }

    #[test]
    fn test_tampered_origin_detected() {
        let ledger = ledger_with_votes(&[("V1", "C1", "E1")]);
        let mut entries = ledger.chain().to_vec();
        entries[0].timestamp += 1;
        let tampered = Ledger::from_entries(entries, 1).unwrap();
        assert!(!tampered.is_valid());
    }

    #[test]
    fn test_push_sealed_rejects_stale_tail() {
        let mut ledger = Ledger::new(1);
        let first = seal(ledger.prepare(&VoteEvent::new("V1", "C1", "E1")), 1);
        let racing = seal(ledger.prepare(&VoteEvent::new("V2", "C1", "E1")), 1);
        ledger.push_sealed(first).unwrap();
        let err = ledger.push_sealed(racing).unwrap_err();
        assert!(matches!(err, ChainError::InvalidEntry(_)));
        assert_eq!(ledger.len(), 2);
        assert!(ledger.is_valid());
    }

    #[test]
    fn test_push_sealed_rejects_unsealed() {
        let mut ledger = Ledger::new(4);
        let mut candidate = ledger.prepare(&VoteEvent::new("V1", "C1", "E1"));
        while meets_difficulty(&candidate.digest, 4) {
            candidate.nonce += 1;
            candidate.digest = candidate.compute_digest();
        }
        assert!(ledger.push_sealed(candidate).is_err());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_clear_keeps_origin() {
        let mut ledger = ledger_with_votes(&[("V1", "C1", "E1"), ("V2", "C2", "E1")]);
        let origin = ledger.origin().clone();
        ledger.clear();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.origin(), &origin);
        assert!(ledger.is_valid());
        assert!(!ledger.has_voted("V1"));
        assert!(ledger.vote_counts().is_empty());

        ledger.append(&VoteEvent::new("V1", "C1", "E2"));
        assert_eq!(ledger.origin(), &origin);
        assert_eq!(ledger.chain()[1].previous_digest, origin.digest);
    }

    #[test]
    fn test_from_entries_rejects_bad_shape() {
        assert!(matches!(
            Ledger::from_entries(Vec::new(), 1),
            Err(ChainError::CorruptSnapshot(_))
        ));

        let ledger = ledger_with_votes(&[("V1", "C1", "E1")]);
        let without_origin = ledger.chain()[1..].to_vec();
        assert!(matches!(
            Ledger::from_entries(without_origin, 1),
            Err(ChainError::CorruptSnapshot(_))
        ));
    }

    #[test]
    fn test_difficulty_above_cap_rejected() {
        assert!(Ledger::try_new(8).is_ok());
        assert!(matches!(Ledger::try_new(9), Err(ChainError::ConfigError(_))));
        assert!(matches!(Ledger::try_new(65), Err(ChainError::ConfigError(_))));

        let entries = Ledger::new(1).chain().to_vec();
        assert!(matches!(
            Ledger::from_entries(entries, 9),
            Err(ChainError::ConfigError(_))
        ));
    }

    #[test]
    fn test_failed_load_keeps_state() {
        let mut ledger = ledger_with_votes(&[("V1", "C1", "E1")]);
        let before = ledger.chain().to_vec();
        let empty = InMemoryPersistence::new();
        let err = ledger.load(&empty).unwrap_err();
        assert!(err.is_non_fatal_load());
        assert_eq!(ledger.chain(), before.as_slice());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let ledger = ledger_with_votes(&[("V1", "C1", "E1"), ("V2", "C2", "E1")]);
        let store = InMemoryPersistence::new();
        ledger.save(&store).unwrap();

        let mut restored = Ledger::new(1);
        restored.load(&store).unwrap();
        assert_eq!(restored.chain(), ledger.chain());
        assert_eq!(restored.is_valid(), ledger.is_valid());
        assert!(restored.has_voted("V2"));
    }

    #[test]
    fn test_entry_json_field_names() {
        let ledger = ledger_with_votes(&[("V1", "C1", "E1")]);
        let value = serde_json::to_value(&ledger.chain()[1]).unwrap();
        for key in ["position", "timestamp", "payload", "previousDigest", "digest", "nonce"] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(value["payload"]["kind"], "vote");
        assert_eq!(value["payload"]["candidateId"], "C1");
        assert_eq!(value["payload"]["electionId"], "E1");
        assert!(value["payload"]["hashedVoterId"].is_string());

        let origin = serde_json::to_value(ledger.origin()).unwrap();
        assert_eq!(origin["payload"]["kind"], "origin");
        assert_eq!(origin["previousDigest"], "0");
    }
}
