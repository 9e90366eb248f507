//! Shared, single-writer handle over the ledger
//!
//! Appends and resets are serialized through one writer lock. Sealing runs
//! while only that lock is held, so readers keep going during proof-of-work
//! and only ever see fully sealed entries. Each mutation is persisted before
//! the writer lock is released, keeping snapshots in mutation order.

use crate::blockchain::{ElectionResults, Entry, Ledger, VoteEvent};
use crate::config::Config;
use crate::error::ChainError;
use crate::miner::seal;
use crate::persistence::{open_persistence, Persistence};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// How the ledger came up at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Restored { entries: usize },
    /// No usable snapshot; the ledger started origin-only.
    Fresh { reason: ChainError },
}

struct Shared {
    writer: Mutex<()>,
    ledger: RwLock<Ledger>,
    persistence: Box<dyn Persistence>,
    outcome: LoadOutcome,
}

#[derive(Clone)]
pub struct LedgerHandle {
    shared: Arc<Shared>,
}

impl LedgerHandle {
    /// Create-or-load using the configured storage backend.
    pub fn open(config: &Config) -> Result<Self, ChainError> {
        let persistence = open_persistence(&config.storage)?;
        Self::open_with(persistence, config.ledger.difficulty)
    }

    /// Create-or-load against an explicit backend. A missing or unreadable
    /// snapshot is not fatal: the handle starts from a fresh origin entry and
    /// reports why through [`LedgerHandle::load_outcome`]. A difficulty above
    /// [`crate::config::MAX_DIFFICULTY`] is rejected with a config error.
    pub fn open_with(persistence: Box<dyn Persistence>, difficulty: usize) -> Result<Self, ChainError> {
        let mut ledger = Ledger::try_new(difficulty)?;

        let outcome = match ledger.load(persistence.as_ref()) {
            Ok(()) => LoadOutcome::Restored {
                entries: ledger.len(),
            },
            Err(e) => {
                warn!(
                    "Failed to load ledger from {}: {}. Starting with origin entry.",
                    persistence.describe(),
                    e
                );
                LoadOutcome::Fresh { reason: e }
            }
        };

        info!(
            difficulty,
            entries = ledger.len(),
            storage = %persistence.describe(),
            "ledger ready"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                writer: Mutex::new(()),
                ledger: RwLock::new(ledger),
                persistence,
                outcome,
            }),
        })
    }

    pub fn load_outcome(&self) -> &LoadOutcome {
        &self.shared.outcome
    }

    /// Seal and append a vote, then persist. The caller is responsible for
    /// checking [`LedgerHandle::has_voted`] and election state first.
    ///
    /// If the save fails the entry stays appended in memory and the error is
    /// returned; the next successful save includes it.
    pub fn append(&self, event: &VoteEvent) -> Result<Entry, ChainError> {
        let _writer = self.shared.writer.lock();

        let (candidate, difficulty) = {
            let ledger = self.shared.ledger.read();
            (ledger.prepare(event), ledger.difficulty())
        };

        let sealed = seal(candidate, difficulty);

        let entry = self.shared.ledger.write().push_sealed(sealed)?;

        self.persist()?;
        Ok(entry)
    }

    /// Discard every vote and persist the origin-only ledger. Privileged;
    /// access control belongs to the caller.
    pub fn clear(&self) -> Result<(), ChainError> {
        let _writer = self.shared.writer.lock();
        self.shared.ledger.write().clear();
        self.persist()
    }

    pub fn save(&self) -> Result<(), ChainError> {
        let _writer = self.shared.writer.lock();
        self.persist()
    }

    /// Replace the in-memory ledger with the stored snapshot. On error the
    /// current state is kept.
    pub fn reload(&self) -> Result<(), ChainError> {
        let _writer = self.shared.writer.lock();
        let difficulty = self.difficulty();
        let restored = self
            .shared
            .persistence
            .load_chain()
            .and_then(|entries| Ledger::from_entries(entries, difficulty));

        match restored {
            Ok(ledger) => {
                *self.shared.ledger.write() = ledger;
                info!(entries = self.len(), "ledger reloaded");
                Ok(())
            }
            Err(e) => {
                warn!(
                    "Failed to reload ledger from {}: {}. Keeping current state.",
                    self.shared.persistence.describe(),
                    e
                );
                Err(e)
            }
        }
    }

    // Caller must hold the writer lock. Readers may proceed during the save.
    fn persist(&self) -> Result<(), ChainError> {
        let ledger = self.shared.ledger.read();
        ledger.save(self.shared.persistence.as_ref())
    }

    pub fn difficulty(&self) -> usize {
        self.shared.ledger.read().difficulty()
    }

    /// Copy of the current chain, safe to hold across further appends.
    pub fn chain(&self) -> Vec<Entry> {
        self.shared.ledger.read().chain().to_vec()
    }

    pub fn len(&self) -> usize {
        self.shared.ledger.read().len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn tail(&self) -> Entry {
        self.shared.ledger.read().tail().clone()
    }

    pub fn is_valid(&self) -> bool {
        self.shared.ledger.read().is_valid()
    }

    pub fn has_voted(&self, voter_id: &str) -> bool {
        self.shared.ledger.read().has_voted(voter_id)
    }

    pub fn voter_entry(&self, voter_id: &str) -> Option<Entry> {
        self.shared.ledger.read().voter_entry(voter_id).cloned()
    }

    pub fn vote_counts(&self) -> HashMap<String, u64> {
        self.shared.ledger.read().vote_counts()
    }

    pub fn vote_counts_for_election(&self, election_id: &str) -> HashMap<String, u64> {
        self.shared.ledger.read().vote_counts_for_election(election_id)
    }

    pub fn election_results(&self, election_id: &str) -> ElectionResults {
        self.shared.ledger.read().election_results(election_id)
    }

    /// Run a read-only closure against the ledger without copying the chain.
    pub fn with_ledger<R>(&self, f: impl FnOnce(&Ledger) -> R) -> R {
        f(&self.shared.ledger.read())
    }
}
