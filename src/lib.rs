//! BallotChain - a tamper-evident, append-only vote ledger
//!
//! Every cast vote becomes one entry, linked to its predecessor by digest and
//! sealed with a small proof-of-work. The ledger records votes; deciding who
//! may vote is left to the calling service.
//!
//! # Architecture
//!
//! ## Core Ledger
//! - [`blockchain`] - Entries, the ledger, validation and tallies
//! - [`miner`] - Proof-of-work sealing
//!
//! ## Cryptography
//! - [`crypto`] - SHA-256 digests and voter hashing
//!
//! ## State Management
//! - [`persistence`] - JSON file and SQLite snapshot stores
//! - [`node`] - Shared single-writer ledger handle
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;
pub mod miner;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;

// ============================================================================
// State Management
// ============================================================================
pub mod node;
pub mod persistence;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;

pub use blockchain::{Entry, Ledger, Payload, VoteEvent, VoteRecord};
pub use error::{ChainError, Result};
pub use node::{LedgerHandle, LoadOutcome};
