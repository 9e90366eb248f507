// Thin re-export module: implementation is in `blockchain/core.rs`, split
// into entry/ledger logic, the derived vote index, chain validation and
// election results.

pub mod core;
pub use self::core::*;
