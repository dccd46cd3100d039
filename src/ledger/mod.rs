//! Append-only, hash-chained value ledger.
//!
//! Every chip motion and revenue attribution is recorded as one immutable
//! entry. Entries chain through `prev_hash`/`hash` so any mutation of
//! history is detectable, and per-party running balances are maintained on
//! append.

pub mod book;
pub mod hash;
pub mod types;

pub use book::{IntegrityReport, LedgerError, NewEntry, RevenueReport, SharedLedger, ValueLedger};
pub use hash::GENESIS_HASH;
pub use types::{EntryKind, LedgerEntry, Party, PartyKind};
