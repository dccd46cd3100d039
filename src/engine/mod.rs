//! Event-sourced hand replay engine.
//!
//! The event log is the single source of truth for a hand. [`replay::process`]
//! folds a prefix of the log into a [`snapshot::HandSnapshot`]; folding the
//! same prefix twice yields bitwise-identical snapshots.

pub mod errors;
pub mod events;
pub mod format;
pub mod log;
pub mod replay;
pub mod snapshot;
pub mod types;

pub use errors::ReplayError;
pub use events::{BlindKind, EndReason, HandEvent, SeatedPlayer, WinnerAward};
pub use format::describe_event;
pub use log::HandLog;
pub use replay::process;
pub use snapshot::{HandSnapshot, LegalActions};
pub use types::{
    Chips, HandId, HandPhase, PlayerId, PlayerState, PlayerStatus, Pot, PotKind, SeatId, Street,
};
