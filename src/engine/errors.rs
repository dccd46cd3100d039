use thiserror::Error;

use super::types::{HandPhase, PlayerId};

/// Replay failures. Producing an event the state machine rejects is a
/// programming error in the caller, not runtime input.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ReplayError {
    #[error("event log is empty")]
    EmptyLog,
    #[error("event index {index} out of bounds (log has {len} events)")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("log must begin with HandStart, found `{found}`")]
    MissingHandStart { found: &'static str },
    #[error("invalid event for state at index {index}: {detail}")]
    InvalidEventForState { index: usize, detail: String },
    #[error("event at index {index} targets unknown player `{player_id}`")]
    UnknownPlayer { index: usize, player_id: PlayerId },
    #[error(
        "event at index {index} not allowed for `{player_id}` in phase {phase:?}: {detail}"
    )]
    ActionNotAllowed {
        index: usize,
        player_id: PlayerId,
        phase: HandPhase,
        detail: String,
    },
}
