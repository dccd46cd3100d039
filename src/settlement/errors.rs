use thiserror::Error;

use crate::engine::types::{Chips, HandId};
use crate::ledger::LedgerError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SettlementError {
    /// Distributing would create or destroy chips. Settlement aborts with
    /// the prior state retained.
    #[error(
        "chip conservation violated for hand {hand_id}: contributed {contributed}, \
         distributed {distributed} plus rake {rake}"
    )]
    ChipConservation {
        hand_id: HandId,
        contributed: Chips,
        distributed: Chips,
        rake: Chips,
    },
    #[error("pot {pot_index} has no eligible winner")]
    NoEligibleWinners { pot_index: usize },
    #[error("player `{player_id}` reached showdown without hole cards")]
    MissingHoleCards { player_id: String },
    #[error("ledger transaction failed: {0}")]
    TransactionFailed(#[from] LedgerError),
}
