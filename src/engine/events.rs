use serde::{Deserialize, Serialize};

use crate::cards::Card;

use super::types::{Chips, HandId, PlayerId, SeatId, Street};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlindKind {
    Small,
    Big,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndReason {
    Showdown,
    AllFold,
}

/// Seat assignment carried by `HandStart`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatedPlayer {
    pub player_id: PlayerId,
    pub seat: SeatId,
    pub stack: Chips,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinnerAward {
    pub player_id: PlayerId,
    pub amount: Chips,
    pub hand_rank: Option<String>,
}

/// The hand event vocabulary. Events are value-typed and immutable once
/// recorded; equality is field equality.
///
/// For the wager variants (`Bet`, `Call`, `Raise`, `AllIn`) `amount` is the
/// player's cumulative wager on the current street, not the increment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandEvent {
    HandStart {
        hand_id: HandId,
        players: Vec<SeatedPlayer>,
        dealer_seat: SeatId,
        sb_seat: SeatId,
        bb_seat: SeatId,
        sb_amount: Chips,
        bb_amount: Chips,
    },
    PostBlind {
        player_id: PlayerId,
        amount: Chips,
        kind: BlindKind,
    },
    DealHole {
        player_id: PlayerId,
        cards: [Card; 2],
    },
    StreetStart {
        street: Street,
    },
    Bet {
        player_id: PlayerId,
        amount: Chips,
    },
    Call {
        player_id: PlayerId,
        amount: Chips,
    },
    Raise {
        player_id: PlayerId,
        amount: Chips,
    },
    AllIn {
        player_id: PlayerId,
        amount: Chips,
    },
    Check {
        player_id: PlayerId,
    },
    Fold {
        player_id: PlayerId,
    },
    DealCommunity {
        phase: Street,
        cards: Vec<Card>,
    },
    Showdown,
    HandEnd {
        reason: EndReason,
        winners: Vec<WinnerAward>,
    },
}

impl HandEvent {
    /// Player the event targets, when any.
    pub fn actor(&self) -> Option<&PlayerId> {
        match self {
            HandEvent::PostBlind { player_id, .. }
            | HandEvent::DealHole { player_id, .. }
            | HandEvent::Bet { player_id, .. }
            | HandEvent::Call { player_id, .. }
            | HandEvent::Raise { player_id, .. }
            | HandEvent::AllIn { player_id, .. }
            | HandEvent::Check { player_id }
            | HandEvent::Fold { player_id } => Some(player_id),
            _ => None,
        }
    }

    /// Short stable tag for logs and timeline attribution.
    pub fn kind(&self) -> &'static str {
        match self {
            HandEvent::HandStart { .. } => "hand_start",
            HandEvent::PostBlind { .. } => "post_blind",
            HandEvent::DealHole { .. } => "deal_hole",
            HandEvent::StreetStart { .. } => "street_start",
            HandEvent::Bet { .. } => "bet",
            HandEvent::Call { .. } => "call",
            HandEvent::Raise { .. } => "raise",
            HandEvent::AllIn { .. } => "all_in",
            HandEvent::Check { .. } => "check",
            HandEvent::Fold { .. } => "fold",
            HandEvent::DealCommunity { .. } => "deal_community",
            HandEvent::Showdown => "showdown",
            HandEvent::HandEnd { .. } => "hand_end",
        }
    }
}
