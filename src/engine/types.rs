use serde::{Deserialize, Serialize};

use crate::cards::Card;

pub type Chips = u64;
pub type SeatId = u8; // 0..=9
pub type PlayerId = String;
pub type HandId = String;
pub type TableId = String;
pub type ClubId = String;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Street {
    Preflop,
    Flop,
    Turn,
    River,
}

impl Street {
    /// Betting-round ordering. Showdown sits above River in [`HandPhase`].
    pub fn index(self) -> u8 {
        match self {
            Street::Preflop => 0,
            Street::Flop => 1,
            Street::Turn => 2,
            Street::River => 3,
        }
    }

    /// Street implied by the number of community cards on the board.
    /// Legacy logs omit `StreetStart`, so the reducer infers from board
    /// length; inference never lowers the street, only advances it.
    pub fn from_board_len(len: usize) -> Option<Street> {
        match len {
            3 => Some(Street::Flop),
            4 => Some(Street::Turn),
            5 => Some(Street::River),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HandPhase {
    Initializing,
    Preflop,
    Flop,
    Turn,
    River,
    Showdown,
    Complete,
}

impl HandPhase {
    pub fn index(self) -> u8 {
        match self {
            HandPhase::Initializing => 0,
            HandPhase::Preflop => 1,
            HandPhase::Flop => 2,
            HandPhase::Turn => 3,
            HandPhase::River => 4,
            HandPhase::Showdown => 5,
            HandPhase::Complete => 6,
        }
    }

    pub fn from_street(street: Street) -> HandPhase {
        match street {
            Street::Preflop => HandPhase::Preflop,
            Street::Flop => HandPhase::Flop,
            Street::Turn => HandPhase::Turn,
            Street::River => HandPhase::River,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerStatus {
    Active,
    Folded,
    AllIn,
    SittingOut,
}

impl PlayerStatus {
    pub fn as_byte(self) -> u8 {
        match self {
            PlayerStatus::Active => 0,
            PlayerStatus::Folded => 1,
            PlayerStatus::AllIn => 2,
            PlayerStatus::SittingOut => 3,
        }
    }

    /// Whether the player can still be handed the action.
    pub fn can_act(self) -> bool {
        self == PlayerStatus::Active
    }
}

/// Per-hand, per-seat contribution state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    pub player_id: PlayerId,
    pub seat: SeatId,
    pub stack: Chips,
    /// Cumulative wager on the current street.
    pub current_bet: Chips,
    /// Cumulative wager across the whole hand, blinds included.
    pub total_bet: Chips,
    pub status: PlayerStatus,
    pub hole_cards: Option<[Card; 2]>,
}

impl PlayerState {
    pub fn new(player_id: PlayerId, seat: SeatId, stack: Chips) -> Self {
        Self {
            player_id,
            seat,
            stack,
            current_bet: 0,
            total_bet: 0,
            status: PlayerStatus::Active,
            hole_cards: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PotKind {
    Main,
    Side,
}

/// One layer of the pot. Derived state, never authored directly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pot {
    pub amount: Chips,
    /// Player ids eligible to win this layer, sorted ascending.
    pub eligible: Vec<PlayerId>,
    pub kind: PotKind,
}
