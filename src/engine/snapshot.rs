use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cards::Card;

use super::events::EndReason;
use super::types::{
    Chips, HandId, HandPhase, PlayerId, PlayerState, PlayerStatus, Pot, SeatId, Street,
};

/// Actions open to the current actor, derived from the folded state.
/// Advisory for consumers; the reducer itself replays recorded history and
/// does not gate on this.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegalActions {
    pub may_fold: bool,
    pub may_check: bool,
    pub call_amount: Option<Chips>,
    pub bet_range: Option<(Chips, Chips)>,
    pub raise_range: Option<(Chips, Chips)>,
}

/// Canonical derived game state, fully keyed by `hand_id` and `sequence`.
/// `sequence` equals the count of events folded into the snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandSnapshot {
    pub hand_id: HandId,
    pub sequence: u64,

    pub phase: HandPhase,
    pub street: Street,

    pub dealer_seat: SeatId,
    pub sb_seat: SeatId,
    pub bb_seat: SeatId,
    pub sb_amount: Chips,
    pub bb_amount: Chips,

    /// 0, 3, 4 or 5 community cards.
    pub community: Vec<Card>,

    /// Hand state keyed by player id; seat order is the derived view below.
    pub players: BTreeMap<PlayerId, PlayerState>,
    /// Immutable seat assignment for the hand, sorted by seat.
    pub seats: Vec<(SeatId, PlayerId)>,

    pub current_player: Option<PlayerId>,
    pub current_bet_to_call: Chips,
    /// Size of the last full raise this street; the next raise must be at
    /// least `current_bet_to_call + min_raise`.
    pub min_raise: Chips,

    pub pot_total: Chips,
    pub pots: Vec<Pot>,

    pub is_active: bool,
    pub is_hand_over: bool,
    pub end_reason: Option<EndReason>,

    pub legal_actions: LegalActions,
}

impl HandSnapshot {
    pub fn player(&self, id: &PlayerId) -> Option<&PlayerState> {
        self.players.get(id)
    }

    pub fn seat_of(&self, id: &PlayerId) -> Option<SeatId> {
        self.players.get(id).map(|p| p.seat)
    }

    /// Players still contesting the pot, in seat order.
    pub fn players_in_hand(&self) -> Vec<&PlayerState> {
        let mut alive: Vec<&PlayerState> = self
            .players
            .values()
            .filter(|p| p.status != PlayerStatus::Folded && p.status != PlayerStatus::SittingOut)
            .collect();
        alive.sort_by_key(|p| p.seat);
        alive
    }

    /// Hole-card visibility policy: raw cards are visible to their owner at
    /// all times and to everyone from Showdown onward. The engine always
    /// emits raw cards in the snapshot; transport-level filtering applies
    /// this predicate.
    pub fn hole_cards_visible_to(&self, owner: &PlayerId, viewer: Option<&PlayerId>) -> bool {
        matches!(self.phase, HandPhase::Showdown | HandPhase::Complete)
            || viewer == Some(owner)
    }

    /// Price the given player must pay to continue.
    pub fn amount_to_call(&self, id: &PlayerId) -> Chips {
        let Some(p) = self.players.get(id) else {
            return 0;
        };
        self.current_bet_to_call.saturating_sub(p.current_bet)
    }

    pub(super) fn derive_legal_actions(&mut self) {
        self.legal_actions = match &self.current_player {
            Some(id) => self.legal_actions_for(id),
            None => LegalActions::default(),
        };
    }

    fn legal_actions_for(&self, id: &PlayerId) -> LegalActions {
        let Some(p) = self.players.get(id) else {
            return LegalActions::default();
        };
        if !p.status.can_act() || !self.is_active {
            return LegalActions::default();
        }

        let price = self.current_bet_to_call.saturating_sub(p.current_bet);
        let mut legals = LegalActions {
            may_fold: true,
            may_check: price == 0,
            call_amount: Some(price.min(p.stack)),
            bet_range: None,
            raise_range: None,
        };

        let max_to = p.current_bet.saturating_add(p.stack);
        if self.current_bet_to_call == 0 {
            let min = self.bb_amount.min(max_to);
            if max_to > 0 {
                legals.bet_range = Some((min, max_to));
            }
        } else {
            let min_to = self
                .current_bet_to_call
                .saturating_add(self.min_raise.max(self.bb_amount));
            if max_to > self.current_bet_to_call {
                legals.raise_range = Some((min_to.min(max_to), max_to));
            }
        }
        legals
    }
}
