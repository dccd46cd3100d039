//! The pure fold from an event log prefix to a canonical snapshot.

use std::collections::BTreeMap;

use tracing::trace;

use crate::settlement::pots::{self, Contribution};

use super::errors::ReplayError;
use super::events::{HandEvent, SeatedPlayer, WinnerAward};
use super::snapshot::{HandSnapshot, LegalActions};
use super::types::{Chips, HandPhase, PlayerId, PlayerState, PlayerStatus, SeatId, Street};

const LOG_TARGET: &str = "holdem_core::engine::replay";

/// Fold `events[0..=up_to]` into a snapshot.
///
/// Pure: no side effects, and re-execution with the same arguments returns
/// an equal snapshot. `up_to` is the index of the last applied event, so its
/// bounds are `[0, events.len() - 1]`; callers that count applied events
/// translate by one.
pub fn process(events: &[HandEvent], up_to: usize) -> Result<HandSnapshot, ReplayError> {
    if events.is_empty() {
        return Err(ReplayError::EmptyLog);
    }
    if up_to >= events.len() {
        return Err(ReplayError::IndexOutOfBounds {
            index: up_to,
            len: events.len(),
        });
    }

    let HandEvent::HandStart {
        hand_id,
        players,
        dealer_seat,
        sb_seat,
        bb_seat,
        sb_amount,
        bb_amount,
    } = &events[0]
    else {
        return Err(ReplayError::MissingHandStart {
            found: events[0].kind(),
        });
    };

    let mut snapshot = init_snapshot(
        hand_id.clone(),
        players,
        *dealer_seat,
        *sb_seat,
        *bb_seat,
        *sb_amount,
        *bb_amount,
    )?;

    for (index, event) in events.iter().enumerate().take(up_to + 1).skip(1) {
        apply(&mut snapshot, event, index)?;
    }

    snapshot.sequence = (up_to + 1) as u64;
    snapshot.pots = derive_pot_layering(&snapshot);
    snapshot.derive_legal_actions();

    trace!(
        target: LOG_TARGET,
        hand_id = %snapshot.hand_id,
        sequence = snapshot.sequence,
        phase = ?snapshot.phase,
        pot_total = snapshot.pot_total,
        "folded event prefix"
    );

    Ok(snapshot)
}

fn init_snapshot(
    hand_id: String,
    seated: &[SeatedPlayer],
    dealer_seat: SeatId,
    sb_seat: SeatId,
    bb_seat: SeatId,
    sb_amount: Chips,
    bb_amount: Chips,
) -> Result<HandSnapshot, ReplayError> {
    let mut players = BTreeMap::new();
    let mut seats: Vec<(SeatId, PlayerId)> = Vec::with_capacity(seated.len());
    for sp in seated {
        if players
            .insert(
                sp.player_id.clone(),
                PlayerState::new(sp.player_id.clone(), sp.seat, sp.stack),
            )
            .is_some()
        {
            return Err(ReplayError::InvalidEventForState {
                index: 0,
                detail: format!("duplicate player id `{}` in HandStart", sp.player_id),
            });
        }
        seats.push((sp.seat, sp.player_id.clone()));
    }
    seats.sort();
    for window in seats.windows(2) {
        if window[0].0 == window[1].0 {
            return Err(ReplayError::InvalidEventForState {
                index: 0,
                detail: format!("seat {} assigned twice in HandStart", window[0].0),
            });
        }
    }

    let mut snapshot = HandSnapshot {
        hand_id,
        sequence: 1,
        phase: HandPhase::Preflop,
        street: Street::Preflop,
        dealer_seat,
        sb_seat,
        bb_seat,
        sb_amount,
        bb_amount,
        community: Vec::new(),
        players,
        seats,
        current_player: None,
        current_bet_to_call: 0,
        min_raise: bb_amount,
        pot_total: 0,
        pots: Vec::new(),
        is_active: true,
        is_hand_over: false,
        end_reason: None,
        legal_actions: LegalActions::default(),
    };
    snapshot.current_player = next_active_clockwise(&snapshot, dealer_seat);
    Ok(snapshot)
}

fn apply(s: &mut HandSnapshot, event: &HandEvent, index: usize) -> Result<(), ReplayError> {
    if s.is_hand_over {
        return Err(ReplayError::InvalidEventForState {
            index,
            detail: format!("event `{}` after HandEnd", event.kind()),
        });
    }

    match event {
        HandEvent::HandStart { .. } => Err(ReplayError::InvalidEventForState {
            index,
            detail: "HandStart after index 0".to_string(),
        }),
        HandEvent::PostBlind {
            player_id, amount, ..
        } => {
            let blind = *amount;
            let seat = wager(s, player_id, index, |p| {
                if p.stack < blind {
                    return Err(format!(
                        "blind {blind} exceeds stack {stack}",
                        stack = p.stack
                    ));
                }
                p.stack -= blind;
                p.current_bet = blind;
                p.total_bet += blind;
                Ok(blind)
            })?;
            if blind > s.current_bet_to_call {
                s.current_bet_to_call = blind;
            }
            s.current_player = next_active_clockwise(s, seat);
            Ok(())
        }
        HandEvent::DealHole { player_id, cards } => {
            let p = player_mut(s, player_id, index)?;
            p.hole_cards = Some(*cards);
            Ok(())
        }
        HandEvent::StreetStart { street } => {
            s.street = *street;
            if s.phase < HandPhase::Showdown {
                s.phase = HandPhase::from_street(*street);
            }
            Ok(())
        }
        HandEvent::Bet { player_id, amount }
        | HandEvent::Call { player_id, amount }
        | HandEvent::Raise { player_id, amount }
        | HandEvent::AllIn { player_id, amount } => {
            let to = *amount;
            let seat = wager(s, player_id, index, |p| {
                let additional = to.checked_sub(p.current_bet).ok_or_else(|| {
                    format!(
                        "cumulative bet {to} below already-committed {committed}",
                        committed = p.current_bet
                    )
                })?;
                if additional > p.stack {
                    return Err(format!(
                        "wager of {additional} exceeds stack {stack}",
                        stack = p.stack
                    ));
                }
                p.stack -= additional;
                p.current_bet = to;
                p.total_bet += additional;
                Ok(additional)
            })?;
            let raises_to_call = !matches!(event, HandEvent::Call { .. });
            if raises_to_call && to > s.current_bet_to_call {
                s.min_raise = to - s.current_bet_to_call;
                s.current_bet_to_call = to;
            }
            if matches!(event, HandEvent::AllIn { .. }) {
                if let Some(p) = s.players.get_mut(player_id) {
                    p.status = PlayerStatus::AllIn;
                }
            }
            s.current_player = next_active_clockwise(s, seat);
            Ok(())
        }
        HandEvent::Check { player_id } | HandEvent::Fold { player_id } => {
            let folds = matches!(event, HandEvent::Fold { .. });
            let seat = {
                let p = acting_player_mut(s, player_id, index)?;
                if folds {
                    p.status = PlayerStatus::Folded;
                }
                p.seat
            };
            s.current_player = next_active_clockwise(s, seat);
            Ok(())
        }
        HandEvent::DealCommunity { phase, cards } => {
            s.community.extend_from_slice(cards);
            if s.community.len() > 5 {
                return Err(ReplayError::InvalidEventForState {
                    index,
                    detail: format!("board overflows to {} cards", s.community.len()),
                });
            }
            // The semantic street comes from StreetStart; inference from board
            // length covers legacy logs and never lowers the street.
            let inferred = Street::from_board_len(s.community.len()).unwrap_or(*phase);
            if inferred.index() > s.street.index() {
                s.street = inferred;
            }
            if phase.index() > s.street.index() {
                s.street = *phase;
            }
            if s.phase < HandPhase::Showdown {
                s.phase = HandPhase::from_street(s.street);
            }
            for p in s.players.values_mut() {
                p.current_bet = 0;
            }
            s.current_bet_to_call = 0;
            s.min_raise = 0;
            s.current_player = next_active_clockwise(s, s.dealer_seat);
            Ok(())
        }
        HandEvent::Showdown => {
            s.phase = HandPhase::Showdown;
            s.is_active = false;
            s.current_player = None;
            Ok(())
        }
        HandEvent::HandEnd { reason, winners } => {
            credit_winners(s, winners, index)?;
            s.is_active = false;
            s.is_hand_over = true;
            s.end_reason = Some(*reason);
            s.phase = HandPhase::Complete;
            s.current_player = None;
            Ok(())
        }
    }
}

fn credit_winners(
    s: &mut HandSnapshot,
    winners: &[WinnerAward],
    index: usize,
) -> Result<(), ReplayError> {
    for w in winners {
        let p = player_mut(s, &w.player_id, index)?;
        p.stack += w.amount;
    }
    Ok(())
}

fn player_mut<'a>(
    s: &'a mut HandSnapshot,
    id: &PlayerId,
    index: usize,
) -> Result<&'a mut PlayerState, ReplayError> {
    s.players
        .get_mut(id)
        .ok_or_else(|| ReplayError::UnknownPlayer {
            index,
            player_id: id.clone(),
        })
}

fn acting_player_mut<'a>(
    s: &'a mut HandSnapshot,
    id: &PlayerId,
    index: usize,
) -> Result<&'a mut PlayerState, ReplayError> {
    let phase = s.phase;
    let p = s
        .players
        .get_mut(id)
        .ok_or_else(|| ReplayError::UnknownPlayer {
            index,
            player_id: id.clone(),
        })?;
    if !p.status.can_act() {
        return Err(ReplayError::ActionNotAllowed {
            index,
            player_id: id.clone(),
            phase,
            detail: format!("status {:?} forbids the action", p.status),
        });
    }
    Ok(p)
}

/// Apply a chip-moving mutation to an acting player, mapping mutation
/// failures to `ActionNotAllowed`. Returns the player's seat.
fn wager<F>(
    s: &mut HandSnapshot,
    id: &PlayerId,
    index: usize,
    mutate: F,
) -> Result<SeatId, ReplayError>
where
    F: FnOnce(&mut PlayerState) -> Result<Chips, String>,
{
    let phase = s.phase;
    let p = acting_player_mut(s, id, index)?;
    let seat = p.seat;
    let additional = mutate(p).map_err(|detail| ReplayError::ActionNotAllowed {
        index,
        player_id: id.clone(),
        phase,
        detail,
    })?;
    s.pot_total += additional;
    Ok(seat)
}

/// Next seat clockwise of `from` whose player can still act. Wraps around
/// the seat ring; `None` when nobody can act.
fn next_active_clockwise(s: &HandSnapshot, from: SeatId) -> Option<PlayerId> {
    if s.seats.is_empty() {
        return None;
    }
    let start = s.seats.partition_point(|(seat, _)| *seat <= from);
    let n = s.seats.len();
    for offset in 0..n {
        let (_, id) = &s.seats[(start + offset) % n];
        if let Some(p) = s.players.get(id) {
            if p.status.can_act() {
                return Some(id.clone());
            }
        }
    }
    None
}

fn derive_pot_layering(s: &HandSnapshot) -> Vec<super::types::Pot> {
    let contributions: Vec<Contribution> = s
        .players
        .values()
        .map(|p| Contribution {
            player_id: p.player_id.clone(),
            amount: p.total_bet,
            all_in: p.status == PlayerStatus::AllIn,
            folded: p.status == PlayerStatus::Folded,
        })
        .collect();
    pots::calculate(&contributions).pots
}
